//! Real spherical harmonics
//!
//! Orthonormal real basis in ACN channel order, without Condon-Shortley phase:
//!
//! - `m > 0`: `sqrt(2) K(n, m) P_n^m(cos θ) cos(m φ)`
//! - `m = 0`: `K(n, 0) P_n(cos θ)`
//! - `m < 0`: `sqrt(2) K(n, |m|) P_n^|m|(cos θ) sin(|m| φ)`
//!
//! with `K(n, m) = sqrt((2n + 1) / 4π · (n - m)! / (n + m)!)`.

use ndarray::Array2;
use std::f64::consts::PI;

/// Angle enclosing the max-rE main lobe, in degrees
const MAX_RE_ANGLE_DEG: f64 = 137.9;

/// Number of SH channels for an order
pub fn channel_count(order: usize) -> usize {
    (order + 1) * (order + 1)
}

/// ACN channel index from (order, degree)
pub fn acn_index(order: usize, degree: i64) -> usize {
    (order as i64 * order as i64 + order as i64 + degree) as usize
}

/// Get (order, degree) from ACN index
pub fn acn_to_order_degree(acn: usize) -> (usize, i64) {
    let order = (acn as f64).sqrt().floor() as usize;
    let degree = acn as i64 - (order * order + order) as i64;
    (order, degree)
}

/// Associated Legendre functions `P_n^m(x)` for `0 <= m <= n <= order`,
/// stored at `[n][m]`, without Condon-Shortley phase
fn associated_legendre(order: usize, x: f64) -> Vec<Vec<f64>> {
    let mut p = vec![vec![0.0; order + 1]; order + 1];
    let s = (1.0 - x * x).max(0.0).sqrt();

    // Diagonal: P_m^m = (2m - 1)!! s^m
    p[0][0] = 1.0;
    for m in 1..=order {
        p[m][m] = p[m - 1][m - 1] * (2 * m - 1) as f64 * s;
    }
    for m in 0..order {
        p[m + 1][m] = x * (2 * m + 1) as f64 * p[m][m];
    }
    for m in 0..=order {
        for n in (m + 2)..=order {
            p[n][m] = ((2 * n - 1) as f64 * x * p[n - 1][m] - (n + m - 1) as f64 * p[n - 2][m])
                / (n - m) as f64;
        }
    }
    p
}

/// Normalization `K(n, m)`
fn sh_norm(n: usize, m: usize) -> f64 {
    // (n - m)! / (n + m)! as a running product
    let ratio: f64 = ((n - m + 1)..=(n + m)).map(|k| 1.0 / k as f64).product();
    ((2 * n + 1) as f64 / (4.0 * PI) * ratio).sqrt()
}

/// Real SH coefficients of a single direction
pub fn sh_vector(order: usize, azimuth: f64, colatitude: f64) -> Vec<f64> {
    let mut coeffs = vec![0.0; channel_count(order)];
    fill_sh(order, azimuth, colatitude, &mut coeffs);
    coeffs
}

fn fill_sh(order: usize, azimuth: f64, colatitude: f64, out: &mut [f64]) {
    let p = associated_legendre(order, colatitude.cos());
    for n in 0..=order {
        out[acn_index(n, 0)] = sh_norm(n, 0) * p[n][0];
        for m in 1..=n {
            let k = std::f64::consts::SQRT_2 * sh_norm(n, m) * p[n][m];
            let (sin_m, cos_m) = (m as f64 * azimuth).sin_cos();
            out[acn_index(n, m as i64)] = k * cos_m;
            out[acn_index(n, -(m as i64))] = k * sin_m;
        }
    }
}

/// SH matrix `(points, (order + 1)^2)` for parallel azimuth/colatitude slices
pub fn sh_matrix(order: usize, azimuth: &[f64], colatitude: &[f64]) -> Array2<f64> {
    let points = azimuth.len().min(colatitude.len());
    let mut y = Array2::zeros((points, channel_count(order)));
    for (mut row, (&azi, &col)) in y.rows_mut().into_iter().zip(azimuth.iter().zip(colatitude)) {
        // rows of a standard-layout Array2 are contiguous
        if let Some(out) = row.as_slice_mut() {
            fill_sh(order, azi, col, out);
        }
    }
    y
}

/// Legendre polynomial `P_n(x)` for all `n <= order`
fn legendre(order: usize, x: f64) -> Vec<f64> {
    let mut p = vec![1.0; order + 1];
    if order >= 1 {
        p[1] = x;
    }
    for n in 2..=order {
        p[n] = ((2 * n - 1) as f64 * x * p[n - 1] - (n - 1) as f64 * p[n - 2]) / n as f64;
    }
    p
}

/// max-rE tapering weights per order
pub fn max_re_weights(order: usize) -> Vec<f64> {
    let theta = (MAX_RE_ANGLE_DEG / (order as f64 + 1.51)).to_radians();
    legendre(order, theta.cos())
}

/// Expand per-order coefficients to one value per ACN channel
pub fn repeat_per_order(coeffs: &[f64]) -> Vec<f64> {
    coeffs
        .iter()
        .enumerate()
        .flat_map(|(n, &c)| std::iter::repeat_n(c, 2 * n + 1))
        .collect()
}
