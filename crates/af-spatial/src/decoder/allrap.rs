//! All-round ambisonic panning and decoding
//!
//! Sources (ALLRAP) or SH sound fields (ALLRAD) are sampled on the kernel
//! grid with max-rE weighting and the kernel samples are re-projected onto the
//! loudspeakers through the VBAP gains of the kernel points on the ambisonics
//! hull. The "2" variants sum energies instead of amplitudes.

use std::borrow::Cow;
use std::f64::consts::PI;

use nalgebra::Vector3;
use ndarray::{Array1, Array2, s};

use super::setup::{AmbisonicHulls, AmbisonicOptions, LoudspeakerSetup};
use crate::error::{SpatialError, SpatialResult};
use crate::position::{cart2sph, unit};
use crate::sph::{channel_count, max_re_weights, repeat_per_order, sh_matrix, sh_vector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reprojection {
    Amplitude,
    Energy,
}

/// ALLRAP gains `(sources, loudspeakers)`
///
/// `n_sph` defaults to the characteristic order.
pub fn allrap(
    sources: &[Vector3<f64>],
    setup: &LoudspeakerSetup,
    n_sph: Option<usize>,
) -> SpatialResult<Array2<f64>> {
    let order = resolve_order(setup, n_sph)?;
    reproject(&dirac_sh(sources, order)?, setup, order, Reprojection::Amplitude)
}

/// Energy-preserving ALLRAP gains `(sources, loudspeakers)`
pub fn allrap2(
    sources: &[Vector3<f64>],
    setup: &LoudspeakerSetup,
    n_sph: Option<usize>,
) -> SpatialResult<Array2<f64>> {
    let order = resolve_order(setup, n_sph)?;
    reproject(&dirac_sh(sources, order)?, setup, order, Reprojection::Energy)
}

/// ALLRAD decode of SH coefficients `(sources, (N+1)^2)` to
/// `(sources, loudspeakers)`
///
/// The order is taken from the coefficient count; a given `n_sph` must
/// agree with it.
pub fn allrad(
    f_nm: &Array2<f64>,
    setup: &LoudspeakerSetup,
    n_sph: Option<usize>,
) -> SpatialResult<Array2<f64>> {
    let order = coefficient_order(f_nm, n_sph)?;
    reproject(f_nm, setup, order, Reprojection::Amplitude)
}

/// Energy-preserving ALLRAD decode
pub fn allrad2(
    f_nm: &Array2<f64>,
    setup: &LoudspeakerSetup,
    n_sph: Option<usize>,
) -> SpatialResult<Array2<f64>> {
    let order = coefficient_order(f_nm, n_sph)?;
    reproject(f_nm, setup, order, Reprojection::Energy)
}

fn resolve_order(setup: &LoudspeakerSetup, n_sph: Option<usize>) -> SpatialResult<usize> {
    match n_sph {
        Some(order) => Ok(order),
        None => setup.characteristic_order(),
    }
}

fn coefficient_order(f_nm: &Array2<f64>, n_sph: Option<usize>) -> SpatialResult<usize> {
    let channels = f_nm.ncols();
    let order = ((channels as f64).sqrt().round() as usize).saturating_sub(1);
    if channel_count(order) != channels {
        return Err(SpatialError::InvalidInput(format!(
            "{channels} SH channels is not a full order"
        )));
    }
    match n_sph {
        Some(n) if n != order => Err(SpatialError::LengthMismatch {
            what: "SH channels per source",
            expected: channel_count(n),
            got: channels,
        }),
        _ => Ok(order),
    }
}

/// Band-limited Dirac per source, `(sources, (N+1)^2)`
fn dirac_sh(sources: &[Vector3<f64>], order: usize) -> SpatialResult<Array2<f64>> {
    let mut f = Array2::zeros((sources.len(), channel_count(order)));
    for (s, (src, mut row)) in sources.iter().zip(f.rows_mut()).enumerate() {
        let p = unit(src)
            .ok_or_else(|| SpatialError::InvalidInput(format!("source {s} has zero length")))?;
        let (azi, colat, _) = cart2sph(p.x, p.y, p.z);
        row.assign(&Array1::from(sh_vector(order, azi, colat)));
    }
    Ok(f)
}

/// Stored hulls, or hulls built for this call only
fn ambisonic_hulls(setup: &LoudspeakerSetup, order: usize) -> SpatialResult<Cow<'_, AmbisonicHulls>> {
    match setup.ambisonic() {
        Some(hulls) => Ok(Cow::Borrowed(hulls)),
        None => {
            log::warn!(
                "Ambisonic hulls not prepared, building a kernel of order {} for this call",
                order.max(1)
            );
            let hulls = setup.build_ambisonic_hulls(&AmbisonicOptions::new(order.max(1)))?;
            Ok(Cow::Owned(hulls))
        }
    }
}

fn reproject(
    f_nm: &Array2<f64>,
    setup: &LoudspeakerSetup,
    order: usize,
    mode: Reprojection,
) -> SpatialResult<Array2<f64>> {
    let hulls = ambisonic_hulls(setup, order)?;
    let kernel = &hulls.kernel.points;
    let (azi, colat): (Vec<f64>, Vec<f64>) = kernel
        .iter()
        .map(|k| {
            let (azi, colat, _) = cart2sph(k.x, k.y, k.z);
            (azi, colat)
        })
        .unzip();

    // Virtual kernel signals v = F diag(a_n) Y_kᵀ, (sources, kernel points)
    let y_k = sh_matrix(order, &azi, &colat);
    let a_n = Array1::from(repeat_per_order(&max_re_weights(order)));
    let v = (f_nm * &a_n).dot(&y_k.t());

    let g_k = hulls.kernel_gains();
    let scale = 4.0 * PI / kernel.len() as f64;
    let gains = match mode {
        Reprojection::Amplitude => v.dot(&g_k) * scale,
        Reprojection::Energy => (v.mapv(|x| x * x).dot(&g_k.mapv(|g| g * g)) * scale).mapv(f64::sqrt),
    };

    // imaginary loudspeakers are dropped
    Ok(gains.slice(s![.., ..setup.num_loudspeakers()]).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grids::Grid;
    use approx::assert_abs_diff_eq;

    fn sphere_setup() -> LoudspeakerSetup {
        let mut setup = LoudspeakerSetup::from_positions(&Grid::fibonacci(24).vectors(), Vector3::zeros()).unwrap();
        setup.setup_for_ambisonic(&AmbisonicOptions::new(4)).unwrap();
        setup
    }

    #[test]
    fn test_allrap_matches_allrad() {
        let setup = sphere_setup();
        let src = Vector3::new(1.0, 0.5, 2.5);
        let order = 2;

        let g_rap = allrap(&[src], &setup, Some(order)).unwrap();
        let (azi, colat, _) = cart2sph(src.x, src.y, src.z);
        let f = sh_matrix(order, &[azi], &[colat]);
        let g_rad = allrad(&f, &setup, Some(order)).unwrap();

        assert_eq!(g_rap.dim(), (1, 24));
        for (a, b) in g_rap.iter().zip(&g_rad) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }

        let g_rap2 = allrap2(&[src], &setup, Some(order)).unwrap();
        let g_rad2 = allrad2(&f, &setup, None).unwrap();
        for (a, b) in g_rap2.iter().zip(&g_rad2) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
        assert!(g_rap2.iter().all(|&g| g >= 0.0));
    }

    #[test]
    fn test_allrap_peaks_at_source() {
        let setup = sphere_setup();
        let target = 7;
        let src = setup.directions()[target];
        let g = allrap(&[src], &setup, Some(2)).unwrap();
        let best = g
            .row(0)
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(best, target);
    }

    #[test]
    fn test_coefficient_order_checks() {
        let setup = sphere_setup();
        assert!(matches!(
            allrad(&Array2::zeros((1, 5)), &setup, None),
            Err(SpatialError::InvalidInput(_))
        ));
        assert!(matches!(
            allrad(&Array2::zeros((1, 9)), &setup, Some(1)),
            Err(SpatialError::LengthMismatch { .. })
        ));
    }
}
