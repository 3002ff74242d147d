//! HRIR measurement sets

use nalgebra::Vector3;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::cache::CacheKey;
use crate::error::{SpatialError, SpatialResult};
use crate::position::{Direction, directions_to_vectors};

/// Taps of the synthetic set
const SYNTHETIC_TAPS: usize = 128;

/// Grid resolution of the synthetic set in degrees
const SYNTHETIC_STEP_DEG: usize = 10;

/// Immutable HRIR set on a measurement grid
#[derive(Debug, Clone)]
pub struct HrirSet {
    left: Vec<Vec<f64>>,
    right: Vec<Vec<f64>>,
    azimuth: Vec<f64>,
    colatitude: Vec<f64>,
    vectors: Vec<Vector3<f64>>,
    fs: u32,
    taps: usize,
    hash: [u8; 32],
}

impl HrirSet {
    /// Create from per-direction impulse responses
    ///
    /// All responses must share one non-zero length and contain only finite
    /// values; grid angles are radians.
    pub fn new(
        left: Vec<Vec<f64>>,
        right: Vec<Vec<f64>>,
        azimuth: Vec<f64>,
        colatitude: Vec<f64>,
        fs: u32,
    ) -> SpatialResult<Self> {
        let count = left.len();
        if count == 0 {
            return Err(SpatialError::InvalidHrirSet("no measurement directions".into()));
        }
        for (what, got) in [
            ("right HRIRs", right.len()),
            ("HRIR azimuths", azimuth.len()),
            ("HRIR colatitudes", colatitude.len()),
        ] {
            if got != count {
                return Err(SpatialError::LengthMismatch {
                    what,
                    expected: count,
                    got,
                });
            }
        }
        if fs == 0 {
            return Err(SpatialError::InvalidHrirSet("sample rate is zero".into()));
        }

        let taps = left[0].len();
        if taps == 0 {
            return Err(SpatialError::InvalidHrirSet("empty impulse responses".into()));
        }
        for (i, (l, r)) in left.iter().zip(&right).enumerate() {
            if l.len() != taps || r.len() != taps {
                return Err(SpatialError::InvalidHrirSet(format!(
                    "direction {i} has {}/{} taps, expected {taps}",
                    l.len(),
                    r.len()
                )));
            }
            if !l.iter().chain(r).all(|s| s.is_finite()) {
                return Err(SpatialError::InvalidHrirSet(format!(
                    "direction {i} contains non-finite samples"
                )));
            }
        }
        if !azimuth.iter().chain(&colatitude).all(|a| a.is_finite()) {
            return Err(SpatialError::InvalidHrirSet("non-finite grid angle".into()));
        }

        let mut key = CacheKey::builder("HrirSet")
            .u64(fs as u64)
            .f64s(&azimuth)
            .f64s(&colatitude);
        for (l, r) in left.iter().zip(&right) {
            key = key.f64s(l).f64s(r);
        }
        let hash = *key.finish().as_bytes();

        let vectors = directions_to_vectors(&azimuth, &colatitude);
        Ok(Self {
            left,
            right,
            azimuth,
            colatitude,
            vectors,
            fs,
            taps,
            hash,
        })
    }

    /// Synthetic spherical-head set for use without measurements
    ///
    /// 10° grid from -40° to 90° elevation, 128 taps. Models interaural time
    /// and level differences, far-ear shadowing and an elevation-dependent
    /// pinna echo.
    pub fn synthetic(fs: u32) -> Self {
        let mut azimuth = Vec::new();
        let mut colatitude = Vec::new();
        for el in (-40..=90).step_by(SYNTHETIC_STEP_DEG) {
            if el == 90 {
                azimuth.push(0.0);
                colatitude.push(0.0);
                continue;
            }
            for az in (-180..180).step_by(SYNTHETIC_STEP_DEG) {
                let dir = Direction::from_elevation_degrees(az as f64, el as f64);
                azimuth.push(dir.azimuth);
                colatitude.push(dir.colatitude);
            }
        }

        let (left, right): (Vec<_>, Vec<_>) = azimuth
            .iter()
            .zip(&colatitude)
            .map(|(&azi, &col)| synthetic_hrir(azi, col, fs.max(1), SYNTHETIC_TAPS))
            .unzip();

        let count = azimuth.len();
        let vectors = directions_to_vectors(&azimuth, &colatitude);
        let key = CacheKey::builder("HrirSet::synthetic")
            .u64(fs as u64)
            .u64(count as u64)
            .u64(SYNTHETIC_TAPS as u64);
        Self {
            left,
            right,
            azimuth,
            colatitude,
            vectors,
            fs: fs.max(1),
            taps: SYNTHETIC_TAPS,
            hash: *key.finish().as_bytes(),
        }
    }

    /// Index of the grid direction closest to `v`; exact ties go to the first
    pub fn nearest(&self, v: &Vector3<f64>) -> usize {
        let mut best = 0;
        let mut best_dot = f64::NEG_INFINITY;
        for (i, g) in self.vectors.iter().enumerate() {
            let d = g.dot(v);
            if d > best_dot {
                best = i;
                best_dot = d;
            }
        }
        best
    }

    /// Index of the grid direction closest to (azimuth, colatitude)
    pub fn nearest_angles(&self, azimuth: f64, colatitude: f64) -> usize {
        self.nearest(&Direction::new(azimuth, colatitude).to_vector())
    }

    /// Left/right responses of a grid direction
    pub fn pair(&self, index: usize) -> (&[f64], &[f64]) {
        (&self.left[index], &self.right[index])
    }

    /// Left/right responses nearest to (azimuth, colatitude)
    pub fn nearest_hrirs(&self, azimuth: f64, colatitude: f64) -> (&[f64], &[f64]) {
        self.pair(self.nearest_angles(azimuth, colatitude))
    }

    /// Number of measurement directions
    pub fn len(&self) -> usize {
        self.left.len()
    }

    /// Always false for a constructed set
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Impulse response length
    pub fn taps(&self) -> usize {
        self.taps
    }

    /// Sample rate
    pub fn fs(&self) -> u32 {
        self.fs
    }

    /// Grid azimuths (radians)
    pub fn azimuth(&self) -> &[f64] {
        &self.azimuth
    }

    /// Grid colatitudes (radians)
    pub fn colatitude(&self) -> &[f64] {
        &self.colatitude
    }

    /// SHA-256 over the sample rate, grid and every response
    pub fn content_hash(&self) -> &[u8; 32] {
        &self.hash
    }
}

/// One synthetic HRIR pair
fn synthetic_hrir(azimuth: f64, colatitude: f64, fs: u32, taps: usize) -> (Vec<f64>, Vec<f64>) {
    let mut left = vec![0.0; taps];
    let mut right = vec![0.0; taps];

    // Lateral position, +1 = fully right
    let pan = (-azimuth.sin() * colatitude.sin()).clamp(-1.0, 1.0);
    let lateral = pan.asin();
    let elevation = FRAC_PI_2 - colatitude;

    // Woodworth ITD
    let head_radius = 0.0875;
    let speed_of_sound = 343.0;
    let itd_samples = (head_radius / speed_of_sound) * (lateral.abs() + lateral.abs().sin()) * fs as f64;

    // Constant-power ILD
    let left_gain = ((1.0 + pan) * FRAC_PI_4).cos();
    let right_gain = ((1.0 + pan) * FRAC_PI_4).sin();

    let onset = 8.0;
    let left_delay = onset + if pan > 0.0 { itd_samples } else { 0.0 };
    let right_delay = onset + if pan < 0.0 { itd_samples } else { 0.0 };

    let sigma: f64 = 1.5;
    let pinna_offset = 12.0 + 6.0 * elevation / FRAC_PI_2;
    let pinna_gain = 0.2 * (1.0 - elevation.abs() / FRAC_PI_2);

    for i in 0..taps {
        let t = i as f64;
        let pulse = |delay: f64| (-(t - delay).powi(2) / (2.0 * sigma * sigma)).exp();
        left[i] = left_gain * (pulse(left_delay) + pinna_gain * pulse(left_delay + pinna_offset));
        right[i] = right_gain * (pulse(right_delay) + pinna_gain * pulse(right_delay + pinna_offset));
    }

    // Head shadow: one-pole lowpass on the far ear
    let coeff = 0.3 + 0.7 * (1.0 - pan.abs());
    let far = if pan > 0.0 {
        Some(&mut left)
    } else if pan < 0.0 {
        Some(&mut right)
    } else {
        None
    };
    if let Some(far) = far {
        let mut state = 0.0;
        for s in far.iter_mut() {
            state += coeff * (*s - state);
            *s = state;
        }
    }

    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn energy(x: &[f64]) -> f64 {
        x.iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_synthetic_grid() {
        let set = HrirSet::synthetic(48000);
        assert_eq!(set.len(), 13 * 36 + 1);
        assert_eq!(set.taps(), 128);
        assert_eq!(set.fs(), 48000);

        let up = set.nearest(&Vector3::z());
        assert_abs_diff_eq!(set.colatitude()[up], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_synthetic_lateralization() {
        let set = HrirSet::synthetic(48000);
        // positive azimuth is left
        let (l, r) = set.nearest_hrirs(FRAC_PI_2, FRAC_PI_2);
        assert!(energy(l) > 4.0 * energy(r));

        let (l, r) = set.nearest_hrirs(-FRAC_PI_2, FRAC_PI_2);
        assert!(energy(r) > 4.0 * energy(l));

        let (l, r) = set.nearest_hrirs(0.0, FRAC_PI_2);
        assert_abs_diff_eq!(energy(l), energy(r), epsilon = 1e-9);
    }

    #[test]
    fn test_validation() {
        let ok = HrirSet::new(
            vec![vec![1.0, 0.0]; 2],
            vec![vec![0.0, 1.0]; 2],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
            44100,
        );
        assert!(ok.is_ok());

        let short = HrirSet::new(vec![vec![1.0]; 2], vec![vec![1.0]; 2], vec![0.0], vec![1.0, 1.0], 44100);
        assert!(matches!(short, Err(SpatialError::LengthMismatch { .. })));

        let ragged = HrirSet::new(
            vec![vec![1.0, 0.0], vec![1.0]],
            vec![vec![1.0, 0.0]; 2],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
            44100,
        );
        assert!(matches!(ragged, Err(SpatialError::InvalidHrirSet(_))));

        let nan = HrirSet::new(vec![vec![f64::NAN]], vec![vec![0.0]], vec![0.0], vec![1.0], 44100);
        assert!(matches!(nan, Err(SpatialError::InvalidHrirSet(_))));
    }

    #[test]
    fn test_nearest_ties_go_to_first() {
        let set = HrirSet::new(
            vec![vec![1.0]; 2],
            vec![vec![1.0]; 2],
            vec![FRAC_PI_4, -FRAC_PI_4],
            vec![FRAC_PI_2, FRAC_PI_2],
            48000,
        )
        .unwrap();
        assert_eq!(set.nearest_angles(0.0, FRAC_PI_2), 0);
    }

    #[test]
    fn test_content_hash() {
        let a = HrirSet::new(vec![vec![1.0]], vec![vec![0.5]], vec![0.0], vec![1.0], 48000).unwrap();
        let b = HrirSet::new(vec![vec![1.0]], vec![vec![0.5]], vec![0.0], vec![1.0], 48000).unwrap();
        let c = HrirSet::new(vec![vec![1.0]], vec![vec![0.6]], vec![0.0], vec![1.0], 48000).unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }
}
