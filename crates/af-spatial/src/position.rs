//! Directions on the unit sphere and coordinate conversions
//!
//! Azimuth is measured from +x towards +y, colatitude from +z. All angles are
//! radians unless a function name says otherwise.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Vectors shorter than this are treated as having no direction
const MIN_NORM: f64 = 1e-12;

/// Point on the unit sphere
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    /// Azimuth in radians
    pub azimuth: f64,
    /// Colatitude in radians (0 = up)
    pub colatitude: f64,
}

impl Direction {
    /// Create new direction
    pub fn new(azimuth: f64, colatitude: f64) -> Self {
        Self {
            azimuth,
            colatitude,
        }
    }

    /// Create from degrees
    pub fn from_degrees(azimuth_deg: f64, colatitude_deg: f64) -> Self {
        Self::new(azimuth_deg.to_radians(), colatitude_deg.to_radians())
    }

    /// Create from azimuth and elevation in degrees
    pub fn from_elevation_degrees(azimuth_deg: f64, elevation_deg: f64) -> Self {
        Self::from_degrees(azimuth_deg, 90.0 - elevation_deg)
    }

    /// Direction of a vector (origin for the zero vector is straight up)
    pub fn from_vector(v: &Vector3<f64>) -> Self {
        let (azimuth, colatitude, _) = cart2sph(v.x, v.y, v.z);
        Self::new(azimuth, colatitude)
    }

    /// Unit vector
    pub fn to_vector(&self) -> Vector3<f64> {
        let (x, y, z) = sph2cart(self.azimuth, self.colatitude, 1.0);
        Vector3::new(x, y, z)
    }

    /// Elevation in radians
    pub fn elevation(&self) -> f64 {
        std::f64::consts::FRAC_PI_2 - self.colatitude
    }

    /// Great-circle distance to another direction
    pub fn angle_to(&self, other: &Direction) -> f64 {
        angle_between(&self.to_vector(), &other.to_vector())
    }
}

impl From<Vector3<f64>> for Direction {
    fn from(v: Vector3<f64>) -> Self {
        Self::from_vector(&v)
    }
}

/// Spherical to Cartesian coordinates
pub fn sph2cart(azimuth: f64, colatitude: f64, radius: f64) -> (f64, f64, f64) {
    let (sin_col, cos_col) = colatitude.sin_cos();
    let (sin_az, cos_az) = azimuth.sin_cos();
    (
        radius * cos_az * sin_col,
        radius * sin_az * sin_col,
        radius * cos_col,
    )
}

/// Cartesian to spherical coordinates `(azimuth, colatitude, radius)`
pub fn cart2sph(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let radius = (x * x + y * y + z * z).sqrt();
    if radius < MIN_NORM {
        return (0.0, 0.0, 0.0);
    }
    let azimuth = y.atan2(x);
    let colatitude = (z / radius).clamp(-1.0, 1.0).acos();
    (azimuth, colatitude, radius)
}

/// Normalize a vector, `None` for (near) zero length
pub fn unit(v: &Vector3<f64>) -> Option<Vector3<f64>> {
    let norm = v.norm();
    (norm >= MIN_NORM).then(|| v / norm)
}

/// Angle between two vectors in radians
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let denom = a.norm() * b.norm();
    if denom < MIN_NORM {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos()
}

/// Unit vectors from parallel azimuth/colatitude slices
pub fn directions_to_vectors(azimuth: &[f64], colatitude: &[f64]) -> Vec<Vector3<f64>> {
    azimuth
        .iter()
        .zip(colatitude)
        .map(|(&azi, &col)| Direction::new(azi, col).to_vector())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_axes() {
        let front = Direction::new(0.0, FRAC_PI_2).to_vector();
        assert_abs_diff_eq!(front, Vector3::x(), epsilon = 1e-12);

        let left = Direction::new(FRAC_PI_2, FRAC_PI_2).to_vector();
        assert_abs_diff_eq!(left, Vector3::y(), epsilon = 1e-12);

        let up = Direction::new(1.234, 0.0).to_vector();
        assert_abs_diff_eq!(up, Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_round_trip() {
        let v = Vector3::new(1.0, 0.5, 2.5);
        let (azi, col, r) = cart2sph(v.x, v.y, v.z);
        let (x, y, z) = sph2cart(azi, col, r);
        assert_abs_diff_eq!(Vector3::new(x, y, z), v, epsilon = 1e-12);
    }

    #[test]
    fn test_elevation_degrees() {
        let d = Direction::from_elevation_degrees(0.0, 90.0);
        assert_abs_diff_eq!(d.colatitude, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d.elevation(), FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_between() {
        assert_abs_diff_eq!(angle_between(&Vector3::x(), &-Vector3::x()), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(angle_between(&Vector3::x(), &Vector3::z()), FRAC_PI_2, epsilon = 1e-12);
        assert!(unit(&Vector3::zeros()).is_none());
    }
}
