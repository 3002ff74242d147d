//! Nearest-loudspeaker panning

use nalgebra::Vector3;
use ndarray::Array2;

use super::setup::LoudspeakerSetup;
use crate::error::{SpatialError, SpatialResult};
use crate::position::unit;

/// Cosines closer than this count as a tie
const TIE_EPS: f64 = 1e-12;

/// Index of the direction with the smallest angle to `p`; ties go to the
/// lowest index
pub fn nearest_index(directions: &[Vector3<f64>], p: &Vector3<f64>) -> usize {
    let mut best = 0;
    let mut best_cos = f64::NEG_INFINITY;
    for (i, d) in directions.iter().enumerate() {
        let cos = d.dot(p);
        if cos > best_cos + TIE_EPS {
            best = i;
            best_cos = cos;
        }
    }
    best
}

/// One-hot gains `(sources, loudspeakers)` selecting the closest loudspeaker
pub fn nearest_loudspeaker(
    sources: &[Vector3<f64>],
    setup: &LoudspeakerSetup,
) -> SpatialResult<Array2<f64>> {
    let mut gains = Array2::zeros((sources.len(), setup.num_loudspeakers()));
    for (s, src) in sources.iter().enumerate() {
        let p = unit(src)
            .ok_or_else(|| SpatialError::InvalidInput(format!("source {s} has zero length")))?;
        gains[[s, nearest_index(setup.directions(), &p)]] = 1.0;
    }
    Ok(gains)
}
