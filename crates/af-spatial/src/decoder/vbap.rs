//! Vector-base amplitude panning

use nalgebra::Vector3;
use ndarray::{Array2, ArrayViewMut1};
use serde::{Deserialize, Serialize};

use super::nearest::nearest_index;
use super::setup::LoudspeakerSetup;
use crate::error::{SpatialError, SpatialResult};
use crate::geometry::{INSIDE_TOL, TriangleBase, normalize_gains};
use crate::position::unit;

/// What to do with sources outside every valid triangle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutsidePolicy {
    /// Pan on the closest triangle, or the nearest loudspeaker
    #[default]
    ClampToNearest,
    /// Zero gains
    Zero,
    /// Pan on the ambisonics hull and drop imaginary loudspeakers
    ImaginaryFade,
}

/// VBAP options
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VbapOptions {
    /// Per-row p-norm normalization, none by default
    pub norm: Option<f64>,
    /// Outside policy
    pub outside: OutsidePolicy,
}

impl VbapOptions {
    /// Set normalization
    pub fn with_norm(mut self, p: f64) -> Self {
        self.norm = Some(p);
        self
    }

    /// Set outside policy
    pub fn with_outside(mut self, outside: OutsidePolicy) -> Self {
        self.outside = outside;
        self
    }
}

/// First triangle whose weights for `p` are all non-negative
pub(crate) fn active_triangle<'a>(
    bases: &'a [TriangleBase],
    p: &Vector3<f64>,
) -> Option<(&'a TriangleBase, Vector3<f64>)> {
    bases.iter().find_map(|base| {
        let w = base.weights(p);
        (w.min() >= -INSIDE_TOL).then_some((base, w))
    })
}

/// Triangle with the largest minimum weight for `p`
fn closest_triangle<'a>(
    bases: &'a [TriangleBase],
    p: &Vector3<f64>,
) -> Option<(&'a TriangleBase, Vector3<f64>)> {
    bases
        .iter()
        .map(|base| (base, base.weights(p)))
        .max_by(|(_, a), (_, b)| a.min().total_cmp(&b.min()))
}

/// Write clipped weights into `row`; vertices beyond the row are dropped
fn scatter(row: &mut ArrayViewMut1<f64>, base: &TriangleBase, w: &Vector3<f64>) {
    for (k, &v) in base.vertices.iter().enumerate() {
        if v < row.len() {
            row[v] = w[k].max(0.0);
        }
    }
}

/// Pan `p` with unit energy into `row`; false if no triangle contains it
pub(crate) fn pan_normalized(
    bases: &[TriangleBase],
    p: &Vector3<f64>,
    row: &mut ArrayViewMut1<f64>,
) -> bool {
    let Some((base, w)) = active_triangle(bases, p) else {
        return false;
    };
    scatter(row, base, &w);
    let energy = row.iter().map(|g| g * g).sum::<f64>().sqrt();
    if energy > 0.0 {
        row.mapv_inplace(|g| g / energy);
    }
    true
}

/// VBAP gains `(sources, loudspeakers)`
///
/// Gains are non-negative and non-zero only on the active triangle. They are
/// not normalized unless `options.norm` is set.
pub fn vbap(
    sources: &[Vector3<f64>],
    setup: &LoudspeakerSetup,
    options: &VbapOptions,
) -> SpatialResult<Array2<f64>> {
    if let Some(p) = options.norm.filter(|p| !(p.is_finite() && *p > 0.0)) {
        return Err(SpatialError::InvalidInput(format!("invalid gain norm {p}")));
    }

    let bases = match options.outside {
        OutsidePolicy::ImaginaryFade => setup
            .ambisonic()
            .ok_or(SpatialError::AmbisonicsNotPrepared)?
            .bases(),
        _ => setup.bases(),
    };

    let mut gains = Array2::zeros((sources.len(), setup.num_loudspeakers()));
    let mut clamped = 0;

    for (s, (src, mut row)) in sources.iter().zip(gains.rows_mut()).enumerate() {
        let p = unit(src)
            .ok_or_else(|| SpatialError::InvalidInput(format!("source {s} has zero length")))?;

        if let Some((base, w)) = active_triangle(bases, &p) {
            scatter(&mut row, base, &w);
            continue;
        }

        if options.outside == OutsidePolicy::ClampToNearest {
            clamped += 1;
            if let Some((base, w)) = closest_triangle(bases, &p) {
                scatter(&mut row, base, &w);
            }
            if row.iter().all(|&g| g == 0.0) {
                row[nearest_index(setup.directions(), &p)] = 1.0;
            }
        }
    }

    if clamped > 0 {
        log::warn!(
            "VBAP: {clamped} of {} sources outside the triangulation, clamped",
            sources.len()
        );
    }
    if let Some(p) = options.norm {
        normalize_gains(&mut gains, p);
    }
    Ok(gains)
}
