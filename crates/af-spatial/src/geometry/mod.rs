//! Geometry kernel
//!
//! Convex hull over loudspeaker directions, triangle pruning and the
//! per-triangle inverse bases used for panning. Hulls live in listener
//! coordinates: the listener is the origin and all points are unit vectors.

mod hull;
mod prune;

pub use hull::{Hull, Triangle, build_hull, common_plane_normal};
pub use prune::{
    PruneLimits, PruneReason, PruneReport, aperture, check_triangle, encloses_listener,
    is_blacklisted, normal_deviation, opening,
};

use nalgebra::{Matrix3, Vector3};
use ndarray::Array2;

use crate::error::{SpatialError, SpatialResult};

/// Barycentric tolerance for point-in-triangle tests
pub const INSIDE_TOL: f64 = 1e-6;

/// Remove triangles that do not enclose the listener
///
/// Run once after hull construction; removed triangles are reported with
/// [`PruneReason::ListenerOutside`].
pub fn drop_unenclosing(hull: &mut Hull) -> PruneReport {
    let origin = Vector3::zeros();
    let points = &hull.points;
    let mut removed = Vec::new();
    hull.triangles.retain(|t| {
        let keep = encloses_listener(t, points, &origin);
        if !keep {
            removed.push((t.vertices, PruneReason::ListenerOutside));
        }
        keep
    });
    PruneReport {
        removed,
        remaining: hull.triangles.len(),
    }
}

/// Remove triangles failing any enabled limit or named in `blacklist`
///
/// Fails with [`SpatialError::NoValidTriangles`] if nothing remains; the hull
/// is left untouched in that case.
pub fn prune_triangles(
    hull: &mut Hull,
    limits: &PruneLimits,
    blacklist: &[[usize; 3]],
) -> SpatialResult<PruneReport> {
    let origin = Vector3::zeros();
    let verdicts: Vec<Option<PruneReason>> = hull
        .triangles
        .iter()
        .map(|t| check_triangle(t, &hull.points, &origin, limits, blacklist))
        .collect();

    if verdicts.iter().all(Option::is_some) {
        return Err(SpatialError::NoValidTriangles);
    }

    let mut removed = Vec::new();
    let mut kept = Vec::with_capacity(hull.triangles.len());
    for (tri, verdict) in hull.triangles.iter().zip(verdicts) {
        match verdict {
            Some(reason) => {
                log::debug!("Pruned triangle {:?}: {:?}", tri.vertices, reason);
                removed.push((tri.vertices, reason));
            }
            None => kept.push(*tri),
        }
    }
    hull.triangles = kept;

    Ok(PruneReport {
        removed,
        remaining: hull.triangles.len(),
    })
}

/// Inverse vertex base of one triangle
#[derive(Debug, Clone, Copy)]
pub struct TriangleBase {
    /// Point indices
    pub vertices: [usize; 3],
    inverse: Matrix3<f64>,
}

impl TriangleBase {
    /// `None` if the vertex vectors are linearly dependent
    pub fn new(tri: &Triangle, points: &[Vector3<f64>]) -> Option<Self> {
        let [a, b, c] = tri.corners(points);
        let inverse = Matrix3::from_columns(&[a, b, c]).try_inverse()?;
        Some(Self {
            vertices: tri.vertices,
            inverse,
        })
    }

    /// Inverse bases of all triangles of a hull, degenerate ones skipped
    pub fn for_hull(hull: &Hull) -> Vec<Self> {
        hull.triangles
            .iter()
            .filter_map(|t| Self::new(t, &hull.points))
            .collect()
    }

    /// Raw weights solving `p = w0 a + w1 b + w2 c`
    pub fn weights(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.inverse * p
    }

    /// Smallest weight, non-negative iff `p` points into the triangle
    pub fn min_weight(&self, p: &Vector3<f64>) -> f64 {
        self.weights(p).min()
    }
}

/// True if direction `p` passes through the triangle
pub fn point_in_triangle(p: &Vector3<f64>, tri: &Triangle, points: &[Vector3<f64>]) -> bool {
    TriangleBase::new(tri, points).is_some_and(|base| base.min_weight(p) >= -INSIDE_TOL)
}

/// Normalize each row to unit p-norm; all-zero rows are left as they are
pub fn normalize_gains(gains: &mut Array2<f64>, p: f64) {
    for mut row in gains.rows_mut() {
        let norm = row.iter().map(|g| g.abs().powf(p)).sum::<f64>().powf(1.0 / p);
        if norm > 0.0 {
            row /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn octahedron_hull() -> Hull {
        build_hull(&[
            Vector3::x(),
            -Vector3::x(),
            Vector3::y(),
            -Vector3::y(),
            Vector3::z(),
            -Vector3::z(),
        ])
        .unwrap()
    }

    #[test]
    fn test_point_in_triangle() {
        let hull = octahedron_hull();
        let p = Vector3::new(1.0, 1.0, 1.0).normalize();
        let hits: Vec<_> = hull
            .triangles
            .iter()
            .filter(|t| point_in_triangle(&p, t, &hull.points))
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].vertices, [0, 2, 4]);
    }

    #[test]
    fn test_prune_blacklist_and_empty() {
        let mut hull = octahedron_hull();
        let report = prune_triangles(&mut hull, &PruneLimits::none(), &[[4, 2, 0]]).unwrap();
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].1, PruneReason::Blacklisted);
        assert_eq!(hull.triangles.len(), 7);

        let strict = PruneLimits {
            aperture: Some(10.0),
            ..PruneLimits::none()
        };
        assert!(matches!(
            prune_triangles(&mut hull, &strict, &[]),
            Err(SpatialError::NoValidTriangles)
        ));
        assert_eq!(hull.triangles.len(), 7);
    }

    #[test]
    fn test_permissive_limits_keep_everything() {
        let mut hull = octahedron_hull();
        let report = prune_triangles(&mut hull, &PruneLimits::new(180.0, 180.0, 180.0), &[]).unwrap();
        assert!(report.is_empty());
        assert_eq!(report.remaining, 8);
        assert!(drop_unenclosing(&mut hull).is_empty());
    }

    #[test]
    fn test_normalize_gains() {
        let mut g = array![[3.0, 4.0, 0.0], [0.0, 0.0, 0.0]];
        normalize_gains(&mut g, 2.0);
        assert_abs_diff_eq!(g[[0, 0]], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(g[[0, 1]], 0.8, epsilon = 1e-12);
        assert_eq!(g[[1, 2]], 0.0);

        let mut g = array![[1.0, 3.0]];
        normalize_gains(&mut g, 1.0);
        assert_abs_diff_eq!(g[[0, 1]], 0.75, epsilon = 1e-12);
    }
}
