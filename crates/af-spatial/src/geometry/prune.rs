//! Triangle validity checks
//!
//! A triangle stays valid only if it passes every enabled check. Limits are
//! given in degrees; `None` bypasses a check.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::hull::Triangle;
use crate::position::{angle_between, unit};

/// Minimum plane distance for a triangle to enclose the listener
const ENCLOSE_EPS: f64 = 1e-6;

/// Angular pruning limits in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PruneLimits {
    /// Max angle between face normal and the listener-to-centroid direction
    pub normal: Option<f64>,
    /// Max angle between two vertices seen from the listener
    pub aperture: Option<f64>,
    /// Max interior angle of the triangle
    pub opening: Option<f64>,
}

impl Default for PruneLimits {
    fn default() -> Self {
        Self {
            normal: Some(85.0),
            aperture: None,
            opening: None,
        }
    }
}

impl PruneLimits {
    /// All checks bypassed
    pub fn none() -> Self {
        Self {
            normal: None,
            aperture: None,
            opening: None,
        }
    }

    /// Create with all three limits
    pub fn new(normal: f64, aperture: f64, opening: f64) -> Self {
        Self {
            normal: Some(normal),
            aperture: Some(aperture),
            opening: Some(opening),
        }
    }
}

/// Why a triangle was removed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PruneReason {
    /// Listener not strictly inside the triangle's half-space
    ListenerOutside,
    /// Normal deviation in degrees
    Normal(f64),
    /// Largest vertex aperture in degrees
    Aperture(f64),
    /// Largest interior angle in degrees
    Opening(f64),
    /// Explicitly blacklisted
    Blacklisted,
}

/// Triangles removed by a pruning pass
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    /// Removed triangle vertices with the first failing check
    pub removed: Vec<([usize; 3], PruneReason)>,
    /// Valid triangles left
    pub remaining: usize,
}

impl PruneReport {
    /// True if nothing was removed
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

/// True if the listener lies strictly on the inner side of the triangle plane
pub fn encloses_listener(tri: &Triangle, points: &[Vector3<f64>], listener: &Vector3<f64>) -> bool {
    -tri.plane_distance(points, listener) > ENCLOSE_EPS
}

/// Angle between outward normal and listener-to-centroid direction, degrees
///
/// A centroid on the listener has no direction and counts as 180°.
pub fn normal_deviation(tri: &Triangle, points: &[Vector3<f64>], listener: &Vector3<f64>) -> f64 {
    match unit(&(tri.centroid(points) - listener)) {
        Some(to_centroid) => angle_between(&tri.normal, &to_centroid).to_degrees(),
        None => 180.0,
    }
}

/// Largest angle between two vertices seen from the listener, degrees
pub fn aperture(tri: &Triangle, points: &[Vector3<f64>], listener: &Vector3<f64>) -> f64 {
    let [a, b, c] = tri.corners(points).map(|p| p - listener);
    angle_between(&a, &b)
        .max(angle_between(&b, &c))
        .max(angle_between(&a, &c))
        .to_degrees()
}

/// Largest interior angle, degrees
pub fn opening(tri: &Triangle, points: &[Vector3<f64>]) -> f64 {
    let [a, b, c] = tri.corners(points);
    angle_between(&(b - a), &(c - a))
        .max(angle_between(&(a - b), &(c - b)))
        .max(angle_between(&(a - c), &(b - c)))
        .to_degrees()
}

/// True if `tri` is named in the blacklist, in any vertex order
pub fn is_blacklisted(tri: &Triangle, blacklist: &[[usize; 3]]) -> bool {
    blacklist.iter().any(|entry| {
        let mut sorted = *entry;
        sorted.sort_unstable();
        sorted == tri.vertices
    })
}

/// First failing check for a triangle, `None` if it passes all
pub fn check_triangle(
    tri: &Triangle,
    points: &[Vector3<f64>],
    listener: &Vector3<f64>,
    limits: &PruneLimits,
    blacklist: &[[usize; 3]],
) -> Option<PruneReason> {
    if let Some(limit) = limits.normal {
        let dev = normal_deviation(tri, points, listener);
        if dev > limit {
            return Some(PruneReason::Normal(dev));
        }
    }
    if let Some(limit) = limits.aperture {
        let ap = aperture(tri, points, listener);
        if ap > limit {
            return Some(PruneReason::Aperture(ap));
        }
    }
    if let Some(limit) = limits.opening {
        let op = opening(tri, points);
        if op > limit {
            return Some(PruneReason::Opening(op));
        }
    }
    if is_blacklisted(tri, blacklist) {
        return Some(PruneReason::Blacklisted);
    }
    None
}
