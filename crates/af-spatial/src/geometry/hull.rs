//! Incremental 3D convex hull over unit-sphere directions

use nalgebra::Vector3;
use std::collections::HashSet;

use crate::error::{SpatialError, SpatialResult};
use crate::position::unit;

/// Plane-distance tolerance for visibility tests
const PLANE_EPS: f64 = 1e-9;

/// Directions closer than this (chord length) are duplicates
///
/// A neighbour at chord `d` rises about `d²/2` above the faces around a
/// vertex, so this must stay above `sqrt(2 * PLANE_EPS)`.
const DUPLICATE_EPS: f64 = 1e-4;

/// Hull face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// Point indices, ascending
    pub vertices: [usize; 3],
    /// Outward unit normal
    pub normal: Vector3<f64>,
}

impl Triangle {
    /// Centroid of the three vertices
    pub fn centroid(&self, points: &[Vector3<f64>]) -> Vector3<f64> {
        let [a, b, c] = self.vertices;
        (points[a] + points[b] + points[c]) / 3.0
    }

    /// Vertex positions
    pub fn corners(&self, points: &[Vector3<f64>]) -> [Vector3<f64>; 3] {
        self.vertices.map(|i| points[i])
    }

    /// True if the triangle uses `index`
    pub fn contains_vertex(&self, index: usize) -> bool {
        self.vertices.contains(&index)
    }

    /// Signed distance of `p` from the face plane (positive = outside)
    pub fn plane_distance(&self, points: &[Vector3<f64>], p: &Vector3<f64>) -> f64 {
        self.normal.dot(&(p - points[self.vertices[0]]))
    }
}

/// Convex hull triangulation
#[derive(Debug, Clone)]
pub struct Hull {
    /// Unit direction per input point
    pub points: Vec<Vector3<f64>>,
    /// Hull faces
    pub triangles: Vec<Triangle>,
}

impl Hull {
    /// Mean of all hull points
    pub fn barycenter(&self) -> Vector3<f64> {
        self.points.iter().sum::<Vector3<f64>>() / self.points.len().max(1) as f64
    }

    /// Number of hull points
    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

/// Oriented face used during construction
#[derive(Debug, Clone, Copy)]
struct Face {
    v: [usize; 3],
    normal: Vector3<f64>,
    offset: f64,
}

impl Face {
    fn new(points: &[Vector3<f64>], v: [usize; 3]) -> Self {
        let [a, b, c] = v.map(|i| points[i]);
        let n = (b - a).cross(&(c - a));
        let normal = unit(&n).unwrap_or_else(Vector3::zeros);
        Self {
            v,
            normal,
            offset: normal.dot(&a),
        }
    }

    fn distance(&self, p: &Vector3<f64>) -> f64 {
        self.normal.dot(p) - self.offset
    }

    fn edges(&self) -> [(usize, usize); 3] {
        let [a, b, c] = self.v;
        [(a, b), (b, c), (c, a)]
    }
}

/// Build the convex hull of the given directions
///
/// Inputs are normalized first. Fails for fewer than four points, duplicate
/// directions and coplanar layouts.
pub fn build_hull(directions: &[Vector3<f64>]) -> SpatialResult<Hull> {
    if directions.len() < 4 {
        return Err(SpatialError::DegenerateHull(format!(
            "need at least 4 directions, got {}",
            directions.len()
        )));
    }

    let points = directions
        .iter()
        .enumerate()
        .map(|(i, d)| {
            unit(d).ok_or_else(|| {
                SpatialError::InvalidInput(format!("direction {i} has zero length"))
            })
        })
        .collect::<SpatialResult<Vec<_>>>()?;

    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            if (points[i] - points[j]).norm() < DUPLICATE_EPS {
                return Err(SpatialError::DegenerateHull(format!(
                    "directions {i} and {j} coincide"
                )));
            }
        }
    }

    let seed = initial_tetrahedron(&points)?;
    let interior = seed.iter().map(|&i| points[i]).sum::<Vector3<f64>>() / 4.0;

    let [a, b, c, d] = seed;
    let mut faces: Vec<Face> = [[a, b, c], [a, b, d], [a, c, d], [b, c, d]]
        .into_iter()
        .map(|v| orient_outward(&points, v, &interior))
        .collect();

    for p_idx in 0..points.len() {
        if seed.contains(&p_idx) {
            continue;
        }
        let p = points[p_idx];

        if !faces.iter().any(|f| f.distance(&p) > PLANE_EPS) {
            // on or inside the current hull
            continue;
        }

        // Faces coplanar with p are replaced as well; on the sphere this
        // re-triangulates co-circular vertex sets.
        let (visible, kept): (Vec<Face>, Vec<Face>) =
            faces.into_iter().partition(|f| f.distance(&p) > -PLANE_EPS);

        let visible_edges: HashSet<(usize, usize)> =
            visible.iter().flat_map(|f| f.edges()).collect();
        let horizon = visible_edges
            .iter()
            .filter(|(u, v)| !visible_edges.contains(&(*v, *u)));

        faces = kept;
        for &(u, v) in horizon {
            faces.push(orient_outward(&points, [u, v, p_idx], &interior));
        }
    }

    let mut triangles: Vec<Triangle> = faces
        .iter()
        .filter(|f| f.normal.norm() > 0.5)
        .map(|f| {
            let mut vertices = f.v;
            vertices.sort_unstable();
            Triangle {
                vertices,
                normal: f.normal,
            }
        })
        .collect();
    triangles.sort_by(|x, y| x.vertices.cmp(&y.vertices));

    let used: HashSet<usize> = triangles.iter().flat_map(|t| t.vertices).collect();
    for i in (0..points.len()).filter(|i| !used.contains(i)) {
        log::warn!("Direction {i} is not a hull vertex and gets no panning gain");
    }

    log::debug!(
        "Convex hull: {} points, {} triangles",
        points.len(),
        triangles.len()
    );

    Ok(Hull { points, triangles })
}

fn orient_outward(points: &[Vector3<f64>], v: [usize; 3], interior: &Vector3<f64>) -> Face {
    let face = Face::new(points, v);
    if face.distance(interior) > 0.0 {
        Face::new(points, [v[0], v[2], v[1]])
    } else {
        face
    }
}

/// Four affinely independent points to start from
fn initial_tetrahedron(points: &[Vector3<f64>]) -> SpatialResult<[usize; 4]> {
    let a = 0;
    let b = farthest_by(points, |p| (p - points[a]).norm());

    let ab = points[b] - points[a];
    let c = farthest_by(points, |p| ab.cross(&(p - points[a])).norm());
    let normal = ab.cross(&(points[c] - points[a]));
    let Some(normal) = unit(&normal) else {
        return Err(SpatialError::DegenerateHull("all directions are collinear".into()));
    };

    let d = farthest_by(points, |p| normal.dot(&(p - points[a])).abs());
    if normal.dot(&(points[d] - points[a])).abs() < 1e-7 {
        return Err(SpatialError::DegenerateHull(
            "all directions are coplanar".into(),
        ));
    }

    Ok([a, b, c, d])
}

fn farthest_by(points: &[Vector3<f64>], metric: impl Fn(&Vector3<f64>) -> f64) -> usize {
    points
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_val), (i, p)| {
            let val = metric(p);
            if val > best_val { (i, val) } else { (best, best_val) }
        })
        .0
}

/// Unit normal of the plane containing all directions, if there is one
///
/// Used for the planar fallback of ring layouts.
pub fn common_plane_normal(points: &[Vector3<f64>]) -> Option<Vector3<f64>> {
    let units: Vec<Vector3<f64>> = points.iter().filter_map(unit).collect();
    let first = *units.first()?;
    let far = units[farthest_by(&units, |p| (p - first).norm())];
    let edge = far - first;
    let third = units[farthest_by(&units, |p| edge.cross(&(p - first)).norm())];
    let normal = unit(&edge.cross(&(third - first)))?;

    units
        .iter()
        .all(|p| normal.dot(&(p - first)).abs() < 1e-7)
        .then_some(normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grids::Grid;

    fn octahedron() -> Vec<Vector3<f64>> {
        vec![
            Vector3::x(),
            -Vector3::x(),
            Vector3::y(),
            -Vector3::y(),
            Vector3::z(),
            -Vector3::z(),
        ]
    }

    fn cube() -> Vec<Vector3<f64>> {
        let mut pts = Vec::new();
        for &x in &[-1.0, 1.0] {
            for &y in &[-1.0, 1.0] {
                for &z in &[-1.0, 1.0] {
                    pts.push(Vector3::new(x, y, z));
                }
            }
        }
        pts
    }

    fn assert_closed(hull: &Hull) {
        // Every edge shared by exactly two faces: V - E + F = 2 with E = 3F/2
        let v = hull.num_points();
        let f = hull.triangles.len();
        assert_eq!(f, 2 * v - 4);
        for t in &hull.triangles {
            let c = t.centroid(&hull.points);
            assert!(t.normal.dot(&c) > 0.0, "normal must point outward");
        }
    }

    #[test]
    fn test_octahedron() {
        let hull = build_hull(&octahedron()).unwrap();
        assert_eq!(hull.triangles.len(), 8);
        assert_closed(&hull);
    }

    #[test]
    fn test_cube_cocircular_faces() {
        let hull = build_hull(&cube()).unwrap();
        assert_eq!(hull.triangles.len(), 12);
        assert_closed(&hull);
    }

    #[test]
    fn test_dense_grid() {
        let hull = build_hull(&Grid::fibonacci(300).vectors()).unwrap();
        assert_closed(&hull);
        for t in &hull.triangles {
            for (i, p) in hull.points.iter().enumerate() {
                if !t.contains_vertex(i) {
                    assert!(t.plane_distance(&hull.points, p) < 1e-8);
                }
            }
        }
    }

    #[test]
    fn test_degenerate_inputs() {
        let ring: Vec<Vector3<f64>> = (0..8)
            .map(|i| {
                let a = i as f64 * std::f64::consts::PI / 4.0;
                Vector3::new(a.cos(), a.sin(), 0.0)
            })
            .collect();
        assert!(matches!(build_hull(&ring), Err(SpatialError::DegenerateHull(_))));
        assert!(common_plane_normal(&ring).is_some());

        let mut dup = octahedron();
        dup.push(Vector3::x() * 2.0);
        assert!(matches!(build_hull(&dup), Err(SpatialError::DegenerateHull(_))));

        assert!(build_hull(&octahedron()[..3]).is_err());
    }

    #[test]
    fn test_near_duplicates_rejected() {
        // 5e-5 rad apart: too close to both become hull vertices
        let mut close = octahedron();
        let a = 5e-5_f64;
        close.push(Vector3::new(a.cos(), a.sin(), 0.0));
        assert!(matches!(build_hull(&close), Err(SpatialError::DegenerateHull(_))));

        // 1e-3 rad apart: both are vertices
        let mut apart = octahedron();
        let a = 1e-3_f64;
        apart.push(Vector3::new(a.cos(), a.sin(), 0.0));
        let hull = build_hull(&apart).unwrap();
        assert_closed(&hull);
        assert!(hull.triangles.iter().any(|t| t.contains_vertex(6)));
    }
}
