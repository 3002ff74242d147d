//! Quadrature grids on the sphere
//!
//! Used for kernel hulls and for testing panning laws over many source
//! directions at once.

use nalgebra::Vector3;
use std::f64::consts::PI;

use crate::position::directions_to_vectors;

/// Directions with integration weights (weights sum to 4π)
#[derive(Debug, Clone)]
pub struct Grid {
    /// Azimuth per point (radians)
    pub azimuth: Vec<f64>,
    /// Colatitude per point (radians)
    pub colatitude: Vec<f64>,
    /// Integration weight per point
    pub weights: Vec<f64>,
}

impl Grid {
    /// Near-uniform Fibonacci spiral with equal weights
    pub fn fibonacci(n: usize) -> Self {
        let golden_ratio = (1.0 + 5.0_f64.sqrt()) / 2.0;
        let mut azimuth = Vec::with_capacity(n);
        let mut colatitude = Vec::with_capacity(n);

        for i in 0..n {
            let azi = (2.0 * PI * i as f64 / golden_ratio).rem_euclid(2.0 * PI);
            let col = (1.0 - 2.0 * (i as f64 + 0.5) / n as f64).acos();
            azimuth.push(azi);
            colatitude.push(col);
        }

        let weights = vec![4.0 * PI / n.max(1) as f64; n];
        Self {
            azimuth,
            colatitude,
            weights,
        }
    }

    /// Equiangular midpoint grid with `sin(colatitude)` weights
    pub fn equiangular(n_azimuth: usize, n_colatitude: usize) -> Self {
        let d_azi = 2.0 * PI / n_azimuth as f64;
        let d_col = PI / n_colatitude as f64;
        let count = n_azimuth * n_colatitude;
        let mut grid = Self {
            azimuth: Vec::with_capacity(count),
            colatitude: Vec::with_capacity(count),
            weights: Vec::with_capacity(count),
        };

        for c in 0..n_colatitude {
            let col = (c as f64 + 0.5) * d_col;
            for a in 0..n_azimuth {
                grid.azimuth.push(a as f64 * d_azi);
                grid.colatitude.push(col);
                grid.weights.push(col.sin() * d_col * d_azi);
            }
        }
        grid
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.azimuth.len()
    }

    /// True if the grid has no points
    pub fn is_empty(&self) -> bool {
        self.azimuth.is_empty()
    }

    /// Unit vectors of all points
    pub fn vectors(&self) -> Vec<Vector3<f64>> {
        directions_to_vectors(&self.azimuth, &self.colatitude)
    }
}
