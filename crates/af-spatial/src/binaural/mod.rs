//! Binaural output
//!
//! - HRIR sets on a measurement grid with nearest-direction lookup
//! - Synthetic ITD/ILD set for use without measured data
//! - Stereo impulse-response buffers

mod hrir;

pub use hrir::HrirSet;

use serde::{Deserialize, Serialize};

/// Left/right impulse response pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BinauralIr {
    /// Left ear
    pub left: Vec<f64>,
    /// Right ear
    pub right: Vec<f64>,
}

impl BinauralIr {
    /// Silent buffer of `len` samples per ear
    pub fn zeros(len: usize) -> Self {
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
        }
    }

    /// Samples per ear
    pub fn len(&self) -> usize {
        self.left.len()
    }

    /// True if both ears are empty
    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }

    /// Add `other` into `self` starting at `offset`, clipped at the end
    pub fn add_at(&mut self, offset: usize, other: &BinauralIr) {
        crate::dsp::accumulate(&mut self.left, offset, 1.0, &other.left);
        crate::dsp::accumulate(&mut self.right, offset, 1.0, &other.right);
    }

    /// Largest absolute sample difference over both ears
    ///
    /// Buffers of different length compare as infinitely far apart.
    pub fn max_abs_diff(&self, other: &BinauralIr) -> f64 {
        if self.left.len() != other.left.len() || self.right.len() != other.right.len() {
            return f64::INFINITY;
        }
        self.left
            .iter()
            .zip(&other.left)
            .chain(self.right.iter().zip(&other.right))
            .fold(0.0_f64, |m, (a, b)| m.max((a - b).abs()))
    }

    /// Peak absolute value over both ears
    pub fn peak(&self) -> f64 {
        crate::dsp::peak(&self.left).max(crate::dsp::peak(&self.right))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_at() {
        let mut out = BinauralIr::zeros(4);
        let part = BinauralIr {
            left: vec![1.0, 2.0],
            right: vec![0.5, 0.5],
        };
        out.add_at(1, &part);
        out.add_at(3, &part);
        assert_eq!(out.left, vec![0.0, 1.0, 2.0, 1.0]);
        assert_eq!(out.right, vec![0.0, 0.5, 0.5, 0.5]);
        assert_eq!(out.peak(), 2.0);
        assert_eq!(out.max_abs_diff(&BinauralIr::zeros(3)), f64::INFINITY);
    }
}
