//! Panning gain engine and loudspeaker setup model
//!
//! - VBAP on the pruned triangulation
//! - ALLRAP/ALLRAP2 and ALLRAD/ALLRAD2 through a virtual kernel
//! - Nearest-loudspeaker selection

mod allrap;
mod nearest;
mod setup;
mod vbap;

pub use allrap::{allrad, allrad2, allrap, allrap2};
pub use nearest::{nearest_index, nearest_loudspeaker};
pub use setup::{
    AmbisonicHulls, AmbisonicOptions, DEFAULT_N_KERNEL, ImaginaryLoudspeakers, LoudspeakerSetup,
    SetupOptions,
};
pub use vbap::{OutsidePolicy, VbapOptions, vbap};

use nalgebra::Vector3;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{SpatialError, SpatialResult};

/// Point-source decoding method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodingMode {
    /// Vector-base amplitude panning
    #[default]
    Vbap,
    /// All-round ambisonic panning
    Allrap,
    /// Energy-preserving ALLRAP
    Allrap2,
    /// Nearest loudspeaker
    Nls,
}

impl DecodingMode {
    /// All modes
    pub const ALL: [DecodingMode; 4] = [Self::Vbap, Self::Allrap, Self::Allrap2, Self::Nls];

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vbap => "vbap",
            Self::Allrap => "allrap",
            Self::Allrap2 => "allrap2",
            Self::Nls => "nls",
        }
    }
}

impl fmt::Display for DecodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DecodingMode {
    type Err = SpatialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.name() == lower)
            .ok_or_else(|| SpatialError::Config(format!("unknown decoding mode '{s}'")))
    }
}

/// Gains `(sources, loudspeakers)` with the given mode and default VBAP options
pub fn decode(
    mode: DecodingMode,
    sources: &[Vector3<f64>],
    setup: &LoudspeakerSetup,
    n_sph: Option<usize>,
) -> SpatialResult<Array2<f64>> {
    decode_with(mode, sources, setup, n_sph, &VbapOptions::default())
}

/// Gains `(sources, loudspeakers)` with explicit VBAP options
pub fn decode_with(
    mode: DecodingMode,
    sources: &[Vector3<f64>],
    setup: &LoudspeakerSetup,
    n_sph: Option<usize>,
    vbap_options: &VbapOptions,
) -> SpatialResult<Array2<f64>> {
    log::debug!("Decoding {} sources with {mode}", sources.len());
    match mode {
        DecodingMode::Vbap => vbap(sources, setup, vbap_options),
        DecodingMode::Allrap => allrap(sources, setup, n_sph),
        DecodingMode::Allrap2 => allrap2(sources, setup, n_sph),
        DecodingMode::Nls => nearest_loudspeaker(sources, setup),
    }
}
