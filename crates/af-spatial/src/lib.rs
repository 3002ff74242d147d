//! AF-Spatial: Loudspeaker-array decoding and SDM rendering
//!
//! Panning and decoding for arbitrary 3D loudspeaker layouts:
//! - Convex-hull triangulation with angular pruning
//! - VBAP, ALLRAP/ALLRAP2, ALLRAD/ALLRAD2 and nearest-loudspeaker gains
//! - Imaginary loudspeakers for partial layouts
//! - Binaural preview of loudspeaker signals
//! - Spatial Decomposition Method (SDM) rendering, stereo, binaural and
//!   loudspeaker-binaural, parallel over sample chunks
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      LoudspeakerSetup                        │
//! │                                                              │
//! │  ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌────────────┐  │
//! │  │ Layout   │ → │ Hull    │ → │ Pruning  │ → │ Bases      │  │
//! │  │ (preset) │   │ (convex)│   │ (limits) │   │ (inverse)  │  │
//! │  └──────────┘   └─────────┘   └──────────┘   └────────────┘  │
//! │                                     │                        │
//! │                       ┌─────────────┴──────────────┐         │
//! │                       │ Ambisonic hulls (kernel)   │         │
//! │                       └────────────────────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//!          │ gains                                │ gains
//!          ▼                                      ▼
//!   loudspeaker / binaural signals      SDM renderer (rayon chunks)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use af_spatial::{DecodingMode, LayoutPreset, LoudspeakerSetup, decode};
//!
//! let mut setup = LoudspeakerSetup::from_preset(&LayoutPreset::builtin("aalto_full")?)?;
//! setup.setup_for_ambisonic(&Default::default())?;
//! let gains = decode(DecodingMode::Allrap2, &sources, &setup, None)?;
//! ```

pub mod binaural;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod dsp;
pub mod error;
pub mod geometry;
pub mod grids;
pub mod layouts;
pub mod position;
pub mod sdm;
pub mod sph;

pub use binaural::{BinauralIr, HrirSet};
pub use cache::{CacheKey, CachePolicy, CacheStats, MemoCache};
pub use config::DecoderConfig;
pub use decoder::{
    AmbisonicOptions, DecodingMode, ImaginaryLoudspeakers, LoudspeakerSetup, OutsidePolicy,
    SetupOptions, VbapOptions, allrad, allrad2, allrap, allrap2, decode, decode_with,
    nearest_loudspeaker, vbap,
};
pub use error::{SpatialError, SpatialResult};
pub use geometry::{Hull, PruneLimits, PruneReason, PruneReport};
pub use grids::Grid;
pub use layouts::{LayoutPreset, builtin_names};
pub use position::Direction;
pub use sdm::{Jobs, SdmRenderer, SdmStream, render_bsdm, render_loudspeaker_sdm, render_stereo_sdm};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
