//! Error types for loudspeaker decoding and binaural rendering

use thiserror::Error;

/// Spatial decoding error types
#[derive(Error, Debug)]
pub enum SpatialError {
    /// Unknown setup name, decoding mode or otherwise unusable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Loudspeaker directions do not span a 3D hull
    #[error("Degenerate hull: {0}")]
    DegenerateHull(String),

    /// Pruning left no triangle to pan on
    #[error("No valid triangles left in triangulation")]
    NoValidTriangles,

    /// Ambisonic hulls missing where they cannot be built on the fly
    #[error("Ambisonic hulls not prepared, run setup_for_ambisonic() first")]
    AmbisonicsNotPrepared,

    /// Invalid numeric input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Parallel input streams of different length
    #[error("Length mismatch: {what} has {got} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Buffer size mismatch
    #[error("Buffer size mismatch: expected {expected}, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },

    /// HRIR set recorded at another sample rate
    #[error("Sample rate mismatch: expected {expected} Hz, got {got} Hz")]
    SampleRateMismatch { expected: u32, got: u32 },

    /// Malformed HRIR set
    #[error("Invalid HRIR set: {0}")]
    InvalidHrirSet(String),

    /// Worker pool could not be created
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;
