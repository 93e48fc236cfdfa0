//! Error types for relay lifecycle operations

use crate::core::tts::{SynthesisError, UnsupportedSampleRate};

/// Fatal relay errors. Per-item synthesis failures are logged by the worker
/// and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(#[from] UnsupportedSampleRate),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Backend error: {0}")]
    Backend(#[from] SynthesisError),
    #[error("Synthesis worker failed: {0}")]
    WorkerJoin(String),
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
