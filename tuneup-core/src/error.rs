//! Error types for tuneup-core.

use thiserror::Error;

/// Error type for tuner operations.
#[derive(Error, Debug)]
pub enum TunerError {
    #[error("Unknown tuning mode: {0}")]
    UnknownMode(String),

    #[error("Invalid frequency: {0} Hz. Must be finite and greater than zero")]
    InvalidFrequency(f32),

    #[error("Duplicate note '{note}' in scheme '{scheme}'")]
    DuplicateNote { scheme: String, note: String },

    #[error("Duplicate tuning mode: {0}")]
    DuplicateMode(String),

    #[error("Tuning scheme '{0}' has no notes")]
    EmptyScheme(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Audio input unavailable: {0}")]
    AudioUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, TunerError>;
