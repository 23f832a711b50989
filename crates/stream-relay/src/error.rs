//! Error types for the `stream-relay` crate.
//!
//! Failures of the relayed source never surface here: they travel verbatim
//! on the relay's `"error"` channel. These variants cover the configuration
//! layer only.

use thiserror::Error;

/// Result type alias using the crate `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading or validating relay configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
