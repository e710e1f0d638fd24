//! Error types for mesh operations.

use thiserror::Error;

/// Errors that can occur while talking to mesh peers.
///
/// None of these ever escape a validation call: each one drops a single
/// node (or, for configuration errors, disables the mesh).
#[derive(Debug, Error)]
pub enum MeshError {
    /// Missing or invalid mesh configuration or key material.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection refused, reset or non-success HTTP status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A single attempt exceeded its timeout.
    #[error("Request timed out")]
    Timeout,

    /// Malformed reply or missing envelope field.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Bad signature or failed tag verification.
    #[error("Authentication failed: {0}")]
    Authentication(&'static str),
}

impl MeshError {
    /// Whether the transport should try the request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MeshError::Transport(_) | MeshError::Timeout)
    }
}

impl From<reqwest::Error> for MeshError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MeshError::Timeout
        } else {
            MeshError::Transport(err.to_string())
        }
    }
}

/// Result type alias for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
