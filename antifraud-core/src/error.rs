//! Error types for the antifraud core library.

use thiserror::Error;

/// Errors that can occur in core antifraud operations.
#[derive(Debug, Error)]
pub enum AntifraudError {
    /// The validation request is missing a field or carries an invalid value.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A quorum specification could not be parsed.
    #[error("Invalid quorum '{0}': expected a count or 'required/total'")]
    InvalidQuorum(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, AntifraudError>;
