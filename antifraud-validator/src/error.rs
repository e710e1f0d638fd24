//! Error types for the validation pipeline.
//!
//! Only [`ValidatorError::InvalidRequest`] ever leaves
//! [`TransactionValidator::validate`](crate::TransactionValidator::validate);
//! external-service errors are logged and replaced by the local ensemble.

use antifraud_core::AntifraudError;
use thiserror::Error;

/// Errors that can occur while validating a transaction.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Missing or invalid address, amount or fee rate.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The external scoring service failed or answered badly.
    #[error("External scoring error: {0}")]
    External(String),

    /// The external scoring service did not answer in time.
    #[error("External scoring timed out after {timeout_ms} ms")]
    ExternalTimeout {
        /// Configured timeout
        timeout_ms: u64,
    },
}

impl From<AntifraudError> for ValidatorError {
    fn from(err: AntifraudError) -> Self {
        ValidatorError::InvalidRequest(err.to_string())
    }
}

/// Result type alias for validator operations.
pub type Result<T> = std::result::Result<T, ValidatorError>;
