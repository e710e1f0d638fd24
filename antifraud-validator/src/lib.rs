//! # Antifraud Validator
//!
//! **Layer 2: Transaction Validation Pipeline**
//!
//! This crate turns a wallet's validation request into a [`FinalDecision`]:
//! it always runs the deterministic local ensemble, optionally defers to an
//! external scoring service, and optionally blends in signals from the
//! antifraud mesh.
//!
//! ## Features
//!
//! - **Degrades gracefully**: External and mesh failures fall back to local scoring
//! - **Bounded**: Mesh collection runs under an overall deadline
//! - **Auditable**: The mesh verdict and its discrepancies are reported alongside
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use antifraud_core::ValidationRequest;
//! use antifraud_validator::TransactionValidator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let validator = TransactionValidator::from_env();
//!
//!     let result = validator
//!         .validate(ValidationRequest::new("bc1qexampleaddress", 0.25, 12.0))
//!         .await?;
//!
//!     println!("Decision: {}", result.decision);
//!     println!("Score: {:.4}", result.score);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod external;
pub mod result;
pub mod validator;

// Re-export main types for convenience
pub use config::{ExternalScorerConfig, ValidatorConfig};
pub use error::ValidatorError;
pub use external::{ExternalOutcome, ExternalScorer};
pub use result::{FinalDecision, MeshSummary, Policy, PolicyMode};
pub use validator::TransactionValidator;
