//! # Antifraud Core
//!
//! **Layer 0: Deterministic Risk Scoring**
//!
//! This crate holds everything in the antifraud pipeline that does not touch
//! the network: transaction candidate validation, feature derivation, the
//! 32-model local ensemble, quorum-gated signal aggregation and the blender
//! that combines local and mesh scores.
//!
//! ## Features
//!
//! - **Deterministic**: Same candidate → same score on every host
//! - **Minimal**: No network I/O, no async
//! - **Auditable**: Discrepancy flags explain every disagreement among peers
//!
//! ## Quick Start
//!
//! ```rust
//! use antifraud_core::{
//!     aggregate, blend, run_local_ensemble, Decision, Signal, TransactionCandidate,
//! };
//!
//! let tx = TransactionCandidate::new("bc1qexampleaddress", 0.5, 12.0, "mainnet").unwrap();
//! let local = run_local_ensemble(&tx, 0.7);
//! assert_eq!(local.decision, Decision::Approve);
//!
//! let signals = vec![Signal::new(0.2, Decision::Approve), Signal::new(0.3, Decision::Approve)];
//! let mesh = aggregate(&signals, 0.7);
//! let blended = blend(local.mean, mesh.as_ref());
//! assert!(blended.combined_score < 0.7);
//! ```

pub mod aggregate;
pub mod blend;
pub mod decision;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod signal;
pub mod transaction;

// Re-export main types for convenience
pub use aggregate::{aggregate, evaluate_quorum, AggregateResult, Discrepancy, Quorum};
pub use blend::{blend, BlendOutcome};
pub use decision::{Decision, MeshDecision};
pub use ensemble::{build_reason, run_local_ensemble, EnsembleOutcome, MODEL_COUNT, MODEL_VERSION};
pub use error::AntifraudError;
pub use features::{
    derive_features, AddressType, AmountBucket, FeeBucket, RiskSignal, TransactionFeatures,
};
pub use signal::Signal;
pub use transaction::{NumberLike, TransactionCandidate, ValidationRequest};

/// Clamp a score into `[min, max]`, mapping NaN to `min`.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.max(min).min(max)
}

/// Clamp a score into the unit interval.
pub fn clamp_unit(value: f64) -> f64 {
    clamp(value, 0.0, 1.0)
}
