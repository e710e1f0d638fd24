//! Final decision returned to the wallet.

use std::collections::BTreeSet;
use std::fmt;

use antifraud_core::{AggregateResult, Decision, Discrepancy, MeshDecision};
use serde::{Deserialize, Serialize};

/// Which scorer produced the base score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Local,
    External,
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyMode::Local => f.write_str("local"),
            PolicyMode::External => f.write_str("external"),
        }
    }
}

/// Policy the decision was taken under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub mode: PolicyMode,
    pub threshold: f64,
    pub retention_days: u32,
}

/// Audit view of the mesh round.
///
/// Informational only: the final decision is always re-derived from the
/// blended score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSummary {
    pub decision: MeshDecision,
    pub score: Option<f64>,
    pub participants: usize,
    pub discrepancies: BTreeSet<Discrepancy>,
}

impl From<&AggregateResult> for MeshSummary {
    fn from(aggregate: &AggregateResult) -> Self {
        Self {
            decision: aggregate.decision,
            score: aggregate.score.map(antifraud_core::ensemble::round4),
            participants: aggregate.participants,
            discrepancies: aggregate.discrepancies.clone(),
        }
    }
}

/// Outcome of validating one transaction.
///
/// # Example
///
/// ```rust
/// use antifraud_core::Decision;
/// use antifraud_validator::{FinalDecision, Policy, PolicyMode};
///
/// let result = FinalDecision {
///     score: 0.2731,
///     decision: Decision::Approve,
///     reason: "Aprobada: score 27.3% por debajo del umbral 70%.".into(),
///     threshold: 0.7,
///     model_count: 32,
///     model_version: "mock-ensemble-32-v1".into(),
///     signals: vec!["direccion_segwit".into()],
///     policy: Policy { mode: PolicyMode::Local, threshold: 0.7, retention_days: 0 },
///     mesh: None,
/// };
///
/// assert!(result.is_approved());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalDecision {
    /// Final risk score, rounded to 4 decimals.
    pub score: f64,
    pub decision: Decision,
    pub reason: String,
    pub threshold: f64,
    pub model_count: usize,
    pub model_version: String,
    /// Categorical risk signals of the transaction.
    pub signals: Vec<String>,
    pub policy: Policy,
    /// Present only when the mesh was consulted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<MeshSummary>,
}

impl FinalDecision {
    pub fn is_approved(&self) -> bool {
        self.decision == Decision::Approve
    }
}

impl fmt::Display for FinalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.is_approved() { "APPROVED" } else { "REJECTED" };
        write!(
            f,
            "Transaction {} (score: {:.4}, threshold: {:.2}, mode: {})",
            verdict, self.score, self.threshold, self.policy.mode
        )?;
        if let Some(mesh) = &self.mesh {
            write!(f, " [mesh: {}, {} participants]", mesh.decision, mesh.participants)?;
        }
        Ok(())
    }
}
