//! Decision types shared by the local ensemble, peers and the aggregator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary verdict on a transaction candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Reject when `score >= threshold`, approve otherwise.
    pub fn from_score(score: f64, threshold: f64) -> Self {
        if score >= threshold {
            Decision::Reject
        } else {
            Decision::Approve
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of the mesh as a whole.
///
/// `Insufficient` means the quorum gate was not met and the mesh score must
/// not be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshDecision {
    Approve,
    Reject,
    Insufficient,
}

impl From<Decision> for MeshDecision {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approve => MeshDecision::Approve,
            Decision::Reject => MeshDecision::Reject,
        }
    }
}

impl fmt::Display for MeshDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MeshDecision::Approve => "approve",
            MeshDecision::Reject => "reject",
            MeshDecision::Insufficient => "insufficient",
        };
        f.write_str(label)
    }
}
