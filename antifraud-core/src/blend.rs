//! Blend the local score with the mesh result.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::aggregate::{AggregateResult, Discrepancy};
use crate::clamp_unit;
use crate::decision::MeshDecision;

/// Share of the local score in the blended score.
pub const LOCAL_WEIGHT: f64 = 0.6;

/// Share of the mesh score in the blended score.
pub const MESH_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendOutcome {
    pub combined_score: f64,
    /// Audit only; never overrides the threshold comparison.
    pub mesh_decision: Option<MeshDecision>,
    pub discrepancies: BTreeSet<Discrepancy>,
}

/// Combine `local_score` with the mesh, if the mesh produced a score.
pub fn blend(local_score: f64, mesh: Option<&AggregateResult>) -> BlendOutcome {
    let discrepancies = mesh.map(|m| m.discrepancies.clone()).unwrap_or_default();

    match mesh.and_then(|m| m.score.map(|score| (score, m.decision))) {
        Some((mesh_score, decision)) => BlendOutcome {
            combined_score: clamp_unit(local_score * LOCAL_WEIGHT + mesh_score * MESH_WEIGHT),
            mesh_decision: Some(decision),
            discrepancies,
        },
        None => BlendOutcome {
            combined_score: local_score,
            mesh_decision: None,
            discrepancies,
        },
    }
}
