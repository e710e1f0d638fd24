//! Quorum gate and weighted consensus scoring over mesh signals.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::clamp_unit;
use crate::decision::{Decision, MeshDecision};
use crate::error::AntifraudError;
use crate::signal::Signal;

/// Score spread at or above which signals are flagged as dispersed.
pub const DISPERSION_THRESHOLD: f64 = 0.35;

/// Default number of responding nodes required.
pub const DEFAULT_QUORUM: usize = 2;

/// Marker noting disagreement among signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discrepancy {
    /// Spread between max and min score is at least [`DISPERSION_THRESHOLD`].
    DispersionAlta,
    /// Both approve and reject verdicts carry weight.
    CriteriosOpuestos,
    /// Too few nodes responded.
    QuorumInsuficiente,
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Discrepancy::DispersionAlta => "dispersion_alta",
            Discrepancy::CriteriosOpuestos => "criterios_opuestos",
            Discrepancy::QuorumInsuficiente => "quorum_insuficiente",
        };
        f.write_str(label)
    }
}

/// Minimum number of usable signals before the mesh is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quorum {
    /// Absolute response count.
    Count(usize),
    /// `required` out of every `total` nodes that completed the handshake.
    Ratio { required: usize, total: usize },
}

impl Default for Quorum {
    fn default() -> Self {
        Quorum::Count(DEFAULT_QUORUM)
    }
}

impl Quorum {
    /// Number of responses needed when `eligible_nodes` nodes completed the
    /// handshake.
    ///
    /// A ratio resolves to `ceil(eligible_nodes * required / total)`, never
    /// less than one.
    pub fn required(&self, eligible_nodes: usize) -> usize {
        match *self {
            Quorum::Count(count) => count,
            Quorum::Ratio { required, total } => {
                let total = total as u128;
                let scaled = (eligible_nodes as u128 * required as u128 + total - 1) / total;
                usize::try_from(scaled).unwrap_or(usize::MAX).max(1)
            }
        }
    }
}

impl FromStr for Quorum {
    type Err = AntifraudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || AntifraudError::InvalidQuorum(trimmed.to_string());

        if let Some((required, total)) = trimmed.split_once('/') {
            let required: usize = required.trim().parse().map_err(|_| invalid())?;
            let total: usize = total.trim().parse().map_err(|_| invalid())?;
            if total == 0 || required > total {
                return Err(invalid());
            }
            return Ok(Quorum::Ratio { required, total });
        }

        trimmed.parse().map(Quorum::Count).map_err(|_| invalid())
    }
}

impl fmt::Display for Quorum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quorum::Count(count) => write!(f, "{}", count),
            Quorum::Ratio { required, total } => write!(f, "{}/{}", required, total),
        }
    }
}

/// Result of aggregating mesh signals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    /// Weighted mean score; `None` when the quorum gate failed.
    pub score: Option<f64>,
    pub decision: MeshDecision,
    /// Nodes that produced a usable signal.
    pub participants: usize,
    pub discrepancies: BTreeSet<Discrepancy>,
    /// Effective weight of approving signals.
    pub approvals: f64,
    /// Effective weight of rejecting signals.
    pub rejections: f64,
    pub total_weight: f64,
}

impl AggregateResult {
    /// Result reported when fewer than the required nodes responded.
    pub fn insufficient(participants: usize) -> Self {
        Self {
            score: None,
            decision: MeshDecision::Insufficient,
            participants,
            discrepancies: BTreeSet::from([Discrepancy::QuorumInsuficiente]),
            approvals: 0.0,
            rejections: 0.0,
            total_weight: 0.0,
        }
    }

    pub fn has(&self, discrepancy: Discrepancy) -> bool {
        self.discrepancies.contains(&discrepancy)
    }
}

/// Effective weight of a signal: `weight * clamp(confidence)`.
///
/// Non-finite weights and confidences default to 1; negative weights count
/// as zero.
fn effective_weight(signal: &Signal) -> f64 {
    let weight = if signal.weight.is_finite() {
        signal.weight.max(0.0)
    } else {
        1.0
    };
    let confidence = if signal.confidence.is_finite() {
        clamp_unit(signal.confidence)
    } else {
        1.0
    };
    weight * confidence
}

/// Weighted consensus over `signals`.
///
/// Returns `None` for an empty slice.
pub fn aggregate(signals: &[Signal], threshold: f64) -> Option<AggregateResult> {
    if signals.is_empty() {
        return None;
    }

    let mut total_weight = 0.0;
    let mut weighted_sum = 0.0;
    let mut approvals = 0.0;
    let mut rejections = 0.0;
    let mut max_score = f64::MIN;
    let mut min_score = f64::MAX;

    for signal in signals {
        let score = clamp_unit(signal.score);
        let weight = effective_weight(signal);

        total_weight += weight;
        weighted_sum += score * weight;
        match signal.decision {
            Decision::Approve => approvals += weight,
            Decision::Reject => rejections += weight,
        }
        max_score = max_score.max(score);
        min_score = min_score.min(score);
    }

    let divisor = if total_weight == 0.0 { 1.0 } else { total_weight };
    let weighted_score = weighted_sum / divisor;

    let mut discrepancies = BTreeSet::new();
    if max_score - min_score >= DISPERSION_THRESHOLD {
        discrepancies.insert(Discrepancy::DispersionAlta);
    }
    if approvals > 0.0 && rejections > 0.0 {
        discrepancies.insert(Discrepancy::CriteriosOpuestos);
    }

    Some(AggregateResult {
        score: Some(clamp_unit(weighted_score)),
        decision: Decision::from_score(weighted_score, threshold).into(),
        participants: signals.len(),
        discrepancies,
        approvals,
        rejections,
        total_weight,
    })
}

/// Apply the quorum gate, then aggregate.
///
/// `required` is the resolved response count (see [`Quorum::required`]).
/// Returns `None` only when the gate passes with no signals at all, which
/// can happen when `required` is zero.
pub fn evaluate_quorum(
    signals: &[Signal],
    required: usize,
    threshold: f64,
) -> Option<AggregateResult> {
    if signals.len() < required {
        return Some(AggregateResult::insufficient(signals.len()));
    }
    aggregate(signals, threshold)
}
