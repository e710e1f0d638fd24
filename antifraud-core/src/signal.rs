//! A single peer's risk judgement.

use serde::{Deserialize, Serialize};

use crate::decision::Decision;

fn default_unit() -> f64 {
    1.0
}

/// Risk signal produced by one mesh node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    /// Risk score in `[0, 1]`.
    pub score: f64,
    /// The node's own verdict.
    pub decision: Decision,
    /// How sure the node is, in `[0, 1]`.
    #[serde(default = "default_unit")]
    pub confidence: f64,
    /// Weight of the node in consensus scoring.
    #[serde(default = "default_unit")]
    pub weight: f64,
    /// Identifier of the model that produced the signal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

impl Signal {
    /// Create a signal with full confidence and unit weight.
    pub fn new(score: f64, decision: Decision) -> Self {
        Self {
            score,
            decision,
            confidence: 1.0,
            weight: 1.0,
            model_id: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_absent() {
        let signal: Signal = serde_json::from_str(r#"{"score":0.4,"decision":"approve"}"#).unwrap();
        assert_eq!(signal.confidence, 1.0);
        assert_eq!(signal.weight, 1.0);
        assert!(signal.model_id.is_none());
    }

    #[test]
    fn test_camel_case_model_id() {
        let signal = Signal::new(0.9, Decision::Reject).with_model("peer-gbm-v2");
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["modelId"], "peer-gbm-v2");
    }
}
