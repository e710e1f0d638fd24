//! Client for an external scoring service.
//!
//! When configured, the service replaces the local ensemble. Any failure is
//! reported to the caller, which falls back to local scoring.

use antifraud_core::{
    build_reason, clamp_unit, Decision, NumberLike, TransactionCandidate, MODEL_COUNT,
};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ExternalScorerConfig;
use crate::error::{Result, ValidatorError};

/// Value sent as `metadata.source`.
pub const REQUEST_SOURCE: &str = "antifraud-validator";

/// Model version reported when the service names none.
pub const DEFAULT_EXTERNAL_MODEL_VERSION: &str = "external";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionPayload<'a> {
    address: &'a str,
    amount: f64,
    fee_rate: f64,
    network: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnsembleHint {
    expected_models: usize,
}

#[derive(Serialize)]
struct RequestMetadata {
    source: &'static str,
}

#[derive(Serialize)]
struct ScoringRequest<'a> {
    transaction: TransactionPayload<'a>,
    ensemble: EnsembleHint,
    metadata: RequestMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoringReply {
    score: Option<NumberLike>,
    decision: Option<String>,
    reason: Option<String>,
    model_version: Option<String>,
    model_count: Option<usize>,
    signals: Option<Vec<String>>,
    error: Option<String>,
}

/// Verdict returned by the external service.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalOutcome {
    /// Score clamped to `[0, 1]`.
    pub score: f64,
    pub decision: Decision,
    pub reason: String,
    pub model_version: String,
    pub model_count: usize,
    pub signals: Vec<String>,
}

/// HTTP client for the external scoring service.
#[derive(Debug, Clone)]
pub struct ExternalScorer {
    client: reqwest::Client,
    config: ExternalScorerConfig,
}

impl ExternalScorer {
    /// Create a scorer for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns `External` if the HTTP client cannot be built.
    pub fn new(config: ExternalScorerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ValidatorError::External(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Ask the service to score `tx`.
    ///
    /// # Errors
    ///
    /// - `ExternalTimeout` if no answer arrives within the configured timeout
    /// - `External` for transport failures, non-success statuses, or a reply
    ///   without a finite score
    pub async fn score(
        &self,
        tx: &TransactionCandidate,
        threshold: f64,
    ) -> Result<ExternalOutcome> {
        let request = ScoringRequest {
            transaction: TransactionPayload {
                address: tx.address(),
                amount: tx.amount(),
                fee_rate: tx.fee_rate(),
                network: tx.network(),
            },
            ensemble: EnsembleHint {
                expected_models: MODEL_COUNT,
            },
            metadata: RequestMetadata { source: REQUEST_SOURCE },
        };

        let mut builder = self.client.post(&self.config.url).json(&request);
        if let Some(token) = &self.config.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        debug!("Requesting external score from {}", self.config.url);
        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let reply: Option<ScoringReply> = serde_json::from_slice(&body).ok();

        if !status.is_success() {
            let message = reply
                .and_then(|r| r.error)
                .unwrap_or_else(|| format!("service answered HTTP {}", status.as_u16()));
            return Err(ValidatorError::External(message));
        }

        let reply = reply.ok_or_else(|| ValidatorError::External("reply is not JSON".into()))?;
        interpret_reply(reply, threshold)
    }

    fn classify(&self, err: reqwest::Error) -> ValidatorError {
        if err.is_timeout() {
            ValidatorError::ExternalTimeout {
                timeout_ms: self.config.timeout.as_millis() as u64,
            }
        } else {
            ValidatorError::External(err.to_string())
        }
    }
}

fn interpret_reply(reply: ScoringReply, threshold: f64) -> Result<ExternalOutcome> {
    let raw_score = reply
        .score
        .as_ref()
        .and_then(NumberLike::as_f64)
        .ok_or_else(|| ValidatorError::External("reply has no finite score".into()))?;

    let decision = match reply.decision.as_deref().map(str::trim) {
        Some("approve") => Decision::Approve,
        Some(other) if !other.is_empty() => Decision::Reject,
        _ => Decision::from_score(raw_score, threshold),
    };
    let signals = reply.signals.unwrap_or_default();
    let reason = reply
        .reason
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| build_reason(decision, raw_score, threshold, &signals));

    Ok(ExternalOutcome {
        score: clamp_unit(raw_score),
        decision,
        reason,
        model_version: reply
            .model_version
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_EXTERNAL_MODEL_VERSION.to_string()),
        model_count: reply.model_count.filter(|&c| c > 0).unwrap_or(MODEL_COUNT),
        signals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scorer(url: String, token: Option<&str>) -> ExternalScorer {
        ExternalScorer::new(ExternalScorerConfig {
            url,
            token: token.map(str::to_string),
            timeout: Duration::from_millis(300),
        })
        .unwrap()
    }

    fn tx() -> TransactionCandidate {
        TransactionCandidate::new("bc1qexternal", 0.3, 8.0, "mainnet").unwrap()
    }

    #[tokio::test]
    async fn test_full_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer t0ken"))
            .and(body_partial_json(json!({
                "transaction": {"address": "bc1qexternal", "feeRate": 8.0},
                "ensemble": {"expectedModels": 32}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "score": 0.91,
                "decision": "reject",
                "reason": "velocity",
                "modelVersion": "gbm-7",
                "modelCount": 5,
                "signals": ["velocidad"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = scorer(server.uri(), Some("t0ken")).score(&tx(), 0.7).await.unwrap();
        assert_eq!(outcome.score, 0.91);
        assert_eq!(outcome.decision, Decision::Reject);
        assert_eq!(outcome.reason, "velocity");
        assert_eq!(outcome.model_version, "gbm-7");
        assert_eq!(outcome.model_count, 5);
        assert_eq!(outcome.signals, vec!["velocidad".to_string()]);
    }

    #[tokio::test]
    async fn test_minimal_reply_gets_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": "0.25"})))
            .mount(&server)
            .await;

        let outcome = scorer(server.uri(), None).score(&tx(), 0.7).await.unwrap();
        assert_eq!(outcome.decision, Decision::Approve);
        assert_eq!(outcome.model_version, "external");
        assert_eq!(outcome.model_count, MODEL_COUNT);
        assert!(outcome.reason.starts_with("Aprobada: score 25.0%"));
    }

    #[tokio::test]
    async fn test_missing_score_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"decision": "approve"})))
            .mount(&server)
            .await;

        let result = scorer(server.uri(), None).score(&tx(), 0.7).await;
        assert!(matches!(result, Err(ValidatorError::External(_))));
    }

    #[tokio::test]
    async fn test_error_status_carries_service_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({"error": "model warming up"})),
            )
            .mount(&server)
            .await;

        let err = scorer(server.uri(), None).score(&tx(), 0.7).await.unwrap_err();
        assert_eq!(err.to_string(), "External scoring error: model warming up");
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"score": 0.1}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let result = scorer(server.uri(), None).score(&tx(), 0.7).await;
        assert!(matches!(result, Err(ValidatorError::ExternalTimeout { timeout_ms: 300 })));
    }

    #[test]
    fn test_out_of_range_score_is_clamped() {
        let reply = ScoringReply {
            score: Some(NumberLike::Number(1.7)),
            ..ScoringReply::default()
        };
        let outcome = interpret_reply(reply, 0.7).unwrap();
        assert_eq!(outcome.score, 1.0);
        assert_eq!(outcome.decision, Decision::Reject);
    }
}
