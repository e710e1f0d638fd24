//! Transaction validator - the main public API.
//!
//! Runs the local ensemble (or the external scorer when configured),
//! consults the mesh when enabled, blends the scores and re-applies the
//! threshold to produce the [`FinalDecision`].

use std::time::Instant;

use antifraud_core::ensemble::round4;
use antifraud_core::{
    blend, build_reason, derive_features, run_local_ensemble, Decision, EnsembleOutcome,
    TransactionCandidate, ValidationRequest,
};
use antifraud_mesh::{MeshClient, MeshReport};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ValidatorConfig;
use crate::error::Result;
use crate::external::{ExternalOutcome, ExternalScorer};
use crate::result::{FinalDecision, MeshSummary, Policy, PolicyMode};

/// Score produced by the local ensemble or the external service, before
/// the mesh is blended in.
#[derive(Debug, Clone)]
struct BaseAssessment {
    /// Unrounded score used for blending and re-thresholding.
    exact_score: f64,
    reported_score: f64,
    decision: Decision,
    reason: String,
    model_version: String,
    model_count: usize,
    signals: Vec<String>,
    mode: PolicyMode,
}

impl From<EnsembleOutcome> for BaseAssessment {
    fn from(outcome: EnsembleOutcome) -> Self {
        Self {
            exact_score: outcome.mean,
            reported_score: outcome.score,
            decision: outcome.decision,
            reason: outcome.reason,
            model_version: outcome.model_version,
            model_count: outcome.model_count,
            signals: outcome.signals,
            mode: PolicyMode::Local,
        }
    }
}

impl From<ExternalOutcome> for BaseAssessment {
    fn from(outcome: ExternalOutcome) -> Self {
        Self {
            exact_score: outcome.score,
            reported_score: outcome.score,
            decision: outcome.decision,
            reason: outcome.reason,
            model_version: outcome.model_version,
            model_count: outcome.model_count,
            signals: outcome.signals,
            mode: PolicyMode::External,
        }
    }
}

/// Validates transaction candidates before broadcast.
///
/// # Example
///
/// ```rust,no_run
/// use antifraud_core::ValidationRequest;
/// use antifraud_validator::TransactionValidator;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let validator = TransactionValidator::from_env();
///
///     let result = validator
///         .validate(ValidationRequest::new("bc1qexampleaddress", 0.25, 12.0))
///         .await?;
///
///     println!("{}", result);
///     println!("{}", result.reason);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TransactionValidator {
    config: ValidatorConfig,
    external: Option<ExternalScorer>,
    mesh: Option<MeshClient>,
}

impl TransactionValidator {
    /// Create a validator.
    ///
    /// Never fails: an external scorer or mesh client that cannot be built
    /// is logged and left out.
    pub fn new(config: ValidatorConfig) -> Self {
        let external = config.external.clone().and_then(|external| {
            ExternalScorer::new(external)
                .map_err(|e| warn!("External scorer disabled: {}", e))
                .ok()
        });

        let mesh = if config.mesh.is_active() {
            MeshClient::new(config.mesh.clone())
                .map_err(|e| warn!("Mesh disabled: {}", e))
                .ok()
        } else {
            None
        };

        Self { config, external, mesh }
    }

    /// Create a validator from process environment variables.
    pub fn from_env() -> Self {
        Self::new(ValidatorConfig::from_env())
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// The mesh client, when the mesh is active.
    pub fn mesh_client(&self) -> Option<&MeshClient> {
        self.mesh.as_ref()
    }

    /// Validate a transaction request.
    ///
    /// This method:
    /// 1. Validates the request into a transaction candidate
    /// 2. Scores it with the external service, or the local ensemble
    /// 3. Collects mesh signals under an overall deadline
    /// 4. Blends local and mesh scores and re-applies the threshold
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the address is missing or empty, or the
    /// amount or fee rate is not a positive number. Every other failure
    /// degrades to local scoring.
    pub async fn validate(&self, request: ValidationRequest) -> Result<FinalDecision> {
        let start = Instant::now();
        let tx = request.into_candidate(&self.config.network)?;
        let threshold = self.config.threshold;

        let base = self.assess(&tx, threshold).await;
        let report = self.collect_mesh(&tx, threshold).await;
        let aggregate = report.aggregate();
        let blended = blend(base.exact_score, aggregate);

        let mesh_scored = aggregate.map_or(false, |a| a.score.is_some());
        let (score, decision, reason) = if mesh_scored {
            let decision = Decision::from_score(blended.combined_score, threshold);
            let reason = build_reason(decision, blended.combined_score, threshold, &base.signals);
            (round4(blended.combined_score), decision, reason)
        } else {
            (base.reported_score, base.decision, base.reason)
        };

        if !blended.discrepancies.is_empty() {
            debug!("Mesh discrepancies: {:?}", blended.discrepancies);
        }

        let result = FinalDecision {
            score,
            decision,
            reason,
            threshold,
            model_count: base.model_count,
            model_version: base.model_version,
            signals: base.signals,
            policy: Policy {
                mode: base.mode,
                threshold,
                retention_days: self.config.retention_days,
            },
            mesh: aggregate.map(MeshSummary::from),
        };

        info!("{} in {:?}", result, start.elapsed());
        Ok(result)
    }

    async fn assess(&self, tx: &TransactionCandidate, threshold: f64) -> BaseAssessment {
        if let Some(external) = &self.external {
            match external.score(tx, threshold).await {
                Ok(outcome) => return outcome.into(),
                Err(e) => warn!(
                    "External scorer {} failed, using local ensemble: {}",
                    external.url(),
                    e
                ),
            }
        }
        run_local_ensemble(tx, threshold).into()
    }

    async fn collect_mesh(&self, tx: &TransactionCandidate, threshold: f64) -> MeshReport {
        let Some(client) = &self.mesh else {
            return MeshReport::Unavailable;
        };

        let features = derive_features(tx);
        let deadline = client.config().collection_deadline();
        match timeout(deadline, client.collect_signals(&features, threshold)).await {
            Ok(report) => report,
            Err(_) => {
                warn!("Mesh collection exceeded {:?}; continuing without mesh", deadline);
                MeshReport::Unavailable
            }
        }
    }
}
