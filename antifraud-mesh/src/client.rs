//! Mesh client - collects risk signals from peer nodes.

use std::fmt;
use std::sync::Arc;

use antifraud_core::{evaluate_quorum, AggregateResult, Signal, TransactionFeatures};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::{MeshConfig, NodeDescriptor};
use crate::envelope::{SecureEnvelope, SecureEnvelopeCodec};
use crate::error::{MeshError, Result};
use crate::keys::KeyExchangeManager;
use crate::protocol::SignalRequest;
use crate::transport::Transport;

/// Phase of a node exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStage {
    Handshake,
    Seal,
    Request,
    Open,
}

impl fmt::Display for ExchangeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExchangeStage::Handshake => "handshake",
            ExchangeStage::Seal => "seal",
            ExchangeStage::Request => "request",
            ExchangeStage::Open => "open",
        };
        f.write_str(label)
    }
}

/// Why a node contributed no signal.
#[derive(Debug)]
pub struct NodeFailure {
    pub stage: ExchangeStage,
    pub error: MeshError,
}

impl NodeFailure {
    fn at(stage: ExchangeStage) -> impl FnOnce(MeshError) -> Self {
        move |error| Self { stage, error }
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Authentication failures only name the failing check.
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

/// Result of the exchange with one node.
#[derive(Debug)]
pub struct NodeOutcome {
    pub node_id: String,
    pub result: std::result::Result<Signal, NodeFailure>,
}

impl NodeOutcome {
    pub fn signal(&self) -> Option<&Signal> {
        self.result.as_ref().ok()
    }

    /// Whether the node got past the handshake and counts toward the quorum.
    pub fn handshake_completed(&self) -> bool {
        !matches!(&self.result, Err(failure) if failure.stage == ExchangeStage::Handshake)
    }
}

/// Outcome of a collection round.
#[derive(Debug)]
pub enum MeshReport {
    /// Mesh disabled or no nodes configured; nothing was contacted.
    Unavailable,
    /// Nodes were contacted. `aggregate` may still be `insufficient`.
    Evaluated {
        outcomes: Vec<NodeOutcome>,
        aggregate: AggregateResult,
    },
}

impl MeshReport {
    pub fn aggregate(&self) -> Option<&AggregateResult> {
        match self {
            MeshReport::Unavailable => None,
            MeshReport::Evaluated { aggregate, .. } => Some(aggregate),
        }
    }
}

/// Client that exchanges sealed signal requests with every configured node.
#[derive(Debug, Clone)]
pub struct MeshClient {
    config: MeshConfig,
    keys: Arc<KeyExchangeManager>,
    codec: SecureEnvelopeCodec,
    transport: Transport,
}

impl MeshClient {
    /// Create a client with its own key manager.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the configured key material is invalid or
    /// the HTTP client cannot be built.
    pub fn new(config: MeshConfig) -> Result<Self> {
        let keys = Arc::new(KeyExchangeManager::new(config.identity.clone()));
        Self::with_keys(config, keys)
    }

    /// Create a client sharing an existing key manager.
    pub fn with_keys(config: MeshConfig, keys: Arc<KeyExchangeManager>) -> Result<Self> {
        // Surface bad key material at startup rather than on first request.
        keys.get_or_create_local_key_pair()?;
        let transport = Transport::from_config(&config)?;
        Ok(Self {
            codec: SecureEnvelopeCodec::new(keys.clone()),
            config,
            keys,
            transport,
        })
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn keys(&self) -> &Arc<KeyExchangeManager> {
        &self.keys
    }

    /// Query every node and aggregate the signals that come back.
    ///
    /// Failed nodes reduce the participant count and never abort the round.
    pub async fn collect_signals(
        &self,
        features: &TransactionFeatures,
        threshold: f64,
    ) -> MeshReport {
        if !self.config.is_active() {
            debug!("Mesh inactive; skipping signal collection");
            return MeshReport::Unavailable;
        }

        let outcomes = self.exchange_all(features, threshold).await;
        let signals: Vec<Signal> = outcomes.iter().filter_map(|o| o.signal().cloned()).collect();

        // Nodes that never completed a handshake are out of the denominator.
        let eligible = outcomes.iter().filter(|o| o.handshake_completed()).count();
        let required = self.config.quorum.required(eligible);
        let aggregate = evaluate_quorum(&signals, required, threshold)
            .unwrap_or_else(|| AggregateResult::insufficient(0));

        info!(
            "Mesh round: {}/{} nodes responded, {} past handshake (quorum {}), decision {}",
            signals.len(),
            self.config.nodes.len(),
            eligible,
            required,
            aggregate.decision
        );

        MeshReport::Evaluated { outcomes, aggregate }
    }

    async fn exchange_all(
        &self,
        features: &TransactionFeatures,
        threshold: f64,
    ) -> Vec<NodeOutcome> {
        let request = SignalRequest::new(features.clone(), threshold);
        let exchanges = self.config.nodes.iter().map(|node| {
            let request = &request;
            async move {
                let result = self.exchange_with_node(node, request).await;
                if let Err(failure) = &result {
                    warn!("Dropping mesh node {}: {}", node.id, failure);
                }
                NodeOutcome {
                    node_id: node.id.clone(),
                    result,
                }
            }
        });
        join_all(exchanges).await
    }

    async fn exchange_with_node(
        &self,
        node: &NodeDescriptor,
        request: &SignalRequest,
    ) -> std::result::Result<Signal, NodeFailure> {
        let resolved;
        let node = if node.has_keys() {
            node
        } else {
            resolved = self
                .keys
                .perform_handshake(&self.transport, node, &self.config.handshake_path)
                .await
                .map_err(NodeFailure::at(ExchangeStage::Handshake))?;
            &resolved
        };

        let (Some(peer_ecdh), signing_key) =
            (node.ecdh_public_key.as_deref(), node.signing_public_key.as_deref())
        else {
            return Err(NodeFailure::at(ExchangeStage::Handshake)(MeshError::Protocol(
                "missing peer ECDH key".into(),
            )));
        };

        let envelope = self
            .codec
            .seal(peer_ecdh, request)
            .map_err(NodeFailure::at(ExchangeStage::Seal))?;

        debug!("Sending signal request to {}", node.id);
        let reply: SecureEnvelope = self
            .transport
            .post_json(&node.endpoint(&self.config.signal_path), &envelope)
            .await
            .map_err(NodeFailure::at(ExchangeStage::Request))?;

        let sender_ecdh = if reply.ecdh_public_key.is_empty() {
            peer_ecdh
        } else {
            reply.ecdh_public_key.as_str()
        };
        let signal: Signal = self
            .codec
            .open(&reply, signing_key, sender_ecdh)
            .map_err(NodeFailure::at(ExchangeStage::Open))?;

        Ok(signal.with_weight(node.weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antifraud_core::{derive_features, TransactionCandidate};

    fn features() -> TransactionFeatures {
        let tx = TransactionCandidate::new("bc1qexample", 0.5, 10.0, "mainnet").unwrap();
        derive_features(&tx)
    }

    #[test]
    fn test_disabled_mesh_is_unavailable() {
        let client = MeshClient::new(MeshConfig::disabled()).unwrap();
        let report = tokio_test::block_on(client.collect_signals(&features(), 0.7));
        assert!(matches!(report, MeshReport::Unavailable));
        assert!(report.aggregate().is_none());
    }

    #[tokio::test]
    async fn test_enabled_without_nodes_is_unavailable() {
        let config = MeshConfig {
            enabled: true,
            ..MeshConfig::disabled()
        };
        let client = MeshClient::new(config).unwrap();
        assert!(matches!(
            client.collect_signals(&features(), 0.7).await,
            MeshReport::Unavailable
        ));
    }

    #[test]
    fn test_invalid_key_material_fails_construction() {
        let mut config = MeshConfig::disabled();
        config.identity.ecdh_private_key = Some("bm90IGEga2V5".into());
        assert!(matches!(MeshClient::new(config), Err(MeshError::Configuration(_))));
    }

    #[test]
    fn test_failure_display_names_stage() {
        let failure = NodeFailure::at(ExchangeStage::Open)(MeshError::Authentication("signature"));
        assert!(failure.to_string().starts_with("open failed"));
    }

    #[test]
    fn test_handshake_failures_leave_the_denominator() {
        let outcome = |stage| NodeOutcome {
            node_id: "n".into(),
            result: Err(NodeFailure::at(stage)(MeshError::Timeout)),
        };
        assert!(!outcome(ExchangeStage::Handshake).handshake_completed());
        assert!(outcome(ExchangeStage::Request).handshake_completed());
        assert!(outcome(ExchangeStage::Open).handshake_completed());
    }
}
