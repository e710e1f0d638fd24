//! Mesh responder - the peer side of the signal exchange.
//!
//! Lets one binary act as a mesh node: it answers handshakes with its public
//! keys and answers sealed signal requests with a sealed, signed signal.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use antifraud_core::{clamp_unit, Decision, Signal, TransactionFeatures};
use lru::LruCache;
use tracing::{debug, info, warn};

use crate::envelope::{verify_signature, SecureEnvelope, SecureEnvelopeCodec};
use crate::error::{MeshError, Result};
use crate::keys::{decode_public_key, KeyExchangeManager};
use crate::protocol::{HandshakeReply, HandshakeRequest, SignalRequest};

/// Threshold used when a request carries a non-finite one.
pub const FALLBACK_THRESHOLD: f64 = 0.7;

/// Model identifier reported in responder signals.
pub const RESPONDER_MODEL_ID: &str = "mesh-base-risk-v1";

/// Initiators whose signing keys are remembered at once.
const SIGNER_CACHE_CAPACITY: usize = 1024;

/// Unconfirmed signing keys kept per initiator ECDH key.
const MAX_SIGNER_CANDIDATES: usize = 4;

/// Signing keys announced for one initiator ECDH key.
///
/// A handshake only proposes a candidate. The key is bound once an envelope
/// that decrypts under the ECDH key also verifies against it, since only the
/// holder of the ECDH private key can produce such an envelope.
#[derive(Debug, Default)]
struct SignerBinding {
    confirmed: Option<String>,
    candidates: VecDeque<String>,
}

/// Answers handshake and signal requests from other nodes.
#[derive(Debug)]
pub struct MeshResponder {
    keys: Arc<KeyExchangeManager>,
    codec: SecureEnvelopeCodec,
    /// Keyed by the initiator's ECDH public key.
    signers: Mutex<LruCache<String, SignerBinding>>,
}

impl MeshResponder {
    pub fn new(keys: Arc<KeyExchangeManager>) -> Self {
        Self::with_signer_capacity(keys, SIGNER_CACHE_CAPACITY)
    }

    fn with_signer_capacity(keys: Arc<KeyExchangeManager>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            codec: SecureEnvelopeCodec::new(keys.clone()),
            keys,
            signers: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn node_id(&self) -> &str {
        self.keys.node_id()
    }

    /// Answer a handshake with this node's public keys.
    ///
    /// A signed handshake must verify against the key it announces. The key
    /// becomes a candidate signer for the announced ECDH key and is bound on
    /// the first envelope from that ECDH key that verifies against it.
    ///
    /// # Errors
    ///
    /// - `Protocol` if the announced ECDH key is not a P-256 point
    /// - `Authentication` if a present signature does not verify
    pub fn handle_handshake(&self, request: &HandshakeRequest) -> Result<HandshakeReply> {
        decode_public_key(&request.ecdh_public_key)?;

        if request.signature.is_some() {
            let verified = verify_signature(
                &request.signable_bytes(),
                request.signature.as_deref(),
                request.signing_public_key.as_deref(),
            );
            if !verified {
                warn!("Rejecting handshake from {}: bad signature", request.from_id);
                return Err(MeshError::Authentication("handshake signature"));
            }
            if let Some(signing_key) = &request.signing_public_key {
                self.propose_signer(&request.ecdh_public_key, signing_key);
            }
        }

        let key_pair = self.keys.get_or_create_local_key_pair()?;
        debug!("Handshake from {}", request.from_id);
        Ok(HandshakeReply {
            ecdh_public_key: Some(key_pair.ecdh_public_key().to_string()),
            signing_public_key: key_pair.signing_public_key().map(str::to_string),
        })
    }

    /// Open a signal request, score it, and seal the reply to the sender.
    ///
    /// Once a signer is bound to the sender's ECDH key, the envelope must
    /// verify against it before it is decrypted.
    pub fn handle_signal(&self, envelope: &SecureEnvelope) -> Result<SecureEnvelope> {
        let sender = envelope.ecdh_public_key.as_str();
        let (confirmed, candidates) = self.signers_for(sender);
        let request: SignalRequest = match confirmed {
            Some(signing_key) => self.codec.open(envelope, Some(signing_key.as_str()), sender)?,
            None => {
                let request = self.codec.decrypt_envelope(envelope, sender)?;
                let verified = candidates.iter().find(|k| envelope.verify(Some(k.as_str())));
                if let Some(signing_key) = verified {
                    debug!("Bound signing key for {}", envelope.from_id);
                    self.confirm_signer(sender, signing_key);
                }
                request
            }
        };

        let signal = self.score(&request.features, request.context.threshold);
        info!(
            "Scored signal request from {}: {:.4} ({})",
            envelope.from_id, signal.score, signal.decision
        );
        self.codec.seal(sender, &signal)
    }

    /// Score features with the base-risk table.
    pub fn score(&self, features: &TransactionFeatures, threshold: f64) -> Signal {
        let threshold = if threshold.is_finite() {
            clamp_unit(threshold)
        } else {
            FALLBACK_THRESHOLD
        };
        let score = features.base_risk();
        Signal::new(score, Decision::from_score(score, threshold)).with_model(RESPONDER_MODEL_ID)
    }

    fn propose_signer(&self, ecdh_public_key: &str, signing_key: &str) {
        let Ok(mut signers) = self.signers.lock() else {
            return;
        };
        if let Some(binding) = signers.get_mut(ecdh_public_key) {
            if binding.confirmed.is_some() || binding.candidates.iter().any(|k| k == signing_key) {
                return;
            }
            binding.candidates.push_back(signing_key.to_string());
            if binding.candidates.len() > MAX_SIGNER_CANDIDATES {
                binding.candidates.pop_front();
            }
        } else {
            let mut binding = SignerBinding::default();
            binding.candidates.push_back(signing_key.to_string());
            signers.put(ecdh_public_key.to_string(), binding);
        }
    }

    fn confirm_signer(&self, ecdh_public_key: &str, signing_key: &str) {
        if let Ok(mut signers) = self.signers.lock() {
            signers.put(
                ecdh_public_key.to_string(),
                SignerBinding {
                    confirmed: Some(signing_key.to_string()),
                    candidates: VecDeque::new(),
                },
            );
        }
    }

    fn signers_for(&self, ecdh_public_key: &str) -> (Option<String>, Vec<String>) {
        let Ok(mut signers) = self.signers.lock() else {
            return (None, Vec::new());
        };
        match signers.get(ecdh_public_key) {
            Some(binding) => (
                binding.confirmed.clone(),
                binding.candidates.iter().cloned().collect(),
            ),
            None => (None, Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalIdentity;
    use crate::envelope::sign_payload;
    use crate::keys::{generate_key_material, LocalKeyPair};
    use crate::protocol::timestamp_now;
    use antifraud_core::{derive_features, TransactionCandidate};

    fn responder() -> MeshResponder {
        let material = generate_key_material().unwrap();
        MeshResponder::new(Arc::new(KeyExchangeManager::new(LocalIdentity {
            node_id: "peer".into(),
            signing_key_pem: Some(material.signing_private_key_pem),
            ecdh_private_key: None,
        })))
    }

    fn features(amount: f64, fee_rate: f64) -> TransactionFeatures {
        let address = "1BoatSLRHtKNngkdXEeobR76b53LETtpyT";
        let tx = TransactionCandidate::new(address, amount, fee_rate, "mainnet").unwrap();
        derive_features(&tx)
    }

    fn signed_handshake(initiator: &LocalKeyPair) -> HandshakeRequest {
        let mut request = HandshakeRequest {
            from_id: "wallet".into(),
            ecdh_public_key: initiator.ecdh_public_key().to_string(),
            signing_public_key: initiator.signing_public_key().map(str::to_string),
            timestamp: timestamp_now(),
            signature: None,
        };
        request.signature = sign_payload(initiator.signing_key(), &request.signable_bytes());
        request
    }

    #[test]
    fn test_score_uses_base_risk() {
        let responder = responder();
        // alto + alta fee + legacy: 0.18 + 0.32 + 0.12 + 0.08
        let signal = responder.score(&features(6.0, 40.0), 0.6);
        assert!((signal.score - 0.70).abs() < 1e-9);
        assert_eq!(signal.decision, Decision::Reject);
        assert_eq!(signal.model_id.as_deref(), Some(RESPONDER_MODEL_ID));

        let signal = responder.score(&features(0.1, 10.0), f64::NAN);
        assert_eq!(signal.decision, Decision::Approve);
    }

    #[test]
    fn test_handshake_returns_own_keys() {
        let responder = responder();
        let initiator = LocalKeyPair::generate(None).unwrap();
        let reply = responder.handle_handshake(&signed_handshake(&initiator)).unwrap();
        assert!(reply.ecdh_public_key.is_some());
        assert!(reply.signing_public_key.is_some());
    }

    #[test]
    fn test_handshake_with_bad_signature_is_rejected() {
        let responder = responder();
        let signing_key = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let initiator = LocalKeyPair::generate(Some(signing_key)).unwrap();
        let mut request = signed_handshake(&initiator);
        request.from_id = "impostor".into();

        assert!(matches!(
            responder.handle_handshake(&request),
            Err(MeshError::Authentication(_))
        ));
    }

    #[test]
    fn test_handshake_with_invalid_ecdh_key() {
        let responder = responder();
        let request = HandshakeRequest {
            from_id: "wallet".into(),
            ecdh_public_key: "AAAA".into(),
            signing_public_key: None,
            timestamp: timestamp_now(),
            signature: None,
        };
        assert!(matches!(
            responder.handle_handshake(&request),
            Err(MeshError::Protocol(_))
        ));
    }

    #[test]
    fn test_signal_round_trip_through_responder() {
        let responder = responder();
        let material = generate_key_material().unwrap();
        let wallet = Arc::new(KeyExchangeManager::new(LocalIdentity {
            node_id: "wallet".into(),
            signing_key_pem: Some(material.signing_private_key_pem.clone()),
            ecdh_private_key: Some(material.ecdh_private_key.clone()),
        }));
        let wallet_codec = SecureEnvelopeCodec::new(wallet.clone());

        let initiator = wallet.get_or_create_local_key_pair().unwrap();
        let reply = responder.handle_handshake(&signed_handshake(initiator)).unwrap();
        let peer_ecdh = reply.ecdh_public_key.unwrap();

        let request = SignalRequest::new(features(2.0, 10.0), 0.7);
        let envelope = wallet_codec.seal(&peer_ecdh, &request).unwrap();
        let sealed_reply = responder.handle_signal(&envelope).unwrap();

        let signal: Signal = wallet_codec
            .open(
                &sealed_reply,
                reply.signing_public_key.as_deref(),
                &sealed_reply.ecdh_public_key,
            )
            .unwrap();
        // medio + legacy
        assert!((signal.score - 0.44).abs() < 1e-9);
        assert_eq!(signal.decision, Decision::Approve);

        // Once the signer is known, a tampered envelope is refused.
        let mut tampered = envelope.clone();
        tampered.timestamp = "1999-01-01T00:00:00.000Z".into();
        assert!(matches!(
            responder.handle_signal(&tampered),
            Err(MeshError::Authentication("signature"))
        ));
    }

    fn wallet(node_id: &str) -> Arc<KeyExchangeManager> {
        let material = generate_key_material().unwrap();
        Arc::new(KeyExchangeManager::new(LocalIdentity {
            node_id: node_id.into(),
            signing_key_pem: Some(material.signing_private_key_pem),
            ecdh_private_key: Some(material.ecdh_private_key),
        }))
    }

    #[test]
    fn test_foreign_signer_cannot_claim_ecdh_key() {
        let responder = responder();
        let victim = wallet("wallet");
        let victim_codec = SecureEnvelopeCodec::new(victim.clone());
        let victim_keys = victim.get_or_create_local_key_pair().unwrap();

        // Self-signed handshake pairing the victim's ECDH key with another signer.
        let attacker = wallet("attacker");
        let attacker_keys = attacker.get_or_create_local_key_pair().unwrap();
        let mut forged = signed_handshake(attacker_keys);
        forged.ecdh_public_key = victim_keys.ecdh_public_key().to_string();
        forged.signature = sign_payload(attacker_keys.signing_key(), &forged.signable_bytes());

        for request in [forged.clone(), signed_handshake(victim_keys), forged] {
            responder.handle_handshake(&request).unwrap();
        }

        let peer_ecdh = responder
            .keys
            .get_or_create_local_key_pair()
            .unwrap()
            .ecdh_public_key()
            .to_string();
        let envelope = victim_codec
            .seal(&peer_ecdh, &SignalRequest::new(features(0.5, 10.0), 0.7))
            .unwrap();
        assert!(responder.handle_signal(&envelope).is_ok());

        // The victim's key is now bound; later forged handshakes change nothing.
        let mut replay = signed_handshake(attacker_keys);
        replay.ecdh_public_key = victim_keys.ecdh_public_key().to_string();
        replay.signature = sign_payload(attacker_keys.signing_key(), &replay.signable_bytes());
        responder.handle_handshake(&replay).unwrap();

        let envelope = victim_codec
            .seal(&peer_ecdh, &SignalRequest::new(features(0.5, 10.0), 0.7))
            .unwrap();
        assert!(responder.handle_signal(&envelope).is_ok());
    }

    #[test]
    fn test_signer_memory_is_bounded() {
        let material = generate_key_material().unwrap();
        let keys = Arc::new(KeyExchangeManager::new(LocalIdentity {
            node_id: "peer".into(),
            signing_key_pem: Some(material.signing_private_key_pem),
            ecdh_private_key: None,
        }));
        let responder = MeshResponder::with_signer_capacity(keys, 2);

        for node_id in ["a", "b", "c"] {
            let initiator = wallet(node_id);
            let key_pair = initiator.get_or_create_local_key_pair().unwrap();
            responder.handle_handshake(&signed_handshake(key_pair)).unwrap();
        }
        assert_eq!(responder.signers.lock().unwrap().len(), 2);
    }
}
