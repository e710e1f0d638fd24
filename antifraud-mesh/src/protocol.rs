//! Wire types for the two mesh endpoints.

use antifraud_core::TransactionFeatures;
use serde::{Deserialize, Serialize};

/// Path of the handshake endpoint on every peer.
pub const DEFAULT_HANDSHAKE_PATH: &str = "/mesh-handshake";

/// Default path of the signal endpoint.
pub const DEFAULT_SIGNAL_PATH: &str = "/mesh-signal";

/// Path of the wallet-facing validation endpoint served next to the mesh
/// endpoints.
pub const VALIDATE_PATH: &str = "/antifraud-validate";

/// Current time as an RFC 3339 UTC timestamp with millisecond precision.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Handshake fields covered by the initiator's signature.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedHandshake<'a> {
    pub from_id: &'a str,
    pub ecdh_public_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_public_key: Option<&'a str>,
    pub timestamp: &'a str,
}

/// Handshake request announcing the initiator's public keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    pub from_id: String,
    pub ecdh_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_public_key: Option<String>,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl HandshakeRequest {
    pub fn unsigned(&self) -> UnsignedHandshake<'_> {
        UnsignedHandshake {
            from_id: &self.from_id,
            ecdh_public_key: &self.ecdh_public_key,
            signing_public_key: self.signing_public_key.as_deref(),
            timestamp: &self.timestamp,
        }
    }

    /// Canonical bytes covered by the signature.
    pub fn signable_bytes(&self) -> Vec<u8> {
        // Serializing a struct of borrowed strings cannot fail.
        serde_json::to_vec(&self.unsigned()).unwrap_or_default()
    }
}

/// Handshake reply carrying the peer's public keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeReply {
    #[serde(default)]
    pub ecdh_public_key: Option<String>,
    #[serde(default)]
    pub signing_public_key: Option<String>,
}

/// Context sent alongside the features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContext {
    pub threshold: f64,
    pub timestamp: String,
}

/// Plaintext of an outbound signal envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRequest {
    pub features: TransactionFeatures,
    pub context: SignalContext,
}

impl SignalRequest {
    pub fn new(features: TransactionFeatures, threshold: f64) -> Self {
        Self {
            features,
            context: SignalContext {
                threshold,
                timestamp: timestamp_now(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_signable_bytes_exclude_signature() {
        let mut request = HandshakeRequest {
            from_id: "local".into(),
            ecdh_public_key: "BPk=".into(),
            signing_public_key: None,
            timestamp: "2026-01-01T00:00:00.000Z".into(),
            signature: None,
        };
        let before = request.signable_bytes();
        request.signature = Some("c2ln".into());
        assert_eq!(before, request.signable_bytes());
        assert_eq!(
            String::from_utf8(before).unwrap(),
            r#"{"fromId":"local","ecdhPublicKey":"BPk=","timestamp":"2026-01-01T00:00:00.000Z"}"#
        );
    }

    #[test]
    fn test_reply_tolerates_missing_fields() {
        let reply: HandshakeReply = serde_json::from_str("{}").unwrap();
        assert!(reply.ecdh_public_key.is_none());
        assert!(reply.signing_public_key.is_none());
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp_now();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
