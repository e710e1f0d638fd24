//! Key exchange manager.
//!
//! Owns the process-wide P-256 key pair and runs the handshake that learns a
//! peer's public keys. The key pair is created at most once, on first use,
//! behind a once-only guard; concurrent first callers all observe the same
//! pair.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use once_cell::sync::OnceCell;
use p256::ecdh::diffie_hellman;
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use p256::{PublicKey, SecretKey};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::config::{LocalIdentity, NodeDescriptor};
use crate::envelope::sign_payload;
use crate::error::{MeshError, Result};
use crate::protocol::{timestamp_now, HandshakeReply, HandshakeRequest};
use crate::transport::Transport;

/// The process's ECDH key pair and optional signing key.
pub struct LocalKeyPair {
    ecdh_secret: SecretKey,
    ecdh_public_key: String,
    signing_key: Option<SigningKey>,
    signing_public_key: Option<String>,
}

impl fmt::Debug for LocalKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeyPair")
            .field("ecdh_public_key", &self.ecdh_public_key)
            .field("signing_public_key", &self.signing_public_key)
            .finish_non_exhaustive()
    }
}

/// Decode a base64 SEC1 P-256 public key.
pub fn decode_public_key(encoded: &str) -> Result<PublicKey> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|_| MeshError::Protocol("ECDH public key is not base64".into()))?;
    PublicKey::from_sec1_bytes(&bytes)
        .map_err(|_| MeshError::Protocol("ECDH public key is not a P-256 point".into()))
}

fn encode_public_key(public_key: &PublicKey) -> String {
    BASE64.encode(public_key.to_encoded_point(false).as_bytes())
}

fn load_signing_key(pem: &str) -> Result<SigningKey> {
    let pem = pem.trim();
    SigningKey::from_pkcs8_pem(pem)
        .or_else(|_| SecretKey::from_sec1_pem(pem).map(SigningKey::from))
        .map_err(|_| MeshError::Configuration("signing key is not a P-256 PEM private key".into()))
}

fn signing_public_pem(signing_key: &SigningKey) -> Result<String> {
    signing_key
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| MeshError::Configuration(format!("signing public key encoding: {}", e)))
}

impl LocalKeyPair {
    fn assemble(ecdh_secret: SecretKey, signing_key: Option<SigningKey>) -> Result<Self> {
        let ecdh_public_key = encode_public_key(&ecdh_secret.public_key());
        let signing_public_key = signing_key.as_ref().map(signing_public_pem).transpose()?;
        Ok(Self {
            ecdh_secret,
            ecdh_public_key,
            signing_key,
            signing_public_key,
        })
    }

    /// Fresh ECDH key pair with the given signing key.
    pub fn generate(signing_key: Option<SigningKey>) -> Result<Self> {
        Self::assemble(SecretKey::random(&mut rand::rngs::OsRng), signing_key)
    }

    /// Build the pair from configured material, generating what is missing.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the ECDH scalar or signing key is invalid.
    pub fn from_identity(identity: &LocalIdentity) -> Result<Self> {
        let signing_key = identity
            .signing_key_pem
            .as_deref()
            .map(load_signing_key)
            .transpose()?;

        let ecdh_secret = match identity.ecdh_private_key.as_deref() {
            Some(encoded) => {
                let bytes = Zeroizing::new(BASE64.decode(encoded.trim()).map_err(|_| {
                    MeshError::Configuration("ECDH private key is not base64".into())
                })?);
                SecretKey::from_slice(&bytes).map_err(|_| {
                    MeshError::Configuration("ECDH private key is not a P-256 scalar".into())
                })?
            }
            None => SecretKey::random(&mut rand::rngs::OsRng),
        };

        Self::assemble(ecdh_secret, signing_key)
    }

    /// Base64 SEC1 (uncompressed) ECDH public key.
    pub fn ecdh_public_key(&self) -> &str {
        &self.ecdh_public_key
    }

    /// SPKI PEM signing public key, if a signing key is configured.
    pub fn signing_public_key(&self) -> Option<&str> {
        self.signing_public_key.as_deref()
    }

    pub fn signing_key(&self) -> Option<&SigningKey> {
        self.signing_key.as_ref()
    }

    /// ECDH shared secret (x-coordinate) with the peer's public key.
    pub fn shared_secret(&self, peer_public_key: &str) -> Result<Zeroizing<Vec<u8>>> {
        let peer = decode_public_key(peer_public_key)?;
        let shared = diffie_hellman(self.ecdh_secret.to_nonzero_scalar(), peer.as_affine());
        Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
    }
}

/// Freshly generated key material, encoded for configuration.
#[derive(Debug, Clone)]
pub struct GeneratedKeys {
    /// Value for `ANTIFRAUD_MESH_ECDH_PRIVATE_KEY`.
    pub ecdh_private_key: String,
    pub ecdh_public_key: String,
    /// Value for `ANTIFRAUD_MESH_SIGNING_KEY`.
    pub signing_private_key_pem: String,
    pub signing_public_key_pem: String,
}

/// Generate a new ECDH scalar and signing key.
pub fn generate_key_material() -> Result<GeneratedKeys> {
    let ecdh_secret = SecretKey::random(&mut rand::rngs::OsRng);
    let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
    let signing_private_key_pem = signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| MeshError::Configuration(format!("signing key encoding: {}", e)))?;

    Ok(GeneratedKeys {
        ecdh_private_key: BASE64.encode(ecdh_secret.to_bytes()),
        ecdh_public_key: encode_public_key(&ecdh_secret.public_key()),
        signing_private_key_pem: signing_private_key_pem.to_string(),
        signing_public_key_pem: signing_public_pem(&signing_key)?,
    })
}

/// Process-wide key owner, injected into the mesh client and codec.
pub struct KeyExchangeManager {
    identity: LocalIdentity,
    key_pair: OnceCell<LocalKeyPair>,
}

impl fmt::Debug for KeyExchangeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyExchangeManager")
            .field("node_id", &self.identity.node_id)
            .field("initialized", &self.key_pair.get().is_some())
            .finish()
    }
}

impl KeyExchangeManager {
    pub fn new(identity: LocalIdentity) -> Self {
        Self {
            identity,
            key_pair: OnceCell::new(),
        }
    }

    /// Identity string announced to peers.
    pub fn node_id(&self) -> &str {
        &self.identity.node_id
    }

    /// Return the process key pair, creating it on first call.
    ///
    /// A failed creation is not cached, so a later call retries it.
    pub fn get_or_create_local_key_pair(&self) -> Result<&LocalKeyPair> {
        self.key_pair.get_or_try_init(|| {
            let key_pair = LocalKeyPair::from_identity(&self.identity)?;
            info!(
                "Initialized mesh key pair for {} (signing: {})",
                self.identity.node_id,
                key_pair.signing_key.is_some()
            );
            Ok(key_pair)
        })
    }

    /// Learn `node`'s public keys.
    ///
    /// Keys missing from the reply fall back to those pinned in the node's
    /// configuration. Retries are the transport's job.
    ///
    /// # Errors
    ///
    /// Any transport failure, malformed reply, or reply that leaves either
    /// key unknown. The caller drops the node.
    pub async fn perform_handshake(
        &self,
        transport: &Transport,
        node: &NodeDescriptor,
        handshake_path: &str,
    ) -> Result<NodeDescriptor> {
        let key_pair = self.get_or_create_local_key_pair()?;

        let mut request = HandshakeRequest {
            from_id: self.identity.node_id.clone(),
            ecdh_public_key: key_pair.ecdh_public_key().to_string(),
            signing_public_key: key_pair.signing_public_key().map(str::to_string),
            timestamp: timestamp_now(),
            signature: None,
        };
        request.signature = sign_payload(key_pair.signing_key(), &request.signable_bytes());

        debug!("Handshake with mesh node {}", node.id);
        let reply: HandshakeReply = transport
            .post_json(&node.endpoint(handshake_path), &request)
            .await?;

        let resolved = NodeDescriptor {
            ecdh_public_key: reply
                .ecdh_public_key
                .filter(|k| !k.is_empty())
                .or_else(|| node.ecdh_public_key.clone()),
            signing_public_key: reply
                .signing_public_key
                .filter(|k| !k.is_empty())
                .or_else(|| node.signing_public_key.clone()),
            ..node.clone()
        };

        match resolved.ecdh_public_key.as_deref() {
            Some(key) if resolved.signing_public_key.is_some() => {
                decode_public_key(key)?;
                Ok(resolved)
            }
            _ => Err(MeshError::Protocol(format!(
                "handshake with {} did not yield both public keys",
                node.id
            ))),
        }
    }
}
