//! Secure envelope codec.
//!
//! Messages between peers are encrypted with AES-256-GCM under a key derived
//! per message (HKDF-SHA256 over the ECDH shared secret with a fresh salt)
//! and signed with ECDSA P-256 over the canonical serialization of every
//! envelope field except the signature.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hkdf::Hkdf;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{MeshError, Result};
use crate::keys::KeyExchangeManager;
use crate::protocol::timestamp_now;

/// Application context bound into every derived key.
pub const KDF_INFO: &[u8] = b"antifraud-mesh";

const KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Derive the per-message symmetric key.
pub fn derive_session_key(shared_secret: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), shared_secret);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(KDF_INFO, &mut key[..])
        .map_err(|_| MeshError::Configuration("HKDF output length".into()))?;
    Ok(key)
}

/// Ciphertext plus everything needed to decrypt it, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub iv: String,
    pub salt: String,
    pub cipher: String,
    pub tag: String,
}

/// Encrypt `plaintext` under a key derived from `shared_secret`.
///
/// Salt and nonce are fresh for every call, so encrypting the same plaintext
/// twice never yields the same ciphertext.
pub fn encrypt(shared_secret: &[u8], plaintext: &[u8]) -> Result<EncryptedPayload> {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; NONCE_LEN];
    rng.fill(&mut salt);
    rng.fill(&mut iv);

    let key = derive_session_key(shared_secret, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|_| MeshError::Configuration("AES key length".into()))?;
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| MeshError::Configuration("AES-GCM encryption".into()))?;

    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(EncryptedPayload {
        iv: BASE64.encode(iv),
        salt: BASE64.encode(salt),
        cipher: BASE64.encode(&sealed),
        tag: BASE64.encode(tag),
    })
}

/// Decrypt a payload produced by [`encrypt`].
///
/// # Errors
///
/// Returns `Authentication` if any field is malformed or the tag does not
/// verify. No partial plaintext is ever returned.
pub fn decrypt(shared_secret: &[u8], payload: &EncryptedPayload) -> Result<Vec<u8>> {
    let decode = |field: &str| {
        BASE64
            .decode(field)
            .map_err(|_| MeshError::Authentication("encoding"))
    };

    let iv = decode(&payload.iv)?;
    let salt = decode(&payload.salt)?;
    let mut sealed = decode(&payload.cipher)?;
    let tag = decode(&payload.tag)?;
    if iv.len() != NONCE_LEN || tag.len() != TAG_LEN || salt.is_empty() {
        return Err(MeshError::Authentication("field length"));
    }

    let key = derive_session_key(shared_secret, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|_| MeshError::Configuration("AES key length".into()))?;
    sealed.extend_from_slice(&tag);

    cipher
        .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
        .map_err(|_| MeshError::Authentication("tag"))
}

/// Sign `payload`, returning base64 DER.
///
/// Returns `None` when no signing key is configured.
pub fn sign_payload(signing_key: Option<&SigningKey>, payload: &[u8]) -> Option<String> {
    let signing_key = signing_key?;
    let signature: Signature = signing_key.sign(payload);
    Some(BASE64.encode(signature.to_der().as_bytes()))
}

/// Parse a P-256 verifying key from SPKI PEM or base64 SEC1.
pub fn parse_verifying_key(encoded: &str) -> Option<VerifyingKey> {
    let trimmed = encoded.trim();
    if trimmed.starts_with("-----BEGIN") {
        return VerifyingKey::from_public_key_pem(trimmed).ok();
    }
    let bytes = BASE64.decode(trimmed).ok()?;
    VerifyingKey::from_sec1_bytes(&bytes).ok()
}

/// Verify a base64 signature (DER or raw 64-byte) over `payload`.
///
/// Returns `false` on any mismatch or missing material.
pub fn verify_signature(payload: &[u8], signature: Option<&str>, public_key: Option<&str>) -> bool {
    let (Some(signature), Some(public_key)) = (signature, public_key) else {
        return false;
    };
    let Some(verifying_key) = parse_verifying_key(public_key) else {
        return false;
    };
    let Ok(bytes) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let parsed = Signature::from_der(&bytes).or_else(|_| Signature::from_slice(&bytes));
    let Ok(signature) = parsed else {
        return false;
    };
    verifying_key.verify(payload, &signature).is_ok()
}

/// Envelope fields covered by the signature, in canonical order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnsignedEnvelope<'a> {
    from_id: &'a str,
    ecdh_public_key: &'a str,
    timestamp: &'a str,
    iv: &'a str,
    salt: &'a str,
    cipher: &'a str,
    tag: &'a str,
}

/// Authenticated, encrypted message exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureEnvelope {
    pub from_id: String,
    /// Sender's ECDH public key (base64 SEC1).
    pub ecdh_public_key: String,
    pub timestamp: String,
    pub iv: String,
    pub salt: String,
    pub cipher: String,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl SecureEnvelope {
    /// Canonical bytes covered by the signature.
    ///
    /// Compact JSON of every field but the signature, in declaration order.
    /// Verifiers must reproduce this exactly.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let unsigned = UnsignedEnvelope {
            from_id: &self.from_id,
            ecdh_public_key: &self.ecdh_public_key,
            timestamp: &self.timestamp,
            iv: &self.iv,
            salt: &self.salt,
            cipher: &self.cipher,
            tag: &self.tag,
        };
        // Serializing borrowed strings cannot fail.
        serde_json::to_vec(&unsigned).unwrap_or_default()
    }

    pub fn encrypted_payload(&self) -> EncryptedPayload {
        EncryptedPayload {
            iv: self.iv.clone(),
            salt: self.salt.clone(),
            cipher: self.cipher.clone(),
            tag: self.tag.clone(),
        }
    }

    pub fn verify(&self, signing_public_key: Option<&str>) -> bool {
        verify_signature(&self.signable_bytes(), self.signature.as_deref(), signing_public_key)
    }
}

/// Seals and opens typed messages using the process key pair.
#[derive(Debug, Clone)]
pub struct SecureEnvelopeCodec {
    keys: Arc<KeyExchangeManager>,
}

impl SecureEnvelopeCodec {
    pub fn new(keys: Arc<KeyExchangeManager>) -> Self {
        Self { keys }
    }

    /// Encrypt `message` for the peer owning `peer_ecdh_public_key` and sign
    /// the envelope when a signing key is configured.
    pub fn seal<T: Serialize>(
        &self,
        peer_ecdh_public_key: &str,
        message: &T,
    ) -> Result<SecureEnvelope> {
        let key_pair = self.keys.get_or_create_local_key_pair()?;
        let shared_secret = key_pair.shared_secret(peer_ecdh_public_key)?;
        let plaintext = Zeroizing::new(
            serde_json::to_vec(message)
                .map_err(|e| MeshError::Protocol(format!("message encoding: {}", e)))?,
        );
        let encrypted = encrypt(&shared_secret[..], &plaintext)?;

        let mut envelope = SecureEnvelope {
            from_id: self.keys.node_id().to_string(),
            ecdh_public_key: key_pair.ecdh_public_key().to_string(),
            timestamp: timestamp_now(),
            iv: encrypted.iv,
            salt: encrypted.salt,
            cipher: encrypted.cipher,
            tag: encrypted.tag,
            signature: None,
        };
        envelope.signature = sign_payload(key_pair.signing_key(), &envelope.signable_bytes());
        Ok(envelope)
    }

    /// Verify the envelope against `signing_public_key`, then decrypt it.
    ///
    /// # Errors
    ///
    /// - `Authentication` for a missing or invalid signature, or a bad tag
    /// - `Protocol` if the sender key or the decrypted message is malformed
    pub fn open<T: DeserializeOwned>(
        &self,
        envelope: &SecureEnvelope,
        signing_public_key: Option<&str>,
        sender_ecdh_public_key: &str,
    ) -> Result<T> {
        if !envelope.verify(signing_public_key) {
            return Err(MeshError::Authentication("signature"));
        }
        self.decrypt_envelope(envelope, sender_ecdh_public_key)
    }

    /// Decrypt without checking the signature.
    pub fn decrypt_envelope<T: DeserializeOwned>(
        &self,
        envelope: &SecureEnvelope,
        sender_ecdh_public_key: &str,
    ) -> Result<T> {
        let key_pair = self.keys.get_or_create_local_key_pair()?;
        let shared_secret = key_pair.shared_secret(sender_ecdh_public_key)?;
        let plaintext = Zeroizing::new(decrypt(&shared_secret[..], &envelope.encrypted_payload())?);
        serde_json::from_slice(&plaintext)
            .map_err(|e| MeshError::Protocol(format!("decrypted message: {}", e)))
    }
}
