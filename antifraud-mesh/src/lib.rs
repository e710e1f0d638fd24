//! # Antifraud Mesh
//!
//! **Layer 1: Authenticated Risk-Signal Exchange**
//!
//! This crate lets a wallet backend ask independent peer nodes for their
//! opinion on a transaction, without ever sending the address itself.
//!
//! ## Features
//!
//! - **Key Exchange**: P-256 ECDH handshake, keys created once per process
//! - **Secure Envelopes**: HKDF-SHA256 + AES-256-GCM, ECDSA-signed
//! - **Bounded Transport**: Per-attempt timeouts, bounded retries
//! - **Quorum Gating**: Peer signals only count once enough nodes answer
//! - **Responder**: The same binary can serve as a mesh node
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use antifraud_core::{derive_features, TransactionCandidate};
//! use antifraud_mesh::{MeshClient, MeshConfig, MeshReport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MeshClient::new(MeshConfig::from_env()?)?;
//!
//!     let tx = TransactionCandidate::new("bc1qexampleaddress", 0.5, 12.0, "mainnet")?;
//!     match client.collect_signals(&derive_features(&tx), 0.7).await {
//!         MeshReport::Unavailable => println!("Mesh disabled"),
//!         MeshReport::Evaluated { aggregate, .. } => {
//!             println!("Mesh decision: {}", aggregate.decision);
//!             println!("Participants: {}", aggregate.participants);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod peer;
pub mod protocol;
pub mod transport;

// Re-export main types
pub use client::{ExchangeStage, MeshClient, MeshReport, NodeFailure, NodeOutcome};
pub use config::{LocalIdentity, MeshConfig, NodeDescriptor};
pub use envelope::{SecureEnvelope, SecureEnvelopeCodec};
pub use error::MeshError;
pub use keys::{generate_key_material, GeneratedKeys, KeyExchangeManager, LocalKeyPair};
pub use peer::MeshResponder;
pub use protocol::{HandshakeReply, HandshakeRequest, SignalRequest};
pub use transport::Transport;
