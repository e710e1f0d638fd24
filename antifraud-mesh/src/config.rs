//! Mesh configuration, parsed once at startup.
//!
//! The node list accepts two shapes: a JSON list of node objects
//! (`ANTIFRAUD_MESH_NODES`) or a delimited list of URLs
//! (`ANTIFRAUD_MESH_ENDPOINTS`). The quorum accepts an absolute count or a
//! `required/total` ratio.

use std::time::Duration;

use antifraud_core::{NumberLike, Quorum};
use serde::Deserialize;
use tracing::warn;

use crate::error::{MeshError, Result};
use crate::protocol::{DEFAULT_HANDSHAKE_PATH, DEFAULT_SIGNAL_PATH, VALIDATE_PATH};

pub const ENV_ENABLED: &str = "ANTIFRAUD_MESH_ENABLED";
pub const ENV_NODES: &str = "ANTIFRAUD_MESH_NODES";
pub const ENV_ENDPOINTS: &str = "ANTIFRAUD_MESH_ENDPOINTS";
pub const ENV_QUORUM: &str = "ANTIFRAUD_MESH_QUORUM";
pub const ENV_TIMEOUT_MS: &str = "ANTIFRAUD_MESH_TIMEOUT_MS";
pub const ENV_RETRIES: &str = "ANTIFRAUD_MESH_RETRIES";
pub const ENV_DEADLINE_MS: &str = "ANTIFRAUD_MESH_DEADLINE_MS";
pub const ENV_SIGNAL_PATH: &str = "ANTIFRAUD_MESH_SIGNAL_PATH";
pub const ENV_SIGNING_KEY: &str = "ANTIFRAUD_MESH_SIGNING_KEY";
pub const ENV_ECDH_PRIVATE_KEY: &str = "ANTIFRAUD_MESH_ECDH_PRIVATE_KEY";
pub const ENV_NODE_ID: &str = "ANTIFRAUD_MESH_NODE_ID";

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1400);

/// Default retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 2;

/// Largest accepted retry count.
pub const MAX_RETRIES: u32 = 10;

/// Identity used when none is configured.
pub const DEFAULT_NODE_ID: &str = "local";

/// A peer node.
///
/// Keys are filled in by the handshake when not pinned in configuration and
/// live only as long as the request that learned them.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescriptor {
    pub id: String,
    pub url: String,
    /// Base64 SEC1 P-256 public key used for ECDH.
    pub ecdh_public_key: Option<String>,
    /// PEM (or base64 SEC1) P-256 public key used to verify replies.
    pub signing_public_key: Option<String>,
    pub weight: f64,
}

impl NodeDescriptor {
    pub fn new(id: impl Into<String>, url: &str) -> Self {
        Self {
            id: id.into(),
            url: url.trim_end_matches('/').to_string(),
            ecdh_public_key: None,
            signing_public_key: None,
            weight: 1.0,
        }
    }

    /// Whether both peer keys are known.
    pub fn has_keys(&self) -> bool {
        self.ecdh_public_key.is_some() && self.signing_public_key.is_some()
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }
}

/// Key material and identity of this process.
#[derive(Debug, Clone, Default)]
pub struct LocalIdentity {
    pub node_id: String,
    /// PKCS#8 PEM ECDSA P-256 private key.
    pub signing_key_pem: Option<String>,
    /// Base64 raw 32-byte P-256 scalar.
    pub ecdh_private_key: Option<String>,
}

impl LocalIdentity {
    pub fn anonymous() -> Self {
        Self {
            node_id: DEFAULT_NODE_ID.to_string(),
            ..Self::default()
        }
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            node_id: non_empty(ENV_NODE_ID).unwrap_or_else(|| DEFAULT_NODE_ID.to_string()),
            signing_key_pem: non_empty(ENV_SIGNING_KEY),
            ecdh_private_key: non_empty(ENV_ECDH_PRIVATE_KEY),
        }
    }
}

/// Validated mesh configuration.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub enabled: bool,
    pub nodes: Vec<NodeDescriptor>,
    pub quorum: Quorum,
    /// Timeout of a single HTTP attempt.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Explicit bound on a whole collection round.
    pub deadline: Option<Duration>,
    pub handshake_path: String,
    pub signal_path: String,
    pub identity: LocalIdentity,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Node object as accepted in `ANTIFRAUD_MESH_NODES`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    id: Option<String>,
    url: Option<String>,
    ecdh_public_key: Option<String>,
    signing_public_key: Option<String>,
    weight: Option<NumberLike>,
}

impl MeshConfig {
    /// Configuration with the mesh switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            nodes: Vec::new(),
            quorum: Quorum::default(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            deadline: None,
            handshake_path: DEFAULT_HANDSHAKE_PATH.to_string(),
            signal_path: DEFAULT_SIGNAL_PATH.to_string(),
            identity: LocalIdentity::anonymous(),
        }
    }

    /// Parse the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for an unparseable node list, quorum, timeout,
    /// deadline or retry count, and for a signal path that collides with
    /// another endpoint.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let enabled = get(ENV_ENABLED).map(|v| parse_flag(&v)).unwrap_or(false);

        let nodes = match (get(ENV_NODES), get(ENV_ENDPOINTS)) {
            (Some(json), _) => parse_node_list(&json)?,
            (None, Some(list)) => parse_endpoint_list(&list),
            (None, None) => Vec::new(),
        };

        let quorum = match get(ENV_QUORUM) {
            Some(raw) => raw
                .parse::<Quorum>()
                .map_err(|e| MeshError::Configuration(e.to_string()))?,
            None => Quorum::default(),
        };

        let timeout = get(ENV_TIMEOUT_MS)
            .map(|raw| parse_millis(ENV_TIMEOUT_MS, &raw))
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT);

        let deadline = get(ENV_DEADLINE_MS)
            .map(|raw| parse_millis(ENV_DEADLINE_MS, &raw))
            .transpose()?;

        let retries = match get(ENV_RETRIES) {
            Some(raw) => match raw.parse::<u32>() {
                Ok(retries) if retries <= MAX_RETRIES => retries,
                _ => {
                    return Err(MeshError::Configuration(format!(
                        "{} must be an integer between 0 and {}, got '{}'",
                        ENV_RETRIES, MAX_RETRIES, raw
                    )))
                }
            },
            None => DEFAULT_RETRIES,
        };

        let signal_path = match get(ENV_SIGNAL_PATH) {
            Some(raw) => parse_signal_path(&raw)?,
            None => DEFAULT_SIGNAL_PATH.to_string(),
        };

        Ok(Self {
            enabled,
            nodes,
            quorum,
            timeout,
            retries,
            deadline,
            handshake_path: DEFAULT_HANDSHAKE_PATH.to_string(),
            signal_path,
            identity: LocalIdentity::from_lookup(&lookup),
        })
    }

    /// Whether the mesh should be consulted at all.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.nodes.is_empty()
    }

    /// Worst-case duration of one phase against one node.
    pub fn node_deadline(&self) -> Duration {
        self.timeout.saturating_mul(self.retries.saturating_add(1))
    }

    /// Upper bound on a whole collection round (handshake plus signal).
    pub fn collection_deadline(&self) -> Duration {
        self.deadline
            .unwrap_or_else(|| self.node_deadline().saturating_mul(2))
    }
}

/// Interpret an on/off flag.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration> {
    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(MeshError::Configuration(format!(
            "{} must be a positive integer, got '{}'",
            key, raw
        ))),
    }
}

/// Normalize the signal path and keep it clear of the other served routes.
fn parse_signal_path(raw: &str) -> Result<String> {
    let path = normalize_path(raw);
    let path = match path.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    };
    let dynamic = path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'));
    if dynamic || path == DEFAULT_HANDSHAKE_PATH || path == VALIDATE_PATH {
        return Err(MeshError::Configuration(format!(
            "{} '{}' collides with another endpoint",
            ENV_SIGNAL_PATH, raw
        )));
    }
    Ok(path)
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn is_http_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn parse_node_list(json: &str) -> Result<Vec<NodeDescriptor>> {
    let raw: Vec<RawNode> = serde_json::from_str(json).map_err(|e| {
        MeshError::Configuration(format!("{} is not a JSON node list: {}", ENV_NODES, e))
    })?;

    let nodes = raw
        .into_iter()
        .filter_map(|node| {
            let id = node.id.filter(|id| !id.trim().is_empty())?;
            let url = node.url.filter(|url| !url.trim().is_empty())?;
            if !is_http_url(url.trim()) {
                warn!("Skipping mesh node {} with invalid url '{}'", id, url);
                return None;
            }
            let weight = match node.weight.as_ref().and_then(NumberLike::as_f64) {
                Some(w) => w.max(0.0),
                None => 1.0,
            };
            Some(NodeDescriptor {
                ecdh_public_key: node.ecdh_public_key.filter(|k| !k.is_empty()),
                signing_public_key: node.signing_public_key.filter(|k| !k.is_empty()),
                weight,
                ..NodeDescriptor::new(id, url.trim())
            })
        })
        .collect();

    Ok(nodes)
}

fn parse_endpoint_list(list: &str) -> Vec<NodeDescriptor> {
    list.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|url| !url.is_empty())
        .filter(|url| {
            let valid = is_http_url(url);
            if !valid {
                warn!("Skipping invalid mesh endpoint '{}'", url);
            }
            valid
        })
        .enumerate()
        .map(|(index, url)| NodeDescriptor::new(format!("mesh-{:02}", index + 1), url))
        .collect()
}
