//! Validator configuration, read once from the environment.
//!
//! Nothing here is fatal: unparseable values fall back to their defaults
//! with a warning, and an invalid mesh configuration disables the mesh.

use std::time::Duration;

use antifraud_core::clamp_unit;
use antifraud_mesh::MeshConfig;
use tracing::warn;

pub const ENV_THRESHOLD: &str = "ANTIFRAUD_THRESHOLD";
pub const ENV_NETWORK: &str = "BITCOIN_NETWORK";
pub const ENV_RETENTION_DAYS: &str = "ANTIFRAUD_RETENTION_DAYS";
pub const ENV_ML_URL: &str = "ANTIFRAUD_ML_URL";
pub const ENV_ML_TOKEN: &str = "ANTIFRAUD_ML_TOKEN";
pub const ENV_ML_TIMEOUT_MS: &str = "ANTIFRAUD_ML_TIMEOUT_MS";

/// Decision threshold used when none is configured.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

pub const DEFAULT_NETWORK: &str = "mainnet";

/// Default timeout for the external scoring service.
pub const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_millis(4500);

/// External scoring service endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalScorerConfig {
    pub url: String,
    /// Sent as a bearer token when present.
    pub token: Option<String>,
    pub timeout: Duration,
}

/// Complete validator configuration.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Decision threshold in `[0, 1]`.
    pub threshold: f64,
    pub network: String,
    /// Reported in the policy block only.
    pub retention_days: u32,
    pub external: Option<ExternalScorerConfig>,
    pub mesh: MeshConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            network: DEFAULT_NETWORK.to_string(),
            retention_days: 0,
            external: None,
            mesh: MeshConfig::disabled(),
        }
    }
}

impl ValidatorConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let threshold = match get(ENV_THRESHOLD) {
            Some(raw) => match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => clamp_unit(value),
                _ => {
                    warn!(
                        "Ignoring invalid {} '{}', using {}",
                        ENV_THRESHOLD, raw, DEFAULT_THRESHOLD
                    );
                    DEFAULT_THRESHOLD
                }
            },
            None => DEFAULT_THRESHOLD,
        };

        let retention_days = match get(ENV_RETENTION_DAYS) {
            Some(raw) => raw.parse::<u32>().unwrap_or_else(|_| {
                warn!("Ignoring invalid {} '{}'", ENV_RETENTION_DAYS, raw);
                0
            }),
            None => 0,
        };

        let external = get(ENV_ML_URL).map(|url| {
            let timeout = match get(ENV_ML_TIMEOUT_MS).map(|raw| (raw.parse::<u64>(), raw)) {
                Some((Ok(ms), _)) if ms > 0 => Duration::from_millis(ms),
                Some((_, raw)) => {
                    warn!("Ignoring invalid {} '{}'", ENV_ML_TIMEOUT_MS, raw);
                    DEFAULT_EXTERNAL_TIMEOUT
                }
                None => DEFAULT_EXTERNAL_TIMEOUT,
            };
            ExternalScorerConfig {
                url,
                token: get(ENV_ML_TOKEN),
                timeout,
            }
        });

        let mesh = MeshConfig::from_lookup(&lookup).unwrap_or_else(|e| {
            warn!("Mesh disabled: {}", e);
            MeshConfig::disabled()
        });

        Self {
            threshold,
            network: get(ENV_NETWORK).unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
            retention_days,
            external,
            mesh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> ValidatorConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ValidatorConfig::from_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.threshold, 0.7);
        assert_eq!(config.network, "mainnet");
        assert_eq!(config.retention_days, 0);
        assert!(config.external.is_none());
        assert!(!config.mesh.is_active());
    }

    #[test]
    fn test_threshold_is_clamped() {
        assert_eq!(config(&[(ENV_THRESHOLD, "1.8")]).threshold, 1.0);
        assert_eq!(config(&[(ENV_THRESHOLD, "-0.3")]).threshold, 0.0);
        assert_eq!(config(&[(ENV_THRESHOLD, "0.55")]).threshold, 0.55);
        assert_eq!(config(&[(ENV_THRESHOLD, "high")]).threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_external_scorer() {
        let external = config(&[
            (ENV_ML_URL, "https://scoring.internal/score"),
            (ENV_ML_TOKEN, "s3cret"),
            (ENV_ML_TIMEOUT_MS, "1200"),
        ])
        .external
        .unwrap();
        assert_eq!(external.url, "https://scoring.internal/score");
        assert_eq!(external.token.as_deref(), Some("s3cret"));
        assert_eq!(external.timeout, Duration::from_millis(1200));

        let external = config(&[(ENV_ML_URL, "https://x"), (ENV_ML_TIMEOUT_MS, "soon")])
            .external
            .unwrap();
        assert_eq!(external.timeout, DEFAULT_EXTERNAL_TIMEOUT);
    }

    #[test]
    fn test_invalid_mesh_config_disables_mesh() {
        let config = config(&[
            ("ANTIFRAUD_MESH_ENABLED", "true"),
            ("ANTIFRAUD_MESH_ENDPOINTS", "http://a.local"),
            ("ANTIFRAUD_MESH_QUORUM", "3/2"),
        ]);
        assert!(!config.mesh.enabled);
        assert!(!config.mesh.is_active());
    }

    #[test]
    fn test_unsafe_mesh_values_disable_mesh() {
        for (key, value) in [
            ("ANTIFRAUD_MESH_RETRIES", "4294967295"),
            ("ANTIFRAUD_MESH_SIGNAL_PATH", "/antifraud-validate"),
        ] {
            let config = config(&[
                ("ANTIFRAUD_MESH_ENABLED", "true"),
                ("ANTIFRAUD_MESH_ENDPOINTS", "http://a.local"),
                (key, value),
            ]);
            assert!(!config.mesh.is_active(), "{}={}", key, value);
            assert!(config.mesh.collection_deadline() > std::time::Duration::ZERO);
        }
    }

    #[test]
    fn test_network_and_retention() {
        let config = config(&[(ENV_NETWORK, "testnet"), (ENV_RETENTION_DAYS, "30")]);
        assert_eq!(config.network, "testnet");
        assert_eq!(config.retention_days, 30);
    }
}
