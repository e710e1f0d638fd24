//! Bounded-timeout, bounded-retry JSON exchange over HTTP.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::timeout;
use tracing::debug;

use crate::config::MeshConfig;
use crate::error::{MeshError, Result};

/// HTTP transport to mesh peers.
///
/// Every attempt runs under its own timeout; transport failures and
/// timeouts are retried up to `retries` more times, everything else fails
/// immediately. Dropping the returned future aborts the in-flight request.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    timeout: Duration,
    retries: u32,
}

impl Transport {
    /// Create a transport with the given per-attempt timeout and retry count.
    pub fn new(attempt_timeout: Duration, retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| MeshError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            timeout: attempt_timeout,
            retries,
        })
    }

    pub fn from_config(config: &MeshConfig) -> Result<Self> {
        Self::new(config.timeout, config.retries)
    }

    /// Total attempts made before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// POST `body` as JSON and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// - `Timeout` / `Transport` once every attempt has failed
    /// - `Protocol` if the reply body is not the expected JSON (not retried)
    pub async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|e| MeshError::Protocol(format!("request encoding: {}", e)))?;
        let reply = self.post_with_retry(url, payload).await?;
        serde_json::from_slice(&reply)
            .map_err(|e| MeshError::Protocol(format!("malformed reply from {}: {}", url, e)))
    }

    async fn post_with_retry(&self, url: &str, payload: Vec<u8>) -> Result<Vec<u8>> {
        let mut last_error = MeshError::Timeout;

        for attempt in 1..=self.max_attempts() {
            let outcome = match timeout(self.timeout, self.attempt(url, payload.clone())).await {
                Ok(result) => result,
                Err(_) => Err(MeshError::Timeout),
            };

            match outcome {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() => {
                    debug!(
                        "Attempt {}/{} to {} failed: {}",
                        attempt,
                        self.max_attempts(),
                        url,
                        err
                    );
                    last_error = err;
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error)
    }

    async fn attempt(&self, url: &str, payload: Vec<u8>) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MeshError::Transport(format!("HTTP {}", status.as_u16())));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(retries: u32) -> Transport {
        Transport::new(Duration::from_millis(300), retries).unwrap()
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let reply: serde_json::Value = transport(2)
            .post_json(&format!("{}/echo", server.uri()), &json!({"ping": 1}))
            .await
            .unwrap();
        assert_eq!(reply["ok"], true);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let result: Result<serde_json::Value> =
            transport(2).post_json(&server.uri(), &json!({})).await;
        assert!(matches!(result, Err(MeshError::Transport(_))));
    }

    #[tokio::test]
    async fn test_slow_peer_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(2)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let result: Result<serde_json::Value> =
            transport(1).post_json(&server.uri(), &json!({})).await;
        assert!(matches!(result, Err(MeshError::Timeout)));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .expect(1)
            .mount(&server)
            .await;

        let result: Result<serde_json::Value> =
            transport(3).post_json(&server.uri(), &json!({})).await;
        assert!(matches!(result, Err(MeshError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Port 9 (discard) is closed on CI hosts.
        let result: Result<serde_json::Value> = transport(0)
            .post_json("http://127.0.0.1:9/mesh-signal", &json!({}))
            .await;
        assert!(result.unwrap_err().is_retryable());
    }

    #[test]
    fn test_attempt_count_saturates() {
        let unbounded = Transport::new(Duration::from_millis(10), u32::MAX).unwrap();
        assert_eq!(unbounded.max_attempts(), u32::MAX);
        assert_eq!(transport(2).max_attempts(), 3);
    }
}
