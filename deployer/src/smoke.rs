//! Post-deploy smoke testing.
//!
//! The orchestrator only cares whether a [`SmokeTest`] passes against the
//! environment's hostname. [`HttpSmokeTest`] is the stock implementation: one
//! GET request, compared against an expected status code.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum SmokeTestError {
    /// The request could not be completed
    #[error("Smoke test request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The endpoint answered with the wrong status
    #[error("Smoke test against {url} expected status {expected}, got {actual}")]
    UnexpectedStatus {
        url: String,
        expected: u16,
        actual: u16,
    },

    /// No answer within the configured timeout
    #[error("Smoke test against {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// HTTP client construction failed
    #[error("Failed to build smoke test client: {reason}")]
    Client { reason: String },

    /// Failure reported by a custom smoke test
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeTestConfig {
    pub path: String,
    pub protocol: Protocol,
    pub timeout_secs: u64,
    pub expected_status: u16,
}

impl Default for SmokeTestConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            protocol: Protocol::Http,
            timeout_secs: 30,
            expected_status: 200,
        }
    }
}

impl SmokeTestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_expected_status(mut self, expected_status: u16) -> Self {
        self.expected_status = expected_status;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.path.starts_with('/') {
            return Err("Smoke test path must start with '/'".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Smoke test timeout must be greater than 0".to_string());
        }

        if !(100..=599).contains(&self.expected_status) {
            return Err(format!(
                "Expected status {} is not a valid HTTP status code",
                self.expected_status
            ));
        }

        Ok(())
    }

    pub fn url_for(&self, hostname: &str) -> String {
        format!("{}://{}{}", self.protocol.scheme(), hostname, self.path)
    }
}

#[async_trait]
pub trait SmokeTest: Send + Sync {
    async fn run(&self, hostname: &str) -> Result<(), SmokeTestError>;
}

/// Issues a single GET against `protocol://hostname/path`.
#[derive(Debug, Clone)]
pub struct HttpSmokeTest {
    config: SmokeTestConfig,
    client: reqwest::Client,
}

impl HttpSmokeTest {
    pub fn new(config: SmokeTestConfig) -> Result<Self, SmokeTestError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SmokeTestError::Client {
                reason: e.to_string(),
            })?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl SmokeTest for HttpSmokeTest {
    async fn run(&self, hostname: &str) -> Result<(), SmokeTestError> {
        let url = self.config.url_for(hostname);
        info!(url = %url, "running smoke test");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SmokeTestError::Timeout {
                    url: url.clone(),
                    timeout_secs: self.config.timeout_secs,
                }
            } else {
                SmokeTestError::Request {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let actual = response.status().as_u16();
        if actual != self.config.expected_status {
            warn!(url = %url, status = actual, "smoke test got unexpected status");
            return Err(SmokeTestError::UnexpectedStatus {
                url,
                expected: self.config.expected_status,
                actual,
            });
        }

        info!(url = %url, status = actual, "smoke test passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one connection with a canned status line, return the host:port.
    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = [0u8; 1024];
            let _ = socket.read(&mut buffer).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                status_line
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        address.to_string()
    }

    #[test]
    fn test_default_config() {
        let config = SmokeTestConfig::default();
        assert_eq!(config.path, "/");
        assert_eq!(config.protocol, Protocol::Http);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.expected_status, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(SmokeTestConfig::new().with_path("health").validate().is_err());
        assert!(SmokeTestConfig::new()
            .with_timeout(Duration::from_secs(0))
            .validate()
            .is_err());
        assert!(SmokeTestConfig::new()
            .with_expected_status(42)
            .validate()
            .is_err());
        assert!(SmokeTestConfig::new()
            .with_expected_status(204)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_url_for() {
        let config = SmokeTestConfig::new()
            .with_protocol(Protocol::Https)
            .with_path("/health");
        assert_eq!(
            config.url_for("myapp-prod.example.com"),
            "https://myapp-prod.example.com/health"
        );
    }

    #[test]
    fn test_protocol_deserializes_lowercase() {
        let config: SmokeTestConfig =
            toml::from_str("protocol = \"https\"\npath = \"/ping\"").unwrap();
        assert_eq!(config.protocol, Protocol::Https);
        assert_eq!(config.path, "/ping");
        assert_eq!(config.expected_status, 200);
    }

    #[tokio::test]
    async fn test_http_smoke_test_passes_on_expected_status() {
        let host = serve_once("200 OK").await;
        let smoke = HttpSmokeTest::new(SmokeTestConfig::default()).unwrap();
        smoke.run(&host).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_smoke_test_fails_on_unexpected_status() {
        let host = serve_once("503 Service Unavailable").await;
        let smoke = HttpSmokeTest::new(SmokeTestConfig::default()).unwrap();

        let err = smoke.run(&host).await.unwrap_err();
        assert!(matches!(
            err,
            SmokeTestError::UnexpectedStatus {
                expected: 200,
                actual: 503,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_http_smoke_test_fails_when_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = listener.local_addr().unwrap().to_string();
        drop(listener);

        let smoke = HttpSmokeTest::new(
            SmokeTestConfig::default().with_timeout(Duration::from_secs(2)),
        )
        .unwrap();

        let err = smoke.run(&host).await.unwrap_err();
        assert!(matches!(
            err,
            SmokeTestError::Request { .. } | SmokeTestError::Timeout { .. }
        ));
    }
}
