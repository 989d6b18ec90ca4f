//! Client configuration.
//!
//! Endpoint, credentials, timeouts, retry and degradation policy are all
//! injected here; nothing on the call path is hardcoded.
//! Default location: /etc/secu/client.toml

use secu_common::{Result, SecuError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file path
pub const DEFAULT_CLIENT_CONFIG_PATH: &str = "/etc/secu/client.toml";

/// What a compute returns when the broker cannot be reached or answers
/// with an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Zero MAC for integrity, unchanged plaintext for ciphering.
    FailOpen,
    /// Surface the error to the caller.
    #[default]
    FailClosed,
}

/// Retry of compute and free calls on `UNAVAILABLE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first; 1 disables retry
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Broker URI, `http://` or `https://`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-request deadline
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// PEM CA bundle; TLS is enabled when set
    #[serde(default)]
    pub tls_ca_path: Option<PathBuf>,

    /// Server name to verify, defaults to the endpoint host
    #[serde(default)]
    pub tls_domain: Option<String>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:50051".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    50
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            tls_ca_path: None,
            tls_domain: None,
            failure_policy: FailurePolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Config pointing at `endpoint` with every other field defaulted.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let config = match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| {
                SecuError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(SecuError::Config(format!(
                    "Failed to read config file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SecuError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(SecuError::Config(format!(
                "endpoint must be an http:// or https:// URI, got {:?}",
                self.endpoint
            )));
        }
        if self.request_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(SecuError::Config("timeouts must be > 0".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SecuError::Config(
                "retry.max_attempts must be >= 1".to_string(),
            ));
        }
        if self.tls_domain.is_some() && self.tls_ca_path.is_none() {
            return Err(SecuError::Config(
                "tls_domain requires tls_ca_path".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls_ca_path.is_some()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, "http://127.0.0.1:50051");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(2));
        assert_eq!(config.failure_policy, FailurePolicy::FailClosed);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.backoff_ms, 50);
        assert!(!config.tls_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_and_retry_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            endpoint = "http://10.0.0.5:7000"
            failure_policy = "fail_open"

            [retry]
            max_attempts = 3
            "#
        )
        .unwrap();

        let config = ClientConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.endpoint, "http://10.0.0.5:7000");
        assert_eq!(config.failure_policy, FailurePolicy::FailOpen);
        assert_eq!(
            config.retry,
            RetryPolicy {
                max_attempts: 3,
                backoff_ms: 50
            }
        );
        assert_eq!(config.request_timeout_ms, 2000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_or_default(dir.path().join("client.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(ClientConfig::from_toml(r#"failure_policy = "sometimes""#).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(ClientConfig::with_endpoint("127.0.0.1:50051")
            .validate()
            .is_err());

        let mut config = ClientConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.tls_domain = Some("broker.local".into());
        assert!(config.validate().is_err());
        config.tls_ca_path = Some(PathBuf::from("/etc/secu/ca.pem"));
        assert!(config.validate().is_ok());
        assert!(config.tls_enabled());
    }
}
