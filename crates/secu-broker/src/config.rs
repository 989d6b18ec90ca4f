//! Configuration file support for secu-brokerd
//!
//! Loads and validates broker configuration from TOML files.
//! Default location: /etc/secu/brokerd.toml

use secu_common::{Result, SecuError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/secu/brokerd.toml";

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the gRPC service listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// PEM certificate chain; TLS is enabled when both paths are set
    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,

    /// PEM private key
    #[serde(default)]
    pub tls_key_path: Option<PathBuf>,
}

/// Context table configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextsConfig {
    /// Epoch stamped in the high bits of every id; random when absent
    #[serde(default)]
    pub epoch: Option<u16>,

    /// Live contexts allowed per table before Init fails
    #[serde(default = "default_max_contexts_per_kind")]
    pub max_contexts_per_kind: usize,
}

/// Complete broker configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub contexts: ContextsConfig,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 50051))
}

fn default_max_contexts_per_kind() -> usize {
    65536
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Default for ContextsConfig {
    fn default() -> Self {
        Self {
            epoch: None,
            max_contexts_per_kind: default_max_contexts_per_kind(),
        }
    }
}

impl BrokerConfig {
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

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.contexts.max_contexts_per_kind == 0 {
            return Err(SecuError::Config(
                "contexts.max_contexts_per_kind must be > 0".to_string(),
            ));
        }

        match (&self.server.tls_cert_path, &self.server.tls_key_path) {
            (Some(_), None) | (None, Some(_)) => Err(SecuError::Config(
                "server.tls_cert_path and server.tls_key_path must be set together".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn tls_enabled(&self) -> bool {
        self.server.tls_cert_path.is_some() && self.server.tls_key_path.is_some()
    }
}
