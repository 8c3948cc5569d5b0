//! Client configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! request_timeout_ms = 1000
//! catalog = "/etc/canopend/star-tracker.yaml"
//!
//! [transport]
//! type = "tcp"
//! host = "127.0.0.1"
//! port = 5555
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use canopend_od::{standard, ObjectDictionary};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Top-level client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Deadline for every request/response exchange
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// YAML catalog merged over the standard entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_request_timeout() -> u64 {
    1000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout(),
            catalog: None,
            transport: TransportConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ClientResult<Self> {
        toml::from_str(content).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Standard entries plus the configured catalog file, if any
    pub fn load_catalog(&self) -> ClientResult<ObjectDictionary> {
        let base = standard::catalog()?;
        match &self.catalog {
            Some(path) => {
                let device = ObjectDictionary::from_file(path)?;
                Ok(base.merge(&device)?)
            }
            None => Ok(base),
        }
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// TCP connection to the daemon's IPC port
    Tcp(TcpConfig),
    /// In-memory daemon for testing
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Tcp(TcpConfig::default())
    }
}

/// TCP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Daemon host
    #[serde(default = "default_host")]
    pub host: String,
    /// Daemon IPC port (default: 5555)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5555
}

fn default_connect_timeout() -> u64 {
    2000
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl TcpConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Mock daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Node id of the daemon's own node
    #[serde(default = "default_local_node_id")]
    pub local_node_id: u8,
}

fn default_local_node_id() -> u8 {
    0x01
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            local_node_id: default_local_node_id(),
        }
    }
}
