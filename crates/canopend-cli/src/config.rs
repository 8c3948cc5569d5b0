//! Configuration file handling for canopend-cli

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use canopend_client::{ClientConfig, TcpConfig, TransportConfig};
use serde::{Deserialize, Serialize};

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default daemon host
    pub host: Option<String>,
    /// Default daemon IPC port
    pub port: Option<u16>,
    /// Default request timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Default object dictionary catalog
    pub catalog: Option<PathBuf>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("canopend-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        host: Option<&str>,
        port: Option<u16>,
        timeout_ms: Option<u64>,
        catalog: Option<&Path>,
        no_color: bool,
    ) -> MergedConfig {
        let defaults = TcpConfig::default();
        let tcp = TcpConfig {
            host: host
                .map(String::from)
                .or_else(|| self.host.clone())
                .unwrap_or(defaults.host),
            port: port.or(self.port).unwrap_or(defaults.port),
            connect_timeout_ms: defaults.connect_timeout_ms,
        };

        let mut client = ClientConfig {
            catalog: catalog.map(Path::to_path_buf).or_else(|| self.catalog.clone()),
            transport: TransportConfig::Tcp(tcp),
            ..ClientConfig::default()
        };
        if let Some(timeout) = timeout_ms.or(self.timeout_ms) {
            client.request_timeout_ms = timeout;
        }

        MergedConfig {
            client,
            output: self.output.clone(),
            no_color: no_color || self.no_color.unwrap_or(false),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub client: ClientConfig,
    /// Output format from the config file; the `--output` flag wins
    pub output: Option<String>,
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_args_override_file() {
        let config: Config = toml::from_str(
            r#"
            host = "10.0.0.2"
            port = 6000
            timeout_ms = 250
            "#,
        )
        .unwrap();

        let merged = config.merge_with_args(None, Some(5555), None, None, false);
        match &merged.client.transport {
            TransportConfig::Tcp(tcp) => assert_eq!(tcp.address(), "10.0.0.2:5555"),
            other => panic!("unexpected transport {:?}", other),
        }
        assert_eq!(merged.client.request_timeout_ms, 250);
        assert!(!merged.no_color);
    }

    #[test]
    fn test_defaults_without_file() {
        let merged = Config::default().merge_with_args(None, None, None, None, true);
        match &merged.client.transport {
            TransportConfig::Tcp(tcp) => assert_eq!(tcp.address(), "127.0.0.1:5555"),
            other => panic!("unexpected transport {:?}", other),
        }
        assert_eq!(merged.client.request_timeout_ms, 1000);
        assert!(merged.client.catalog.is_none());
        assert!(merged.no_color);
    }
}
