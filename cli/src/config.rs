//! CLI configuration file.
//!
//! ```yaml
//! endpoint: wss://kusama-rpc.polkadot.io
//! connect_timeout_ms: 5000
//! request_timeout_ms: 30000
//! log:
//!   level: info
//!   components:
//!     chainscan-substrate: debug
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use chainscan_core::SessionConfig;
use chainscan_observability::LogConfig;
use chainscan_substrate::{ConnectionConfig, DEFAULT_ENDPOINT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Node WebSocket endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Buffered updates between the scan task and the printer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}
fn default_connect_timeout_ms() -> u64 {
    ConnectionConfig::default().connect_timeout_ms
}
fn default_channel_capacity() -> usize {
    SessionConfig::default().channel_capacity
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: None,
            channel_capacity: default_channel_capacity(),
            log: LogConfig::default(),
        }
    }
}

impl ScanConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid config")
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config '{}'", path.display()))?;
        Self::from_yaml_str(&yaml).with_context(|| format!("in '{}'", path.display()))
    }

    /// Load `path` if given, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout_ms: self.connect_timeout_ms,
            request_timeout_ms: self.request_timeout_ms,
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            channel_capacity: self.channel_capacity.max(1),
        }
    }
}
