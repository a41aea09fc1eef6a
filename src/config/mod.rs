//! # Configuration Management Module
//!
//! TOML-backed configuration for the uplink agent, organized one section per
//! concern with serde defaults so a minimal file (or none at all, via
//! `uplink init`) yields a working agent.
//!
//! ## Sections
//!
//! - [`AgentConfig`] - agent identity (name, description)
//! - [`EndpointConfig`] - the remote egress endpoint and reconnect policy
//! - [`IngressConfig`] - the local producer listener
//! - [`QosSection`] - dispatch queue budgets and tie-break policy
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use uplink::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("uplink.toml").await?;
//!     println!("forwarding to {}", config.endpoint.addr());
//!     Ok(())
//! }
//! ```
//!
//! ## File format
//!
//! ```toml
//! [agent]
//! name = "uplink"
//!
//! [endpoint]
//! host = "ingest.example.net"
//! port = 8433
//! reconnect_backoff_seconds = [1, 2, 4, 8]
//!
//! [qos]
//! max_queue_bytes = 1048576
//! max_message_bytes = 262144
//! prioritize_oldest = false
//! ```
//!
//! Numeric QoS limits are validated by the dispatch handler at construction,
//! not here; this layer only parses and fills defaults.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default)]
    pub qos: QosSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            name: "uplink".to_string(),
            description: "Store-and-forward relay agent".to_string(),
        }
    }
}

/// Remote egress endpoint and its reconnect policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Delay schedule between consecutive reconnect attempts; the last entry
    /// repeats. Each delay is jittered upward by up to 50%.
    #[serde(default = "default_backoff_schedule")]
    pub reconnect_backoff_seconds: Vec<u64>,
}

impl EndpointConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            host: "127.0.0.1".to_string(),
            port: 8433,
            connect_timeout_seconds: default_connect_timeout(),
            reconnect_backoff_seconds: default_backoff_schedule(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_backoff_schedule() -> Vec<u64> {
    vec![1, 2, 4, 8]
}

/// Local listener producers connect to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    /// Bind address; loopback by default, producers are local by assumption.
    pub bind: String,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for IngressConfig {
    fn default() -> Self {
        IngressConfig {
            bind: "127.0.0.1:7673".to_string(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn default_max_frame_bytes() -> usize {
    512 * 1024
}

/// Dispatch queue budgets and tie-break policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QosSection {
    pub max_queue_bytes: usize,
    pub max_message_bytes: usize,
    /// Serve equal-priority messages oldest first (FIFO within a class)
    /// instead of the default newest first.
    #[serde(default)]
    pub prioritize_oldest: bool,
}

impl Default for QosSection {
    fn default() -> Self {
        QosSection {
            max_queue_bytes: 1024 * 1024,
            max_message_bytes: 256 * 1024,
            prioritize_oldest: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}
