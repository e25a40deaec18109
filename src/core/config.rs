//! Configuration parsing and validation.
//!
//! MessageVault configuration is loaded from TOML files with CLI overrides.
//! Every section and field has a default, so an empty file is a valid
//! single-node configuration.

use crate::election::elector::ElectionConfig;
use crate::storage::frame::FRAME_SIZE_LIMIT;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level MessageVault configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Identity of this node.
    #[serde(default)]
    pub node: NodeConfig,

    /// Lease timing and leader step-down.
    #[serde(default)]
    pub election: ElectionSection,

    /// Stream served by this node and its framing.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Filesystem paths.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Node identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Lease holder id; must be unique in the cluster.
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Endpoint published in the location record when leader.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            endpoint: default_endpoint(),
        }
    }
}

/// Election timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSection {
    /// Lease TTL in milliseconds.
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,

    /// Renewal interval in milliseconds.
    #[serde(default = "default_renew_interval_ms")]
    pub renew_interval_ms: u64,

    /// Delay between acquire attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Grace period for the write scheduler on step-down.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Capacity of the leader's write queue.
    #[serde(default = "default_write_queue_depth")]
    pub write_queue_depth: usize,
}

impl Default for ElectionSection {
    fn default() -> Self {
        Self {
            lease_ttl_ms: default_lease_ttl_ms(),
            renew_interval_ms: default_renew_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            write_queue_depth: default_write_queue_depth(),
        }
    }
}

impl ElectionSection {
    /// Convert to the elector's runtime settings.
    pub fn to_election_config(&self) -> ElectionConfig {
        ElectionConfig {
            lease_ttl_ms: self.lease_ttl_ms,
            renew_interval_ms: self.renew_interval_ms,
            retry_delay_ms: self.retry_delay_ms,
            shutdown_grace_ms: self.shutdown_grace_ms,
            write_queue_depth: self.write_queue_depth,
        }
    }
}

/// Stream and framing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Name of the stream.
    #[serde(default = "default_stream_name")]
    pub name: String,

    /// Maximum payload bytes per frame.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Frames buffered per subscription.
    #[serde(default = "default_read_messages_buffer")]
    pub read_messages_buffer: usize,

    /// Byte budget of one subscription fetch.
    #[serde(default = "default_read_bytes_buffer")]
    pub read_bytes_buffer: usize,

    /// Mirror the stream into the local cache.
    #[serde(default = "default_mirror_cache")]
    pub mirror_cache: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: default_stream_name(),
            max_frame_size: default_max_frame_size(),
            read_messages_buffer: default_read_messages_buffer(),
            read_bytes_buffer: default_read_bytes_buffer(),
            mirror_cache: default_mirror_cache(),
        }
    }
}

/// Filesystem paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Folder holding one cache subfolder per stream.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Shared leader location record.
    #[serde(default = "default_location_path")]
    pub location_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            location_path: default_location_path(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_node_id() -> String {
    "local".to_string()
}

fn default_endpoint() -> String {
    "127.0.0.1:8001".to_string()
}

fn default_lease_ttl_ms() -> u64 {
    15_000
}

fn default_renew_interval_ms() -> u64 {
    5_000
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_write_queue_depth() -> usize {
    crate::election::writer::WRITE_QUEUE_DEPTH
}

fn default_stream_name() -> String {
    "default".to_string()
}

fn default_max_frame_size() -> usize {
    crate::storage::frame::DEFAULT_MAX_FRAME_SIZE
}

fn default_read_messages_buffer() -> usize {
    crate::client::paged::READ_MESSAGES_BUFFER
}

fn default_read_bytes_buffer() -> usize {
    crate::client::paged::READ_BYTES_BUFFER
}

fn default_mirror_cache() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

fn default_location_path() -> PathBuf {
    PathBuf::from("data/leader.loc")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref node_id) = overrides.node_id {
            self.node.node_id = node_id.clone();
        }
        if let Some(ref endpoint) = overrides.endpoint {
            self.node.endpoint = endpoint.clone();
        }
        if let Some(ref cache_dir) = overrides.cache_dir {
            self.storage.cache_dir = PathBuf::from(cache_dir);
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_node()?;
        self.validate_election()?;
        self.validate_stream()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_node(&self) -> Result<()> {
        if self.node.node_id.trim().is_empty() {
            anyhow::bail!("node.node_id must not be empty");
        }
        if self.node.endpoint.is_empty() {
            anyhow::bail!("node.endpoint must not be empty");
        }
        // varint prefix of up to two bytes plus the endpoint
        if self.node.endpoint.len() > crate::election::location::LOCATION_RECORD_SIZE - 2 {
            anyhow::bail!(
                "node.endpoint is {} bytes, does not fit the location record",
                self.node.endpoint.len()
            );
        }
        Ok(())
    }

    fn validate_election(&self) -> Result<()> {
        let e = &self.election;
        if e.lease_ttl_ms == 0 || e.renew_interval_ms == 0 {
            anyhow::bail!("election.lease_ttl_ms and election.renew_interval_ms must be > 0");
        }
        if e.renew_interval_ms >= e.lease_ttl_ms {
            anyhow::bail!(
                "election.renew_interval_ms ({}) must be below election.lease_ttl_ms ({})",
                e.renew_interval_ms,
                e.lease_ttl_ms
            );
        }
        if e.retry_delay_ms == 0 {
            anyhow::bail!("election.retry_delay_ms must be > 0");
        }
        if e.shutdown_grace_ms == 0 {
            anyhow::bail!("election.shutdown_grace_ms must be > 0");
        }
        if e.write_queue_depth == 0 {
            anyhow::bail!("election.write_queue_depth must be > 0");
        }
        Ok(())
    }

    fn validate_stream(&self) -> Result<()> {
        let s = &self.stream;
        if s.name.is_empty() || s.name.len() > u8::MAX as usize {
            anyhow::bail!("stream.name must be 1..=255 bytes, got: {:?}", s.name);
        }
        if s.max_frame_size == 0 || s.max_frame_size > FRAME_SIZE_LIMIT {
            anyhow::bail!(
                "stream.max_frame_size must be in 1..={}, got: {}",
                FRAME_SIZE_LIMIT,
                s.max_frame_size
            );
        }
        if s.read_messages_buffer == 0 || s.read_bytes_buffer == 0 {
            anyhow::bail!("stream read buffers must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override node id.
    pub node_id: Option<String>,
    /// Override advertised endpoint.
    pub endpoint: Option<String>,
    /// Override cache directory.
    pub cache_dir: Option<String>,
}
