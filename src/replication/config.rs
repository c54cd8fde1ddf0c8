//! Sync Engine Configuration

use crate::replication::codec::WireFormat;
use std::time::Duration;

/// How a node learns about the messages it transmits itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EchoMode {
    /// Apply every sent message locally right after transmission and ignore
    /// our own datagrams when they come back from the network.
    #[default]
    Local,
    /// Rely on the transport looping our own datagrams back to us.
    Multicast,
}

impl EchoMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "local" => Some(EchoMode::Local),
            "multicast" | "loopback" => Some(EchoMode::Multicast),
            _ => None,
        }
    }
}

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Identifier used in logs (default: empty, must be set)
    pub node_id: String,

    /// Pause between send loop iterations (default: 5ms)
    pub send_interval: Duration,

    /// Period of the missing-version request (default: 1s)
    pub reconcile_interval: Duration,

    /// Deepest batch nesting that is still processed (default: 16)
    pub max_batch_depth: usize,

    /// Largest run of missing versions a single event may open (default: 65536)
    pub max_version_gap: u64,

    /// Self-echo strategy (default: Local)
    pub echo_mode: EchoMode,

    /// Datagram encoding (default: Json)
    pub wire_format: WireFormat,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            send_interval: Duration::from_millis(5),
            reconcile_interval: Duration::from_secs(1),
            max_batch_depth: 16,
            max_version_gap: 65_536,
            echo_mode: EchoMode::Local,
            wire_format: WireFormat::Json,
        }
    }
}

impl SyncConfig {
    /// Create a new configuration with node ID.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    pub fn send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }

    pub fn max_batch_depth(mut self, depth: usize) -> Self {
        self.max_batch_depth = depth;
        self
    }

    pub fn max_version_gap(mut self, gap: u64) -> Self {
        self.max_version_gap = gap;
        self
    }

    pub fn echo_mode(mut self, mode: EchoMode) -> Self {
        self.echo_mode = mode;
        self
    }

    pub fn wire_format(mut self, format: WireFormat) -> Self {
        self.wire_format = format;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.is_empty() {
            return Err(ConfigError::MissingNodeId);
        }
        if self.send_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("send_interval"));
        }
        if self.reconcile_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("reconcile_interval"));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("node_id is required")]
    MissingNodeId,
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("invalid multicast group {0}")]
    InvalidGroup(String),
}
