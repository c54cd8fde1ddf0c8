use crate::adapters::outbound::MulticastConfig;
use crate::replication::{ConfigError, EchoMode, SyncConfig, WireFormat};
use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Node settings
    pub node_id: String,
    pub debug: bool,

    // Multicast group
    pub multicast_group: Ipv4Addr,
    pub multicast_port: u16,
    pub multicast_ttl: u32,
    pub multicast_loop: bool,

    // Sync engine
    pub send_interval_ms: u64,
    pub reconcile_interval_ms: u64,
    pub max_batch_depth: usize,
    pub max_version_gap: u64,
    pub echo_mode: EchoMode,
    pub wire_format: WireFormat,
}

impl Default for Config {
    fn default() -> Self {
        let multicast = MulticastConfig::default();
        Self {
            node_id: random_node_id(),
            debug: false,
            multicast_group: multicast.group,
            multicast_port: multicast.port,
            multicast_ttl: multicast.ttl,
            multicast_loop: multicast.multicast_loop,
            send_interval_ms: 5,
            reconcile_interval_ms: 1000,
            max_batch_depth: 16,
            max_version_gap: 65_536,
            echo_mode: EchoMode::default(),
            wire_format: WireFormat::default(),
        }
    }
}

impl Config {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new(self.node_id.clone())
            .send_interval(Duration::from_millis(self.send_interval_ms))
            .reconcile_interval(Duration::from_millis(self.reconcile_interval_ms))
            .max_batch_depth(self.max_batch_depth)
            .max_version_gap(self.max_version_gap)
            .echo_mode(self.echo_mode)
            .wire_format(self.wire_format)
    }

    pub fn multicast_config(&self) -> Result<MulticastConfig, ConfigError> {
        let config = MulticastConfig {
            group: self.multicast_group,
            port: self.multicast_port,
            ttl: self.multicast_ttl,
            multicast_loop: self.multicast_loop,
        };
        config.validate()?;
        Ok(config)
    }
}

fn random_node_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("node-{}", &id[..8])
}

pub fn load_config() -> anyhow::Result<Config> {
    config_from(|key| std::env::var(key).ok())
}

fn config_from(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
    let defaults = Config::default();

    let node_id = var("BOARD_NODE_ID")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(defaults.node_id);

    let debug = var("DEBUG").is_some();

    let multicast_group = match var("BOARD_MULTICAST_GROUP") {
        Some(v) => {
            let group: Ipv4Addr = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidGroup(v.clone()))?;
            if !group.is_multicast() {
                return Err(ConfigError::InvalidGroup(v).into());
            }
            group
        }
        None => defaults.multicast_group,
    };

    let multicast_port = var("BOARD_MULTICAST_PORT")
        .unwrap_or_else(|| "12345".to_string())
        .parse()
        .unwrap_or(defaults.multicast_port);

    let multicast_ttl = var("BOARD_MULTICAST_TTL")
        .unwrap_or_else(|| "1".to_string())
        .parse()
        .unwrap_or(defaults.multicast_ttl);

    let multicast_loop = var("BOARD_MULTICAST_LOOP")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(defaults.multicast_loop);

    let send_interval_ms = var("BOARD_SEND_INTERVAL_MS")
        .unwrap_or_else(|| "5".to_string())
        .parse()
        .ok()
        .filter(|ms| *ms > 0)
        .unwrap_or(defaults.send_interval_ms);

    let reconcile_interval_ms = var("BOARD_RECONCILE_INTERVAL_MS")
        .unwrap_or_else(|| "1000".to_string())
        .parse()
        .ok()
        .filter(|ms| *ms > 0)
        .unwrap_or(defaults.reconcile_interval_ms);

    let max_batch_depth = var("BOARD_MAX_BATCH_DEPTH")
        .unwrap_or_else(|| "16".to_string())
        .parse()
        .unwrap_or(defaults.max_batch_depth);

    let max_version_gap = var("BOARD_MAX_VERSION_GAP")
        .unwrap_or_else(|| "65536".to_string())
        .parse()
        .unwrap_or(defaults.max_version_gap);

    let echo_mode = var("BOARD_ECHO_MODE")
        .and_then(|v| EchoMode::parse(&v))
        .unwrap_or(defaults.echo_mode);

    let wire_format = var("BOARD_WIRE_FORMAT")
        .and_then(|v| WireFormat::parse(&v))
        .unwrap_or(defaults.wire_format);

    Ok(Config {
        node_id,
        debug,
        multicast_group,
        multicast_port,
        multicast_ttl,
        multicast_loop,
        send_interval_ms,
        reconcile_interval_ms,
        max_batch_depth,
        max_version_gap,
        echo_mode,
        wire_format,
    })
}
