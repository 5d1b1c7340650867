//! Node configuration types

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete node configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    /// Node identity and simulation size
    #[serde(default)]
    pub node: NodeSettings,

    /// Event creation and gossip pacing
    #[serde(default)]
    pub gossip: GossipConfig,

    /// Shadow graph expiration
    #[serde(default)]
    pub expiration: ExpirationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node.nodes == 0 {
            bail!("node.nodes must be at least 1");
        }
        if self.gossip.interval_ms == 0 {
            bail!("gossip.interval_ms must be non-zero");
        }
        if self.gossip.max_send_batch == 0 {
            bail!("gossip.max_send_batch must be non-zero");
        }
        if self.expiration.enabled && self.expiration.interval_ms == 0 {
            bail!("expiration.interval_ms must be non-zero when expiration is enabled");
        }
        if self.expiration.retained_generations < 0 {
            bail!("expiration.retained_generations must not be negative");
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => bail!("logging.format must be \"text\" or \"json\", got {:?}", other),
        }
    }
}

/// Basic node settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSettings {
    /// Name prefix; simulated nodes are `<name>-<index>`
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Number of simulated nodes
    #[serde(default = "default_nodes")]
    pub nodes: usize,
}

fn default_node_name() -> String {
    "skein".to_string()
}

fn default_nodes() -> usize {
    4
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            nodes: default_nodes(),
        }
    }
}

/// Gossip settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GossipConfig {
    /// Pause between gossip rounds (ms)
    #[serde(default = "default_gossip_interval_ms")]
    pub interval_ms: u64,

    /// Rounds each node runs before the simulation settles
    #[serde(default = "default_rounds")]
    pub rounds: u64,

    /// Events each node creates per round
    #[serde(default = "default_events_per_round")]
    pub events_per_round: usize,

    /// Upper bound on events applied from one send list
    #[serde(default = "default_max_send_batch")]
    pub max_send_batch: usize,

    /// Seed for peer and parent selection
    #[serde(default)]
    pub seed: u64,
}

fn default_gossip_interval_ms() -> u64 {
    50
}

fn default_rounds() -> u64 {
    40
}

fn default_events_per_round() -> usize {
    1
}

fn default_max_send_batch() -> usize {
    10_000
}

impl GossipConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_gossip_interval_ms(),
            rounds: default_rounds(),
            events_per_round: default_events_per_round(),
            max_send_batch: default_max_send_batch(),
            seed: 0,
        }
    }
}

/// Expiration settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpirationConfig {
    /// Run the periodic expiration task
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Pause between expiration passes (ms)
    #[serde(default = "default_expiration_interval_ms")]
    pub interval_ms: u64,

    /// Generations kept below the highest known one
    #[serde(default = "default_retained_generations")]
    pub retained_generations: i64,
}

fn default_true() -> bool {
    true
}

fn default_expiration_interval_ms() -> u64 {
    200
}

fn default_retained_generations() -> i64 {
    64
}

impl ExpirationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_expiration_interval_ms(),
            retained_generations: default_retained_generations(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
