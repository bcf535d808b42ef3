//! Configuration for mvcc-coord components

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file looked up by [`Config::load`]
pub const DEFAULT_CONFIG_FILE: &str = "mvcc-coord.toml";

/// Prefix for environment overrides (`MVCC_LOG_LEVEL`, `MVCC_PROTOCOL__...`)
const ENV_PREFIX: &str = "MVCC";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Coordinator protocol settings
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Local cluster simulation settings
    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            protocol: ProtocolConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Coordinator protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Complete pending commit acks when their coordinator leaves.
    /// When disabled they stay pending until the caller gives up.
    #[serde(default = "default_cancel_acks")]
    pub cancel_acks_on_coordinator_loss: bool,
}

fn default_cancel_acks() -> bool {
    true
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            cancel_acks_on_coordinator_loss: default_cancel_acks(),
        }
    }
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Total nodes in the local cluster
    #[serde(default = "default_nodes")]
    pub nodes: usize,

    /// How many of them join as client nodes (never elected)
    #[serde(default)]
    pub client_nodes: usize,

    /// Transactions to run
    #[serde(default = "default_transactions")]
    pub transactions: usize,

    /// Fraction of transactions that roll back instead of committing
    #[serde(default = "default_rollback_ratio")]
    pub rollback_ratio: f64,

    /// Fail the elected coordinator after this many transactions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_coordinator_after: Option<usize>,
}

fn default_nodes() -> usize {
    3
}
fn default_transactions() -> usize {
    1_000
}
fn default_rollback_ratio() -> f64 {
    0.1
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            client_nodes: 0,
            transactions: default_transactions(),
            rollback_ratio: default_rollback_ratio(),
            fail_coordinator_after: None,
        }
    }
}

impl Config {
    /// Load from `mvcc-coord.toml` in the working directory (if present)
    /// and `MVCC_*` environment variables.
    pub fn load() -> crate::Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific file (optional) plus environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the simulation cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let sim = &self.simulation;
        if sim.nodes == 0 {
            return Err(crate::Error::InvalidConfig(
                "simulation.nodes must be at least 1".into(),
            ));
        }
        if sim.client_nodes >= sim.nodes {
            return Err(crate::Error::InvalidConfig(format!(
                "simulation.client_nodes ({}) must leave at least one server node out of {}",
                sim.client_nodes, sim.nodes
            )));
        }
        if !(0.0..=1.0).contains(&sim.rollback_ratio) {
            return Err(crate::Error::InvalidConfig(format!(
                "simulation.rollback_ratio must be within [0, 1], got {}",
                sim.rollback_ratio
            )));
        }
        if let Some(after) = sim.fail_coordinator_after {
            if after == 0 || after > sim.transactions {
                return Err(crate::Error::InvalidConfig(format!(
                    "simulation.fail_coordinator_after must be within [1, {}], got {}",
                    sim.transactions, after
                )));
            }
        }
        Ok(())
    }
}
