//! Common utilities and types shared across mvcc-coord

pub mod config;
pub mod error;
pub mod metrics;
pub mod utils;

pub use config::{Config, ProtocolConfig, SimulationConfig};
pub use error::{Error, Result};
pub use metrics::{Counter, Gauge, Histogram, ProtocolMetrics};
pub use utils::{parse_duration, retry_with_backoff};
