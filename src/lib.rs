//! # mvcc-coord
//!
//! Cluster-wide MVCC version counters issued by a single coordinator:
//! - Deterministic coordinator election over a topology snapshot
//! - Strictly increasing, gap-free counter assignment
//! - Active-transaction tracking with idempotent acks
//! - Request/response correlation through pending futures
//! - Cancellation of pending requests when their coordinator leaves
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  TxCounterRequest / TxAckRequest  ┌──────────────┐
//! │  Requester   │ ────────────────────────────────▶ │ Coordinator  │
//! │ MvccManager  │                                   │ MvccManager  │
//! │ (futures)    │ ◀──────────────────────────────── │ (counters)   │
//! └──────┬───────┘  CounterResponse / TxAckResponse  └──────────────┘
//!        │ node left / node failed
//!   ┌────┴─────────┐
//!   │  Membership  │
//!   └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Run a 5-node local cluster, fail the coordinator after 200 transactions
//! mvcc-coord simulate --nodes 5 --transactions 1000 --fail-coordinator-after 200
//!
//! # Print the effective configuration
//! mvcc-coord show-config --config ./mvcc-coord.toml
//! ```

#![allow(clippy::result_large_err)]

pub mod cluster;
pub mod common;
pub mod coordinator;
pub mod simulation;

// Re-export commonly used types
pub use cluster::{ClusterNode, NodeId, TopologySnapshot};
pub use common::{Config, Error, Result};
pub use coordinator::{assign_coordinator, MvccCounter, MvccManager, MvccService, TxId};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
