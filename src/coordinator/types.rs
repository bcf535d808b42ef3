//! Identifiers shared by the coordinator protocol

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// MVCC version counter. Strictly increasing per coordinator instance.
pub type MvccCounter = i64;

/// Correlates a response with the request that produced it
pub type FutureId = u64;

/// Future id carried by messages that expect no response
pub const NO_FUTURE: FutureId = 0;

/// Process-wide future id source shared by counter and ack futures,
/// so ids never collide across the two pending tables.
static NEXT_FUTURE_ID: AtomicU64 = AtomicU64::new(0);

/// Allocate the next future id (never [`NO_FUTURE`])
pub fn next_future_id() -> FutureId {
    NEXT_FUTURE_ID.fetch_add(1, Ordering::Relaxed) + 1
}

/// Globally unique transaction identifier
///
/// Ordered by topology version, then by the originating node's local order,
/// then by the originating node's join order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId {
    pub topology_version: u64,
    pub order: u64,
    pub node_order: u64,
}

impl TxId {
    pub fn new(topology_version: u64, order: u64, node_order: u64) -> Self {
        Self {
            topology_version,
            order,
            node_order,
        }
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TxId[topVer={}, order={}, nodeOrder={}]",
            self.topology_version, self.order, self.node_order
        )
    }
}

/// Hands out transaction ids for one node
#[derive(Debug)]
pub struct TxIdGenerator {
    node_order: u64,
    order: AtomicU64,
}

impl TxIdGenerator {
    pub fn new(node_order: u64) -> Self {
        Self {
            node_order,
            order: AtomicU64::new(0),
        }
    }

    pub fn next(&self, topology_version: u64) -> TxId {
        let order = self.order.fetch_add(1, Ordering::Relaxed) + 1;
        TxId::new(topology_version, order, self.node_order)
    }
}
