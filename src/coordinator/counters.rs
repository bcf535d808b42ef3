//! Counter assignment (coordinator side)
//!
//! Holds the MVCC counter, the committed watermark and the table of active
//! transactions. Counters live in memory only; a restarted coordinator starts
//! from zero under a new node identity.

use super::types::{MvccCounter, TxId};
use crate::cluster::NodeId;
use crate::common::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Default)]
pub struct CounterService {
    mvcc_counter: AtomicI64,
    committed_counter: AtomicI64,
    active_txs: DashMap<TxId, MvccCounter>,
}

impl CounterService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next counter to `tx_id` and mark it active.
    ///
    /// A transaction already present in the active table is a protocol
    /// violation; the counter is not advanced in that case.
    pub fn assign_tx_counter(&self, tx_id: TxId) -> Result<MvccCounter> {
        match self.active_txs.entry(tx_id) {
            Entry::Occupied(existing) => Err(Error::ProtocolViolation(format!(
                "transaction {} already holds counter {}",
                tx_id,
                existing.get()
            ))),
            Entry::Vacant(slot) => {
                let counter = self.mvcc_counter.fetch_add(1, Ordering::SeqCst) + 1;
                slot.insert(counter);
                Ok(counter)
            }
        }
    }

    /// Snapshot boundary for a read-only query.
    ///
    /// Queries are not tracked; the committed watermark is returned as is.
    pub fn assign_query_counter(&self, _requester: &NodeId) -> MvccCounter {
        self.committed_counter.load(Ordering::SeqCst)
    }

    /// Forget a finished transaction. Unknown ids are ignored.
    pub fn ack_tx_done(&self, tx_id: &TxId) -> Option<MvccCounter> {
        self.active_txs.remove(tx_id).map(|(_, counter)| counter)
    }

    /// Release a query snapshot. Snapshots are not reserved yet, so there is
    /// nothing to release.
    pub fn on_query_done(&self, _counter: MvccCounter) {}

    /// Last assigned counter
    pub fn current(&self) -> MvccCounter {
        self.mvcc_counter.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> MvccCounter {
        self.committed_counter.load(Ordering::SeqCst)
    }

    pub fn active_counter(&self, tx_id: &TxId) -> Option<MvccCounter> {
        self.active_txs.get(tx_id).map(|c| *c)
    }

    pub fn active_count(&self) -> usize {
        self.active_txs.len()
    }
}
