//! Per-node MVCC coordinator manager
//!
//! Every node runs one manager. It plays both roles:
//! - requester: issues counter requests and acks (see `protocol`)
//! - coordinator: answers them when elected (see `dispatch`)
//!
//! The current coordinator is never stored here. Callers pick it with
//! [`super::election::assign_coordinator`] and pass it to every request.

use super::counters::CounterService;
use super::futures::PendingTable;
use super::messages::{CoordinatorMessage, COORDINATOR_CHANNEL};
use super::types::MvccCounter;
use crate::cluster::{Membership, NodeId, Transport};
use crate::common::{ProtocolConfig, ProtocolMetrics, Result};
use std::sync::Arc;

pub struct MvccManager {
    local: NodeId,
    transport: Arc<dyn Transport>,
    pub(super) membership: Arc<dyn Membership>,
    pub(super) config: ProtocolConfig,
    pub(super) counters: CounterService,
    pub(super) counter_futs: PendingTable<MvccCounter>,
    pub(super) ack_futs: PendingTable<()>,
    pub(super) metrics: ProtocolMetrics,
}

impl MvccManager {
    pub fn new(
        local: NodeId,
        transport: Arc<dyn Transport>,
        membership: Arc<dyn Membership>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            local,
            transport,
            membership,
            config,
            counters: CounterService::new(),
            counter_futs: PendingTable::new(),
            ack_futs: PendingTable::new(),
            metrics: ProtocolMetrics::new(),
        }
    }

    pub fn local_node(&self) -> &NodeId {
        &self.local
    }

    /// Coordinator-side counter state
    pub fn counters(&self) -> &CounterService {
        &self.counters
    }

    pub fn pending_counter_requests(&self) -> usize {
        self.counter_futs.len()
    }

    pub fn pending_counter_requests_for(&self, coordinator: &NodeId) -> usize {
        self.counter_futs.count_for(coordinator)
    }

    pub fn pending_acks(&self) -> usize {
        self.ack_futs.len()
    }

    pub fn pending_acks_for(&self, coordinator: &NodeId) -> usize {
        self.ack_futs.count_for(coordinator)
    }

    /// Futures dropped by their caller while still pending
    pub fn abandoned_futures(&self) -> u64 {
        self.counter_futs.abandoned() + self.ack_futs.abandoned()
    }

    pub fn metrics(&self) -> &ProtocolMetrics {
        &self.metrics
    }

    /// Prometheus text with gauges refreshed from the live tables
    pub fn render_metrics(&self) -> String {
        self.metrics
            .active_transactions
            .set(self.counters.active_count() as u64);
        self.metrics
            .pending_futures
            .set((self.counter_futs.len() + self.ack_futs.len()) as u64);
        self.metrics.futures_abandoned.set(self.abandoned_futures());
        self.metrics.to_prometheus()
    }

    /// Encode and send one protocol message
    pub(super) fn send(&self, to: &NodeId, msg: &CoordinatorMessage) -> Result<()> {
        let res = msg
            .encode()
            .and_then(|payload| self.transport.send(to, COORDINATOR_CHANNEL, payload));
        if res.is_err() {
            self.metrics.send_failures.inc();
        }
        res
    }
}

impl std::fmt::Debug for MvccManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MvccManager")
            .field("local", &self.local)
            .field("counter", &self.counters.current())
            .field("active_txs", &self.counters.active_count())
            .field("pending_counter_requests", &self.counter_futs.len())
            .field("pending_acks", &self.ack_futs.len())
            .finish()
    }
}
