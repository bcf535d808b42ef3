//! Requester-side protocol
//!
//! Each call registers its future before sending, then returns immediately.
//! A send that fails on the spot takes the future back out of its table and
//! completes it before returning.

use super::futures::CoordinatorFuture;
use super::manager::MvccManager;
use super::messages::CoordinatorMessage;
use super::types::{MvccCounter, TxId, NO_FUTURE};
use crate::cluster::ClusterNode;

/// Resolves to the assigned counter
pub type CounterFuture = CoordinatorFuture<MvccCounter>;

/// Resolves once the coordinator processed a commit ack
pub type AckFuture = CoordinatorFuture<()>;

impl MvccManager {
    /// Ask `coordinator` for a counter for `tx_id`.
    pub fn request_tx_counter(&self, coordinator: &ClusterNode, tx_id: TxId) -> CounterFuture {
        let fut = self.counter_futs.register(coordinator.id);
        self.metrics.futures_registered.inc();

        let msg = CoordinatorMessage::TxCounterRequest {
            future_id: fut.id(),
            tx_id,
        };
        if let Err(e) = self.send(&coordinator.id, &msg) {
            tracing::debug!(
                "Failed to send tx counter request [tx={}, node={}]: {}",
                tx_id,
                coordinator.id,
                e
            );
            if self.counter_futs.complete(fut.id(), Err(e)) {
                self.metrics.futures_completed.inc();
            }
        }

        fut
    }

    /// Ask `coordinator` for a read snapshot boundary.
    pub fn request_query_counter(&self, coordinator: &ClusterNode) -> CounterFuture {
        let fut = self.counter_futs.register(coordinator.id);
        self.metrics.futures_registered.inc();

        let msg = CoordinatorMessage::QueryCounterRequest {
            future_id: fut.id(),
        };
        if let Err(e) = self.send(&coordinator.id, &msg) {
            tracing::debug!(
                "Failed to send query counter request [node={}]: {}",
                coordinator.id,
                e
            );
            if self.counter_futs.complete(fut.id(), Err(e)) {
                self.metrics.futures_completed.inc();
            }
        }

        fut
    }

    /// Tell `coordinator` that `tx_id` committed.
    ///
    /// A coordinator that already left counts as an acknowledgment.
    pub fn ack_tx_commit(&self, coordinator: &ClusterNode, tx_id: TxId) -> AckFuture {
        let fut = self.ack_futs.register(coordinator.id);
        self.metrics.futures_registered.inc();

        let msg = CoordinatorMessage::TxAckRequest {
            future_id: fut.id(),
            tx_id,
            skip_response: false,
        };
        match self.send(&coordinator.id, &msg) {
            Ok(()) => {}
            Err(e) if e.is_topology() => {
                tracing::debug!(
                    "Coordinator left before tx commit ack [tx={}, node={}]",
                    tx_id,
                    coordinator.id
                );
                if self.ack_futs.complete(fut.id(), Ok(())) {
                    self.metrics.futures_completed.inc();
                }
            }
            Err(e) => {
                tracing::error!(
                    "Failed to send tx commit ack [tx={}, node={}]: {}",
                    tx_id,
                    coordinator.id,
                    e
                );
                if self.ack_futs.complete(fut.id(), Err(e)) {
                    self.metrics.futures_completed.inc();
                }
            }
        }

        fut
    }

    /// Tell `coordinator` that `tx_id` rolled back. Best effort: nothing is
    /// awaited and failures are only logged.
    pub fn ack_tx_rollback(&self, coordinator: &ClusterNode, tx_id: TxId) {
        let msg = CoordinatorMessage::TxAckRequest {
            future_id: NO_FUTURE,
            tx_id,
            skip_response: true,
        };
        match self.send(&coordinator.id, &msg) {
            Ok(()) => {}
            Err(e) if e.is_topology() => {
                tracing::debug!(
                    "Failed to send tx rollback ack, node left [tx={}, node={}]",
                    tx_id,
                    coordinator.id
                );
            }
            Err(e) => {
                tracing::error!(
                    "Failed to send tx rollback ack [tx={}, node={}]: {}",
                    tx_id,
                    coordinator.id,
                    e
                );
            }
        }
    }

    /// Release a query snapshot obtained with [`Self::request_query_counter`].
    /// Best effort, like rollback acks.
    pub fn ack_query_done(&self, coordinator: &ClusterNode, counter: MvccCounter) {
        let msg = CoordinatorMessage::QueryAckRequest { counter };
        match self.send(&coordinator.id, &msg) {
            Ok(()) => {}
            Err(e) if e.is_topology() => {
                tracing::debug!(
                    "Failed to send query ack, node left [counter={}, node={}]",
                    counter,
                    coordinator.id
                );
            }
            Err(e) => {
                tracing::error!(
                    "Failed to send query ack [counter={}, node={}]: {}",
                    counter,
                    coordinator.id,
                    e
                );
            }
        }
    }
}
