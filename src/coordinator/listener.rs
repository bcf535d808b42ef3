//! Coordinator failure handling
//!
//! When a node leaves or fails, requests still waiting on it can never be
//! answered. Counter requests fail with a topology error so the caller can
//! re-elect and retry. Commit acks complete successfully: a coordinator that
//! is gone has no active-transaction entry left to clear.

use super::manager::MvccManager;
use crate::cluster::{MembershipEvent, NodeId};
use crate::common::Error;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

impl MvccManager {
    pub fn on_membership_event(&self, event: &MembershipEvent) {
        let cancelled = self.on_node_left(&event.node);
        if cancelled > 0 {
            tracing::info!(
                "Node {} {}, cancelled {} pending coordinator requests (topology={})",
                event.node,
                event.kind,
                cancelled,
                event.topology_version
            );
        }
    }

    /// Cancel everything pending on `node`. Returns the number of futures
    /// this call completed.
    pub fn on_node_left(&self, node: &NodeId) -> usize {
        let mut cancelled = self.counter_futs.complete_all_for(node, || {
            Err(Error::Topology {
                node: *node,
                reason: "Failed to request counter, node failed".into(),
            })
        });

        if self.config.cancel_acks_on_coordinator_loss {
            cancelled += self.ack_futs.complete_all_for(node, || Ok(()));
        }

        self.metrics.futures_cancelled.add(cancelled as u64);
        cancelled
    }

    /// Cancel futures whose coordinator is no longer alive. Used when
    /// membership events may have been missed.
    pub fn cancel_futures_for_departed(&self) -> usize {
        let alive = |node: &NodeId| self.membership.is_alive(node);

        let mut cancelled = self.counter_futs.complete_all_where_gone(alive, |node| {
            Err(Error::Topology {
                node: *node,
                reason: "Failed to request counter, node failed".into(),
            })
        });

        if self.config.cancel_acks_on_coordinator_loss {
            cancelled += self.ack_futs.complete_all_where_gone(alive, |_| Ok(()));
        }

        self.metrics.futures_cancelled.add(cancelled as u64);
        cancelled
    }
}

/// Feed membership events into the manager until the channel closes
pub fn spawn_failure_listener(
    manager: Arc<MvccManager>,
    mut events: broadcast::Receiver<MembershipEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => manager.on_membership_event(&event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        "Failure listener on {} missed {} membership events, resyncing",
                        manager.local_node(),
                        missed
                    );
                    manager.cancel_futures_for_departed();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("Failure listener for {} stopped", manager.local_node());
    })
}
