//! Inbound message dispatch
//!
//! Requests are served by the counter service and answered on the same
//! channel. Responses complete the pending future they name, if it is still
//! pending. Nothing here returns an error: every failure ends up as a future
//! completion or a log line, so one bad peer cannot stall the inbox.

use super::manager::MvccManager;
use super::messages::{CoordinatorMessage, COORDINATOR_CHANNEL};
use super::types::{FutureId, MvccCounter, TxId};
use crate::cluster::{Envelope, NodeId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

impl MvccManager {
    /// Decode and handle a raw coordinator-channel payload
    pub fn on_message(&self, from: &NodeId, payload: &[u8]) {
        match CoordinatorMessage::decode(payload) {
            Ok(msg) => self.handle_message(from, msg),
            Err(e) => {
                self.metrics.dropped_messages.inc();
                tracing::warn!(
                    "Unexpected message received [node={}, len={}]: {}",
                    from,
                    payload.len(),
                    e
                );
            }
        }
    }

    pub fn handle_message(&self, from: &NodeId, msg: CoordinatorMessage) {
        tracing::trace!("Received {} from {}", msg.kind(), from);

        match msg {
            CoordinatorMessage::TxCounterRequest { future_id, tx_id } => {
                self.process_tx_counter_request(from, future_id, tx_id)
            }
            CoordinatorMessage::QueryCounterRequest { future_id } => {
                self.process_query_counter_request(from, future_id)
            }
            CoordinatorMessage::CounterResponse { future_id, counter } => {
                self.process_counter_response(from, future_id, counter)
            }
            CoordinatorMessage::TxAckRequest {
                future_id,
                tx_id,
                skip_response,
            } => self.process_tx_ack_request(from, future_id, tx_id, skip_response),
            CoordinatorMessage::TxAckResponse { future_id } => {
                self.process_tx_ack_response(from, future_id)
            }
            CoordinatorMessage::QueryAckRequest { counter } => {
                self.counters.on_query_done(counter)
            }
        }
    }

    // === Coordinator side ===

    fn process_tx_counter_request(&self, from: &NodeId, future_id: FutureId, tx_id: TxId) {
        if !self.membership.is_alive(from) {
            tracing::debug!(
                "Ignore tx counter request processing, node left [tx={}, node={}]",
                tx_id,
                from
            );
            return;
        }

        let counter = match self.counters.assign_tx_counter(tx_id) {
            Ok(counter) => counter,
            Err(e) => {
                self.metrics.protocol_violations.inc();
                tracing::error!("Rejected tx counter request [node={}]: {}", from, e);
                return;
            }
        };
        self.metrics.tx_counters_assigned.inc();

        self.reply(
            from,
            &CoordinatorMessage::CounterResponse { future_id, counter },
            "tx counter response",
        );
    }

    fn process_query_counter_request(&self, from: &NodeId, future_id: FutureId) {
        if !self.membership.is_alive(from) {
            tracing::debug!(
                "Ignore query counter request processing, node left [node={}]",
                from
            );
            return;
        }

        let counter = self.counters.assign_query_counter(from);
        self.metrics.query_counters_assigned.inc();

        let sent = self.reply(
            from,
            &CoordinatorMessage::CounterResponse { future_id, counter },
            "query counter response",
        );
        if !sent {
            self.counters.on_query_done(counter);
        }
    }

    fn process_tx_ack_request(
        &self,
        from: &NodeId,
        future_id: FutureId,
        tx_id: TxId,
        skip_response: bool,
    ) {
        self.counters.ack_tx_done(&tx_id);
        self.metrics.tx_acks_processed.inc();

        if !skip_response {
            self.reply(
                from,
                &CoordinatorMessage::TxAckResponse { future_id },
                "tx ack response",
            );
        }
    }

    /// Send a response; failures are logged. Returns whether it was sent.
    fn reply(&self, to: &NodeId, msg: &CoordinatorMessage, what: &str) -> bool {
        match self.send(to, msg) {
            Ok(()) => true,
            Err(e) if e.is_topology() => {
                tracing::debug!("Failed to send {}, node left [node={}]", what, to);
                false
            }
            Err(e) => {
                tracing::error!("Failed to send {} [node={}]: {}", what, to, e);
                false
            }
        }
    }

    // === Requester side ===

    fn process_counter_response(&self, from: &NodeId, future_id: FutureId, counter: MvccCounter) {
        match self.counter_futs.take(future_id) {
            Some(pending) => {
                self.metrics.response_latency.observe_since(pending.issued_at());
                self.metrics.futures_completed.inc();
                pending.complete(Ok(counter));
            }
            None => self.log_unmatched(from, "coordinator counter", future_id),
        }
    }

    fn process_tx_ack_response(&self, from: &NodeId, future_id: FutureId) {
        match self.ack_futs.take(future_id) {
            Some(pending) => {
                self.metrics.response_latency.observe_since(pending.issued_at());
                self.metrics.futures_completed.inc();
                pending.complete(Ok(()));
            }
            None => self.log_unmatched(from, "tx ack", future_id),
        }
    }

    /// A live sender answering an unknown future points at a bug; a departed
    /// one is the expected race with cancellation.
    fn log_unmatched(&self, from: &NodeId, what: &str, future_id: FutureId) {
        self.metrics.unmatched_responses.inc();
        if self.membership.is_alive(from) {
            tracing::warn!(
                "Failed to find {} future [node={}, futureId={}]",
                what,
                from,
                future_id
            );
        } else {
            tracing::debug!(
                "Failed to find {} future, node left [node={}, futureId={}]",
                what,
                from,
                future_id
            );
        }
    }
}

/// Drain a node inbox into its manager until the inbox closes
pub fn spawn_dispatcher(
    manager: Arc<MvccManager>,
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = inbox.recv().await {
            if envelope.channel != COORDINATOR_CHANNEL {
                tracing::trace!(
                    "Skipping message on channel {} from {}",
                    envelope.channel,
                    envelope.from
                );
                continue;
            }
            manager.on_message(&envelope.from, &envelope.payload);
        }
        tracing::debug!("Dispatcher for {} stopped", manager.local_node());
    })
}
