//! Request/response protocol between a requester and its coordinator

mod common;

use common::{MockNet, Pair};
use mvcc_coord::common::ProtocolConfig;
use mvcc_coord::coordinator::{assign_coordinator, CoordinatorMessage, TxId, NO_FUTURE};
use mvcc_coord::cluster::Membership;
use mvcc_coord::Error;
use std::time::Duration;
use tokio_test::{assert_pending, assert_ready_err, assert_ready_ok, task};

fn tx(order: u64) -> TxId {
    TxId::new(1, order, 2)
}

#[tokio::test]
async fn test_counter_request_roundtrip() {
    let pair = Pair::new();

    let fut = pair.req.request_tx_counter(&pair.crd_node, tx(1));
    assert_eq!(pair.req.pending_counter_requests(), 1);

    let sent = pair.net.pop().unwrap();
    assert_eq!(sent.to, pair.crd_node.id);
    assert_eq!(
        sent.message(),
        CoordinatorMessage::TxCounterRequest {
            future_id: fut.id(),
            tx_id: tx(1)
        }
    );
    pair.crd.on_message(&sent.from, &sent.payload);
    pair.pump();

    assert_eq!(fut.await.unwrap(), 1);
    assert_eq!(pair.req.pending_counter_requests(), 0);
    assert_eq!(pair.crd.counters().active_counter(&tx(1)), Some(1));
}

#[tokio::test]
async fn test_counters_follow_arrival_order() {
    let pair = Pair::new();

    let a = pair.req.request_tx_counter(&pair.crd_node, tx(1));
    let b = pair.req.request_tx_counter(&pair.crd_node, tx(2));
    let c = pair.req.request_tx_counter(&pair.crd_node, tx(3));
    pair.pump();

    assert_eq!(a.await.unwrap(), 1);
    assert_eq!(b.await.unwrap(), 2);
    assert_eq!(c.await.unwrap(), 3);
    assert_eq!(pair.crd.counters().active_count(), 3);
}

#[tokio::test]
async fn test_query_counter_returns_committed_watermark() {
    let pair = Pair::new();

    let tx_fut = pair.req.request_tx_counter(&pair.crd_node, tx(1));
    let query_fut = pair.req.request_query_counter(&pair.crd_node);
    pair.pump();

    assert_eq!(tx_fut.await.unwrap(), 1);
    assert_eq!(query_fut.await.unwrap(), 0);
    assert_eq!(pair.crd.metrics().query_counters_assigned.get(), 1);

    pair.req.ack_query_done(&pair.crd_node, 0);
    assert_eq!(pair.pump(), 1);
}

#[tokio::test]
async fn test_commit_ack_clears_active_entry() {
    let pair = Pair::new();

    let counter = pair.req.request_tx_counter(&pair.crd_node, tx(1));
    pair.pump();
    counter.await.unwrap();

    let ack = pair.req.ack_tx_commit(&pair.crd_node, tx(1));
    assert_eq!(pair.req.pending_acks(), 1);
    pair.pump();

    ack.await.unwrap();
    assert_eq!(pair.req.pending_acks(), 0);
    assert_eq!(pair.crd.counters().active_count(), 0);
}

#[tokio::test]
async fn test_duplicate_commit_acks_both_succeed() {
    let pair = Pair::new();

    let counter = pair.req.request_tx_counter(&pair.crd_node, tx(1));
    pair.pump();
    counter.await.unwrap();

    let first = pair.req.ack_tx_commit(&pair.crd_node, tx(1));
    let second = pair.req.ack_tx_commit(&pair.crd_node, tx(1));
    pair.pump();

    first.await.unwrap();
    second.await.unwrap();
    assert_eq!(pair.crd.counters().active_counter(&tx(1)), None);
}

#[tokio::test]
async fn test_ack_before_counter_response_tolerated() {
    let pair = Pair::new();

    // Ack for a transaction the coordinator never saw
    let ack = pair.req.ack_tx_commit(&pair.crd_node, tx(9));
    pair.pump();
    ack.await.unwrap();
    assert_eq!(pair.crd.counters().active_count(), 0);
}

#[tokio::test]
async fn test_commit_ack_to_departed_coordinator_succeeds() {
    let pair = Pair::new();
    pair.net.remove(&pair.crd_node.id);

    let mut ack = task::spawn(pair.req.ack_tx_commit(&pair.crd_node, tx(1)));
    assert_ready_ok!(ack.poll());
    assert_eq!(pair.req.pending_acks(), 0);
    assert_eq!(pair.net.queued(), 0);
}

#[tokio::test]
async fn test_commit_ack_generic_send_failure_fails_future() {
    let pair = Pair::new();
    pair.net.break_link(&pair.crd_node.id);

    let mut ack = task::spawn(pair.req.ack_tx_commit(&pair.crd_node, tx(1)));
    let err = assert_ready_err!(ack.poll());
    assert!(matches!(err, Error::SendFailed { .. }));
    assert_eq!(pair.req.pending_acks(), 0);
}

#[tokio::test]
async fn test_counter_request_send_failure_is_synchronous() {
    let pair = Pair::new();
    pair.net.break_link(&pair.crd_node.id);

    let mut fut = task::spawn(pair.req.request_tx_counter(&pair.crd_node, tx(1)));
    let err = assert_ready_err!(fut.poll());
    assert!(matches!(err, Error::SendFailed { .. }));
    assert_eq!(pair.req.pending_counter_requests(), 0);
    assert_eq!(pair.req.metrics().send_failures.get(), 1);
}

#[tokio::test]
async fn test_counter_request_to_departed_coordinator_fails_with_topology_error() {
    let pair = Pair::new();
    pair.net.remove(&pair.crd_node.id);

    let mut fut = task::spawn(pair.req.request_query_counter(&pair.crd_node));
    let err = assert_ready_err!(fut.poll());
    assert!(err.is_topology());
    assert_eq!(pair.req.pending_counter_requests(), 0);
}

#[tokio::test]
async fn test_rollback_ack_never_raises() {
    let pair = Pair::new();

    let counter = pair.req.request_tx_counter(&pair.crd_node, tx(1));
    pair.pump();
    counter.await.unwrap();

    pair.req.ack_tx_rollback(&pair.crd_node, tx(1));
    let sent = pair.net.pop().unwrap();
    assert_eq!(
        sent.message(),
        CoordinatorMessage::TxAckRequest {
            future_id: NO_FUTURE,
            tx_id: tx(1),
            skip_response: true
        }
    );
    pair.crd.on_message(&sent.from, &sent.payload);
    assert_eq!(pair.crd.counters().active_count(), 0);
    // No response for a rollback ack
    assert_eq!(pair.net.queued(), 0);

    pair.net.break_link(&pair.crd_node.id);
    pair.req.ack_tx_rollback(&pair.crd_node, tx(2));

    pair.net.remove(&pair.crd_node.id);
    pair.req.ack_tx_rollback(&pair.crd_node, tx(3));
    assert_eq!(pair.req.pending_acks(), 0);
}

#[tokio::test]
async fn test_duplicate_tx_registration_gets_no_response() {
    let pair = Pair::new();

    let first = pair.req.request_tx_counter(&pair.crd_node, tx(1));
    pair.pump();
    assert_eq!(first.await.unwrap(), 1);

    let second = pair.req.request_tx_counter(&pair.crd_node, tx(1));
    pair.pump();

    let mut second = task::spawn(second);
    assert_pending!(second.poll());
    assert_eq!(pair.crd.counters().current(), 1);
    assert_eq!(pair.crd.metrics().protocol_violations.get(), 1);
}

#[tokio::test]
async fn test_coordinator_ignores_requests_from_departed_nodes() {
    let pair = Pair::new();

    let fut = pair.req.request_tx_counter(&pair.crd_node, tx(1));
    pair.net.remove(&pair.req_node.id);
    pair.pump();

    assert_eq!(pair.crd.counters().current(), 0);
    assert_eq!(pair.crd.counters().active_count(), 0);
    assert_eq!(pair.net.queued(), 0);
    drop(fut);
}

#[tokio::test]
async fn test_unmatched_response_is_ignored() {
    let pair = Pair::new();

    let stray = CoordinatorMessage::CounterResponse {
        future_id: 987_654_321,
        counter: 5,
    }
    .encode()
    .unwrap();
    pair.req.on_message(&pair.crd_node.id, &stray);

    let stray_ack = CoordinatorMessage::TxAckResponse {
        future_id: 987_654_322,
    }
    .encode()
    .unwrap();
    pair.req.on_message(&pair.crd_node.id, &stray_ack);

    assert_eq!(pair.req.metrics().unmatched_responses.get(), 2);
    assert_eq!(pair.req.pending_counter_requests(), 0);
}

#[tokio::test]
async fn test_garbage_payload_dropped() {
    let pair = Pair::new();

    pair.crd.on_message(&pair.req_node.id, &[0xff, 0xff, 0xff, 0xff, 0x01]);
    pair.crd.on_message(&pair.req_node.id, &[]);

    assert_eq!(pair.crd.metrics().dropped_messages.get(), 2);
    assert_eq!(pair.net.queued(), 0);
}

#[tokio::test]
async fn test_requester_can_be_its_own_coordinator() {
    let net = MockNet::new();
    let node = net.add_server();
    let manager = net.manager(&node, ProtocolConfig::default());

    let crd = assign_coordinator(&net.topology()).unwrap();
    assert_eq!(crd.id, node.id);

    let fut = manager.request_tx_counter(&crd, tx(1));
    net.pump(&[&manager]);
    assert_eq!(fut.await.unwrap(), 1);
}

#[tokio::test]
async fn test_rejected_duplicate_request_released_after_caller_timeout() {
    let pair = Pair::new();

    let first = pair.req.request_tx_counter(&pair.crd_node, tx(1));
    pair.pump();
    assert_eq!(first.await.unwrap(), 1);

    let duplicate = pair.req.request_tx_counter(&pair.crd_node, tx(1));
    pair.pump();
    assert_eq!(pair.req.pending_counter_requests(), 1);

    assert!(tokio::time::timeout(Duration::from_millis(1), duplicate)
        .await
        .is_err());
    assert_eq!(pair.req.pending_counter_requests(), 0);
    assert_eq!(pair.req.abandoned_futures(), 1);
}

#[tokio::test]
async fn test_every_registered_future_is_accounted_for() {
    let pair = Pair::new();

    // Answered
    let answered = pair.req.request_tx_counter(&pair.crd_node, tx(1));
    pair.pump();
    answered.await.unwrap();

    // Abandoned
    let abandoned = pair.req.request_query_counter(&pair.crd_node);
    pair.net.drain();
    drop(abandoned);

    // Still waiting
    let waiting = pair.req.ack_tx_commit(&pair.crd_node, tx(1));
    pair.net.drain();

    // Failed at send time
    pair.net.break_link(&pair.crd_node.id);
    assert!(pair.req.request_tx_counter(&pair.crd_node, tx(2)).await.is_err());

    // Implicit ack from a departed coordinator
    pair.net.remove(&pair.crd_node.id);
    pair.req.ack_tx_commit(&pair.crd_node, tx(3)).await.unwrap();

    let metrics = pair.req.metrics();
    assert_eq!(metrics.futures_registered.get(), 5);
    assert_eq!(metrics.futures_completed.get(), 3);
    assert_eq!(metrics.futures_cancelled.get(), 0);
    assert_eq!(pair.req.abandoned_futures(), 1);
    assert_eq!(pair.req.pending_acks(), 1);
    assert_eq!(
        metrics.futures_registered.get(),
        metrics.futures_completed.get()
            + metrics.futures_cancelled.get()
            + pair.req.abandoned_futures()
            + (pair.req.pending_acks() + pair.req.pending_counter_requests()) as u64
    );

    let text = pair.req.render_metrics();
    assert!(text.contains("mvcc_futures_abandoned 1"));
    assert!(text.contains("mvcc_pending_futures 1"));
    drop(waiting);
}
