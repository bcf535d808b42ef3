//! MVCC counter coordinator
//!
//! The coordinator is responsible for:
//! - Electing the counter authority from a topology snapshot
//! - Assigning strictly increasing MVCC counters to transactions
//! - Tracking active transactions until they are acknowledged
//! - Correlating responses with pending request futures
//! - Cancelling requests whose coordinator left the cluster

pub mod counters;
pub mod dispatch;
pub mod election;
pub mod futures;
pub mod listener;
pub mod manager;
pub mod messages;
pub mod protocol;
pub mod server;
pub mod types;

pub use counters::CounterService;
pub use election::assign_coordinator;
pub use futures::{CoordinatorFuture, PendingTable};
pub use manager::MvccManager;
pub use messages::{CoordinatorMessage, COORDINATOR_CHANNEL};
pub use protocol::{AckFuture, CounterFuture};
pub use server::MvccService;
pub use types::{next_future_id, FutureId, MvccCounter, TxId, TxIdGenerator, NO_FUTURE};
