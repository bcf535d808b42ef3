//! Coordinator protocol messages
//!
//! All traffic travels over [`COORDINATOR_CHANNEL`]. Requests carry a future
//! id chosen by the requester; the coordinator echoes it back so the
//! requester can correlate the response. Rollback acks and query acks expect
//! no response.

use super::types::{FutureId, MvccCounter, TxId};
use crate::common::Result;
use serde::{Deserialize, Serialize};

/// Logical channel name used for coordinator traffic
pub const COORDINATOR_CHANNEL: &str = "mvcc.coordinator";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinatorMessage {
    /// Requester → coordinator: assign a counter to a new transaction
    TxCounterRequest { future_id: FutureId, tx_id: TxId },

    /// Requester → coordinator: snapshot boundary for a query
    QueryCounterRequest { future_id: FutureId },

    /// Coordinator → requester: answer to either counter request
    CounterResponse {
        future_id: FutureId,
        counter: MvccCounter,
    },

    /// Requester → coordinator: transaction finished
    TxAckRequest {
        future_id: FutureId,
        tx_id: TxId,
        skip_response: bool,
    },

    /// Coordinator → requester: commit ack processed
    TxAckResponse { future_id: FutureId },

    /// Requester → coordinator: query finished, no response
    QueryAckRequest { counter: MvccCounter },
}

impl CoordinatorMessage {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorMessage::TxCounterRequest { .. } => "TxCounterRequest",
            CoordinatorMessage::QueryCounterRequest { .. } => "QueryCounterRequest",
            CoordinatorMessage::CounterResponse { .. } => "CounterResponse",
            CoordinatorMessage::TxAckRequest { .. } => "TxAckRequest",
            CoordinatorMessage::TxAckResponse { .. } => "TxAckResponse",
            CoordinatorMessage::QueryAckRequest { .. } => "QueryAckRequest",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
