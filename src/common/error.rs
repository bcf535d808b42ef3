//! Error types for mvcc-coord

use crate::cluster::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Topology Errors ===
    #[error("Topology changed: {reason} (node {node})")]
    Topology { node: NodeId, reason: String },

    #[error("Destination node left the cluster: {0}")]
    NodeLeft(NodeId),

    // === Protocol Errors ===
    #[error("Send failed to {node}: {reason}")]
    SendFailed { node: NodeId, reason: String },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Did this fail because a node is no longer part of the cluster?
    pub fn is_topology(&self) -> bool {
        matches!(self, Error::Topology { .. } | Error::NodeLeft(_))
    }

    /// Is this a retryable error?
    ///
    /// Topology failures are retried against a freshly elected coordinator.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Topology { .. } | Error::NodeLeft(_) | Error::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_classification() {
        let node = NodeId::random();
        assert!(Error::NodeLeft(node).is_topology());
        assert!(Error::Topology {
            node,
            reason: "node failed".into()
        }
        .is_topology());
        assert!(!Error::SendFailed {
            node,
            reason: "queue closed".into()
        }
        .is_topology());
        assert!(!Error::ProtocolViolation("dup".into()).is_retryable());
        assert!(Error::Timeout("ack".into()).is_retryable());
    }

    #[test]
    fn test_converts_into_anyhow_at_binary_edge() {
        let node = NodeId::random();
        let err: anyhow::Error = Error::NodeLeft(node).into();
        assert!(err.to_string().contains(&node.to_string()));
        assert!(err.downcast_ref::<Error>().is_some_and(Error::is_topology));
    }
}
