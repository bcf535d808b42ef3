//! Cluster collaborators
//!
//! The coordinator protocol does not track membership or move bytes itself.
//! It consumes:
//! - [`Membership`]: liveness checks and topology snapshots
//! - [`Transport`]: point-to-point sends over a named logical channel
//! - [`MembershipEvent`]s: node-left / node-failed notifications
//!
//! [`local::LocalCluster`] implements all three in-process.

pub mod local;

pub use local::{Envelope, LocalCluster, LocalTransport};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cluster-unique node identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A member of the cluster as seen in a topology snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: NodeId,
    /// Join order; defines the canonical order of a snapshot
    pub order: u64,
    /// Client nodes never act as coordinator
    pub client: bool,
}

impl ClusterNode {
    pub fn server(id: NodeId, order: u64) -> Self {
        Self {
            id,
            order,
            client: false,
        }
    }

    pub fn client(id: NodeId, order: u64) -> Self {
        Self {
            id,
            order,
            client: true,
        }
    }
}

/// Point-in-time view of cluster membership
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub version: u64,
    nodes: Vec<ClusterNode>,
}

impl TopologySnapshot {
    /// Build a snapshot; nodes are kept in canonical (join) order.
    pub fn new(version: u64, mut nodes: Vec<ClusterNode>) -> Self {
        nodes.sort_by_key(|n| n.order);
        Self { version, nodes }
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    /// Server nodes in canonical order
    pub fn server_nodes(&self) -> impl Iterator<Item = &ClusterNode> {
        self.nodes.iter().filter(|n| !n.client)
    }

    pub fn node(&self, id: &NodeId) -> Option<&ClusterNode> {
        self.nodes.iter().find(|n| n.id == *id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }
}

/// Kind of membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipEventKind {
    NodeLeft,
    NodeFailed,
}

impl std::fmt::Display for MembershipEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipEventKind::NodeLeft => write!(f, "left"),
            MembershipEventKind::NodeFailed => write!(f, "failed"),
        }
    }
}

/// A node departed the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipEvent {
    pub kind: MembershipEventKind,
    pub node: NodeId,
    /// Topology version after the departure
    pub topology_version: u64,
}

/// Membership / topology service
pub trait Membership: Send + Sync {
    /// Is the node still a live cluster member?
    fn is_alive(&self, node: &NodeId) -> bool;

    /// Current topology snapshot
    fn topology(&self) -> TopologySnapshot;
}

/// Messaging transport
///
/// `send` must not block. A destination that is no longer part of the
/// cluster is reported as [`crate::Error::NodeLeft`]; every other failure as
/// [`crate::Error::SendFailed`].
pub trait Transport: Send + Sync {
    fn send(&self, to: &NodeId, channel: &'static str, payload: Vec<u8>) -> crate::Result<()>;
}
