//! Coordinator election
//!
//! No voting: every node applies the same pick to its own topology view.
//! Agreement relies on the membership service delivering snapshots to all
//! nodes in one total order. Callers re-run the pick on each topology change.

use crate::cluster::{ClusterNode, TopologySnapshot};

/// First server node in canonical order, or `None` when there is none.
pub fn assign_coordinator(topology: &TopologySnapshot) -> Option<ClusterNode> {
    topology.server_nodes().next().cloned()
}
