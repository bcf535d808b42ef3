//! In-process cluster
//!
//! Every member gets an unbounded inbox; sends are plain channel pushes so
//! they never block the caller. Departures bump the topology version and are
//! broadcast as [`MembershipEvent`]s after the member is removed, so any send
//! racing with the event already observes [`Error::NodeLeft`].

use super::{
    ClusterNode, Membership, MembershipEvent, MembershipEventKind, NodeId, TopologySnapshot,
    Transport,
};
use crate::common::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{broadcast, mpsc};

/// Capacity of the membership event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A message delivered to a member's inbox
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: NodeId,
    pub channel: &'static str,
    pub payload: Vec<u8>,
}

struct Member {
    node: ClusterNode,
    inbox: mpsc::UnboundedSender<Envelope>,
}

#[derive(Default)]
struct ClusterState {
    version: u64,
    next_order: u64,
    members: HashMap<NodeId, Member>,
}

/// In-process membership service and message fabric
pub struct LocalCluster {
    state: RwLock<ClusterState>,
    events: broadcast::Sender<MembershipEvent>,
}

impl LocalCluster {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            state: RwLock::new(ClusterState::default()),
            events,
        })
    }

    /// Join a server node (eligible as coordinator)
    pub fn join_server(&self) -> (ClusterNode, mpsc::UnboundedReceiver<Envelope>) {
        self.join(false)
    }

    /// Join a client node
    pub fn join_client(&self) -> (ClusterNode, mpsc::UnboundedReceiver<Envelope>) {
        self.join(true)
    }

    fn join(&self, client: bool) -> (ClusterNode, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        state.next_order += 1;
        state.version += 1;
        let node = ClusterNode {
            id: NodeId::random(),
            order: state.next_order,
            client,
        };
        state.members.insert(
            node.id,
            Member {
                node: node.clone(),
                inbox: tx,
            },
        );

        tracing::debug!(
            "Node {} joined (order={}, client={}, topology={})",
            node.id,
            node.order,
            client,
            state.version
        );
        (node, rx)
    }

    /// Graceful departure
    pub fn leave(&self, node: &NodeId) -> bool {
        self.depart(node, MembershipEventKind::NodeLeft)
    }

    /// Abrupt failure
    pub fn fail(&self, node: &NodeId) -> bool {
        self.depart(node, MembershipEventKind::NodeFailed)
    }

    fn depart(&self, node: &NodeId, kind: MembershipEventKind) -> bool {
        let topology_version = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if state.members.remove(node).is_none() {
                return false;
            }
            state.version += 1;
            state.version
        };

        tracing::info!("Node {} {} (topology={})", node, kind, topology_version);

        // No subscribers is fine
        let _ = self.events.send(MembershipEvent {
            kind,
            node: *node,
            topology_version,
        });
        true
    }

    /// Subscribe to node-left / node-failed events
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }

    /// Transport sending on behalf of `from`
    pub fn transport(self: &Arc<Self>, from: NodeId) -> LocalTransport {
        LocalTransport {
            from,
            cluster: Arc::clone(self),
        }
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .members
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Membership for LocalCluster {
    fn is_alive(&self, node: &NodeId) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .members
            .contains_key(node)
    }

    fn topology(&self) -> TopologySnapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let nodes = state.members.values().map(|m| m.node.clone()).collect();
        TopologySnapshot::new(state.version, nodes)
    }
}

/// [`Transport`] over a [`LocalCluster`]
#[derive(Clone)]
pub struct LocalTransport {
    from: NodeId,
    cluster: Arc<LocalCluster>,
}

impl Transport for LocalTransport {
    fn send(&self, to: &NodeId, channel: &'static str, payload: Vec<u8>) -> Result<()> {
        let state = self
            .cluster
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let member = state.members.get(to).ok_or(Error::NodeLeft(*to))?;

        member
            .inbox
            .send(Envelope {
                from: self.from,
                channel,
                payload,
            })
            .map_err(|_| Error::SendFailed {
                node: *to,
                reason: "inbox closed".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_topology() {
        let cluster = LocalCluster::new();
        let (a, _rx_a) = cluster.join_server();
        let (b, _rx_b) = cluster.join_client();

        let topology = cluster.topology();
        assert_eq!(topology.version, 2);
        assert_eq!(topology.nodes().len(), 2);
        assert_eq!(topology.nodes()[0].id, a.id);
        assert!(topology.nodes()[1].client);
        assert!(cluster.is_alive(&b.id));
    }

    #[test]
    fn test_send_delivers_envelope() {
        let cluster = LocalCluster::new();
        let (a, _rx_a) = cluster.join_server();
        let (b, mut rx_b) = cluster.join_server();

        cluster
            .transport(a.id)
            .send(&b.id, "test", vec![1, 2, 3])
            .unwrap();

        let envelope = rx_b.try_recv().unwrap();
        assert_eq!(envelope.from, a.id);
        assert_eq!(envelope.channel, "test");
        assert_eq!(envelope.payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_send_to_departed_node() {
        let cluster = LocalCluster::new();
        let (a, _rx_a) = cluster.join_server();
        let (b, _rx_b) = cluster.join_server();
        let mut events = cluster.subscribe();

        assert!(cluster.fail(&b.id));
        assert!(!cluster.fail(&b.id));

        let err = cluster
            .transport(a.id)
            .send(&b.id, "test", vec![])
            .unwrap_err();
        assert!(matches!(err, Error::NodeLeft(id) if id == b.id));

        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, MembershipEventKind::NodeFailed);
        assert_eq!(event.node, b.id);
        assert_eq!(event.topology_version, 3);
    }

    #[test]
    fn test_send_to_closed_inbox() {
        let cluster = LocalCluster::new();
        let (a, _rx_a) = cluster.join_server();
        let (b, rx_b) = cluster.join_server();
        drop(rx_b);

        let err = cluster
            .transport(a.id)
            .send(&b.id, "test", vec![])
            .unwrap_err();
        assert!(matches!(err, Error::SendFailed { .. }));
        assert!(!err.is_topology());
    }
}
