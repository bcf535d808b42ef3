//! Shared harness: a hand-pumped network so tests control exactly when each
//! message is delivered.

#![allow(dead_code)]

use mvcc_coord::cluster::{ClusterNode, Membership, NodeId, TopologySnapshot, Transport};
use mvcc_coord::common::ProtocolConfig;
use mvcc_coord::coordinator::CoordinatorMessage;
use mvcc_coord::{Error, MvccManager, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct Sent {
    pub from: NodeId,
    pub to: NodeId,
    pub payload: Vec<u8>,
}

impl Sent {
    pub fn message(&self) -> CoordinatorMessage {
        CoordinatorMessage::decode(&self.payload).unwrap()
    }
}

#[derive(Default)]
struct NetState {
    nodes: Vec<ClusterNode>,
    alive: HashSet<NodeId>,
    broken: HashSet<NodeId>,
    queue: VecDeque<Sent>,
}

/// Membership plus an in-memory message queue
#[derive(Default)]
pub struct MockNet {
    state: Mutex<NetState>,
}

impl MockNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_server(&self) -> ClusterNode {
        let mut state = self.state.lock().unwrap();
        let node = ClusterNode::server(NodeId::random(), state.nodes.len() as u64 + 1);
        state.nodes.push(node.clone());
        state.alive.insert(node.id);
        node
    }

    /// Remove from membership; sends to it now fail with `NodeLeft`
    pub fn remove(&self, node: &NodeId) {
        let mut state = self.state.lock().unwrap();
        state.alive.remove(node);
        state.nodes.retain(|n| n.id != *node);
    }

    /// Sends to `node` fail with a non-topology error
    pub fn break_link(&self, node: &NodeId) {
        self.state.lock().unwrap().broken.insert(*node);
    }

    pub fn queued(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn pop(&self) -> Option<Sent> {
        self.state.lock().unwrap().queue.pop_front()
    }

    /// Drop everything queued without delivering
    pub fn drain(&self) -> Vec<Sent> {
        self.state.lock().unwrap().queue.drain(..).collect()
    }

    /// Deliver queued messages (and the replies they trigger) until quiet
    pub fn pump(&self, managers: &[&MvccManager]) -> usize {
        let by_id: HashMap<NodeId, &MvccManager> =
            managers.iter().map(|m| (*m.local_node(), *m)).collect();
        let mut delivered = 0;
        while let Some(sent) = self.pop() {
            if let Some(manager) = by_id.get(&sent.to) {
                manager.on_message(&sent.from, &sent.payload);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn transport(self: &Arc<Self>, from: NodeId) -> Arc<MockTransport> {
        Arc::new(MockTransport {
            from,
            net: Arc::clone(self),
        })
    }

    pub fn manager(self: &Arc<Self>, node: &ClusterNode, config: ProtocolConfig) -> MvccManager {
        MvccManager::new(node.id, self.transport(node.id), self.clone(), config)
    }
}

impl Membership for MockNet {
    fn is_alive(&self, node: &NodeId) -> bool {
        self.state.lock().unwrap().alive.contains(node)
    }

    fn topology(&self) -> TopologySnapshot {
        let state = self.state.lock().unwrap();
        TopologySnapshot::new(state.nodes.len() as u64, state.nodes.clone())
    }
}

pub struct MockTransport {
    from: NodeId,
    net: Arc<MockNet>,
}

impl Transport for MockTransport {
    fn send(&self, to: &NodeId, _channel: &'static str, payload: Vec<u8>) -> Result<()> {
        let mut state = self.net.state.lock().unwrap();
        if !state.alive.contains(to) {
            return Err(Error::NodeLeft(*to));
        }
        if state.broken.contains(to) {
            return Err(Error::SendFailed {
                node: *to,
                reason: "connection reset".into(),
            });
        }
        state.queue.push_back(Sent {
            from: self.from,
            to: *to,
            payload,
        });
        Ok(())
    }
}

/// Coordinator plus one requester on a fresh network
pub struct Pair {
    pub net: Arc<MockNet>,
    pub crd_node: ClusterNode,
    pub crd: MvccManager,
    pub req_node: ClusterNode,
    pub req: MvccManager,
}

impl Pair {
    pub fn new() -> Self {
        Self::with_config(ProtocolConfig::default())
    }

    pub fn with_config(config: ProtocolConfig) -> Self {
        let net = MockNet::new();
        let crd_node = net.add_server();
        let req_node = net.add_server();
        let crd = net.manager(&crd_node, config.clone());
        let req = net.manager(&req_node, config);
        Self {
            net,
            crd_node,
            crd,
            req_node,
            req,
        }
    }

    pub fn pump(&self) -> usize {
        self.net.pump(&[&self.crd, &self.req])
    }
}
