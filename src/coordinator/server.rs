//! Node runtime: wires a manager to its inbox and membership events

use super::dispatch::spawn_dispatcher;
use super::listener::spawn_failure_listener;
use super::manager::MvccManager;
use crate::cluster::{Envelope, MembershipEvent};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

pub struct MvccService {
    manager: Arc<MvccManager>,
    dispatcher: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl MvccService {
    /// Spawn the dispatcher and failure listener tasks for one node
    pub fn start(
        manager: Arc<MvccManager>,
        inbox: mpsc::UnboundedReceiver<Envelope>,
        events: broadcast::Receiver<MembershipEvent>,
    ) -> Self {
        tracing::info!("Starting MVCC coordinator service: {}", manager.local_node());

        let dispatcher = spawn_dispatcher(Arc::clone(&manager), inbox);
        let listener = spawn_failure_listener(Arc::clone(&manager), events);

        Self {
            manager,
            dispatcher,
            listener,
        }
    }

    pub fn manager(&self) -> &Arc<MvccManager> {
        &self.manager
    }

    /// Stop both tasks. Futures still pending stay pending.
    pub fn shutdown(self) {
        tracing::info!("Stopping MVCC coordinator service: {}", self.manager.local_node());
        self.dispatcher.abort();
        self.listener.abort();
    }
}
