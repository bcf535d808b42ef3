//! Pending request futures
//!
//! A [`PendingTable`] maps future ids to the coordinator the request was sent
//! to and a oneshot completion handle. Every completion path (response, send
//! failure, coordinator loss) first removes the entry; only the caller that
//! wins the removal completes the future, so each future completes once.
//!
//! A [`CoordinatorFuture`] dropped before completion (caller timed out or
//! gave up) removes its own entry, so the tables only hold requests someone
//! is still waiting on.

use super::types::{next_future_id, FutureId};
use crate::cluster::NodeId;
use crate::common::{Error, Result};
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::oneshot;

/// Handle to a request awaiting its coordinator's answer
pub struct CoordinatorFuture<T> {
    id: FutureId,
    rx: oneshot::Receiver<Result<T>>,
    table: Weak<Shared<T>>,
}

impl<T> CoordinatorFuture<T> {
    pub fn id(&self) -> FutureId {
        self.id
    }
}

impl<T> Future for CoordinatorFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.rx).poll(cx).map(|res| {
            res.unwrap_or_else(|_| {
                Err(Error::Internal(format!(
                    "future {} dropped without completion",
                    id
                )))
            })
        })
    }
}

impl<T> Drop for CoordinatorFuture<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.table.upgrade() {
            if shared.entries.remove(&self.id).is_some() {
                shared.abandoned.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl<T> std::fmt::Debug for CoordinatorFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorFuture")
            .field("id", &self.id)
            .finish()
    }
}

/// Entry owned by the table until completion
#[derive(Debug)]
pub struct Pending<T> {
    coordinator: NodeId,
    issued_at: Instant,
    tx: oneshot::Sender<Result<T>>,
}

impl<T> Pending<T> {
    pub fn coordinator(&self) -> &NodeId {
        &self.coordinator
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// Complete the future. A caller that stopped waiting is not an error.
    pub fn complete(self, result: Result<T>) {
        let _ = self.tx.send(result);
    }
}

#[derive(Debug)]
struct Shared<T> {
    entries: DashMap<FutureId, Pending<T>>,
    /// Entries removed because their future was dropped first
    abandoned: AtomicU64,
}

/// Concurrent map of outstanding requests
#[derive(Debug)]
pub struct PendingTable<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Default for PendingTable<T> {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: DashMap::new(),
                abandoned: AtomicU64::new(0),
            }),
        }
    }
}

impl<T> PendingTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request sent to `coordinator`. The entry is inserted before
    /// the caller sends, so a fast response always finds it.
    pub fn register(&self, coordinator: NodeId) -> CoordinatorFuture<T> {
        let id = next_future_id();
        let (tx, rx) = oneshot::channel();
        self.shared.entries.insert(
            id,
            Pending {
                coordinator,
                issued_at: Instant::now(),
                tx,
            },
        );
        CoordinatorFuture {
            id,
            rx,
            table: Arc::downgrade(&self.shared),
        }
    }

    /// Atomically take ownership of a pending entry
    pub fn take(&self, id: FutureId) -> Option<Pending<T>> {
        self.shared.entries.remove(&id).map(|(_, pending)| pending)
    }

    /// Remove and complete `id`. Returns false if someone else already did.
    pub fn complete(&self, id: FutureId, result: Result<T>) -> bool {
        match self.take(id) {
            Some(pending) => {
                pending.complete(result);
                true
            }
            None => false,
        }
    }

    /// Remove and complete every future targeting `coordinator`.
    ///
    /// Each id is removed individually, so a response racing with this scan
    /// either completes the future first (and the scan skips it) or finds
    /// nothing.
    pub fn complete_all_for(
        &self,
        coordinator: &NodeId,
        mut result: impl FnMut() -> Result<T>,
    ) -> usize {
        self.ids_for(coordinator)
            .into_iter()
            .filter(|id| self.complete(*id, result()))
            .count()
    }

    /// Remove and complete every future whose coordinator fails `alive`
    pub fn complete_all_where_gone(
        &self,
        alive: impl Fn(&NodeId) -> bool,
        mut result: impl FnMut(&NodeId) -> Result<T>,
    ) -> usize {
        let gone: Vec<(FutureId, NodeId)> = self
            .shared
            .entries
            .iter()
            .filter(|e| !alive(&e.coordinator))
            .map(|e| (*e.key(), e.coordinator))
            .collect();

        gone.into_iter()
            .filter(|(id, node)| self.complete(*id, result(node)))
            .count()
    }

    fn ids_for(&self, coordinator: &NodeId) -> Vec<FutureId> {
        self.shared
            .entries
            .iter()
            .filter(|e| e.coordinator == *coordinator)
            .map(|e| *e.key())
            .collect()
    }

    pub fn count_for(&self, coordinator: &NodeId) -> usize {
        self.shared
            .entries
            .iter()
            .filter(|e| e.coordinator == *coordinator)
            .count()
    }

    pub fn contains(&self, id: FutureId) -> bool {
        self.shared.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    /// Futures dropped by their caller while still pending
    pub fn abandoned(&self) -> u64 {
        self.shared.abandoned.load(Ordering::Relaxed)
    }
}
