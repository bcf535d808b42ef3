//! Local cluster simulation
//!
//! Runs a [`LocalCluster`] with one [`MvccService`] per node and drives
//! concurrent transactions through the full protocol: elect, request a
//! counter, then commit or roll back. Optionally fails the elected
//! coordinator part way through so in-flight requests exercise cancellation
//! and re-election.

use crate::cluster::{ClusterNode, LocalCluster, Membership, NodeId};
use crate::common::{retry_with_backoff, Config, Error, Result, SimulationConfig};
use crate::coordinator::{assign_coordinator, MvccCounter, MvccManager, MvccService, TxIdGenerator};
use futures_util::future::join_all;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Attempts per counter request (re-electing between attempts)
const COUNTER_ATTEMPTS: usize = 5;
const RETRY_DELAY: Duration = Duration::from_millis(5);

struct SimNode {
    node: ClusterNode,
    service: MvccService,
    tx_ids: TxIdGenerator,
}

/// How one transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Committed,
    RolledBack,
    CommitAckTimedOut,
}

/// Summary of a simulation run
#[derive(Debug, Default)]
pub struct SimulationReport {
    pub committed: usize,
    pub rolled_back: usize,
    pub ack_timeouts: usize,
    /// Transactions abandoned because their requesting node left
    pub aborted: usize,
    pub failed: usize,
    /// Counters assigned, grouped by the coordinator that issued them
    pub counters: HashMap<NodeId, Vec<MvccCounter>>,
    pub failed_coordinator: Option<NodeId>,
    pub elapsed: Duration,
}

impl SimulationReport {
    pub fn total(&self) -> usize {
        self.committed + self.rolled_back + self.ack_timeouts + self.aborted + self.failed
    }
}

pub struct Simulation {
    cluster: Arc<LocalCluster>,
    nodes: Vec<SimNode>,
    config: SimulationConfig,
    ack_timeout: Duration,
}

impl Simulation {
    /// Build the cluster and start every node. Requires a tokio runtime.
    pub fn start(config: &Config, ack_timeout: Duration) -> Result<Self> {
        config.validate()?;
        let sim = config.simulation.clone();
        let cluster = LocalCluster::new();

        let nodes = (0..sim.nodes)
            .map(|i| {
                // Clients join first so election has to skip them
                let (node, inbox) = if i < sim.client_nodes {
                    cluster.join_client()
                } else {
                    cluster.join_server()
                };
                let manager = Arc::new(MvccManager::new(
                    node.id,
                    Arc::new(cluster.transport(node.id)),
                    cluster.clone(),
                    config.protocol.clone(),
                ));
                let service = MvccService::start(manager, inbox, cluster.subscribe());
                SimNode {
                    tx_ids: TxIdGenerator::new(node.order),
                    node,
                    service,
                }
            })
            .collect();

        Ok(Self {
            cluster,
            nodes,
            config: sim,
            ack_timeout,
        })
    }

    pub fn cluster(&self) -> &Arc<LocalCluster> {
        &self.cluster
    }

    pub fn manager(&self, node: &NodeId) -> Option<&Arc<MvccManager>> {
        self.nodes
            .iter()
            .find(|n| n.node.id == *node)
            .map(|n| n.service.manager())
    }

    /// Run all configured transactions concurrently
    pub async fn run(&self) -> Result<SimulationReport> {
        let started = Instant::now();
        let completed = AtomicUsize::new(0);
        let failed_coordinator = std::sync::Mutex::new(None);

        let rollbacks: Vec<bool> = {
            let mut rng = rand::thread_rng();
            (0..self.config.transactions)
                .map(|_| rng.gen_bool(self.config.rollback_ratio))
                .collect()
        };

        let runs = rollbacks.iter().enumerate().map(|(i, &rollback)| {
            let completed = &completed;
            let failed_coordinator = &failed_coordinator;
            async move {
                let result = self.run_transaction(i, rollback).await;

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if Some(done) == self.config.fail_coordinator_after {
                    if let Some(crd) = assign_coordinator(&self.cluster.topology()) {
                        tracing::info!("Failing coordinator {} after {} transactions", crd.id, done);
                        self.cluster.fail(&crd.id);
                        if let Ok(mut slot) = failed_coordinator.lock() {
                            *slot = Some(crd.id);
                        }
                    }
                }
                result
            }
        });

        let results = join_all(runs).await;

        let mut report = SimulationReport {
            failed_coordinator: failed_coordinator.into_inner().ok().flatten(),
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(None) => report.aborted += 1,
                Ok(Some((crd, counter, outcome))) => {
                    report.counters.entry(crd).or_default().push(counter);
                    match outcome {
                        TxOutcome::Committed => report.committed += 1,
                        TxOutcome::RolledBack => report.rolled_back += 1,
                        TxOutcome::CommitAckTimedOut => report.ack_timeouts += 1,
                    }
                }
                Err(e) => {
                    tracing::warn!("Transaction failed: {}", e);
                    report.failed += 1;
                }
            }
        }
        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Returns `None` when the requesting node itself left mid-transaction.
    async fn run_transaction(
        &self,
        seq: usize,
        rollback: bool,
    ) -> Result<Option<(NodeId, MvccCounter, TxOutcome)>> {
        let requester = self.pick_requester(seq)?;
        let manager = requester.service.manager();
        let requester_alive = || self.cluster.is_alive(&requester.node.id);

        let assigned = retry_with_backoff(
            || {
                let topology = self.cluster.topology();
                let tx_id = requester.tx_ids.next(topology.version);
                async move {
                    if !requester_alive() {
                        return Err(Error::NodeLeft(requester.node.id));
                    }
                    let crd = assign_coordinator(&topology)
                        .ok_or_else(|| Error::Internal("no server node to coordinate".into()))?;
                    let counter = tokio::time::timeout(
                        self.ack_timeout,
                        manager.request_tx_counter(&crd, tx_id),
                    )
                    .await
                    .map_err(|_| Error::Timeout(format!("counter request for {}", tx_id)))??;
                    Ok::<_, Error>((crd, tx_id, counter))
                }
            },
            COUNTER_ATTEMPTS,
            RETRY_DELAY,
        )
        .await;

        let (crd, tx_id, counter) = match assigned {
            Ok(assigned) => assigned,
            Err(_) if !requester_alive() => return Ok(None),
            Err(e) => return Err(e),
        };

        let outcome = if rollback {
            manager.ack_tx_rollback(&crd, tx_id);
            TxOutcome::RolledBack
        } else {
            match tokio::time::timeout(self.ack_timeout, manager.ack_tx_commit(&crd, tx_id)).await
            {
                Ok(res) => {
                    res?;
                    TxOutcome::Committed
                }
                Err(_) if !requester_alive() => return Ok(None),
                Err(_) => TxOutcome::CommitAckTimedOut,
            }
        };

        Ok(Some((crd.id, counter, outcome)))
    }

    /// Round-robin over nodes still in the cluster
    fn pick_requester(&self, seq: usize) -> Result<&SimNode> {
        let live: Vec<&SimNode> = self
            .nodes
            .iter()
            .filter(|n| self.cluster.is_alive(&n.node.id))
            .collect();
        if live.is_empty() {
            return Err(Error::Internal("no live nodes left".into()));
        }
        Ok(live[seq % live.len()])
    }

    pub fn shutdown(self) {
        for node in self.nodes {
            node.service.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn config(nodes: usize, clients: usize, transactions: usize) -> Config {
        let mut config = Config::default();
        config.simulation.nodes = nodes;
        config.simulation.client_nodes = clients;
        config.simulation.transactions = transactions;
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simulation_all_transactions_complete() {
        let sim = Simulation::start(&config(4, 1, 200), Duration::from_secs(5)).unwrap();
        let report = sim.run().await.unwrap();

        assert_eq!(report.total(), 200);
        assert_eq!(report.failed, 0);
        assert_eq!(report.ack_timeouts, 0);
        assert_eq!(report.counters.len(), 1);

        let counters: HashSet<_> = report.counters.values().flatten().copied().collect();
        assert_eq!(counters, (1..=200).collect());

        sim.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simulation_survives_coordinator_failure() {
        let mut config = config(3, 0, 300);
        config.simulation.fail_coordinator_after = Some(50);
        config.simulation.rollback_ratio = 0.0;

        let sim = Simulation::start(&config, Duration::from_secs(1)).unwrap();
        let report = sim.run().await.unwrap();

        assert_eq!(report.total(), 300);
        assert_eq!(report.failed, 0);
        assert_eq!(report.ack_timeouts, 0);
        let failed = report.failed_coordinator.expect("coordinator failed");
        assert!(!sim.cluster().is_alive(&failed));

        for (crd, counters) in &report.counters {
            let unique: HashSet<_> = counters.iter().collect();
            assert_eq!(unique.len(), counters.len(), "duplicate counters from {}", crd);
        }

        sim.shutdown();
    }
}
