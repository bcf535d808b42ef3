//! mvcc-coord binary

use clap::{Parser, Subcommand};
use mvcc_coord::cluster::Membership;
use mvcc_coord::common::{parse_duration, Config};
use mvcc_coord::simulation::Simulation;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mvcc-coord")]
#[command(about = "MVCC counter coordinator", version = mvcc_coord::VERSION)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = mvcc_coord::common::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run transactions against an in-process cluster
    Simulate {
        /// Total nodes
        #[arg(long)]
        nodes: Option<usize>,

        /// Client nodes (never elected coordinator)
        #[arg(long)]
        clients: Option<usize>,

        /// Transactions to run
        #[arg(long)]
        transactions: Option<usize>,

        /// Fraction of transactions rolled back
        #[arg(long)]
        rollback_ratio: Option<f64>,

        /// Fail the coordinator after this many transactions
        #[arg(long)]
        fail_coordinator_after: Option<usize>,

        /// Give up waiting on a counter or commit ack after this long
        #[arg(long, default_value = "5s")]
        ack_timeout: String,

        /// Print Prometheus metrics of every node when done
        #[arg(long)]
        metrics: bool,
    },

    /// Print the effective configuration as JSON
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load_from(&cli.config)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Simulate {
            nodes,
            clients,
            transactions,
            rollback_ratio,
            fail_coordinator_after,
            ack_timeout,
            metrics,
        } => {
            // CLI has priority over file and environment
            let sim = &mut config.simulation;
            if let Some(nodes) = nodes {
                sim.nodes = nodes;
            }
            if let Some(clients) = clients {
                sim.client_nodes = clients;
            }
            if let Some(transactions) = transactions {
                sim.transactions = transactions;
            }
            if let Some(ratio) = rollback_ratio {
                sim.rollback_ratio = ratio;
            }
            if fail_coordinator_after.is_some() {
                sim.fail_coordinator_after = fail_coordinator_after;
            }
            let ack_timeout = parse_duration(&ack_timeout)?;

            tracing::info!(
                "Starting simulation: {} nodes ({} clients), {} transactions",
                config.simulation.nodes,
                config.simulation.client_nodes,
                config.simulation.transactions
            );

            let simulation = Simulation::start(&config, ack_timeout)?;
            let report = simulation.run().await?;

            tracing::info!(
                "Simulation finished in {:?}: {} committed, {} rolled back, {} ack timeouts, {} aborted, {} failed",
                report.elapsed,
                report.committed,
                report.rolled_back,
                report.ack_timeouts,
                report.aborted,
                report.failed
            );
            if let Some(node) = report.failed_coordinator {
                tracing::info!("Failed coordinator: {}", node);
            }
            for (crd, counters) in &report.counters {
                let max = counters.iter().max().copied().unwrap_or_default();
                tracing::info!(
                    "Coordinator {} issued {} counters (max {})",
                    crd,
                    counters.len(),
                    max
                );
            }

            if metrics {
                for node in simulation.cluster().topology().nodes() {
                    if let Some(manager) = simulation.manager(&node.id) {
                        println!("# node {}", node.id);
                        print!("{}", manager.render_metrics());
                    }
                }
            }

            simulation.shutdown();
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
