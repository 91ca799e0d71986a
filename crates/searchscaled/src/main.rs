//! searchscaled: the searchscale daemon.
//!
//! Runs on every node of an OpenSearch cluster. Only the process co-located
//! with the elected cluster manager makes scaling decisions; the others
//! watch for a leadership change and resume any operation the previous
//! leader left unfinished.
//!
//! # Usage
//!
//! ```text
//! searchscaled run --config config.yaml
//! searchscaled run --config config.yaml --state-db /var/lib/searchscale/state.redb
//! searchscaled check --config config.yaml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use searchscale_control::OpenSearchComponents;
use searchscale_core::{ConfigSource, FileConfigSource, MonitorMode};

#[derive(Parser)]
#[command(name = "searchscaled", about = "OpenSearch autoscaling daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the main and recovery loops until interrupted.
    Run {
        /// Path to the YAML configuration file.
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,

        /// Initial node count of the simulated cloud.
        #[arg(long, default_value = "3")]
        simulated_nodes: u32,

        /// Keep the Operation State in this local redb file instead of the
        /// OpenSearch index. For single-process deployments.
        #[arg(long)]
        state_db: Option<PathBuf>,
    },
    /// Validate a configuration file and print the state document key.
    Check {
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,searchscaled=debug,searchscale_control=debug".into());
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Command::Run {
            config,
            simulated_nodes,
            state_db,
        } => run(config, simulated_nodes, state_db).await,
        Command::Check { config } => check(config),
    }
}

async fn run(
    config: PathBuf,
    simulated_nodes: u32,
    state_db: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!(config = %config.display(), "searchscale daemon starting");

    let source: Arc<dyn ConfigSource> = Arc::new(FileConfigSource::new(config));
    let factory = OpenSearchComponents {
        simulated_nodes,
        state_db,
    };
    let daemon = searchscale_control::initialize(source.clone(), &factory).await?;

    if source.load()?.user_config.monitor_mode() == MonitorMode::Live {
        info!("live monitoring: rules read statistics written by the external collector");
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            // Keep the sender alive so the loops are not told to stop.
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // ── Control loops ──────────────────────────────────────────

    searchscale_control::run(daemon, shutdown_rx).await?;

    info!("searchscale daemon stopped");
    Ok(())
}

fn check(config: PathBuf) -> anyhow::Result<()> {
    let loaded = FileConfigSource::new(&config).load()?;
    let cluster = loaded.cluster_details.cluster_id();
    println!("config ok: {}", config.display());
    println!("cluster:   {cluster}");
    println!("state key: {}", searchscale_state::document_key(cluster));
    println!("tasks:     {}", loaded.task_details.len());
    Ok(())
}
