//! hostgridd — the hostgrid scheduler CLI.
//!
//! Drives the filter scheduler against a local redb record store:
//! - registers compute nodes, service heartbeats and instances
//! - schedules batches and resize-free host selections
//! - gates live migrations
//!
//! Dispatch goes to `LogDispatch`, so every message the scheduler would
//! send to a compute host is logged rather than delivered.
//!
//! # Usage
//!
//! ```text
//! hostgridd --db /var/lib/hostgrid/hostgrid.redb host add compute1 --memory-mb 8192 --vcpus 8 --disk-gb 200
//! hostgridd service heartbeat compute1
//! hostgridd schedule --request request.json --group web
//! ```

mod inventory;
mod scheduling;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hostgrid_core::SchedulerConfig;
use hostgrid_state::StateStore;
use tracing::info;

#[derive(Parser)]
#[command(name = "hostgridd", about = "hostgrid VM placement scheduler")]
struct Cli {
    /// Record store path.
    #[arg(long, global = true, default_value = "hostgrid.redb")]
    db: PathBuf,

    /// Scheduler configuration (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage compute node capacity records.
    Host {
        #[command(subcommand)]
        command: inventory::HostCommand,
    },
    /// Manage compute service records.
    Service {
        #[command(subcommand)]
        command: inventory::ServiceCommand,
    },
    /// Manage instance records.
    Instance {
        #[command(subcommand)]
        command: inventory::InstanceCommand,
    },
    /// Place a batch and dispatch every placed instance.
    Schedule(scheduling::RequestArgs),
    /// Choose hosts for a batch without dispatching.
    SelectHosts(scheduling::RequestArgs),
    /// Check and start a live migration.
    LiveMigrate {
        /// Instance to move.
        uuid: String,
        /// Destination host.
        dest: String,
        #[arg(long)]
        block_migration: bool,
        #[arg(long)]
        disk_over_commit: bool,
    },
    /// Print the effective scheduler configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hostgridd=debug,hostgrid=debug")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SchedulerConfig::from_file(path)?,
        None => SchedulerConfig::default(),
    };

    if let Command::Config = cli.command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    if let Some(parent) = cli.db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let store = StateStore::open(&cli.db)?;
    info!(path = ?cli.db, "record store opened");

    match cli.command {
        Command::Host { command } => inventory::host(&store, command),
        Command::Service { command } => inventory::service(&store, command),
        Command::Instance { command } => inventory::instance(&store, command),
        Command::Schedule(args) => scheduling::schedule(store, config, args).await,
        Command::SelectHosts(args) => scheduling::select_hosts(store, config, args),
        Command::LiveMigrate {
            uuid,
            dest,
            block_migration,
            disk_over_commit,
        } => {
            scheduling::live_migrate(store, config, &uuid, &dest, block_migration, disk_over_commit)
                .await
        }
        Command::Config => Ok(()),
    }
}
