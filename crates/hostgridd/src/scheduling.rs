//! Scheduling subcommands, run against the redb-backed collaborators.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use hostgrid_core::{Instance, RequestSpec, SchedulerConfig};
use hostgrid_placement::RequestContext;
use hostgrid_scheduler::{FilterScheduler, LogDispatch, SchedulerError, StoreBackend};
use hostgrid_state::StateStore;
use tracing::{info, warn};

#[derive(Args)]
pub struct RequestArgs {
    /// Request spec as JSON.
    #[arg(long)]
    request: PathBuf,
    /// Anti-affinity group hint.
    #[arg(long)]
    group: Option<String>,
}

impl RequestArgs {
    fn load(&self) -> anyhow::Result<(RequestContext, RequestSpec)> {
        let raw = std::fs::read_to_string(&self.request)
            .with_context(|| format!("reading {}", self.request.display()))?;
        let spec: RequestSpec = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.request.display()))?;
        let ctx = match &self.group {
            Some(group) => RequestContext::with_group(group.clone()),
            None => RequestContext::default(),
        };
        Ok((ctx, spec))
    }
}

fn build(
    store: StateStore,
    config: SchedulerConfig,
) -> anyhow::Result<FilterScheduler<StoreBackend, LogDispatch>> {
    let backend = StoreBackend::new(store, config.service_down_time_secs);
    Ok(FilterScheduler::new(config, backend, LogDispatch::new())?)
}

pub async fn schedule(
    store: StateStore,
    config: SchedulerConfig,
    args: RequestArgs,
) -> anyhow::Result<()> {
    let (mut ctx, spec) = args.load()?;
    let scheduler = build(store, config)?;

    match scheduler.schedule_run_instance(&mut ctx, &spec).await {
        Ok(placed) => {
            let hosts: Vec<_> = placed.iter().map(|w| w.host.key().to_string()).collect();
            info!(count = hosts.len(), "batch scheduled");
            println!("{}", serde_json::to_string_pretty(&hosts)?);
            Ok(())
        }
        Err(SchedulerError::NoValidHost {
            reason,
            unplaced,
            placed,
        }) => {
            warn!(placed = placed.len(), ?unplaced, "batch partially scheduled");
            anyhow::bail!("no valid host was found: {reason} (unplaced: {unplaced:?})")
        }
        Err(other) => Err(other.into()),
    }
}

pub fn select_hosts(
    store: StateStore,
    config: SchedulerConfig,
    args: RequestArgs,
) -> anyhow::Result<()> {
    let (mut ctx, spec) = args.load()?;
    let scheduler = build(store, config)?;
    let hosts = scheduler.select_hosts(&mut ctx, &spec)?;
    println!("{}", serde_json::to_string_pretty(&hosts)?);
    Ok(())
}

pub async fn live_migrate(
    store: StateStore,
    config: SchedulerConfig,
    uuid: &str,
    dest: &str,
    block_migration: bool,
    disk_over_commit: bool,
) -> anyhow::Result<()> {
    let record = store
        .get_instance(uuid)?
        .with_context(|| format!("instance {uuid} not found"))?;
    let host = record
        .host
        .clone()
        .with_context(|| format!("instance {uuid} is not running on any host"))?;
    let instance = Instance {
        uuid: record.uuid,
        host,
        node: record.node,
        memory_mb: record.memory_mb,
        vcpus: record.vcpus,
    };

    let scheduler = build(store, config)?;
    scheduler
        .schedule_live_migration(&instance, dest, block_migration, disk_over_commit)
        .await?;
    println!("live migration of {uuid} to {dest} started");
    Ok(())
}
