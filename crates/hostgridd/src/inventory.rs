//! Record management subcommands: compute nodes, services, instances.

use clap::Subcommand;
use hostgrid_state::{ComputeNodeRecord, InstanceRecord, ServiceRecord, StateStore, epoch_secs};
use tracing::info;

#[derive(Subcommand)]
pub enum HostCommand {
    /// Register or replace a compute node's capacity.
    Add {
        host: String,
        /// Hypervisor node name; defaults to the host name.
        #[arg(long)]
        node: Option<String>,
        #[arg(long)]
        vcpus: u32,
        #[arg(long, default_value = "0")]
        vcpus_used: u32,
        #[arg(long)]
        memory_mb: i64,
        /// Free RAM; defaults to all of it. May be negative.
        #[arg(long, allow_negative_numbers = true)]
        free_ram_mb: Option<i64>,
        #[arg(long)]
        disk_gb: i64,
        #[arg(long, default_value = "0")]
        disk_used_gb: i64,
        #[arg(long, default_value = "0")]
        running_vms: u32,
        #[arg(long, default_value = "qemu")]
        hypervisor_type: String,
        #[arg(long, default_value = "1")]
        hypervisor_version: u64,
    },
    /// List compute nodes as JSON.
    List,
}

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// Stamp a heartbeat, registering the compute service if needed.
    Heartbeat { host: String },
    /// List compute services as JSON.
    List,
}

#[derive(Subcommand)]
pub enum InstanceCommand {
    /// Register an instance. With `--host` it counts as running there.
    Add {
        uuid: String,
        #[arg(long)]
        memory_mb: i64,
        #[arg(long, default_value = "1")]
        vcpus: u32,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        node: Option<String>,
        /// Server group the instance belongs to.
        #[arg(long)]
        group: Option<String>,
    },
    /// Show one instance and its faults as JSON.
    Show { uuid: String },
}

pub fn host(store: &StateStore, command: HostCommand) -> anyhow::Result<()> {
    match command {
        HostCommand::Add {
            host,
            node,
            vcpus,
            vcpus_used,
            memory_mb,
            free_ram_mb,
            disk_gb,
            disk_used_gb,
            running_vms,
            hypervisor_type,
            hypervisor_version,
        } => {
            let record = ComputeNodeRecord {
                node: node.unwrap_or_else(|| host.clone()),
                host,
                vcpus,
                vcpus_used,
                memory_mb,
                free_ram_mb: free_ram_mb.unwrap_or(memory_mb),
                local_gb: disk_gb,
                local_gb_used: disk_used_gb,
                running_vms,
                hypervisor_type,
                hypervisor_version,
                updated_at: epoch_secs(),
            };
            store.put_compute_node(&record)?;
            info!(host = %record.host, node = %record.node, memory_mb, vcpus, "compute node registered");
        }
        HostCommand::List => {
            println!("{}", serde_json::to_string_pretty(&store.list_compute_nodes()?)?);
        }
    }
    Ok(())
}

pub fn service(store: &StateStore, command: ServiceCommand) -> anyhow::Result<()> {
    match command {
        ServiceCommand::Heartbeat { host } => {
            let now = epoch_secs();
            if store.get_service(&host)?.is_some() {
                store.record_heartbeat(&host, now)?;
            } else {
                store.put_service(&ServiceRecord {
                    host: host.clone(),
                    topic: "compute".to_string(),
                    last_heartbeat: now,
                })?;
                info!(%host, "compute service registered");
            }
        }
        ServiceCommand::List => {
            println!("{}", serde_json::to_string_pretty(&store.list_services()?)?);
        }
    }
    Ok(())
}

pub fn instance(store: &StateStore, command: InstanceCommand) -> anyhow::Result<()> {
    match command {
        InstanceCommand::Add {
            uuid,
            memory_mb,
            vcpus,
            host,
            node,
            group,
        } => {
            let mut record = InstanceRecord::building(uuid, memory_mb, vcpus);
            if host.is_some() {
                record.vm_state = hostgrid_state::VmState::Active;
                record.task_state = None;
                record.node = node.or_else(|| host.clone());
                record.host = host;
            }
            if let Some(group) = group {
                record.system_metadata.insert("group".to_string(), group);
            }
            store.put_instance(&record)?;
            info!(uuid = %record.uuid, host = ?record.host, "instance registered");
        }
        InstanceCommand::Show { uuid } => {
            let record = store
                .get_instance(&uuid)?
                .ok_or_else(|| anyhow::anyhow!("instance {uuid} not found"))?;
            let faults = store.list_instance_faults(&uuid)?;
            let out = serde_json::json!({ "instance": record, "faults": faults });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}
