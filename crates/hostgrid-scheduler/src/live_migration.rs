//! Live-migration feasibility gate.
//!
//! Checks run in a fixed order and stop at the first failure. The remote
//! precheck and the final migration call are the only side effects, and
//! nothing already sent is rolled back.

use std::fmt;

use hostgrid_core::Instance;
use hostgrid_placement::{HostScope, HostState};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::collaborators::{ComputeDispatch, ComputeService, RemoteCall, SchedulerBackend};
use crate::error::{SchedulerError, SchedulerResult};
use crate::filter_scheduler::FilterScheduler;

/// The live-migration check that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationCheck {
    SourceService,
    DestinationService,
    DestinationCapacity,
    SameHost,
    HypervisorType,
    HypervisorVersion,
    Memory,
}

impl fmt::Display for MigrationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SourceService => "source_service",
            Self::DestinationService => "destination_service",
            Self::DestinationCapacity => "destination_capacity",
            Self::SameHost => "same_host",
            Self::HypervisorType => "hypervisor_type",
            Self::HypervisorVersion => "hypervisor_version",
            Self::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// Memory the destination can still hand out under `ratio`.
///
/// Without overcommit this is the reported free RAM. With overcommit the
/// ceiling is `memory_mb × ratio` minus what is already used, which stays
/// correct when free RAM is reported negative.
pub fn available_memory_mb(dest: &HostState, ratio: f64) -> f64 {
    if ratio > 1.0 {
        let used = dest.total_memory_mb - dest.free_ram_mb;
        dest.total_memory_mb as f64 * ratio - used as f64
    } else {
        dest.free_ram_mb as f64
    }
}

impl<B, D> FilterScheduler<B, D>
where
    B: SchedulerBackend,
    D: ComputeDispatch,
{
    /// Check that `instance` may live-migrate to `dest`, then start it.
    pub async fn schedule_live_migration(
        &self,
        instance: &Instance,
        dest: &str,
        block_migration: bool,
        disk_over_commit: bool,
    ) -> SchedulerResult<()> {
        let src = instance.host.as_str();
        info!(instance = %instance.uuid, %src, %dest, block_migration, "live migration requested");

        self.require_live_service(src, MigrationCheck::SourceService)?;
        self.require_live_service(dest, MigrationCheck::DestinationService)?;

        let dest_state = self.first_node(dest)?.ok_or_else(|| {
            SchedulerError::migration(
                MigrationCheck::DestinationCapacity,
                format!("no compute node reported for host {dest}"),
            )
        })?;

        self.common_check(instance, &dest_state)?;
        self.memory_check(instance, &dest_state)?;

        let version = self.config.rpc_version.clone();
        let migrate_data = self
            .dispatch
            .call(RemoteCall {
                topic: format!("compute.{dest}"),
                method: "check_can_live_migrate_destination".to_string(),
                args: json!({
                    "instance": instance,
                    "block_migration": block_migration,
                    "disk_over_commit": disk_over_commit,
                }),
                version: version.clone(),
            })
            .await?;
        debug!(%dest, ?migrate_data, "destination accepted live migration");

        self.dispatch
            .call(RemoteCall {
                topic: format!("compute.{src}"),
                method: "live_migration".to_string(),
                args: json!({
                    "instance": instance,
                    "dest": dest,
                    "block_migration": block_migration,
                    "migrate_data": migrate_data,
                }),
                version,
            })
            .await?;
        info!(instance = %instance.uuid, %src, %dest, "live migration dispatched");
        Ok(())
    }

    fn require_live_service(&self, host: &str, check: MigrationCheck) -> SchedulerResult<ComputeService> {
        let Some(service) = self.backend.compute_service(host)? else {
            warn!(%host, %check, "no compute service");
            return Err(SchedulerError::migration(
                check,
                format!("no compute service registered on host {host}"),
            ));
        };
        if !self.backend.is_up(&service) {
            warn!(%host, %check, last_heartbeat = service.last_heartbeat, "compute service down");
            return Err(SchedulerError::migration(
                check,
                format!("compute service on host {host} is down"),
            ));
        }
        debug!(%host, %check, "compute service is up");
        Ok(service)
    }

    /// First node of `host` in key order, read through the capacity store.
    fn first_node(&self, host: &str) -> SchedulerResult<Option<HostState>> {
        let snapshot = self.snapshot(&HostScope::Host(host.to_string()))?;
        Ok(snapshot.into_values().next())
    }

    fn common_check(&self, instance: &Instance, dest: &HostState) -> SchedulerResult<()> {
        if dest.host == instance.host {
            return Err(SchedulerError::migration(
                MigrationCheck::SameHost,
                format!("instance {} already runs on host {}", instance.uuid, dest.host),
            ));
        }

        let src_host = instance.host.as_str();
        let snapshot = self.snapshot(&HostScope::Host(src_host.to_string()))?;
        let src = instance
            .node
            .as_ref()
            .and_then(|node| snapshot.values().find(|s| &s.nodename == node))
            .or_else(|| snapshot.values().next())
            .ok_or_else(|| {
                SchedulerError::migration(
                    MigrationCheck::HypervisorType,
                    format!("no compute node reported for source host {src_host}"),
                )
            })?;

        if src.hypervisor_type != dest.hypervisor_type {
            return Err(SchedulerError::migration(
                MigrationCheck::HypervisorType,
                format!(
                    "source hypervisor {} differs from destination hypervisor {}",
                    src.hypervisor_type, dest.hypervisor_type
                ),
            ));
        }
        if dest.hypervisor_version < src.hypervisor_version {
            return Err(SchedulerError::migration(
                MigrationCheck::HypervisorVersion,
                format!(
                    "destination hypervisor version {} is older than source version {}",
                    dest.hypervisor_version, src.hypervisor_version
                ),
            ));
        }
        Ok(())
    }

    fn memory_check(&self, instance: &Instance, dest: &HostState) -> SchedulerResult<()> {
        let available = available_memory_mb(dest, self.config.ram_allocation_ratio);
        let required = instance.memory_mb as f64;
        if required > available {
            return Err(SchedulerError::migration(
                MigrationCheck::Memory,
                format!(
                    "unable to migrate {} to {}: lack of memory (host: {available} <= instance: {required})",
                    instance.uuid, dest.host
                ),
            ));
        }
        debug!(host = %dest.host, available, required, "destination has enough memory");
        Ok(())
    }
}
