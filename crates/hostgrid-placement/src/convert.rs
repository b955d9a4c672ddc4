//! Type conversions between state store records and placement types.
//!
//! Bridges `hostgrid_state::ComputeNodeRecord` to the placement view
//! `HostState`.

use std::collections::BTreeMap;

use hostgrid_state::ComputeNodeRecord;

use crate::host_state::{HostSnapshot, HostState};

/// Convert a [`ComputeNodeRecord`] to a fresh [`HostState`] with no limits.
pub fn node_record_to_host_state(record: &ComputeNodeRecord) -> HostState {
    HostState {
        host: record.host.clone(),
        nodename: record.node.clone(),
        total_vcpus: record.vcpus,
        vcpus_used: record.vcpus_used,
        total_memory_mb: record.memory_mb,
        free_ram_mb: record.free_ram_mb,
        total_disk_gb: record.local_gb,
        used_disk_gb: record.local_gb_used,
        num_instances: record.running_vms,
        hypervisor_type: record.hypervisor_type.clone(),
        hypervisor_version: record.hypervisor_version,
        limits: BTreeMap::new(),
    }
}

/// Key a set of host states by (host, node).
///
/// A later entry for the same pair replaces an earlier one.
pub fn snapshot_from_records<I>(states: I) -> HostSnapshot
where
    I: IntoIterator<Item = HostState>,
{
    states.into_iter().map(|s| (s.key(), s)).collect()
}
