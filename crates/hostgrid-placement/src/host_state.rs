//! Per-node resource view used during one scheduling pass.

use std::collections::BTreeMap;

use hostgrid_core::{HostNode, InstanceType};
use serde::{Deserialize, Serialize};

/// Which part of the fleet a snapshot covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostScope {
    All,
    Host(String),
}

/// Resource state of one (host, node) pair.
///
/// Only changed by [`HostState::consume_from_instance`] and limit population
/// while a batch is being placed; never written back to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostState {
    pub host: String,
    pub nodename: String,
    pub total_vcpus: u32,
    pub vcpus_used: u32,
    pub total_memory_mb: i64,
    /// Negative when the host is overcommitted.
    pub free_ram_mb: i64,
    pub total_disk_gb: i64,
    pub used_disk_gb: i64,
    pub num_instances: u32,
    pub hypervisor_type: String,
    pub hypervisor_version: u64,
    /// Soft ceilings (`memory_mb`, `vcpu`, `disk_gb`) set when the host is chosen.
    #[serde(default)]
    pub limits: BTreeMap<String, f64>,
}

impl HostState {
    pub fn key(&self) -> HostNode {
        HostNode::new(self.host.clone(), self.nodename.clone())
    }

    pub fn free_vcpus(&self) -> i64 {
        i64::from(self.total_vcpus) - i64::from(self.vcpus_used)
    }

    pub fn free_disk_gb(&self) -> i64 {
        self.total_disk_gb - self.used_disk_gb
    }

    /// Provisionally account for one more instance of `instance_type`.
    pub fn consume_from_instance(&mut self, instance_type: &InstanceType) {
        self.free_ram_mb -= instance_type.memory_mb;
        self.vcpus_used = self.vcpus_used.saturating_add(instance_type.vcpus);
        self.used_disk_gb += instance_type.disk_gb();
        self.num_instances += 1;
    }
}

/// Private copy of the fleet keyed by (host, node), iterated in key order.
pub type HostSnapshot = BTreeMap<HostNode, HostState>;
