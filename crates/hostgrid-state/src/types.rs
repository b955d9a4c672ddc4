//! Persisted record types.
//!
//! These are the rows behind the scheduler's collaborator traits. All types
//! are JSON-serializable for storage in redb tables.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds since the unix epoch.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Compute node ──────────────────────────────────────────────────

/// Capacity reported by one hypervisor node of a compute host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputeNodeRecord {
    pub host: String,
    pub node: String,
    pub vcpus: u32,
    pub vcpus_used: u32,
    pub memory_mb: i64,
    /// May go negative on an overcommitted host.
    pub free_ram_mb: i64,
    pub local_gb: i64,
    pub local_gb_used: i64,
    #[serde(default)]
    pub running_vms: u32,
    pub hypervisor_type: String,
    pub hypervisor_version: u64,
    pub updated_at: u64,
}

impl ComputeNodeRecord {
    pub fn table_key(&self) -> String {
        node_key(&self.host, &self.node)
    }
}

/// Composite key for the compute nodes table.
pub fn node_key(host: &str, node: &str) -> String {
    format!("{host}/{node}")
}

// ── Service ───────────────────────────────────────────────────────

/// A compute service and its last heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRecord {
    pub host: String,
    pub topic: String,
    /// Unix timestamp of the last heartbeat.
    pub last_heartbeat: u64,
}

// ── Instance ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    Building,
    Active,
    Resized,
    Stopped,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Scheduling,
    ResizePrep,
    Migrating,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceRecord {
    pub uuid: String,
    /// Host the instance runs on; unset until it has been built.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
    pub vm_state: VmState,
    #[serde(default)]
    pub task_state: Option<TaskState>,
    pub memory_mb: i64,
    pub vcpus: u32,
    #[serde(default)]
    pub system_metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub launch_index: Option<u32>,
    #[serde(default)]
    pub scheduled_at: Option<u64>,
    pub updated_at: u64,
}

impl InstanceRecord {
    /// A new instance waiting to be scheduled.
    pub fn building(uuid: impl Into<String>, memory_mb: i64, vcpus: u32) -> Self {
        Self {
            uuid: uuid.into(),
            host: None,
            node: None,
            vm_state: VmState::Building,
            task_state: Some(TaskState::Scheduling),
            memory_mb,
            vcpus,
            system_metadata: BTreeMap::new(),
            launch_index: None,
            scheduled_at: None,
            updated_at: epoch_secs(),
        }
    }
}

/// Failure recorded against an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceFault {
    pub instance_uuid: String,
    pub code: u16,
    pub message: String,
    pub created_at: u64,
}
