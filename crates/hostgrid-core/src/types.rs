//! Shared types used across hostgrid crates.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of an instance (a UUID string in practice).
pub type InstanceId = String;

/// Identity of one schedulable compute node.
///
/// A host runs one compute service but may expose several hypervisor
/// nodes, so placement always works on the `(host, node)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostNode {
    pub host: String,
    pub node: String,
}

impl HostNode {
    pub fn new(host: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            node: node.into(),
        }
    }
}

impl fmt::Display for HostNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.node)
    }
}

// ── Request ───────────────────────────────────────────────────────

/// Resource shape requested for every instance of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    pub name: String,
    pub memory_mb: i64,
    pub vcpus: u32,
    pub root_gb: i64,
    #[serde(default)]
    pub ephemeral_gb: i64,
}

impl InstanceType {
    /// Local disk needed by one instance (root + ephemeral).
    pub fn disk_gb(&self) -> i64 {
        self.root_gb + self.ephemeral_gb
    }
}

/// Placement-relevant properties shared by every instance of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceProperties {
    pub project_id: String,
    #[serde(default)]
    pub os_type: Option<String>,
    #[serde(default)]
    pub system_metadata: BTreeMap<String, String>,
    /// Zero-based position inside the batch, stamped just before dispatch.
    #[serde(default)]
    pub launch_index: Option<u32>,
}

/// Description of one scheduling batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub instance_type: InstanceType,
    #[serde(default)]
    pub instance_properties: InstanceProperties,
    /// Explicit instance count, used when no identities are listed.
    #[serde(default)]
    pub num_instances: Option<u32>,
    /// Identities of the instances being placed, in request order.
    #[serde(default)]
    pub instance_uuids: Vec<InstanceId>,
}

impl RequestSpec {
    pub fn new(instance_type: InstanceType, instance_uuids: Vec<InstanceId>) -> Self {
        Self {
            instance_type,
            instance_properties: InstanceProperties::default(),
            num_instances: None,
            instance_uuids,
        }
    }

    /// Number of placements this batch needs.
    ///
    /// The identity list wins when present; otherwise the explicit count,
    /// defaulting to a single instance.
    pub fn num_instances(&self) -> usize {
        if self.instance_uuids.is_empty() {
            self.num_instances.unwrap_or(1) as usize
        } else {
            self.instance_uuids.len()
        }
    }
}

// ── Instance ──────────────────────────────────────────────────────

/// An existing instance, as seen by resize and live migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub uuid: InstanceId,
    /// Host the instance currently runs on.
    pub host: String,
    #[serde(default)]
    pub node: Option<String>,
    pub memory_mb: i64,
    pub vcpus: u32,
}
