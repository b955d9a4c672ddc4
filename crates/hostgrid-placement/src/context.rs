//! Request context threaded by `&mut` through every scheduling stage.
//!
//! The retry and group sub-records are serializable so a caller can hand
//! them back on a later attempt of the same request.

use std::collections::BTreeMap;

use hostgrid_core::{HostNode, InstanceType, RequestSpec};
use serde::{Deserialize, Serialize};

/// Attempts made so far and the nodes they landed on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryInfo {
    pub attempt_count: u32,
    #[serde(default)]
    pub tried_hosts: Vec<HostNode>,
}

/// Anti-affinity group hint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    /// Hosts that already run a member of the group.
    #[serde(default)]
    pub occupied_hosts: Vec<String>,
}

/// Copy of the per-instance demand, so filters need only the context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestedResources {
    pub memory_mb: i64,
    pub vcpus: u32,
    pub root_gb: i64,
    pub ephemeral_gb: i64,
}

impl RequestedResources {
    pub fn disk_gb(&self) -> i64 {
        self.root_gb + self.ephemeral_gb
    }
}

impl From<&InstanceType> for RequestedResources {
    fn from(it: &InstanceType) -> Self {
        Self {
            memory_mb: it.memory_mb,
            vcpus: it.vcpus,
            root_gb: it.root_gb,
            ephemeral_gb: it.ephemeral_gb,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupInfo>,
    /// Limits of the host chosen for this request.
    #[serde(default)]
    pub limits: BTreeMap<String, f64>,
    #[serde(default)]
    pub resources: RequestedResources,
    #[serde(default)]
    pub project_id: String,
}

impl RequestContext {
    /// A context carrying an anti-affinity group hint.
    pub fn with_group(name: impl Into<String>) -> Self {
        Self {
            group: Some(GroupInfo {
                name: name.into(),
                occupied_hosts: Vec::new(),
            }),
            ..Self::default()
        }
    }

    /// Copy the demand and project of `spec` into the context.
    pub fn load_request(&mut self, spec: &RequestSpec) {
        self.resources = RequestedResources::from(&spec.instance_type);
        self.project_id = spec.instance_properties.project_id.clone();
    }

    pub fn was_tried(&self, key: &HostNode) -> bool {
        self.retry
            .as_ref()
            .is_some_and(|r| r.tried_hosts.contains(key))
    }

    pub fn is_occupied(&self, host: &str) -> bool {
        self.group
            .as_ref()
            .is_some_and(|g| g.occupied_hosts.iter().any(|h| h == host))
    }

    pub fn group_name(&self) -> Option<&str> {
        self.group.as_ref().map(|g| g.name.as_str())
    }
}
