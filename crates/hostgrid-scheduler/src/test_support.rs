//! In-memory collaborators and fixtures shared by the scheduler tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use hostgrid_core::{Instance, InstanceType, RequestSpec, SchedulerConfig};
use hostgrid_placement::{HostScope, HostState};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::collaborators::{
    CapacityStore, ComputeDispatch, ComputeService, Fault, GroupMembership, InstanceRecords,
    PrepResize, RemoteCall, RunInstance, ServiceLiveness,
};
use crate::dispatch::{Dispatched, LogDispatch};
use crate::filter_scheduler::FilterScheduler;

type Stamp = (String, u32, BTreeMap<String, String>);

#[derive(Default)]
pub struct FakeBackend {
    hosts: Vec<HostState>,
    groups: BTreeMap<String, Vec<String>>,
    /// Registered services and whether each is up.
    services: BTreeMap<String, bool>,
    offline: bool,
    stamped: Mutex<Vec<Stamp>>,
    errored: Mutex<Vec<(String, Fault)>>,
}

impl FakeBackend {
    pub fn with_hosts(hosts: Vec<HostState>) -> Self {
        Self {
            hosts,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn with_group(mut self, name: &str, hosts: &[&str]) -> Self {
        self.groups
            .insert(name.to_string(), hosts.iter().map(|h| h.to_string()).collect());
        self
    }

    pub fn with_service(mut self, host: &str, up: bool) -> Self {
        self.services.insert(host.to_string(), up);
        self
    }

    pub fn stamped(&self) -> Vec<Stamp> {
        self.stamped.lock().unwrap().clone()
    }

    pub fn errored(&self) -> Vec<(String, Fault)> {
        self.errored.lock().unwrap().clone()
    }
}

impl CapacityStore for FakeBackend {
    fn host_states(&self, scope: &HostScope) -> anyhow::Result<Vec<HostState>> {
        if self.offline {
            anyhow::bail!("capacity store offline");
        }
        Ok(self
            .hosts
            .iter()
            .filter(|h| match scope {
                HostScope::All => true,
                HostScope::Host(name) => &h.host == name,
            })
            .cloned()
            .collect())
    }
}

impl ServiceLiveness for FakeBackend {
    fn compute_service(&self, host: &str) -> anyhow::Result<Option<ComputeService>> {
        Ok(self.services.get(host).map(|&up| ComputeService {
            host: host.to_string(),
            topic: "compute".to_string(),
            last_heartbeat: u64::from(up),
        }))
    }

    fn is_up(&self, service: &ComputeService) -> bool {
        service.last_heartbeat > 0
    }
}

impl GroupMembership for FakeBackend {
    fn occupied_hosts(&self, group: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.groups.get(group).cloned().unwrap_or_default())
    }
}

impl InstanceRecords for FakeBackend {
    fn stamp_scheduled(
        &self,
        uuid: &str,
        launch_index: u32,
        system_metadata: &BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        self.stamped
            .lock()
            .unwrap()
            .push((uuid.to_string(), launch_index, system_metadata.clone()));
        Ok(())
    }

    fn mark_errored(&self, uuid: &str, fault: &Fault) -> anyhow::Result<()> {
        self.errored.lock().unwrap().push((uuid.to_string(), fault.clone()));
        Ok(())
    }
}

/// Transport whose every send fails.
pub struct FailingDispatch;

#[async_trait]
impl ComputeDispatch for FailingDispatch {
    async fn run_instance(&self, _request: RunInstance) -> anyhow::Result<()> {
        anyhow::bail!("compute host unreachable")
    }

    async fn prep_resize(&self, _request: PrepResize) -> anyhow::Result<()> {
        anyhow::bail!("compute host unreachable")
    }

    async fn call(&self, _call: RemoteCall) -> anyhow::Result<serde_json::Value> {
        anyhow::bail!("compute host unreachable")
    }
}

// ── Fixtures ──────────────────────────────────────────────────────

/// Single-node host with `memory_mb` of RAM, all of it free.
pub fn host(name: &str, memory_mb: i64) -> HostState {
    HostState {
        host: name.to_string(),
        nodename: name.to_string(),
        total_vcpus: 16,
        vcpus_used: 0,
        total_memory_mb: memory_mb,
        free_ram_mb: memory_mb,
        total_disk_gb: 500,
        used_disk_gb: 0,
        num_instances: 0,
        hypervisor_type: "qemu".to_string(),
        hypervisor_version: 1,
        limits: BTreeMap::new(),
    }
}

/// Batch of 1024 MB / 1 vCPU / 10 GB instances.
pub fn request(uuids: &[&str]) -> RequestSpec {
    let flavor = InstanceType {
        name: "m1.small".to_string(),
        memory_mb: 1024,
        vcpus: 1,
        root_gb: 10,
        ephemeral_gb: 0,
    };
    let mut spec = RequestSpec::new(flavor, uuids.iter().map(|u| u.to_string()).collect());
    spec.instance_properties.project_id = "fake-project".to_string();
    spec
}

pub fn existing_instance(uuid: &str, host: &str) -> Instance {
    Instance {
        uuid: uuid.to_string(),
        host: host.to_string(),
        node: Some(host.to_string()),
        memory_mb: 1024,
        vcpus: 1,
    }
}

pub fn seeded() -> StdRng {
    StdRng::seed_from_u64(7)
}

pub fn scheduler(
    backend: FakeBackend,
    config: SchedulerConfig,
) -> FilterScheduler<FakeBackend, LogDispatch> {
    FilterScheduler::with_rng(config, backend, LogDispatch::new(), seeded()).unwrap()
}

/// `run_instance` requests seen by `dispatch`, in send order.
pub fn run_requests(dispatch: &LogDispatch) -> Vec<RunInstance> {
    dispatch
        .sent()
        .into_iter()
        .filter_map(|d| match d {
            Dispatched::RunInstance(run) => Some(run),
            _ => None,
        })
        .collect()
}
