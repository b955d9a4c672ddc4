//! Scheduler collaborators backed by the redb state store.

use std::collections::BTreeMap;

use hostgrid_placement::{HostScope, HostState, node_record_to_host_state};
use hostgrid_state::{InstanceFault, StateStore, VmState, epoch_secs};
use tracing::{debug, warn};

use crate::collaborators::{
    CapacityStore, ComputeService, Fault, GroupMembership, InstanceRecords, ServiceLiveness,
};

/// System-metadata key naming an instance's group.
const GROUP_KEY: &str = "group";

#[derive(Clone)]
pub struct StoreBackend {
    store: StateStore,
    service_down_time_secs: u64,
}

impl StoreBackend {
    pub fn new(store: StateStore, service_down_time_secs: u64) -> Self {
        Self {
            store,
            service_down_time_secs,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn is_up_at(&self, service: &ComputeService, now: u64) -> bool {
        now.saturating_sub(service.last_heartbeat) <= self.service_down_time_secs
    }
}

impl CapacityStore for StoreBackend {
    fn host_states(&self, scope: &HostScope) -> anyhow::Result<Vec<HostState>> {
        let records = match scope {
            HostScope::All => self.store.list_compute_nodes()?,
            HostScope::Host(host) => self.store.list_compute_nodes_for_host(host)?,
        };
        debug!(?scope, nodes = records.len(), "capacity read");
        Ok(records.iter().map(node_record_to_host_state).collect())
    }
}

impl ServiceLiveness for StoreBackend {
    fn compute_service(&self, host: &str) -> anyhow::Result<Option<ComputeService>> {
        Ok(self.store.get_service(host)?.map(|s| ComputeService {
            host: s.host,
            topic: s.topic,
            last_heartbeat: s.last_heartbeat,
        }))
    }

    fn is_up(&self, service: &ComputeService) -> bool {
        self.is_up_at(service, epoch_secs())
    }
}

impl GroupMembership for StoreBackend {
    /// Hosts of live group members, in first-seen order.
    fn occupied_hosts(&self, group: &str) -> anyhow::Result<Vec<String>> {
        let mut hosts: Vec<String> = Vec::new();
        for instance in self.store.list_instances()? {
            if instance.vm_state == VmState::Error
                || instance.system_metadata.get(GROUP_KEY).map(String::as_str) != Some(group)
            {
                continue;
            }
            match instance.host {
                Some(host) if !hosts.contains(&host) => hosts.push(host),
                _ => {}
            }
        }
        Ok(hosts)
    }
}

impl InstanceRecords for StoreBackend {
    fn stamp_scheduled(
        &self,
        uuid: &str,
        launch_index: u32,
        system_metadata: &BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        let now = epoch_secs();
        self.store.update_instance(uuid, |record| {
            record.launch_index = Some(launch_index);
            record
                .system_metadata
                .extend(system_metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
            record.scheduled_at = Some(now);
        })?;
        Ok(())
    }

    fn mark_errored(&self, uuid: &str, fault: &Fault) -> anyhow::Result<()> {
        self.store.update_instance(uuid, |record| {
            record.vm_state = VmState::Error;
            record.task_state = None;
        })?;
        self.store.add_instance_fault(&InstanceFault {
            instance_uuid: uuid.to_string(),
            code: fault.code,
            message: fault.message.clone(),
            created_at: epoch_secs(),
        })?;
        warn!(%uuid, code = fault.code, "instance set to error");
        Ok(())
    }
}
