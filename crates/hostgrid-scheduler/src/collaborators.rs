//! Contracts the scheduler consumes.
//!
//! The scheduler never touches storage or transport directly. Everything it
//! reads or writes outside its own snapshot goes through these traits, and
//! any failure they raise is surfaced as `SchedulerError::Collaborator`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use hostgrid_core::{Instance, InstanceId, InstanceType, RequestSpec};
use hostgrid_placement::{HostScope, HostState, RequestContext};
use serde::{Deserialize, Serialize};

// ── Read side ─────────────────────────────────────────────────────

/// Source of per-node capacity.
pub trait CapacityStore: Send + Sync {
    /// Current resource state of every node in `scope`. Empty is not an error.
    fn host_states(&self, scope: &HostScope) -> anyhow::Result<Vec<HostState>>;
}

/// A compute service as seen by the liveness check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeService {
    pub host: String,
    pub topic: String,
    pub last_heartbeat: u64,
}

pub trait ServiceLiveness: Send + Sync {
    /// The compute service running on `host`, if one is registered.
    fn compute_service(&self, host: &str) -> anyhow::Result<Option<ComputeService>>;

    fn is_up(&self, service: &ComputeService) -> bool;
}

pub trait GroupMembership: Send + Sync {
    /// Hosts already running a member of `group`.
    fn occupied_hosts(&self, group: &str) -> anyhow::Result<Vec<String>>;
}

// ── Write side ────────────────────────────────────────────────────

/// Fault recorded on an instance that could not be scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub code: u16,
    pub message: String,
}

pub trait InstanceRecords: Send + Sync {
    /// Record the batch position and system metadata of an instance about
    /// to be dispatched. Must not touch the instance's host.
    fn stamp_scheduled(
        &self,
        uuid: &str,
        launch_index: u32,
        system_metadata: &BTreeMap<String, String>,
    ) -> anyhow::Result<()>;

    /// Put an instance into the error state, clear its task state and
    /// record `fault` against it.
    fn mark_errored(&self, uuid: &str, fault: &Fault) -> anyhow::Result<()>;
}

/// Everything the scheduler reads and writes synchronously.
pub trait SchedulerBackend: CapacityStore + ServiceLiveness + GroupMembership + InstanceRecords {}

impl<T> SchedulerBackend for T where T: CapacityStore + ServiceLiveness + GroupMembership + InstanceRecords {}

// ── Dispatch ──────────────────────────────────────────────────────

/// Build request for one placed instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInstance {
    pub host: String,
    pub node: String,
    pub instance_uuid: Option<InstanceId>,
    pub request_spec: RequestSpec,
    /// Context for this instance only: its own retry entry and limits.
    pub context: RequestContext,
}

/// Resize preparation sent to the chosen destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepResize {
    pub host: String,
    pub node: String,
    pub instance: Instance,
    pub instance_type: InstanceType,
    pub request_spec: RequestSpec,
    pub context: RequestContext,
}

/// Generic remote call to a compute service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCall {
    /// Routing target, `compute.<host>`.
    pub topic: String,
    pub method: String,
    pub args: serde_json::Value,
    pub version: String,
}

/// Transport to compute hosts. Timeouts and cancellation belong to the
/// implementation.
#[async_trait]
pub trait ComputeDispatch: Send + Sync {
    async fn run_instance(&self, request: RunInstance) -> anyhow::Result<()>;

    async fn prep_resize(&self, request: PrepResize) -> anyhow::Result<()>;

    /// Send `call` and wait for the remote reply.
    async fn call(&self, call: RemoteCall) -> anyhow::Result<serde_json::Value>;
}
