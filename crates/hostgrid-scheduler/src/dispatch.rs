//! Dispatch transport that only logs.
//!
//! `LogDispatch` acknowledges every message, keeps a copy of what it was
//! sent and answers remote calls with an empty object. It lets the daemon
//! run scheduling end to end without compute hosts.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::info;

use crate::collaborators::{ComputeDispatch, PrepResize, RemoteCall, RunInstance};

/// One message handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    RunInstance(RunInstance),
    PrepResize(PrepResize),
    Call(RemoteCall),
}

#[derive(Debug, Default)]
pub struct LogDispatch {
    sent: Mutex<Vec<Dispatched>>,
}

impl LogDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<Dispatched> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, message: Dispatched) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}

#[async_trait]
impl ComputeDispatch for LogDispatch {
    async fn run_instance(&self, request: RunInstance) -> anyhow::Result<()> {
        info!(
            host = %request.host,
            node = %request.node,
            instance = ?request.instance_uuid,
            launch_index = ?request.request_spec.instance_properties.launch_index,
            "run_instance"
        );
        self.push(Dispatched::RunInstance(request));
        Ok(())
    }

    async fn prep_resize(&self, request: PrepResize) -> anyhow::Result<()> {
        info!(
            host = %request.host,
            node = %request.node,
            instance = %request.instance.uuid,
            instance_type = %request.instance_type.name,
            "prep_resize"
        );
        self.push(Dispatched::PrepResize(request));
        Ok(())
    }

    async fn call(&self, call: RemoteCall) -> anyhow::Result<serde_json::Value> {
        info!(topic = %call.topic, method = %call.method, version = %call.version, "remote call");
        self.push(Dispatched::Call(call));
        Ok(serde_json::Value::Object(serde_json::Map::new()))
    }
}
