//! StateStore — redb-backed persistence for scheduler records.
//!
//! Typed operations over compute nodes, services, instances and instance
//! faults. Supports on-disk and in-memory backends (the latter for tests).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [COMPUTE_NODES, SERVICES, INSTANCES, INSTANCE_FAULTS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic JSON rows ──────────────────────────────────────────

    fn put_json<T: Serialize>(&self, def: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// All rows whose key starts with `prefix`, in key order.
    fn scan_json<T: DeserializeOwned>(&self, def: JsonTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let row: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(row);
            }
        }
        Ok(results)
    }

    fn delete_key(&self, def: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Compute nodes ──────────────────────────────────────────────

    /// Insert or update the capacity record of one (host, node).
    ///
    /// Host names are the key prefix, so they may not contain the `/`
    /// separator.
    pub fn put_compute_node(&self, record: &ComputeNodeRecord) -> StateResult<()> {
        if record.host.is_empty() || record.host.contains('/') {
            return Err(StateError::InvalidKey(format!(
                "host name {:?} must be non-empty and free of '/'",
                record.host
            )));
        }
        let key = record.table_key();
        self.put_json(COMPUTE_NODES, &key, record)?;
        debug!(%key, "compute node stored");
        Ok(())
    }

    pub fn get_compute_node(&self, host: &str, node: &str) -> StateResult<Option<ComputeNodeRecord>> {
        self.get_json(COMPUTE_NODES, &node_key(host, node))
    }

    /// Every compute node, ordered by host then node.
    pub fn list_compute_nodes(&self) -> StateResult<Vec<ComputeNodeRecord>> {
        self.scan_json(COMPUTE_NODES, "")
    }

    /// Compute nodes belonging to one host.
    pub fn list_compute_nodes_for_host(&self, host: &str) -> StateResult<Vec<ComputeNodeRecord>> {
        let mut nodes: Vec<ComputeNodeRecord> = self.scan_json(COMPUTE_NODES, &format!("{host}/"))?;
        nodes.retain(|n| n.host == host);
        Ok(nodes)
    }

    pub fn delete_compute_node(&self, host: &str, node: &str) -> StateResult<bool> {
        self.delete_key(COMPUTE_NODES, &node_key(host, node))
    }

    // ── Services ───────────────────────────────────────────────────

    pub fn put_service(&self, service: &ServiceRecord) -> StateResult<()> {
        self.put_json(SERVICES, &service.host, service)
    }

    pub fn get_service(&self, host: &str) -> StateResult<Option<ServiceRecord>> {
        self.get_json(SERVICES, host)
    }

    pub fn list_services(&self) -> StateResult<Vec<ServiceRecord>> {
        self.scan_json(SERVICES, "")
    }

    /// Stamp a heartbeat on an existing service.
    pub fn record_heartbeat(&self, host: &str, at: u64) -> StateResult<ServiceRecord> {
        let mut service = self
            .get_service(host)?
            .ok_or_else(|| StateError::NotFound(format!("service on host {host}")))?;
        service.last_heartbeat = at;
        self.put_service(&service)?;
        debug!(%host, at, "heartbeat recorded");
        Ok(service)
    }

    // ── Instances ──────────────────────────────────────────────────

    pub fn put_instance(&self, record: &InstanceRecord) -> StateResult<()> {
        self.put_json(INSTANCES, &record.uuid, record)
    }

    pub fn get_instance(&self, uuid: &str) -> StateResult<Option<InstanceRecord>> {
        self.get_json(INSTANCES, uuid)
    }

    pub fn list_instances(&self) -> StateResult<Vec<InstanceRecord>> {
        self.scan_json(INSTANCES, "")
    }

    pub fn delete_instance(&self, uuid: &str) -> StateResult<bool> {
        self.delete_key(INSTANCES, uuid)
    }

    /// Read-modify-write of one instance inside a single write transaction.
    pub fn update_instance<F>(&self, uuid: &str, apply: F) -> StateResult<InstanceRecord>
    where
        F: FnOnce(&mut InstanceRecord),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record = {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let mut record: InstanceRecord = match table.get(uuid).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("instance {uuid}"))),
            };
            apply(&mut record);
            record.updated_at = epoch_secs();
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(uuid, value.as_slice())
                .map_err(map_err!(Write))?;
            record
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%uuid, vm_state = ?record.vm_state, "instance updated");
        Ok(record)
    }

    // ── Instance faults ────────────────────────────────────────────

    /// Append a fault for an instance. Faults are never overwritten.
    pub fn add_instance_fault(&self, fault: &InstanceFault) -> StateResult<()> {
        let prefix = format!("{}:", fault.instance_uuid);
        let value = serde_json::to_vec(fault).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCE_FAULTS).map_err(map_err!(Table))?;
            let mut seq = 0usize;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                if key.value().starts_with(&prefix) {
                    seq += 1;
                }
            }
            let key = format!("{prefix}{seq:06}");
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(uuid = %fault.instance_uuid, code = fault.code, "instance fault recorded");
        Ok(())
    }

    /// Faults for one instance, oldest first.
    pub fn list_instance_faults(&self, uuid: &str) -> StateResult<Vec<InstanceFault>> {
        self.scan_json(INSTANCE_FAULTS, &format!("{uuid}:"))
    }
}
