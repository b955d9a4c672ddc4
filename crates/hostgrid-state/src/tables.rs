//! redb table definitions.
//!
//! Every table maps a `&str` key to a JSON-encoded `&[u8]` value.

use redb::TableDefinition;

/// Compute-node capacity keyed by `{host}/{node}`.
pub const COMPUTE_NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("compute_nodes");

/// Compute services keyed by `{host}`.
pub const SERVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("services");

/// Instance records keyed by `{uuid}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Instance faults keyed by `{uuid}:{seq}`.
pub const INSTANCE_FAULTS: TableDefinition<&str, &[u8]> = TableDefinition::new("instance_faults");
