//! hostgrid placement — filter and weigh candidate hosts.
//!
//! This crate holds the pure half of scheduling: the per-host resource view,
//! the request context threaded through a scheduling pass, and the filter,
//! weigher and subset-selection stages. It performs no I/O. The orchestrator
//! in `hostgrid-scheduler` drives these stages and talks to collaborators.
//!
//! # Components
//!
//! - **`host_state`** — mutable per-(host, node) capacity view and snapshot
//! - **`context`** — retry / anti-affinity bookkeeping carried across stages
//! - **`filters`** — predicate pipeline (ram, core, disk, retry, anti-affinity)
//! - **`weights`** — weighted scoring and stable descending ordering
//! - **`selection`** — random pick among the best-weighted subset
//! - **`convert`** — state store records to `HostState`

pub mod context;
pub mod convert;
pub mod filters;
pub mod host_state;
pub mod selection;
pub mod weights;

pub use context::{GroupInfo, RequestContext, RequestedResources, RetryInfo};
pub use convert::{node_record_to_host_state, snapshot_from_records};
pub use filters::{FilterPipeline, HostFilter};
pub use host_state::{HostScope, HostSnapshot, HostState};
pub use selection::choose_host;
pub use weights::{HostWeigher, WeighedHost, WeightPipeline};
