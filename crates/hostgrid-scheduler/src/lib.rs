//! hostgrid-scheduler — places instance batches onto compute hosts.
//!
//! Drives the pure stages from `hostgrid-placement` (filter → weigh →
//! subset pick → provisional consume) once per instance of a batch, and
//! wraps them with retry and anti-affinity bookkeeping, instance-record
//! updates and dispatch to compute hosts. Also gates live migrations.
//!
//! # Architecture
//!
//! ```text
//! FilterScheduler
//!   ├── SchedulerBackend (capacity, service liveness, groups, instance records)
//!   ├── ComputeDispatch  (run_instance, prep_resize, remote calls)
//!   ├── FilterPipeline / WeightPipeline (built from SchedulerConfig)
//!   └── Mutex<StdRng>    (subset selection)
//! ```
//!
//! `StoreBackend` and `LogDispatch` are ready-made collaborators over the
//! redb store and the log, respectively.

pub mod affinity;
pub mod backend;
pub mod collaborators;
pub mod dispatch;
pub mod error;
pub mod filter_scheduler;
pub mod live_migration;
pub mod retry;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::StoreBackend;
pub use collaborators::{
    CapacityStore, ComputeDispatch, ComputeService, Fault, GroupMembership, InstanceRecords,
    PrepResize, RemoteCall, RunInstance, SchedulerBackend, ServiceLiveness,
};
pub use dispatch::{Dispatched, LogDispatch};
pub use error::{SchedulerError, SchedulerResult};
pub use filter_scheduler::FilterScheduler;
pub use live_migration::MigrationCheck;
