//! hostgrid-state — embedded record store for the hostgrid scheduler.
//!
//! Backed by [redb](https://docs.rs/redb). Holds the records the scheduler
//! reads and writes through its collaborator traits: compute-node capacity,
//! compute-service heartbeats, instance records and instance faults.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. Keys are
//! composite (`{host}/{node}`, `{uuid}:{seq}`) so related records can be found
//! by prefix scan.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
