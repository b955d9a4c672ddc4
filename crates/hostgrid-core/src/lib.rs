pub mod config;
pub mod types;

pub use config::{ConfigError, FilterKind, SchedulerConfig, WeigherKind, WeigherSpec};
pub use types::*;
