//! Scheduler error types.

use hostgrid_core::{ConfigError, InstanceId};
use hostgrid_placement::WeighedHost;
use thiserror::Error;

use crate::live_migration::MigrationCheck;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No host satisfied the request for some instance of the batch.
    ///
    /// `placed` holds the placements made before the shortfall, `unplaced`
    /// the identities of the instances left without a host.
    #[error("no valid host was found: {reason}")]
    NoValidHost {
        reason: String,
        unplaced: Vec<InstanceId>,
        placed: Vec<WeighedHost>,
    },

    #[error("live migration check '{check}' failed: {reason}")]
    Migration { check: MigrationCheck, reason: String },

    /// Failure raised by a collaborator, passed through untouched.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl SchedulerError {
    pub fn no_valid_host(reason: impl Into<String>, unplaced: Vec<InstanceId>) -> Self {
        Self::NoValidHost {
            reason: reason.into(),
            unplaced,
            placed: Vec::new(),
        }
    }

    pub fn migration(check: MigrationCheck, reason: impl Into<String>) -> Self {
        Self::Migration {
            check,
            reason: reason.into(),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
