//! Retry bookkeeping carried inside the request context.

use hostgrid_core::{ConfigError, HostNode, InstanceId};
use hostgrid_placement::{RequestContext, RetryInfo};
use tracing::{debug, warn};

use crate::error::{SchedulerError, SchedulerResult};

/// Count one more scheduling attempt against `max_attempts`.
///
/// With `max_attempts == 1` retries are disabled and the retry record is
/// left alone. Exceeding the limit fails with no-valid-host naming every
/// instance of the batch.
pub fn begin_attempt(
    ctx: &mut RequestContext,
    max_attempts: i64,
    instance_uuids: &[InstanceId],
) -> SchedulerResult<()> {
    if max_attempts < 1 {
        return Err(ConfigError::Invalid {
            field: "max_attempts",
            message: format!("must be >= 1, got {max_attempts}"),
        }
        .into());
    }
    if max_attempts == 1 {
        return Ok(());
    }

    let retry = ctx.retry.get_or_insert_with(RetryInfo::default);
    // A counter that can no longer grow has exceeded any limit.
    let attempt = retry.attempt_count.checked_add(1);
    if let Some(attempt) = attempt {
        retry.attempt_count = attempt;
    }
    debug!(?attempt, max_attempts, "scheduling attempt");

    if attempt.is_none_or(|attempt| i64::from(attempt) > max_attempts) {
        warn!(?attempt, max_attempts, instances = ?instance_uuids, "scheduling attempts exhausted");
        return Err(SchedulerError::no_valid_host(
            format!("exceeded max scheduling attempts {max_attempts} for instances {instance_uuids:?}"),
            instance_uuids.to_vec(),
        ));
    }
    Ok(())
}

/// Remember that `key` was chosen, so a later attempt avoids it.
///
/// Does nothing when retries are disabled (no retry record).
pub fn record_chosen(ctx: &mut RequestContext, key: HostNode) {
    if let Some(retry) = ctx.retry.as_mut() {
        retry.tried_hosts.push(key);
    }
}
