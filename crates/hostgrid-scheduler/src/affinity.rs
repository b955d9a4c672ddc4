//! Anti-affinity group bookkeeping.
//!
//! Only the exclusion side exists: hosts running a group member are kept
//! out of the candidate set. Restricting placement *to* group hosts is not
//! supported.

use hostgrid_placement::RequestContext;
use tracing::debug;

use crate::collaborators::GroupMembership;

/// Add the hosts currently occupied by the context's group to the hosts
/// the caller already supplied. No-op without a group hint.
pub fn seed_occupied_hosts<G>(ctx: &mut RequestContext, groups: &G) -> anyhow::Result<()>
where
    G: GroupMembership + ?Sized,
{
    let Some(group) = ctx.group.as_mut() else {
        return Ok(());
    };
    let occupied = groups.occupied_hosts(&group.name)?;
    for host in occupied {
        if !group.occupied_hosts.contains(&host) {
            group.occupied_hosts.push(host);
        }
    }
    debug!(group = %group.name, occupied = ?group.occupied_hosts, "anti-affinity hosts seeded");
    Ok(())
}

/// Mark `host` as taken by the group for the rest of the batch.
pub fn record_placement(ctx: &mut RequestContext, host: &str) {
    if let Some(group) = ctx.group.as_mut() {
        group.occupied_hosts.push(host.to_string());
    }
}
