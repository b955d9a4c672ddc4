//! Host filters.
//!
//! Each filter is a pure predicate over a host and the request context. The
//! pipeline ANDs them in configured order and keeps the survivors in input
//! order. Resource filters also know the soft limit they enforce, which is
//! written onto a host once it has been chosen.

use hostgrid_core::{FilterKind, SchedulerConfig};
use tracing::debug;

use crate::context::RequestContext;
use crate::host_state::HostState;

pub trait HostFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn host_passes(&self, host: &HostState, ctx: &RequestContext) -> bool;

    /// Named ceiling this filter enforces on `host`, if any.
    fn limit(&self, _host: &HostState) -> Option<(&'static str, f64)> {
        None
    }
}

// ── Resource filters ──────────────────────────────────────────────

/// Passes when overcommitted RAM still covers the request.
#[derive(Debug, Clone)]
pub struct RamFilter {
    pub allocation_ratio: f64,
}

impl HostFilter for RamFilter {
    fn name(&self) -> &'static str {
        "ram"
    }

    fn host_passes(&self, host: &HostState, ctx: &RequestContext) -> bool {
        let total = host.total_memory_mb as f64;
        let used = (host.total_memory_mb - host.free_ram_mb) as f64;
        let usable = total * self.allocation_ratio - used;
        usable >= ctx.resources.memory_mb as f64
    }

    fn limit(&self, host: &HostState) -> Option<(&'static str, f64)> {
        Some(("memory_mb", host.total_memory_mb as f64 * self.allocation_ratio))
    }
}

/// Passes when overcommitted vCPUs still cover the request.
///
/// Hosts reporting zero vCPUs have unknown capacity and always pass.
#[derive(Debug, Clone)]
pub struct CoreFilter {
    pub allocation_ratio: f64,
}

impl HostFilter for CoreFilter {
    fn name(&self) -> &'static str {
        "core"
    }

    fn host_passes(&self, host: &HostState, ctx: &RequestContext) -> bool {
        if host.total_vcpus == 0 {
            return true;
        }
        let limit = f64::from(host.total_vcpus) * self.allocation_ratio;
        limit - f64::from(host.vcpus_used) >= f64::from(ctx.resources.vcpus)
    }

    fn limit(&self, host: &HostState) -> Option<(&'static str, f64)> {
        (host.total_vcpus > 0)
            .then(|| ("vcpu", f64::from(host.total_vcpus) * self.allocation_ratio))
    }
}

/// Passes when overcommitted local disk covers root plus ephemeral.
#[derive(Debug, Clone)]
pub struct DiskFilter {
    pub allocation_ratio: f64,
}

impl HostFilter for DiskFilter {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn host_passes(&self, host: &HostState, ctx: &RequestContext) -> bool {
        let limit = host.total_disk_gb as f64 * self.allocation_ratio;
        limit - host.used_disk_gb as f64 >= ctx.resources.disk_gb() as f64
    }

    fn limit(&self, host: &HostState) -> Option<(&'static str, f64)> {
        Some(("disk_gb", host.total_disk_gb as f64 * self.allocation_ratio))
    }
}

// ── Bookkeeping filters ───────────────────────────────────────────

/// Rejects nodes already tried by an earlier attempt.
#[derive(Debug, Clone, Default)]
pub struct RetryFilter;

impl HostFilter for RetryFilter {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn host_passes(&self, host: &HostState, ctx: &RequestContext) -> bool {
        !ctx.was_tried(&host.key())
    }
}

/// Rejects hosts already running a member of the request's group.
#[derive(Debug, Clone, Default)]
pub struct GroupAntiAffinityFilter;

impl HostFilter for GroupAntiAffinityFilter {
    fn name(&self) -> &'static str {
        "group_anti_affinity"
    }

    fn host_passes(&self, host: &HostState, ctx: &RequestContext) -> bool {
        !ctx.is_occupied(&host.host)
    }
}

// ── Pipeline ──────────────────────────────────────────────────────

pub struct FilterPipeline {
    filters: Vec<Box<dyn HostFilter>>,
}

impl FilterPipeline {
    pub fn new(filters: Vec<Box<dyn HostFilter>>) -> Self {
        Self { filters }
    }

    /// Build the configured filters, in configured order.
    ///
    /// Retry and group anti-affinity exclusion always run: a retry filter
    /// missing from the list is put first, an anti-affinity filter missing
    /// from the list is put last. Repeated kinds are built once.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        let mut kinds: Vec<FilterKind> = Vec::with_capacity(config.filters.len() + 2);
        if !config.filters.contains(&FilterKind::Retry) {
            kinds.push(FilterKind::Retry);
        }
        for kind in &config.filters {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        if !kinds.contains(&FilterKind::GroupAntiAffinity) {
            kinds.push(FilterKind::GroupAntiAffinity);
        }

        let filters = kinds
            .into_iter()
            .map(|kind| -> Box<dyn HostFilter> {
                match kind {
                    FilterKind::Retry => Box::new(RetryFilter),
                    FilterKind::Ram => Box::new(RamFilter {
                        allocation_ratio: config.ram_allocation_ratio,
                    }),
                    FilterKind::Core => Box::new(CoreFilter {
                        allocation_ratio: config.cpu_allocation_ratio,
                    }),
                    FilterKind::Disk => Box::new(DiskFilter {
                        allocation_ratio: config.disk_allocation_ratio,
                    }),
                    FilterKind::GroupAntiAffinity => Box::new(GroupAntiAffinityFilter),
                }
            })
            .collect();
        Self::new(filters)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Hosts passing every filter, in their input order.
    pub fn apply<'a, I>(&self, hosts: I, ctx: &RequestContext) -> Vec<&'a HostState>
    where
        I: IntoIterator<Item = &'a HostState>,
    {
        hosts
            .into_iter()
            .filter(|host| {
                self.filters.iter().all(|f| {
                    let passes = f.host_passes(host, ctx);
                    if !passes {
                        debug!(host = %host.key(), filter = f.name(), "host rejected");
                    }
                    passes
                })
            })
            .collect()
    }

    /// Write every filter's limit onto a chosen host.
    pub fn populate_limits(&self, host: &mut HostState) {
        for filter in &self.filters {
            if let Some((name, value)) = filter.limit(host) {
                host.limits.insert(name.to_string(), value);
            }
        }
    }
}
