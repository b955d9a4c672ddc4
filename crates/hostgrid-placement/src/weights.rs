//! Host weighers.
//!
//! Each weigher yields a raw score per host. A host's weight is the sum of
//! `multiplier × raw` over the configured weighers. A positive multiplier
//! spreads load toward the highest raw score, a negative one stacks it.

use hostgrid_core::{SchedulerConfig, WeigherKind};

use crate::context::RequestContext;
use crate::host_state::HostState;

pub trait HostWeigher: Send + Sync {
    fn name(&self) -> &'static str;

    fn raw_weight(&self, host: &HostState, ctx: &RequestContext) -> f64;
}

/// Free RAM in MB.
#[derive(Debug, Clone, Default)]
pub struct RamWeigher;

impl HostWeigher for RamWeigher {
    fn name(&self) -> &'static str {
        "ram"
    }

    fn raw_weight(&self, host: &HostState, _ctx: &RequestContext) -> f64 {
        host.free_ram_mb as f64
    }
}

/// Free vCPUs.
#[derive(Debug, Clone, Default)]
pub struct CpuWeigher;

impl HostWeigher for CpuWeigher {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn raw_weight(&self, host: &HostState, _ctx: &RequestContext) -> f64 {
        host.free_vcpus() as f64
    }
}

/// Free local disk in GB.
#[derive(Debug, Clone, Default)]
pub struct DiskWeigher;

impl HostWeigher for DiskWeigher {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn raw_weight(&self, host: &HostState, _ctx: &RequestContext) -> f64 {
        host.free_disk_gb() as f64
    }
}

/// A candidate host with its combined weight.
#[derive(Debug, Clone, PartialEq)]
pub struct WeighedHost {
    pub host: HostState,
    pub weight: f64,
}

pub struct WeightPipeline {
    weighers: Vec<(Box<dyn HostWeigher>, f64)>,
}

impl WeightPipeline {
    pub fn new(weighers: Vec<(Box<dyn HostWeigher>, f64)>) -> Self {
        Self { weighers }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        let weighers = config
            .weighers
            .iter()
            .map(|spec| -> (Box<dyn HostWeigher>, f64) {
                let weigher: Box<dyn HostWeigher> = match spec.kind {
                    WeigherKind::Ram => Box::new(RamWeigher),
                    WeigherKind::Cpu => Box::new(CpuWeigher),
                    WeigherKind::Disk => Box::new(DiskWeigher),
                };
                (weigher, spec.multiplier)
            })
            .collect();
        Self::new(weighers)
    }

    pub fn weight_of(&self, host: &HostState, ctx: &RequestContext) -> f64 {
        self.weighers
            .iter()
            .map(|(w, multiplier)| multiplier * w.raw_weight(host, ctx))
            .sum()
    }

    /// Weigh `hosts` and sort them best first.
    ///
    /// The sort is stable, so hosts of equal weight keep their input order.
    pub fn weigh<'a, I>(&self, hosts: I, ctx: &RequestContext) -> Vec<WeighedHost>
    where
        I: IntoIterator<Item = &'a HostState>,
    {
        let mut weighed: Vec<WeighedHost> = hosts
            .into_iter()
            .map(|host| WeighedHost {
                weight: self.weight_of(host, ctx),
                host: host.clone(),
            })
            .collect();
        weighed.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        weighed
    }
}
