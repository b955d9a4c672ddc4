//! FilterScheduler — batch placement over a private host snapshot.
//!
//! For every instance of a batch the scheduler filters the snapshot, weighs
//! the survivors, picks one host from the best-weighted subset and consumes
//! the requested resources from its local copy of that host, so a batch
//! never double-books a node. The shared capacity store is only read, once
//! per call; concurrent calls may race for the same host and rely on the
//! compute side to reject over-capacity work.

use std::sync::{Mutex, PoisonError};

use hostgrid_core::{Instance, InstanceId, RequestSpec, SchedulerConfig};
use hostgrid_placement::{
    FilterPipeline, HostScope, HostSnapshot, RequestContext, WeighedHost, WeightPipeline,
    choose_host, snapshot_from_records,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::affinity;
use crate::collaborators::{ComputeDispatch, Fault, PrepResize, RunInstance, SchedulerBackend};
use crate::error::{SchedulerError, SchedulerResult};
use crate::retry;

/// Fault code stamped on instances that found no host.
const NO_VALID_HOST_FAULT: u16 = 500;

pub struct FilterScheduler<B, D> {
    pub(crate) config: SchedulerConfig,
    pub(crate) backend: B,
    pub(crate) dispatch: D,
    filters: FilterPipeline,
    weights: WeightPipeline,
    rng: Mutex<StdRng>,
}

impl<B, D> FilterScheduler<B, D>
where
    B: SchedulerBackend,
    D: ComputeDispatch,
{
    /// Create a scheduler with an entropy-seeded random source.
    pub fn new(config: SchedulerConfig, backend: B, dispatch: D) -> SchedulerResult<Self> {
        Self::with_rng(config, backend, dispatch, StdRng::from_entropy())
    }

    /// Create a scheduler with a caller-supplied random source.
    pub fn with_rng(
        config: SchedulerConfig,
        backend: B,
        dispatch: D,
        rng: StdRng,
    ) -> SchedulerResult<Self> {
        config.validate()?;
        let filters = FilterPipeline::from_config(&config);
        let weights = WeightPipeline::from_config(&config);
        info!(
            filters = ?filters.names(),
            weighers = config.weighers.len(),
            subset = config.subset_size(),
            max_attempts = config.max_attempts,
            "filter scheduler ready"
        );
        Ok(Self {
            config,
            backend,
            dispatch,
            filters,
            weights,
            rng: Mutex::new(rng),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn dispatch(&self) -> &D {
        &self.dispatch
    }

    // ── Selection ──────────────────────────────────────────────────

    /// Choose one host per instance of `spec`.
    ///
    /// Counts a retry attempt, seeds anti-affinity hosts, then fills the
    /// batch slot by slot. Returns exactly `spec.num_instances()` hosts or
    /// fails with no-valid-host carrying the placements already made.
    pub fn schedule(
        &self,
        ctx: &mut RequestContext,
        spec: &RequestSpec,
    ) -> SchedulerResult<Vec<WeighedHost>> {
        retry::begin_attempt(ctx, self.config.max_attempts, &spec.instance_uuids)?;
        affinity::seed_occupied_hosts(ctx, &self.backend)?;
        ctx.load_request(spec);

        let wanted = spec.num_instances();
        let mut snapshot = self.snapshot(&HostScope::All)?;
        info!(hosts = snapshot.len(), wanted, "scheduling batch");

        // The requested count is caller input; size the buffer by the fleet.
        let mut selected: Vec<WeighedHost> = Vec::with_capacity(wanted.min(snapshot.len()));
        for index in 0..wanted {
            let passed = self.filters.apply(snapshot.values(), ctx);
            debug!(index, candidates = passed.len(), "hosts after filtering");
            let weighed = self.weights.weigh(passed, ctx);

            let chosen = {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                choose_host(weighed, self.config.subset_size(), &mut *rng)
            };
            let Some(mut chosen) = chosen else {
                let unplaced: Vec<InstanceId> =
                    spec.instance_uuids.iter().skip(index).cloned().collect();
                warn!(index, wanted, ?unplaced, "no valid host for instance");
                return Err(SchedulerError::NoValidHost {
                    reason: format!("no host can take instance {} of {wanted}", index + 1),
                    unplaced,
                    placed: selected,
                });
            };

            if let Some(state) = snapshot.get_mut(&chosen.host.key()) {
                self.filters.populate_limits(state);
                state.consume_from_instance(&spec.instance_type);
                chosen.host = state.clone();
            }
            affinity::record_placement(ctx, &chosen.host.host);
            info!(index, host = %chosen.host.key(), weight = chosen.weight, "host chosen");
            selected.push(chosen);
        }
        Ok(selected)
    }

    /// Host names chosen for `spec`, in instance order.
    pub fn select_hosts(
        &self,
        ctx: &mut RequestContext,
        spec: &RequestSpec,
    ) -> SchedulerResult<Vec<String>> {
        let selected = self.schedule(ctx, spec)?;
        Ok(selected.into_iter().map(|w| w.host.host).collect())
    }

    /// Read the capacity store once into a private, mutable snapshot.
    pub(crate) fn snapshot(&self, scope: &HostScope) -> SchedulerResult<HostSnapshot> {
        let states = self.backend.host_states(scope)?;
        Ok(snapshot_from_records(states))
    }

    // ── Dispatch ───────────────────────────────────────────────────

    /// Schedule a batch and send each placed instance to its host.
    ///
    /// Instances are dispatched in request order, each stamped with its
    /// launch index and (under a group hint) the group name. When the batch
    /// runs short, the placed instances are still dispatched, the unplaced
    /// ones are marked errored and the no-valid-host error is returned.
    pub async fn schedule_run_instance(
        &self,
        ctx: &mut RequestContext,
        spec: &RequestSpec,
    ) -> SchedulerResult<Vec<WeighedHost>> {
        let (placed, shortfall) = match self.schedule(ctx, spec) {
            Ok(placed) => (placed, None),
            Err(SchedulerError::NoValidHost {
                reason,
                unplaced,
                placed,
            }) => (placed, Some((reason, unplaced))),
            Err(other) => return Err(other),
        };

        for (index, weighed) in placed.iter().enumerate() {
            self.provision(ctx, spec, index, weighed).await?;
        }

        match shortfall {
            None => Ok(placed),
            Some((reason, unplaced)) => {
                let fault = Fault {
                    code: NO_VALID_HOST_FAULT,
                    message: format!("no valid host was found: {reason}"),
                };
                for uuid in &unplaced {
                    warn!(%uuid, "marking unplaced instance errored");
                    self.backend.mark_errored(uuid, &fault)?;
                }
                Err(SchedulerError::NoValidHost {
                    reason,
                    unplaced,
                    placed,
                })
            }
        }
    }

    async fn provision(
        &self,
        ctx: &RequestContext,
        spec: &RequestSpec,
        index: usize,
        weighed: &WeighedHost,
    ) -> SchedulerResult<()> {
        let launch_index = u32::try_from(index).unwrap_or(u32::MAX);
        let mut request_spec = spec.clone();
        let properties = &mut request_spec.instance_properties;
        properties.launch_index = Some(launch_index);
        if let Some(group) = ctx.group_name() {
            properties
                .system_metadata
                .insert("group".to_string(), group.to_string());
        }

        let instance_uuid = spec.instance_uuids.get(index).cloned();
        if let Some(uuid) = &instance_uuid {
            self.backend
                .stamp_scheduled(uuid, launch_index, &properties.system_metadata)?;
        }

        // Each instance carries only its own chosen node on top of the
        // hosts tried by earlier attempts.
        let mut instance_ctx = ctx.clone();
        retry::record_chosen(&mut instance_ctx, weighed.host.key());
        instance_ctx.limits = weighed.host.limits.clone();

        self.dispatch
            .run_instance(RunInstance {
                host: weighed.host.host.clone(),
                node: weighed.host.nodename.clone(),
                instance_uuid,
                request_spec,
                context: instance_ctx,
            })
            .await?;
        Ok(())
    }

    /// Pick a destination for resizing `instance` and send it `prep_resize`.
    ///
    /// The chosen node goes into the caller's retry record. The instance's
    /// recorded host is left untouched; the compute side moves it.
    pub async fn schedule_prep_resize(
        &self,
        ctx: &mut RequestContext,
        spec: &RequestSpec,
        instance: &Instance,
    ) -> SchedulerResult<WeighedHost> {
        let mut request_spec = spec.clone();
        request_spec.instance_uuids = vec![instance.uuid.clone()];
        request_spec.num_instances = Some(1);

        let chosen = self
            .schedule(ctx, &request_spec)?
            .pop()
            .ok_or_else(|| {
                SchedulerError::no_valid_host("no host chosen for resize", vec![instance.uuid.clone()])
            })?;

        retry::record_chosen(ctx, chosen.host.key());
        ctx.limits = chosen.host.limits.clone();

        self.dispatch
            .prep_resize(PrepResize {
                host: chosen.host.host.clone(),
                node: chosen.host.nodename.clone(),
                instance: instance.clone(),
                instance_type: request_spec.instance_type.clone(),
                request_spec,
                context: ctx.clone(),
            })
            .await?;
        info!(instance = %instance.uuid, dest = %chosen.host.key(), "resize prepared");
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use hostgrid_core::{FilterKind, HostNode};
    use hostgrid_placement::RetryInfo;

    use super::*;
    use crate::dispatch::{Dispatched, LogDispatch};
    use crate::test_support::*;

    // ── schedule ───────────────────────────────────────────────────

    #[test]
    fn batch_of_n_returns_n_placements() {
        let backend = FakeBackend::with_hosts(vec![
            host("host1", 4096),
            host("host2", 4096),
            host("host3", 4096),
        ]);
        let sched = scheduler(backend, SchedulerConfig::default());
        let spec = request(&["a", "b", "c", "d", "e"]);

        let placed = sched.schedule(&mut RequestContext::default(), &spec).unwrap();

        assert_eq!(placed.len(), 5);
        assert!(placed.iter().all(|w| !w.host.host.is_empty()));
    }

    #[test]
    fn empty_snapshot_is_no_valid_host() {
        let sched = scheduler(FakeBackend::default(), SchedulerConfig::default());
        let err = sched
            .schedule(&mut RequestContext::default(), &request(&["fake-uuid1"]))
            .unwrap_err();

        match err {
            SchedulerError::NoValidHost { unplaced, placed, .. } => {
                assert_eq!(unplaced, vec!["fake-uuid1".to_string()]);
                assert!(placed.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn provisional_consume_prevents_double_booking() {
        // Each host fits exactly one 1024 MB instance without overcommit.
        let config = SchedulerConfig {
            ram_allocation_ratio: 1.0,
            ..SchedulerConfig::default()
        };
        let backend = FakeBackend::with_hosts(vec![host("host1", 1024), host("host2", 1024)]);
        let sched = scheduler(backend, config);

        let err = sched
            .schedule(&mut RequestContext::default(), &request(&["a", "b", "c"]))
            .unwrap_err();

        match err {
            SchedulerError::NoValidHost { unplaced, placed, .. } => {
                let hosts: BTreeSet<String> = placed.iter().map(|w| w.host.host.clone()).collect();
                assert_eq!(hosts.len(), 2);
                assert_eq!(unplaced, vec!["c".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn subset_of_one_picks_best_host() {
        let backend = FakeBackend::with_hosts(vec![
            host("small", 2048),
            host("large", 8192),
            host("medium", 4096),
        ]);
        let sched = scheduler(backend, SchedulerConfig::default());

        for _ in 0..5 {
            let placed = sched
                .schedule(&mut RequestContext::default(), &request(&["a"]))
                .unwrap();
            assert_eq!(placed[0].host.host, "large");
            assert_eq!(placed[0].weight, 8192.0);
        }
    }

    #[test]
    fn large_subset_still_picks_one_host_per_slot() {
        let config = SchedulerConfig {
            host_subset_size: 20,
            ..SchedulerConfig::default()
        };
        let names = ["h1", "h2", "h3", "h4"];
        let backend = FakeBackend::with_hosts(names.iter().map(|n| host(n, 8192)).collect());
        let sched = scheduler(backend, config);

        let placed = sched
            .schedule(&mut RequestContext::default(), &request(&["a", "b"]))
            .unwrap();

        assert_eq!(placed.len(), 2);
        assert!(placed.iter().all(|w| names.contains(&w.host.host.as_str())));
    }

    #[test]
    fn chosen_host_carries_limits_and_consumption() {
        let backend = FakeBackend::with_hosts(vec![host("host1", 4096)]);
        let sched = scheduler(backend, SchedulerConfig::default());

        let placed = sched
            .schedule(&mut RequestContext::default(), &request(&["a"]))
            .unwrap();

        let chosen = &placed[0].host;
        assert_eq!(chosen.limits.get("memory_mb"), Some(&6144.0));
        assert_eq!(chosen.free_ram_mb, 4096 - 1024);
        assert_eq!(chosen.num_instances, 1);
    }

    #[test]
    fn anti_affinity_never_repeats_host_in_batch() {
        let backend = FakeBackend::with_hosts(vec![
            host("host1", 8192),
            host("host2", 8192),
            host("host3", 8192),
        ])
        .with_group("cats", &["host1"]);
        let sched = scheduler(backend, SchedulerConfig::default());
        let mut ctx = RequestContext::with_group("cats");

        let placed = sched.schedule(&mut ctx, &request(&["a", "b"])).unwrap();

        let hosts: Vec<&str> = placed.iter().map(|w| w.host.host.as_str()).collect();
        assert!(!hosts.contains(&"host1"));
        assert_ne!(hosts[0], hosts[1]);
        assert!(ctx.is_occupied("host2") && ctx.is_occupied("host3"));
    }

    #[test]
    fn anti_affinity_holds_when_filter_is_not_configured() {
        let config = SchedulerConfig {
            filters: vec![FilterKind::Ram],
            ..SchedulerConfig::default()
        };
        let backend = FakeBackend::with_hosts(vec![host("host1", 8192), host("host2", 1024)]);
        let sched = scheduler(backend, config);
        let mut ctx = RequestContext::with_group("cats");

        let hosts = sched.select_hosts(&mut ctx, &request(&["a", "b"])).unwrap();

        assert_eq!(hosts, vec!["host1".to_string(), "host2".to_string()]);
    }

    #[test]
    fn oversized_count_fails_without_reserving_for_it() {
        let config = SchedulerConfig {
            ram_allocation_ratio: 1.0,
            ..SchedulerConfig::default()
        };
        let backend = FakeBackend::with_hosts(vec![host("host1", 1024)]);
        let sched = scheduler(backend, config);
        let mut spec = request(&[]);
        spec.num_instances = Some(u32::MAX);

        let err = sched.schedule(&mut RequestContext::default(), &spec).unwrap_err();

        match err {
            SchedulerError::NoValidHost { placed, unplaced, .. } => {
                assert_eq!(placed.len(), 1);
                assert!(unplaced.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn anti_affinity_runs_out_of_hosts() {
        let backend = FakeBackend::with_hosts(vec![host("host1", 8192), host("host2", 8192)]);
        let sched = scheduler(backend, SchedulerConfig::default());
        let mut ctx = RequestContext::with_group("dogs");

        let err = sched.schedule(&mut ctx, &request(&["a", "b", "c"])).unwrap_err();
        assert!(matches!(err, SchedulerError::NoValidHost { ref unplaced, .. } if unplaced.len() == 1));
    }

    #[test]
    fn retry_filter_skips_tried_nodes() {
        let backend = FakeBackend::with_hosts(vec![host("host1", 8192), host("host2", 1024)]);
        let sched = scheduler(backend, SchedulerConfig::default());
        let mut ctx = RequestContext {
            retry: Some(RetryInfo {
                attempt_count: 1,
                tried_hosts: vec![HostNode::new("host1", "host1")],
            }),
            ..RequestContext::default()
        };

        let hosts = sched.select_hosts(&mut ctx, &request(&["a"])).unwrap();

        assert_eq!(hosts, vec!["host2".to_string()]);
        assert_eq!(ctx.retry.unwrap().attempt_count, 2);
    }

    #[test]
    fn retry_disabled_leaves_context_alone() {
        let config = SchedulerConfig {
            max_attempts: 1,
            ..SchedulerConfig::default()
        };
        let sched = scheduler(FakeBackend::default(), config);
        let mut ctx = RequestContext::default();

        let _ = sched.schedule(&mut ctx, &request(&["a"]));
        assert!(ctx.retry.is_none());
    }

    #[test]
    fn first_attempt_is_counted_even_without_hosts() {
        let config = SchedulerConfig {
            max_attempts: 2,
            ..SchedulerConfig::default()
        };
        let sched = scheduler(FakeBackend::default(), config);
        let mut ctx = RequestContext::default();

        let _ = sched.schedule(&mut ctx, &request(&["a"]));
        assert_eq!(ctx.retry.unwrap().attempt_count, 1);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = SchedulerConfig {
            max_attempts: 0,
            ..SchedulerConfig::default()
        };
        let result = FilterScheduler::with_rng(config, FakeBackend::default(), LogDispatch::new(), seeded());
        assert!(matches!(result, Err(SchedulerError::Config(_))));
    }

    #[test]
    fn select_hosts_follows_batch_order() {
        let config = SchedulerConfig {
            filters: vec![FilterKind::Ram],
            ..SchedulerConfig::default()
        };
        let backend = FakeBackend::with_hosts(vec![host("host1", 3072), host("host2", 2048)]);
        let sched = scheduler(backend, config);
        let mut spec = request(&[]);
        spec.num_instances = Some(3);

        let hosts = sched.select_hosts(&mut RequestContext::default(), &spec).unwrap();

        // 3072 → host1 (2048 left, tie with host2 keeps key order) → host1 → host2
        assert_eq!(hosts, vec!["host1", "host1", "host2"]);
    }

    #[test]
    fn select_hosts_without_hosts_fails() {
        let sched = scheduler(FakeBackend::default(), SchedulerConfig::default());
        let err = sched
            .select_hosts(&mut RequestContext::default(), &request(&[]))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NoValidHost { .. }));
    }

    #[test]
    fn capacity_store_failure_propagates_untouched() {
        let sched = scheduler(FakeBackend::failing(), SchedulerConfig::default());
        let err = sched
            .schedule(&mut RequestContext::default(), &request(&["a"]))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Collaborator(_)));
        assert_eq!(err.to_string(), "capacity store offline");
    }

    // ── schedule_run_instance ──────────────────────────────────────

    #[tokio::test]
    async fn run_instance_stamps_launch_index_in_order() {
        let backend = FakeBackend::with_hosts(vec![host("host1", 8192), host("host2", 8192)]);
        let sched = scheduler(backend, SchedulerConfig::default());

        sched
            .schedule_run_instance(&mut RequestContext::default(), &request(&["fake-uuid1", "fake-uuid2"]))
            .await
            .unwrap();

        let stamped = sched.backend().stamped();
        assert_eq!(stamped[0].0, "fake-uuid1");
        assert_eq!(stamped[0].1, 0);
        assert_eq!(stamped[1].0, "fake-uuid2");
        assert_eq!(stamped[1].1, 1);

        let runs = run_requests(sched.dispatch());
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].request_spec.instance_properties.launch_index, Some(0));
        assert_eq!(runs[1].request_spec.instance_properties.launch_index, Some(1));
        assert_eq!(runs[1].instance_uuid.as_deref(), Some("fake-uuid2"));
    }

    #[tokio::test]
    async fn run_instance_merges_group_metadata() {
        let backend = FakeBackend::with_hosts(vec![host("host3", 8192), host("host4", 8192)]);
        let sched = scheduler(backend, SchedulerConfig::default());
        let mut spec = request(&["fake-uuid1-1", "fake-uuid1-2"]);
        spec.instance_properties
            .system_metadata
            .insert("system".to_string(), "metadata".to_string());

        sched
            .schedule_run_instance(&mut RequestContext::with_group("cats"), &spec)
            .await
            .unwrap();

        for (_, _, metadata) in sched.backend().stamped() {
            assert_eq!(metadata.get("system").map(String::as_str), Some("metadata"));
            assert_eq!(metadata.get("group").map(String::as_str), Some("cats"));
        }
        let hosts: BTreeSet<String> = run_requests(sched.dispatch())
            .into_iter()
            .map(|r| r.host)
            .collect();
        assert_eq!(hosts.len(), 2);
        // The caller's spec is left as it was.
        assert!(!spec.instance_properties.system_metadata.contains_key("group"));
    }

    #[tokio::test]
    async fn run_instance_scrubs_sibling_retry_hosts() {
        let backend = FakeBackend::with_hosts(vec![host("host1", 8192), host("host2", 8192)]);
        let sched = scheduler(backend, SchedulerConfig::default());
        let mut ctx = RequestContext::with_group("web");
        ctx.retry = Some(RetryInfo {
            attempt_count: 0,
            tried_hosts: vec![HostNode::new("old", "old")],
        });

        sched
            .schedule_run_instance(&mut ctx, &request(&["a", "b"]))
            .await
            .unwrap();

        for run in run_requests(sched.dispatch()) {
            let tried = run.context.retry.unwrap().tried_hosts;
            assert_eq!(
                tried,
                vec![HostNode::new("old", "old"), HostNode::new(run.host.clone(), run.node.clone())]
            );
            assert!(run.context.limits.contains_key("memory_mb"));
        }
    }

    #[tokio::test]
    async fn run_instance_without_hosts_marks_errored() {
        let sched = scheduler(FakeBackend::default(), SchedulerConfig::default());

        let err = sched
            .schedule_run_instance(&mut RequestContext::default(), &request(&["fake-uuid1"]))
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::NoValidHost { .. }));
        let errored = sched.backend().errored();
        assert_eq!(errored.len(), 1);
        assert_eq!(errored[0].0, "fake-uuid1");
        assert!(errored[0].1.message.contains("no valid host"));
        assert!(sched.dispatch().sent().is_empty());
    }

    #[tokio::test]
    async fn run_instance_dispatches_placed_before_failing() {
        let config = SchedulerConfig {
            ram_allocation_ratio: 1.0,
            ..SchedulerConfig::default()
        };
        let backend = FakeBackend::with_hosts(vec![host("host1", 1024)]);
        let sched = scheduler(backend, config);

        let err = sched
            .schedule_run_instance(&mut RequestContext::default(), &request(&["a", "b", "c"]))
            .await
            .unwrap_err();

        match err {
            SchedulerError::NoValidHost { unplaced, placed, .. } => {
                assert_eq!(placed.len(), 1);
                assert_eq!(unplaced, vec!["b".to_string(), "c".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(run_requests(sched.dispatch()).len(), 1);
        let errored: Vec<String> = sched.backend().errored().into_iter().map(|(u, _)| u).collect();
        assert_eq!(errored, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn exhausted_retries_mark_every_instance_errored() {
        let config = SchedulerConfig {
            max_attempts: 2,
            ..SchedulerConfig::default()
        };
        let backend = FakeBackend::with_hosts(vec![host("host1", 8192)]);
        let sched = scheduler(backend, config);
        let mut ctx = RequestContext {
            retry: Some(RetryInfo {
                attempt_count: 2,
                tried_hosts: Vec::new(),
            }),
            ..RequestContext::default()
        };
        let spec = request(&["fake-id"]);

        let err = sched.schedule_run_instance(&mut ctx, &spec).await.unwrap_err();

        assert!(matches!(err, SchedulerError::NoValidHost { .. }));
        assert_eq!(spec.instance_uuids, vec!["fake-id".to_string()]);
        assert_eq!(sched.backend().errored().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_failure_propagates() {
        let backend = FakeBackend::with_hosts(vec![host("host1", 8192)]);
        let sched =
            FilterScheduler::with_rng(SchedulerConfig::default(), backend, FailingDispatch, seeded()).unwrap();

        let err = sched
            .schedule_run_instance(&mut RequestContext::default(), &request(&["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Collaborator(_)));
    }

    // ── schedule_prep_resize ───────────────────────────────────────

    #[tokio::test]
    async fn prep_resize_records_retry_and_never_stamps() {
        let backend = FakeBackend::with_hosts(vec![host("host", 8192)]);
        let sched = scheduler(backend, SchedulerConfig::default());
        let mut ctx = RequestContext {
            retry: Some(RetryInfo {
                attempt_count: 0,
                tried_hosts: Vec::new(),
            }),
            ..RequestContext::default()
        };
        let instance = existing_instance("fakeuuid", "old-host");

        let chosen = sched
            .schedule_prep_resize(&mut ctx, &request(&[]), &instance)
            .await
            .unwrap();

        assert_eq!(chosen.host.host, "host");
        assert_eq!(
            ctx.retry.as_ref().unwrap().tried_hosts,
            vec![HostNode::new("host", "host")]
        );
        assert!(sched.backend().stamped().is_empty());

        let sent = sched.dispatch().sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Dispatched::PrepResize(req) => {
                assert_eq!(req.host, "host");
                assert_eq!(req.instance.host, "old-host");
                assert_eq!(req.request_spec.instance_uuids, vec!["fakeuuid".to_string()]);
            }
            other => panic!("unexpected dispatch: {other:?}"),
        }
    }

    #[tokio::test]
    async fn prep_resize_without_hosts_fails() {
        let sched = scheduler(FakeBackend::default(), SchedulerConfig::default());
        let err = sched
            .schedule_prep_resize(
                &mut RequestContext::default(),
                &request(&[]),
                &existing_instance("u", "h"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NoValidHost { .. }));
        assert!(sched.dispatch().sent().is_empty());
    }
}
