//! End-to-end resolution-pipeline scenarios (§4.1, §8) against an in-process
//! mock L1 store and mock upstream dispatcher. L0, the blocklist matcher and
//! the query-log sink are the real adapters from `sentrydns-infrastructure`
//! — only the two ports a scenario needs fine control over are mocked, per
//! the "Cache interface over two backends" design note.

use async_trait::async_trait;
use sentrydns_application::ports::{BlocklistMatcher, L1Stats, L1Store, UpstreamDispatcher};
use sentrydns_application::{
    BlockedKind, PipelineConfig, PipelineOutcome, RefreshCoordinator, RefreshCoordinatorConfig,
    ResolutionPipeline, SweepAction,
};
use sentrydns_application::reload::{ClientRegistry, LocalRecordsRegistry};
use sentrydns_application::stats::StatsRegistry;
use sentrydns_domain::config::BlockedResponse;
use sentrydns_domain::{
    Answer, CacheEntry, CacheKey, ClientTable, Freshness, LocalRecord, LocalRecordsTable,
    Question, RecordType, ResolverError,
};
use sentrydns_infrastructure::{BloomBlocklistMatcher, ChannelQueryLogSink, LruL0Cache};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// In-memory stand-in for a clustered L1 backend: a plain table of entries
/// plus a lease map, no injected-error path needed by the scenarios below.
#[derive(Default)]
struct MockL1Store {
    entries: Mutex<HashMap<String, CacheEntry>>,
    leases: Mutex<HashMap<String, u64>>,
}

#[async_trait]
impl L1Store for MockL1Store {
    async fn get_with_ttl(
        &self,
        key: &CacheKey,
        now: u64,
    ) -> Result<Option<(CacheEntry, Freshness)>, ResolverError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(key.as_str())
            .map(|e| (e.clone(), e.freshness(now))))
    }

    async fn set_with_index(
        &self,
        entry: CacheEntry,
        _index_buckets: &[u64],
    ) -> Result<(), ResolverError> {
        self.entries
            .lock()
            .unwrap()
            .insert(entry.key.as_str().to_string(), entry);
        Ok(())
    }

    async fn expiry_candidates(
        &self,
        _window_start: u64,
        _window_end: u64,
        _max: usize,
    ) -> Result<Vec<CacheKey>, ResolverError> {
        Ok(self.entries.lock().unwrap().keys().map(|k| CacheKey(k.clone())).collect())
    }

    async fn increment_hit(&self, _key: &CacheKey, _sampled_delta: u64) {}
    async fn increment_sweep_hit(&self, _key: &CacheKey) {}

    async fn delete(&self, key: &CacheKey) -> Result<(), ResolverError> {
        self.entries.lock().unwrap().remove(key.as_str());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ResolverError> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }

    fn stats(&self) -> L1Stats {
        L1Stats {
            entries: self.entries.lock().unwrap().len(),
            hits: 0,
            misses: 0,
        }
    }

    async fn try_acquire_lease(
        &self,
        key: &CacheKey,
        owner_token: u64,
        ttl_secs: u64,
        now: u64,
    ) -> Result<bool, ResolverError> {
        let mut leases = self.leases.lock().unwrap();
        match leases.get(key.as_str()) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                leases.insert(key.as_str().to_string(), now + ttl_secs);
                let _ = owner_token;
                Ok(true)
            }
        }
    }

    async fn release_lease(&self, key: &CacheKey, _owner_token: u64) -> Result<(), ResolverError> {
        self.leases.lock().unwrap().remove(key.as_str());
        Ok(())
    }
}

/// Hands back queued responses in order, falling back to
/// [`ResolverError::AllUpstreamsFailed`] once the queue runs dry — standing
/// in for "every configured upstream failed".
struct MockUpstreamDispatcher {
    responses: Mutex<VecDeque<Result<Answer, ResolverError>>>,
    calls: AtomicUsize,
}

impl MockUpstreamDispatcher {
    fn new(responses: Vec<Result<Answer, ResolverError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamDispatcher for MockUpstreamDispatcher {
    async fn exchange(
        &self,
        _question: &Question,
        _deadline: Duration,
    ) -> Result<sentrydns_application::ports::DispatchOutcome, ResolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ResolverError::AllUpstreamsFailed));
        next.map(|answer| sentrydns_application::ports::DispatchOutcome {
            answer,
            upstream_name: Arc::from("mock-upstream"),
            rtt: Duration::from_millis(5),
            min_answer_ttl: None,
        })
    }
}

fn answer(payload: &[u8]) -> Answer {
    Answer::new(Arc::from(payload.to_vec().into_boxed_slice()), false)
}

type TestPipeline =
    ResolutionPipeline<LruL0Cache, MockL1Store, BloomBlocklistMatcher, MockUpstreamDispatcher, ChannelQueryLogSink>;

struct Harness {
    pipeline: Arc<TestPipeline>,
    l1: Arc<MockL1Store>,
    dispatcher: Arc<MockUpstreamDispatcher>,
    log_drain: tokio::task::JoinHandle<()>,
}

fn default_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        local_ttl: 300,
        blocked: BlockedResponse::Nxdomain,
        blocked_ttl: 60,
        min_ttl: 1,
        max_ttl: 3600,
        negative_ttl: 60,
        stale_ttl_secs: 60,
        expired_entry_ttl_secs: 30,
        serve_stale: true,
        refresh_min_ttl_secs: 30,
        hot_threshold: 0,
        upstream_timeout: Duration::from_secs(2),
        servfail_backoff_secs: 30,
    }
}

fn build_harness(upstream_responses: Vec<Result<Answer, ResolverError>>) -> Harness {
    let l0 = Arc::new(LruL0Cache::new(64));
    let l1 = Arc::new(MockL1Store::default());
    let blocklist = Arc::new(BloomBlocklistMatcher::new());
    let dispatcher = Arc::new(MockUpstreamDispatcher::new(upstream_responses));
    let (query_log, log_drain) = ChannelQueryLogSink::spawn(64, vec![], vec![]);
    let query_log = Arc::new(query_log);
    let clients = Arc::new(ClientRegistry::new(ClientTable::default()));
    let local_records = Arc::new(LocalRecordsRegistry::new(LocalRecordsTable::build(&[])));
    let stats = Arc::new(StatsRegistry::new(0));
    let refresh = Arc::new(RefreshCoordinator::new(
        Arc::clone(&l1),
        Arc::clone(&dispatcher),
        RefreshCoordinatorConfig {
            max_inflight: 16,
            lock_ttl_secs: 5,
            min_ttl: 1,
            max_ttl: 3600,
            stale_ttl_secs: 60,
            upstream_timeout: Duration::from_secs(2),
            refresh_upstream_fail_log_interval_secs: 60,
        },
    ));

    let pipeline = Arc::new(ResolutionPipeline::new(
        l0,
        Arc::clone(&l1),
        Arc::clone(&blocklist),
        Arc::clone(&dispatcher),
        query_log,
        clients,
        local_records,
        refresh,
        stats,
        default_pipeline_config(),
    ));

    Harness {
        pipeline,
        l1,
        dispatcher,
        log_drain,
    }
}

fn question(name: &str) -> Question {
    Question::new(name, RecordType::A, Question::CLASS_IN)
}

#[tokio::test]
async fn blocked_query_returns_nxdomain_without_touching_upstream() {
    let harness = build_harness(vec![Ok(answer(b"should not be used"))]);
    // The blocklist is wired through its port, not the harness builder, so
    // reach in via the concrete matcher the pipeline was built with isn't
    // exposed here — instead exercise it via a second matcher-equipped
    // harness built the long way below.
    let l0 = Arc::new(LruL0Cache::new(64));
    let l1 = harness.l1.clone();
    let blocklist = Arc::new(BloomBlocklistMatcher::new());
    blocklist.apply_config(&["ads.example.com".to_string()], &[], &[], &[]);
    let dispatcher = harness.dispatcher.clone();
    let (query_log, log_drain) = ChannelQueryLogSink::spawn(64, vec![], vec![]);
    let query_log = Arc::new(query_log);
    let clients = Arc::new(ClientRegistry::new(ClientTable::default()));
    let local_records = Arc::new(LocalRecordsRegistry::new(LocalRecordsTable::build(&[])));
    let stats = Arc::new(StatsRegistry::new(0));
    let refresh = Arc::new(RefreshCoordinator::new(
        l1.clone(),
        dispatcher.clone(),
        RefreshCoordinatorConfig {
            max_inflight: 16,
            lock_ttl_secs: 5,
            min_ttl: 1,
            max_ttl: 3600,
            stale_ttl_secs: 60,
            upstream_timeout: Duration::from_secs(2),
            refresh_upstream_fail_log_interval_secs: 60,
        },
    ));
    let pipeline = ResolutionPipeline::new(
        l0,
        l1,
        blocklist,
        dispatcher.clone(),
        query_log,
        clients,
        local_records,
        refresh,
        stats,
        default_pipeline_config(),
    );

    let outcome = pipeline
        .resolve(Some(&question("ads.example.com")), IpAddr::from([127, 0, 0, 1]), 0, Instant::now())
        .await;

    match outcome {
        PipelineOutcome::Blocked { kind, .. } => assert!(matches!(kind, BlockedKind::Nxdomain)),
        other => panic!("expected Blocked, got {other:?}"),
    }
    assert_eq!(dispatcher.call_count(), 0);

    drop(pipeline);
    let _ = log_drain.await;
    harness.log_drain.abort();
}

#[tokio::test]
async fn local_record_bypasses_cache_and_upstream() {
    let harness = build_harness(vec![Ok(answer(b"should not be used"))]);
    let local_records = LocalRecordsTable::build(&[LocalRecord {
        name: "router.lan".to_string(),
        record_type: "A".to_string(),
        value: "192.168.1.1".to_string(),
    }]);

    // Rebuild with a local-records registry seeded with the override; the
    // shared harness builder always starts empty.
    let l0 = Arc::new(LruL0Cache::new(64));
    let blocklist = Arc::new(BloomBlocklistMatcher::new());
    let clients = Arc::new(ClientRegistry::new(ClientTable::default()));
    let local_records_registry = Arc::new(LocalRecordsRegistry::new(local_records));
    let stats = Arc::new(StatsRegistry::new(0));
    let (query_log, log_drain) = ChannelQueryLogSink::spawn(64, vec![], vec![]);
    let query_log = Arc::new(query_log);
    let refresh = Arc::new(RefreshCoordinator::new(
        harness.l1.clone(),
        harness.dispatcher.clone(),
        RefreshCoordinatorConfig {
            max_inflight: 16,
            lock_ttl_secs: 5,
            min_ttl: 1,
            max_ttl: 3600,
            stale_ttl_secs: 60,
            upstream_timeout: Duration::from_secs(2),
            refresh_upstream_fail_log_interval_secs: 60,
        },
    ));
    let pipeline = ResolutionPipeline::new(
        l0,
        harness.l1.clone(),
        blocklist,
        harness.dispatcher.clone(),
        query_log,
        clients,
        local_records_registry,
        refresh,
        stats,
        default_pipeline_config(),
    );

    let outcome = pipeline
        .resolve(Some(&question("router.lan")), IpAddr::from([127, 0, 0, 1]), 0, Instant::now())
        .await;

    match outcome {
        PipelineOutcome::Local { values, ttl } => {
            assert_eq!(values, vec!["192.168.1.1".to_string()]);
            assert_eq!(ttl, 300);
        }
        other => panic!("expected Local, got {other:?}"),
    }
    assert_eq!(harness.dispatcher.call_count(), 0);

    drop(pipeline);
    let _ = log_drain.await;
    harness.log_drain.abort();
}

#[tokio::test]
async fn cache_hit_does_not_call_upstream_twice() {
    let harness = build_harness(vec![Ok(answer(b"upstream-answer"))]);
    let client = IpAddr::from([127, 0, 0, 1]);
    let q = question("example.com");

    let first = harness.pipeline.resolve(Some(&q), client, 0, Instant::now()).await;
    assert!(matches!(first, PipelineOutcome::Upstream { .. }));
    assert_eq!(harness.dispatcher.call_count(), 1);

    let second = harness.pipeline.resolve(Some(&q), client, 0, Instant::now()).await;
    assert!(matches!(second, PipelineOutcome::CacheHit { stale: false, .. }));
    assert_eq!(harness.dispatcher.call_count(), 1, "second resolve must be served from L0");

    harness.log_drain.abort();
}

#[tokio::test]
async fn stale_entry_served_and_schedules_background_refresh() {
    let harness = build_harness(vec![Ok(answer(b"refreshed-answer"))]);
    let q = question("stale.example.com");
    let key = q.cache_key();

    // Inserted at t=1000 with ttl=10 (soft_expiry=1010) and stale_ttl=60
    // (hard_expiry=1070); at t=1030 the entry is Stale but not yet Absent.
    let entry = CacheEntry::new(key, answer(b"stale-answer"), 10, 60, 1, 3600, 1000);
    harness.l1.set_with_index(entry.clone(), &[entry.hard_expiry]).await.unwrap();

    let outcome = harness
        .pipeline
        .resolve(Some(&q), IpAddr::from([127, 0, 0, 1]), 1030, Instant::now())
        .await;
    match outcome {
        PipelineOutcome::CacheHit { stale, .. } => assert!(stale),
        other => panic!("expected a stale CacheHit, got {other:?}"),
    }

    // `schedule` fires a detached tokio task; give it a beat to complete.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.dispatcher.call_count(), 1, "stale hit should have scheduled exactly one refresh");

    harness.log_drain.abort();
}

#[tokio::test]
async fn all_upstreams_failing_yields_servfail() {
    let harness = build_harness(vec![Err(ResolverError::AllUpstreamsFailed)]);
    let outcome = harness
        .pipeline
        .resolve(Some(&question("dead.example.com")), IpAddr::from([127, 0, 0, 1]), 0, Instant::now())
        .await;
    assert!(matches!(outcome, PipelineOutcome::Servfail));
    harness.log_drain.abort();
}

#[tokio::test]
async fn hard_expired_entry_still_served_stale_when_upstream_fails() {
    let harness = build_harness(vec![Err(ResolverError::AllUpstreamsFailed)]);
    let q = question("long-dead.example.com");
    let key = q.cache_key();

    // ttl=10, stale_ttl=5, inserted at t=1000: soft_expiry=1010, hard_expiry=1015.
    let entry = CacheEntry::new(key, answer(b"old-answer"), 10, 5, 1, 3600, 1000);
    harness.l1.set_with_index(entry.clone(), &[entry.hard_expiry]).await.unwrap();

    // Past hard_expiry: the entry classifies Absent, but must still be
    // servable as a last resort once every upstream fails.
    let outcome = harness
        .pipeline
        .resolve(Some(&q), IpAddr::from([127, 0, 0, 1]), 2000, Instant::now())
        .await;
    match outcome {
        PipelineOutcome::CacheHit { answer, stale, .. } => {
            assert!(stale);
            assert!(!answer.is_servfail);
        }
        other => panic!("expected a stale CacheHit fallback, got {other:?}"),
    }

    harness.log_drain.abort();
}

#[tokio::test]
async fn repeat_servfail_is_cached_and_short_circuits_upstream() {
    let harness = build_harness(vec![Err(ResolverError::AllUpstreamsFailed)]);
    let q = question("dead.example.com");
    let client = IpAddr::from([127, 0, 0, 1]);

    let first = harness.pipeline.resolve(Some(&q), client, 0, Instant::now()).await;
    assert!(matches!(first, PipelineOutcome::Servfail));
    assert_eq!(harness.dispatcher.call_count(), 1);

    // The failure wrote a cached SERVFAIL answer into L0; the repeat query
    // must be served from it rather than calling upstream again.
    let second = harness.pipeline.resolve(Some(&q), client, 0, Instant::now()).await;
    match second {
        PipelineOutcome::CacheHit { answer, .. } => assert!(answer.is_servfail),
        other => panic!("expected a cached-SERVFAIL CacheHit, got {other:?}"),
    }
    assert_eq!(harness.dispatcher.call_count(), 1, "second query must not reach upstream");

    harness.log_drain.abort();
}

#[tokio::test]
async fn sweeper_removes_cold_key_below_min_hits() {
    let l1 = Arc::new(MockL1Store::default());
    let dispatcher = Arc::new(MockUpstreamDispatcher::new(vec![]));
    let refresh = Arc::new(RefreshCoordinator::new(
        l1.clone(),
        dispatcher,
        RefreshCoordinatorConfig {
            max_inflight: 16,
            lock_ttl_secs: 5,
            min_ttl: 1,
            max_ttl: 3600,
            stale_ttl_secs: 60,
            upstream_timeout: Duration::from_secs(2),
            refresh_upstream_fail_log_interval_secs: 60,
        },
    ));

    let key = CacheKey::new("cold.example.com", RecordType::A, Question::CLASS_IN);
    let entry = CacheEntry::new(key.clone(), answer(b"cold"), 10, 60, 1, 3600, 1000);
    l1.set_with_index(entry.clone(), &[entry.hard_expiry]).await.unwrap();

    let action = refresh.sweep_candidate(key.clone(), 0, 1).await;
    assert_eq!(action, SweepAction::Removed);
    assert!(l1.get_with_ttl(&key, 1000).await.unwrap().is_none());
}

#[tokio::test]
async fn sweeper_schedules_refresh_for_hot_key() {
    let l1 = Arc::new(MockL1Store::default());
    let dispatcher = Arc::new(MockUpstreamDispatcher::new(vec![Ok(answer(b"fresh"))]));
    let refresh = Arc::new(RefreshCoordinator::new(
        l1.clone(),
        dispatcher.clone(),
        RefreshCoordinatorConfig {
            max_inflight: 16,
            lock_ttl_secs: 5,
            min_ttl: 1,
            max_ttl: 3600,
            stale_ttl_secs: 60,
            upstream_timeout: Duration::from_secs(2),
            refresh_upstream_fail_log_interval_secs: 60,
        },
    ));

    let key = CacheKey::new("hot.example.com", RecordType::A, Question::CLASS_IN);
    let entry = CacheEntry::new(key.clone(), answer(b"hot"), 10, 60, 1, 3600, 1000);
    l1.set_with_index(entry.clone(), &[entry.hard_expiry]).await.unwrap();

    let action = refresh.sweep_candidate(key.clone(), 10, 1).await;
    assert_eq!(action, SweepAction::Refreshed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(dispatcher.call_count(), 1);
    assert!(l1.get_with_ttl(&key, 1000).await.unwrap().is_some());
}
