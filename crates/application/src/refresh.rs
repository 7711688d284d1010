//! Refresh coordinator (§4.5): on-demand scheduling plus the periodic
//! sweeper's per-candidate decision. The sweeper's own timer loop lives in
//! the `jobs` crate, which calls [`RefreshCoordinator::sweep_candidate`] once
//! per key the sweeper job enumerates; this module owns the
//! single-flight/lease/in-flight-budget contract so both call sites share
//! it.

use crate::ports::{L1Store, UpstreamDispatcher};
use dashmap::DashMap;
use sentrydns_domain::{CacheEntry, CacheKey, Question};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub struct RefreshCoordinatorConfig {
    pub max_inflight: usize,
    pub lock_ttl_secs: u64,
    pub min_ttl: u32,
    pub max_ttl: u32,
    pub stale_ttl_secs: u32,
    pub upstream_timeout: Duration,
    pub refresh_upstream_fail_log_interval_secs: u64,
}

/// Bounds and deduplicates background refreshes. `max_inflight` is a
/// process-wide counting semaphore (§5); per-key dedup is a lightweight
/// local single-flight map layered in front of the cross-process L1 lease,
/// so a second caller on the same process doesn't even pay the L1 round
/// trip.
pub struct RefreshCoordinator<L1: L1Store, U: UpstreamDispatcher> {
    l1: Arc<L1>,
    dispatcher: Arc<U>,
    inflight_budget: Arc<Semaphore>,
    local_single_flight: Arc<DashMap<String, ()>>,
    owner_token: u64,
    cfg: RefreshCoordinatorConfig,
    fail_log_last_emitted: DashMap<String, u64>,
}

impl<L1: L1Store + 'static, U: UpstreamDispatcher + 'static> RefreshCoordinator<L1, U> {
    pub fn new(l1: Arc<L1>, dispatcher: Arc<U>, cfg: RefreshCoordinatorConfig) -> Self {
        Self {
            l1,
            dispatcher,
            inflight_budget: Arc::new(Semaphore::new(cfg.max_inflight)),
            local_single_flight: Arc::new(DashMap::new()),
            owner_token: fastrand_token(),
            fail_log_last_emitted: DashMap::new(),
            cfg,
        }
    }

    /// On-demand path: called from the resolution pipeline for a fresh hit
    /// nearing soft-expiry (hot enough) or a stale hit already served.
    /// Drops silently on lease-held or pool-full, never blocks the caller.
    pub fn schedule(self: &Arc<Self>, key: CacheKey, question: Question) {
        if self.local_single_flight.contains_key(key.as_str()) {
            return;
        }
        let Ok(permit) = Arc::clone(&self.inflight_budget).try_acquire_owned() else {
            return;
        };
        let this = Arc::clone(self);
        self.local_single_flight.insert(key.as_str().to_string(), ());
        tokio::spawn(async move {
            let _permit = permit;
            this.run_one(key.clone(), question).await;
            this.local_single_flight.remove(key.as_str());
        });
    }

    async fn run_one(&self, key: CacheKey, question: Question) {
        let now = now_unix();
        match self
            .l1
            .try_acquire_lease(&key, self.owner_token, self.cfg.lock_ttl_secs, now)
            .await
        {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(error = %e, key = %key, "refresh lease acquisition failed");
                return;
            }
        }

        let result = tokio::time::timeout(
            self.cfg.upstream_timeout,
            self.dispatcher.exchange(&question, self.cfg.upstream_timeout),
        )
        .await;

        match result {
            Ok(Ok(outcome)) => {
                let upstream_name = outcome.upstream_name.clone();
                let ttl = outcome.min_answer_ttl.unwrap_or(self.cfg.min_ttl);
                let entry = CacheEntry::new(
                    key.clone(),
                    outcome.answer,
                    ttl,
                    self.cfg.stale_ttl_secs,
                    self.cfg.min_ttl,
                    self.cfg.max_ttl,
                    now,
                );
                if let Err(e) = self
                    .l1
                    .set_with_index(entry, &[now + self.cfg.stale_ttl_secs as u64])
                    .await
                {
                    warn!(error = %e, key = %key, "refresh write to L1 failed");
                }
                debug!(key = %key, upstream = %upstream_name, "background refresh succeeded");
            }
            Ok(Err(e)) => self.log_refresh_failure(&key, &e.to_string()),
            Err(_) => self.log_refresh_failure(&key, "timeout"),
        }

        let _ = self.l1.release_lease(&key, self.owner_token).await;
    }

    fn log_refresh_failure(&self, key: &CacheKey, reason: &str) {
        let now = now_unix();
        let mut last = self
            .fail_log_last_emitted
            .entry(key.as_str().to_string())
            .or_insert(0);
        if now.saturating_sub(*last) >= self.cfg.refresh_upstream_fail_log_interval_secs {
            *last = now;
            warn!(key = %key, reason, "refresh upstream failed");
        }
    }

    /// Sweeper entry point (§4.5 steps 3): decides whether `key` is a cold
    /// key (deleted outright) or refresh-eligible (scheduled). Returns
    /// `true` if it scheduled a refresh, `false` if it deleted or skipped.
    pub async fn sweep_candidate(
        self: &Arc<Self>,
        key: CacheKey,
        sweep_hit_count: u64,
        sweep_min_hits: u32,
    ) -> SweepAction {
        // Open Question resolution (DESIGN.md #1): sweep_min_hits == 0 is a
        // pass-through, not "delete everything untouched".
        if sweep_min_hits > 0 && sweep_hit_count < sweep_min_hits as u64 {
            if let Err(e) = self.l1.delete(&key).await {
                warn!(error = %e, key = %key, "sweeper delete failed");
            }
            return SweepAction::Removed;
        }
        let Some((qname, qtype, qclass)) = sentrydns_domain::CacheKey::parse(key.as_str()) else {
            return SweepAction::Skipped;
        };
        let question = Question {
            qname,
            qtype,
            qclass,
        };
        self.schedule(key, question);
        SweepAction::Refreshed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    Refreshed,
    Removed,
    Skipped,
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

static TOKEN_SEQ: AtomicU64 = AtomicU64::new(1);
fn fastrand_token() -> u64 {
    TOKEN_SEQ.fetch_add(1, Ordering::Relaxed) ^ (now_unix() << 32)
}
