//! Sweeper job (§4.5 step 3): periodically scans L1's expiry index for keys
//! nearing their hard expiry and hands each one to
//! [`RefreshCoordinator::sweep_candidate`], which decides refresh vs delete.
//! Grounded on the teacher's `CacheMaintenanceJob` refresh-cycle timer loop,
//! generalized from a single `run_refresh_cycle` port call to the two-tier
//! cache's own expiry-index scan.

use sentrydns_application::ports::{L1Store, UpstreamDispatcher};
use sentrydns_application::refresh::{RefreshCoordinator, SweepAction};
use sentrydns_application::stats::StatsRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct SweeperJob<L1: L1Store, U: UpstreamDispatcher> {
    refresh: Arc<RefreshCoordinator<L1, U>>,
    l1: Arc<L1>,
    stats: Arc<StatsRegistry>,
    interval_secs: u64,
    window_secs: u64,
    sweep_min_hits: u32,
    sweep_hit_window_secs: u64,
    max_batch_size: usize,
    shutdown: CancellationToken,
}

impl<L1: L1Store + 'static, U: UpstreamDispatcher + 'static> SweeperJob<L1, U> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        refresh: Arc<RefreshCoordinator<L1, U>>,
        l1: Arc<L1>,
        stats: Arc<StatsRegistry>,
        interval_secs: u64,
        window_secs: u64,
        sweep_min_hits: u32,
        sweep_hit_window_secs: u64,
        max_batch_size: usize,
    ) -> Self {
        Self {
            refresh,
            l1,
            stats,
            interval_secs,
            window_secs,
            sweep_min_hits,
            sweep_hit_window_secs,
            max_batch_size,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        info!(interval_secs = self.interval_secs, "starting sweeper job");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("sweeper job shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        self.run_once().await;
                    }
                }
            }
        });
    }

    async fn run_once(&self) {
        let now = now_unix();
        let window_end = now.saturating_add(self.window_secs);
        let candidates = match self
            .l1
            .expiry_candidates(now, window_end, self.max_batch_size)
            .await
        {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "sweeper candidate scan failed");
                return;
            }
        };
        if candidates.is_empty() {
            return;
        }

        let mut refreshed = 0u64;
        let mut removed = 0u64;
        for key in candidates {
            let mut entry = match self.l1.get_with_ttl(&key, now).await {
                Ok(Some((entry, _))) => entry,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, key = %key, "sweeper lookup failed");
                    continue;
                }
            };

            // Roll the hit counter's window: a key quiet for longer than
            // `sweep_hit_window_secs` goes back to being cold-eligible even
            // if it was popular earlier in its lifetime.
            if now.saturating_sub(entry.sweep_window_started_at) >= self.sweep_hit_window_secs {
                entry.sweep_hit_count = 0;
                entry.sweep_window_started_at = now;
                let hard_expiry = entry.hard_expiry;
                if let Err(e) = self.l1.set_with_index(entry.clone(), &[hard_expiry]).await {
                    warn!(error = %e, key = %key, "sweeper window reset failed");
                }
            }

            match self
                .refresh
                .sweep_candidate(key, entry.sweep_hit_count, self.sweep_min_hits)
                .await
            {
                SweepAction::Refreshed => refreshed += 1,
                SweepAction::Removed => removed += 1,
                SweepAction::Skipped => {}
            }
        }
        self.stats.record_refresh_sweep(now, refreshed, removed);
        debug!(refreshed, removed, "sweep cycle completed");
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
