//! Periodic eviction of expired entries from the SERVFAIL tracker (§4.4),
//! so a dead upstream's short-circuit state doesn't linger past its backoff
//! window. Same timer-loop shape as [`crate::sweeper::SweeperJob`].

use sentrydns_infrastructure::ServfailTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ServfailPrunerJob {
    tracker: Arc<ServfailTracker>,
    interval_secs: u64,
    shutdown: CancellationToken,
}

impl ServfailPrunerJob {
    pub fn new(tracker: Arc<ServfailTracker>, interval_secs: u64) -> Self {
        Self {
            tracker,
            interval_secs,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        info!(interval_secs = self.interval_secs, "starting servfail pruner job");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("servfail pruner job shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let now = now_unix();
                        let pruned = self.tracker.prune_expired(now);
                        if pruned > 0 {
                            debug!(pruned, "pruned expired servfail entries");
                        }
                    }
                }
            }
        });
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
