//! Builder that starts whichever background jobs the composition root
//! configured, sharing one `CancellationToken` across all of them. Grounded
//! on the teacher's `JobRunner` builder shape; generic over the cache/
//! upstream adapter types the sweeper needs since, unlike the teacher's
//! DB-backed jobs, ours are wired directly to the pipeline's ports.

use crate::{ServfailPrunerJob, SweeperJob};
use sentrydns_application::ports::{L1Store, UpstreamDispatcher};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct JobRunner<L1: L1Store, U: UpstreamDispatcher> {
    sweeper: Option<SweeperJob<L1, U>>,
    servfail_pruner: Option<ServfailPrunerJob>,
    shutdown: Option<CancellationToken>,
}

impl<L1: L1Store + 'static, U: UpstreamDispatcher + 'static> JobRunner<L1, U> {
    pub fn new() -> Self {
        Self {
            sweeper: None,
            servfail_pruner: None,
            shutdown: None,
        }
    }

    pub fn with_sweeper(mut self, job: SweeperJob<L1, U>) -> Self {
        self.sweeper = Some(job);
        self
    }

    pub fn with_servfail_pruner(mut self, job: ServfailPrunerJob) -> Self {
        self.servfail_pruner = Some(job);
        self
    }

    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub async fn start(self) {
        info!("starting background job runner");

        if let Some(job) = self.sweeper {
            let job = match &self.shutdown {
                Some(token) => job.with_cancellation(token.clone()),
                None => job,
            };
            Arc::new(job).start().await;
        }

        if let Some(job) = self.servfail_pruner {
            let job = match &self.shutdown {
                Some(token) => job.with_cancellation(token.clone()),
                None => job,
            };
            Arc::new(job).start().await;
        }

        info!("all background jobs started");
    }
}

impl<L1: L1Store + 'static, U: UpstreamDispatcher + 'static> Default for JobRunner<L1, U> {
    fn default() -> Self {
        Self::new()
    }
}
