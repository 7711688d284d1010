//! Upstream dispatcher port (§4.4): strategy selection, per-upstream
//! backoff and the SERVFAIL tracker all live behind this one call.

use async_trait::async_trait;
use sentrydns_domain::{Answer, Question, ResolverError};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub answer: Answer,
    pub upstream_name: Arc<str>,
    pub rtt: Duration,
    /// Minimum TTL across the upstream's answer records, `None` when there
    /// were none to scan (e.g. a negative response). Callers clamp this to
    /// `[min_ttl, max_ttl]` before caching; a `None` falls back to the
    /// negative/positive config constant the caller already applies.
    pub min_answer_ttl: Option<u32>,
}

#[async_trait]
pub trait UpstreamDispatcher: Send + Sync {
    /// Resolves `question` against the configured upstream set under
    /// `deadline` (the §5 per-exchange ceiling). Returns
    /// [`ResolverError::AllUpstreamsFailed`] when every eligible upstream
    /// failed, or a more specific upstream-* error when short-circuited by
    /// the SERVFAIL tracker.
    async fn exchange(
        &self,
        question: &Question,
        deadline: Duration,
    ) -> Result<DispatchOutcome, ResolverError>;
}
