//! [`UpstreamDispatcher`] implementation (§4.4): strategy selection over the
//! configured upstream set, per-upstream health/backoff, the SERVFAIL
//! tracker, and the wire codec — all behind one `exchange` call.

use super::servfail::ServfailTracker;
use super::transport::{self, UpstreamTarget};
use super::wire;
use async_trait::async_trait;
use dashmap::DashMap;
use sentrydns_application::ports::{DispatchOutcome, UpstreamDispatcher};
use sentrydns_domain::config::ResolverConfig;
use sentrydns_domain::upstream::{LoadBalancingStrategy, Upstream};
use sentrydns_domain::{Question, ResolverError, UpstreamHealth};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

struct ConfiguredUpstream {
    name: Arc<str>,
    target: UpstreamTarget,
}

/// Implements §4.4 in full: strategy selection, backoff, EWMA RTT, and the
/// SERVFAIL short-circuit. `health` is keyed by upstream index rather than
/// name since the upstream set is fixed for the process lifetime.
pub struct DnsUpstreamDispatcher {
    upstreams: Vec<ConfiguredUpstream>,
    health: Vec<std::sync::Mutex<UpstreamHealth>>,
    servfail: Arc<ServfailTracker>,
    strategy: LoadBalancingStrategy,
    backoff_secs: u64,
    round_robin_cursor: AtomicUsize,
}

impl DnsUpstreamDispatcher {
    pub fn new(
        upstreams: &[Upstream],
        resolver_cfg: &ResolverConfig,
        servfail: Arc<ServfailTracker>,
    ) -> Result<Self, ResolverError> {
        let mut configured = Vec::with_capacity(upstreams.len());
        let mut health = Vec::with_capacity(upstreams.len());
        for u in upstreams {
            let target = transport::parse_target(&u.address, u.protocol)?;
            configured.push(ConfiguredUpstream {
                name: Arc::from(u.name.as_str()),
                target,
            });
            health.push(std::sync::Mutex::new(UpstreamHealth::default()));
        }
        Ok(Self {
            upstreams: configured,
            health,
            servfail,
            strategy: resolver_cfg.strategy,
            backoff_secs: resolver_cfg.upstream_backoff_ms / 1000,
            round_robin_cursor: AtomicUsize::new(0),
        })
    }

    /// Indices ordered per the configured strategy, skipping upstreams still
    /// in backoff unless every one of them is (§4.4: "if all skipped, ignore
    /// backoff and try in order anyway").
    fn ordered_candidates(&self, now: u64) -> Vec<usize> {
        let eligible: Vec<usize> = (0..self.upstreams.len())
            .filter(|&i| !self.health[i].lock().unwrap_or_else(|e| e.into_inner()).is_skipped(now))
            .collect();
        let pool = if eligible.is_empty() {
            (0..self.upstreams.len()).collect::<Vec<_>>()
        } else {
            eligible
        };

        match self.strategy {
            LoadBalancingStrategy::Failover => pool,
            LoadBalancingStrategy::RoundRobin => {
                if pool.is_empty() {
                    return pool;
                }
                let start = self.round_robin_cursor.fetch_add(1, Ordering::Relaxed) % pool.len();
                pool[start..].iter().chain(pool[..start].iter()).copied().collect()
            }
            LoadBalancingStrategy::Weighted => {
                let mut weighted: Vec<(usize, f64)> = pool
                    .iter()
                    .map(|&i| {
                        let rtt = self.health[i]
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .ewma_rtt_millis;
                        let weight = if rtt > 0.0 { 1.0 / rtt } else { 1.0 };
                        (i, weight)
                    })
                    .collect();
                weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                weighted.into_iter().map(|(i, _)| i).collect()
            }
        }
    }

    fn record_failure(&self, index: usize, now: u64) {
        self.health[index]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_failure(now, self.backoff_secs);
    }

    fn record_success(&self, index: usize, now: u64, rtt_millis: f64) {
        self.health[index]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_success(now, rtt_millis);
    }
}

#[async_trait]
impl UpstreamDispatcher for DnsUpstreamDispatcher {
    async fn exchange(
        &self,
        question: &Question,
        deadline: Duration,
    ) -> Result<DispatchOutcome, ResolverError> {
        if self.upstreams.is_empty() {
            return Err(ResolverError::AllUpstreamsFailed);
        }

        let now = now_unix();
        let cache_key = question.cache_key();
        if self.servfail.should_short_circuit(cache_key.as_str(), now) {
            return Err(ResolverError::AllUpstreamsFailed);
        }

        let (id, query_bytes) = wire::build_query(question)?;
        let candidates = self.ordered_candidates(now);

        for index in candidates {
            let upstream = &self.upstreams[index];
            let started = Instant::now();
            let result = transport::exchange(&upstream.target, &query_bytes, deadline).await;

            match result {
                Ok(raw) => match wire::parse_response(&raw, id) {
                    Ok(parsed) if parsed.is_servfail => {
                        self.record_failure(index, now);
                        if self.servfail.record_servfail(cache_key.as_str(), now) {
                            warn!(upstream = %upstream.name, key = %cache_key, "refresh upstream failed");
                        }
                        continue;
                    }
                    Ok(parsed) => {
                        let rtt = started.elapsed();
                        self.record_success(index, now, rtt.as_secs_f64() * 1000.0);
                        self.servfail.clear(cache_key.as_str());
                        return Ok(DispatchOutcome {
                            answer: sentrydns_domain::Answer::new(
                                Arc::from(parsed.raw.into_boxed_slice()),
                                parsed.rcode_is_negative,
                            ),
                            upstream_name: Arc::clone(&upstream.name),
                            rtt,
                            min_answer_ttl: parsed.min_answer_ttl,
                        });
                    }
                    Err(e) => {
                        warn!(upstream = %upstream.name, error = %e, "malformed upstream response");
                        self.record_failure(index, now);
                        continue;
                    }
                },
                Err(e) => {
                    warn!(upstream = %upstream.name, error = %e, "upstream exchange failed");
                    self.record_failure(index, now);
                    continue;
                }
            }
        }

        Err(ResolverError::AllUpstreamsFailed)
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrydns_domain::upstream::Protocol;

    fn dispatcher_with(addrs: &[&str]) -> DnsUpstreamDispatcher {
        let upstreams: Vec<Upstream> = addrs
            .iter()
            .enumerate()
            .map(|(i, a)| Upstream {
                name: format!("u{i}"),
                address: a.to_string(),
                protocol: Protocol::Udp,
            })
            .collect();
        let cfg = ResolverConfig::default();
        DnsUpstreamDispatcher::new(&upstreams, &cfg, Arc::new(ServfailTracker::new(16, 3, 30, 60)))
            .unwrap()
    }

    #[test]
    fn failover_orders_all_candidates_when_none_in_backoff() {
        let d = dispatcher_with(&["1.1.1.1:53", "8.8.8.8:53"]);
        assert_eq!(d.ordered_candidates(0), vec![0, 1]);
    }

    #[test]
    fn backoff_skips_unhealthy_upstream() {
        let d = dispatcher_with(&["1.1.1.1:53", "8.8.8.8:53"]);
        d.record_failure(0, 100);
        assert_eq!(d.ordered_candidates(100), vec![1]);
    }

    #[test]
    fn all_skipped_falls_back_to_full_order() {
        let d = dispatcher_with(&["1.1.1.1:53", "8.8.8.8:53"]);
        d.record_failure(0, 100);
        d.record_failure(1, 100);
        let candidates = d.ordered_candidates(100);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn round_robin_rotates_start_index() {
        let d = dispatcher_with(&["1.1.1.1:53", "8.8.8.8:53", "9.9.9.9:53"]);
        let d = DnsUpstreamDispatcher {
            strategy: LoadBalancingStrategy::RoundRobin,
            ..d
        };
        let first = d.ordered_candidates(0);
        let second = d.ordered_candidates(0);
        assert_ne!(first[0], second[0]);
    }
}
