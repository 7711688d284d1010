//! Resolution pipeline (§4.1): the per-query state machine from ingress to
//! response. Operates on parsed [`Question`]s; the wire codec that turns a
//! raw message into a `Question` (and a [`PipelineOutcome`] back into
//! bytes) is an infrastructure concern.

use crate::ports::{BlocklistMatcher, L0Cache, L1Store, QueryLogSink, UpstreamDispatcher};
use crate::reload::{ClientRegistry, LocalRecordsRegistry};
use crate::refresh::RefreshCoordinator;
use crate::stats::StatsRegistry;
use sentrydns_domain::config::BlockedResponse;
use sentrydns_domain::{
    Answer, BlockDecision, CacheEntry, CacheKey, Freshness, Outcome, Question, QueryEvent,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub enum BlockedKind {
    Nxdomain,
    SinkholeIp(Arc<str>),
}

impl From<&BlockedResponse> for BlockedKind {
    fn from(r: &BlockedResponse) -> Self {
        match r {
            BlockedResponse::Nxdomain => BlockedKind::Nxdomain,
            BlockedResponse::Ip(addr) => BlockedKind::SinkholeIp(Arc::from(addr.as_str())),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// No question section; nothing more can be inferred about the request.
    Formerr,
    /// Answered from the static local-records table. Never cached.
    Local { values: Vec<String>, ttl: u32 },
    /// Blocked by policy.
    Blocked { kind: BlockedKind, ttl: u32 },
    /// Served from L0 or L1.
    CacheHit {
        answer: Answer,
        stale: bool,
        remaining_ttl: u32,
    },
    /// Served from a fresh upstream exchange.
    Upstream { answer: Answer, ttl: u32 },
    /// Every upstream failed and no stale fallback was available.
    Servfail,
}

pub struct PipelineConfig {
    pub local_ttl: u32,
    pub blocked: BlockedResponse,
    pub blocked_ttl: u32,
    pub min_ttl: u32,
    pub max_ttl: u32,
    pub negative_ttl: u32,
    pub stale_ttl_secs: u32,
    /// TTL advertised to the client on a stale hit (distinct from
    /// `stale_ttl_secs`, which only widens the soft→hard window).
    pub expired_entry_ttl_secs: u32,
    pub serve_stale: bool,
    pub refresh_min_ttl_secs: u32,
    pub hot_threshold: u64,
    pub upstream_timeout: Duration,
    /// TTL for a cached SERVFAIL entry (§4.4's tracker, once it trips).
    pub servfail_backoff_secs: u32,
}

/// Wires together the ports named in §4.1 into the eight-phase flow. One
/// instance is shared across all worker tasks; every method takes `&self`.
pub struct ResolutionPipeline<L0, L1, B, U, Q>
where
    L0: L0Cache,
    L1: L1Store,
    B: BlocklistMatcher,
    U: UpstreamDispatcher,
    Q: QueryLogSink,
{
    l0: Arc<L0>,
    l1: Arc<L1>,
    blocklist: Arc<B>,
    dispatcher: Arc<U>,
    query_log: Arc<Q>,
    clients: Arc<ClientRegistry>,
    local_records: Arc<LocalRecordsRegistry>,
    refresh: Arc<RefreshCoordinator<L1, U>>,
    stats: Arc<StatsRegistry>,
    cfg: PipelineConfig,
}

impl<L0, L1, B, U, Q> ResolutionPipeline<L0, L1, B, U, Q>
where
    L0: L0Cache + 'static,
    L1: L1Store + 'static,
    B: BlocklistMatcher,
    U: UpstreamDispatcher + 'static,
    Q: QueryLogSink,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        l0: Arc<L0>,
        l1: Arc<L1>,
        blocklist: Arc<B>,
        dispatcher: Arc<U>,
        query_log: Arc<Q>,
        clients: Arc<ClientRegistry>,
        local_records: Arc<LocalRecordsRegistry>,
        refresh: Arc<RefreshCoordinator<L1, U>>,
        stats: Arc<StatsRegistry>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            l0,
            l1,
            blocklist,
            dispatcher,
            query_log,
            clients,
            local_records,
            refresh,
            stats,
            cfg,
        }
    }

    /// Resolves `question` on behalf of `client_addr`. `now` is unix seconds;
    /// `started` is used only for the query-log's latency field.
    pub async fn resolve(
        &self,
        question: Option<&Question>,
        client_addr: IpAddr,
        now: u64,
        started: Instant,
    ) -> PipelineOutcome {
        let Some(question) = question else {
            return PipelineOutcome::Formerr;
        };

        let identity = self.clients.identify(client_addr);

        if let Some(values) = self.local_records.lookup(&question.qname, question.qtype) {
            self.log(
                client_addr,
                &identity.name,
                question,
                Outcome::Local,
                None,
                started,
            );
            return PipelineOutcome::Local {
                values,
                ttl: self.cfg.local_ttl,
            };
        }

        let decision = self
            .blocklist
            .decide(&question.qname, &identity.group_id, now);
        if decision == BlockDecision::Blocked {
            self.stats.record_blocklist_match(now);
            self.log(
                client_addr,
                &identity.name,
                question,
                Outcome::Blocked,
                None,
                started,
            );
            return PipelineOutcome::Blocked {
                kind: BlockedKind::from(&self.cfg.blocked),
                ttl: self.cfg.blocked_ttl,
            };
        }

        let key = question.cache_key();

        // Populated whenever a cache tier holds an entry that isn't servable
        // right now (stale with serve-stale off, or past hard_expiry); kept
        // around so the upstream-failure branch can still serve it instead
        // of a second round-trip read.
        let mut fallback: Option<CacheEntry> = None;

        if let Some((entry, freshness)) = self.l0.get(&key, now) {
            if let Some(outcome) = self.serve_cached(&entry, freshness, question, &key, now) {
                self.stats.record_cache_hit(now);
                self.log(
                    client_addr,
                    &identity.name,
                    question,
                    log_outcome(freshness),
                    None,
                    started,
                );
                return outcome;
            }
            fallback = Some(entry);
        }

        match self.l1.get_with_ttl(&key, now).await {
            Ok(Some((entry, freshness))) => {
                self.l0.put(entry.clone());
                if let Some(outcome) = self.serve_cached(&entry, freshness, question, &key, now) {
                    self.stats.record_cache_hit(now);
                    self.log(
                        client_addr,
                        &identity.name,
                        question,
                        log_outcome(freshness),
                        None,
                        started,
                    );
                    return outcome;
                }
                fallback = Some(entry);
            }
            Ok(None) => {}
            Err(e) => {
                debug!(error = %e, key = %key, "L1 lookup failed, falling through to upstream");
            }
        }

        self.stats.record_cache_miss(now);
        match self.dispatcher.exchange(question, self.cfg.upstream_timeout).await {
            Ok(outcome) => {
                self.stats.record_upstream_rtt(outcome.rtt);
                let raw_ttl = if outcome.answer.rcode_is_negative {
                    self.cfg.negative_ttl
                } else {
                    outcome.min_answer_ttl.unwrap_or(self.cfg.max_ttl)
                };
                let ttl = raw_ttl.clamp(self.cfg.min_ttl.max(1), self.cfg.max_ttl.max(self.cfg.min_ttl.max(1)));
                let entry = CacheEntry::new(
                    key.clone(),
                    outcome.answer.clone(),
                    ttl,
                    self.cfg.stale_ttl_secs,
                    self.cfg.min_ttl,
                    self.cfg.max_ttl,
                    now,
                );
                self.l0.put(entry.clone());
                let l1 = Arc::clone(&self.l1);
                let hard_expiry = entry.hard_expiry;
                tokio::spawn(async move {
                    let _ = l1.set_with_index(entry, &[hard_expiry]).await;
                });
                self.log(
                    client_addr,
                    &identity.name,
                    question,
                    Outcome::Upstream,
                    Some(outcome.upstream_name.as_ref()),
                    started,
                );
                PipelineOutcome::Upstream {
                    answer: outcome.answer,
                    ttl,
                }
            }
            Err(_) => {
                self.stats.record_servfail(now);

                if self.cfg.serve_stale {
                    if let Some(entry) = fallback.filter(|e| !e.payload.is_servfail) {
                        self.log(
                            client_addr,
                            &identity.name,
                            question,
                            Outcome::CacheStale,
                            None,
                            started,
                        );
                        return PipelineOutcome::CacheHit {
                            answer: entry.payload,
                            stale: true,
                            remaining_ttl: self.cfg.expired_entry_ttl_secs.max(1),
                        };
                    }
                }

                let backoff = self.cfg.servfail_backoff_secs.max(1);
                let servfail_entry =
                    CacheEntry::new(key.clone(), Answer::servfail(), backoff, 0, 1, backoff, now);
                self.l0.put(servfail_entry.clone());
                let l1 = Arc::clone(&self.l1);
                let hard_expiry = servfail_entry.hard_expiry;
                tokio::spawn(async move {
                    let _ = l1.set_with_index(servfail_entry, &[hard_expiry]).await;
                });

                self.log(
                    client_addr,
                    &identity.name,
                    question,
                    Outcome::Servfail,
                    None,
                    started,
                );
                PipelineOutcome::Servfail
            }
        }
    }

    /// Returns `Some` when the entry is servable (fresh, or stale but still
    /// within `hard_expiry` — serving a stale-but-within-hard entry is
    /// unconditional, `serve_stale` only gates the post-upstream-failure
    /// fallback past `hard_expiry`); schedules a background refresh when the
    /// entry warrants one. Returns `None` when the caller should fall
    /// through to the next tier / upstream.
    fn serve_cached(
        &self,
        entry: &CacheEntry,
        freshness: Freshness,
        question: &Question,
        key: &CacheKey,
        now: u64,
    ) -> Option<PipelineOutcome> {
        match freshness {
            Freshness::Fresh => {
                if !entry.payload.is_servfail
                    && entry.is_refresh_candidate(now, self.cfg.refresh_min_ttl_secs, self.cfg.hot_threshold)
                {
                    self.refresh.schedule(key.clone(), question.clone());
                }
                Some(PipelineOutcome::CacheHit {
                    answer: entry.payload.clone(),
                    stale: false,
                    remaining_ttl: entry.remaining_ttl(now),
                })
            }
            Freshness::Stale => {
                if !entry.payload.is_servfail {
                    self.refresh.schedule(key.clone(), question.clone());
                }
                Some(PipelineOutcome::CacheHit {
                    answer: entry.payload.clone(),
                    stale: true,
                    remaining_ttl: self.cfg.expired_entry_ttl_secs.max(1),
                })
            }
            Freshness::Absent => None,
        }
    }

    fn log(
        &self,
        client_ip: IpAddr,
        client_name: &Arc<str>,
        question: &Question,
        outcome: Outcome,
        upstream: Option<&str>,
        started: Instant,
    ) {
        if self.query_log.is_excluded(&question.qname, client_name) {
            return;
        }
        let event = QueryEvent {
            client_ip,
            client_name: Arc::clone(client_name),
            qname: Arc::from(question.qname.as_str()),
            qtype: question.qtype,
            outcome,
            upstream_address: upstream.map(Arc::from),
            latency_micros: started.elapsed().as_micros() as u64,
        };
        let _ = self.query_log.emit(event);
    }
}

fn log_outcome(freshness: Freshness) -> Outcome {
    match freshness {
        Freshness::Fresh => Outcome::CacheHit,
        Freshness::Stale => Outcome::CacheStale,
        Freshness::Absent => Outcome::CacheHit,
    }
}
