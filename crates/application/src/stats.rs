//! Stats and observability surface (§4.7). Counters and a 24h rolling
//! window kept in-process; no exporter is wired (out of scope), but every
//! number a future one would read is tracked here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const HOURS: usize = 24;
/// Upper edges (in micros) of the RTT histogram buckets used to estimate
/// p50/p95/p99 without keeping raw samples.
const RTT_BUCKET_EDGES_MICROS: [u64; 12] = [
    1_000, 2_000, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000, 500_000, 1_000_000, 2_500_000,
    u64::MAX,
];

#[derive(Default)]
struct HourlyCounters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    blocklist_matches: AtomicU64,
    servfails: AtomicU64,
    refresh_sweeps: AtomicU64,
    refresh_sweep_refreshed: AtomicU64,
    refresh_sweep_removed: AtomicU64,
}

/// Lock-free counters plus a fixed-size ring of hourly buckets (§4.7). All
/// increments are relaxed; readers tolerate eventual consistency, matching
/// the hit-counter contract the cache ports already document.
pub struct StatsRegistry {
    hours: Box<[HourlyCounters; HOURS]>,
    rtt_buckets: Box<[AtomicU64; RTT_BUCKET_EDGES_MICROS.len()]>,
    l0_entries: AtomicU64,
    start_unix: u64,
}

impl StatsRegistry {
    pub fn new(start_unix: u64) -> Self {
        Self {
            hours: Box::new(std::array::from_fn(|_| HourlyCounters::default())),
            rtt_buckets: Box::new(std::array::from_fn(|_| AtomicU64::new(0))),
            l0_entries: AtomicU64::new(0),
            start_unix,
        }
    }

    fn bucket(&self, now_unix: u64) -> &HourlyCounters {
        let hour = ((now_unix / 3600) % HOURS as u64) as usize;
        &self.hours[hour]
    }

    pub fn record_cache_hit(&self, now_unix: u64) {
        self.bucket(now_unix).cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self, now_unix: u64) {
        self.bucket(now_unix).cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocklist_match(&self, now_unix: u64) {
        self.bucket(now_unix)
            .blocklist_matches
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_servfail(&self, now_unix: u64) {
        self.bucket(now_unix).servfails.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_sweep(&self, now_unix: u64, refreshed: u64, removed: u64) {
        let b = self.bucket(now_unix);
        b.refresh_sweeps.fetch_add(1, Ordering::Relaxed);
        b.refresh_sweep_refreshed.fetch_add(refreshed, Ordering::Relaxed);
        b.refresh_sweep_removed.fetch_add(removed, Ordering::Relaxed);
    }

    pub fn record_upstream_rtt(&self, rtt: Duration) {
        let micros = rtt.as_micros().min(u64::MAX as u128) as u64;
        let idx = RTT_BUCKET_EDGES_MICROS
            .iter()
            .position(|edge| micros <= *edge)
            .unwrap_or(RTT_BUCKET_EDGES_MICROS.len() - 1);
        self.rtt_buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_l0_entries(&self, entries: u64) {
        self.l0_entries.store(entries, Ordering::Relaxed);
    }

    /// Rolls up all 24 hourly buckets (a point-in-time snapshot, not locked
    /// against concurrent writers) into totals for the control surface.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut cache_hits = 0;
        let mut cache_misses = 0;
        let mut blocklist_matches = 0;
        let mut servfails = 0;
        let mut refresh_sweeps = 0;
        let mut refresh_sweep_refreshed = 0;
        let mut refresh_sweep_removed = 0;
        for h in self.hours.iter() {
            cache_hits += h.cache_hits.load(Ordering::Relaxed);
            cache_misses += h.cache_misses.load(Ordering::Relaxed);
            blocklist_matches += h.blocklist_matches.load(Ordering::Relaxed);
            servfails += h.servfails.load(Ordering::Relaxed);
            refresh_sweeps += h.refresh_sweeps.load(Ordering::Relaxed);
            refresh_sweep_refreshed += h.refresh_sweep_refreshed.load(Ordering::Relaxed);
            refresh_sweep_removed += h.refresh_sweep_removed.load(Ordering::Relaxed);
        }

        let rtt_counts: Vec<u64> = self
            .rtt_buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect();
        let total_rtt: u64 = rtt_counts.iter().sum();

        StatsSnapshot {
            cache_hits,
            cache_misses,
            blocklist_matches,
            servfails,
            refresh_sweeps,
            refresh_sweep_refreshed,
            refresh_sweep_removed,
            l0_entries: self.l0_entries.load(Ordering::Relaxed),
            rtt_p50_micros: percentile(&rtt_counts, total_rtt, 0.50),
            rtt_p95_micros: percentile(&rtt_counts, total_rtt, 0.95),
            rtt_p99_micros: percentile(&rtt_counts, total_rtt, 0.99),
            uptime_secs: self.start_unix,
        }
    }
}

fn percentile(bucket_counts: &[u64], total: u64, p: f64) -> u64 {
    if total == 0 {
        return 0;
    }
    let target = (total as f64 * p).ceil() as u64;
    let mut cumulative = 0u64;
    for (idx, count) in bucket_counts.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return RTT_BUCKET_EDGES_MICROS[idx.min(RTT_BUCKET_EDGES_MICROS.len() - 1)];
        }
    }
    RTT_BUCKET_EDGES_MICROS[RTT_BUCKET_EDGES_MICROS.len() - 1]
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub blocklist_matches: u64,
    pub servfails: u64,
    pub refresh_sweeps: u64,
    pub refresh_sweep_refreshed: u64,
    pub refresh_sweep_removed: u64,
    pub l0_entries: u64,
    pub rtt_p50_micros: u64,
    pub rtt_p95_micros: u64,
    pub rtt_p99_micros: u64,
    pub uptime_secs: u64,
}

impl StatsSnapshot {
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
