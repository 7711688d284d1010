//! SERVFAIL tracker (§4.4): counts consecutive SERVFAILs per cache key and
//! short-circuits upstream dispatch once a key crosses `servfail_threshold`,
//! caching a synthetic SERVFAIL answer for `servfail_backoff` instead of
//! hammering a dead upstream. Bounded by `servfail_max_entries`, evicting the
//! least-recently-touched entry — an ordinary `lru::LruCache` rather than a
//! hand-rolled slab, since eviction order is all that matters here.

use lru::LruCache;
use sentrydns_domain::ServfailEntry;
use std::num::NonZeroUsize;
use std::sync::Mutex;

pub struct ServfailTracker {
    entries: Mutex<LruCache<String, ServfailEntry>>,
    threshold: u32,
    backoff_secs: u32,
    fail_log_interval_secs: u64,
}

impl ServfailTracker {
    pub fn new(max_entries: usize, threshold: u32, backoff_secs: u32, fail_log_interval_secs: u64) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(max_entries.max(1)).expect("nonzero"),
            )),
            threshold,
            backoff_secs,
            fail_log_interval_secs,
        }
    }

    /// Whether `key` is currently short-circuited (so upstream dispatch
    /// should be skipped entirely in favor of a cached SERVFAIL answer).
    pub fn should_short_circuit(&self, key: &str, now: u64) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) => {
                entry.should_short_circuit(self.threshold)
                    && now.saturating_sub(entry.last_touch) < self.backoff_secs as u64
            }
            None => false,
        }
    }

    /// Records a SERVFAIL for `key`. Returns `true` if a "refresh upstream
    /// failed" log line should fire now (rate-limited per §4.4).
    pub fn record_servfail(&self, key: &str, now: u64) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if !entries.contains(key) {
            entries.put(key.to_string(), ServfailEntry::new(now));
        }
        let entry = entries.get_mut(key).expect("just inserted");
        entry.record(now);
        entry.try_log(now, self.fail_log_interval_secs)
    }

    /// Clears the tracked count on any non-SERVFAIL success.
    pub fn clear(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.pop(key);
    }

    /// Periodic pruner (§4.4 "bounded growth"): removes entries whose
    /// backoff window has long expired. Returns the number removed.
    pub fn prune_expired(&self, now: u64) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, v)| now.saturating_sub(v.last_touch) > self.backoff_secs as u64 * 4)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_circuits_after_threshold() {
        let tracker = ServfailTracker::new(16, 2, 30, 60);
        for _ in 0..3 {
            tracker.record_servfail("dns:example.com:1:1", 0);
        }
        assert!(tracker.should_short_circuit("dns:example.com:1:1", 0));
    }

    #[test]
    fn clear_resets_count() {
        let tracker = ServfailTracker::new(16, 1, 30, 60);
        tracker.record_servfail("k", 0);
        tracker.record_servfail("k", 0);
        assert!(tracker.should_short_circuit("k", 0));
        tracker.clear("k");
        assert!(!tracker.should_short_circuit("k", 0));
    }

    #[test]
    fn prune_removes_long_expired() {
        let tracker = ServfailTracker::new(16, 1, 10, 60);
        tracker.record_servfail("k", 0);
        assert_eq!(tracker.prune_expired(1_000), 1);
    }
}
