//! Fixed-capacity in-process LRU front for the cache (§4.2). Guarded by a
//! `std::sync::Mutex` rather than an async one: every method is synchronous
//! and the critical section is a handful of hashmap operations, so there's
//! nothing to suspend on.

use lru::LruCache;
use sentrydns_application::ports::{L0Cache, L0Stats};
use sentrydns_domain::{CacheEntry, CacheKey, Freshness};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct LruL0Cache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LruL0Cache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(capacity).unwrap())),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl L0Cache for LruL0Cache {
    fn get(&self, key: &CacheKey, now: u64) -> Option<(CacheEntry, Freshness)> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.get(key.as_str()) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let freshness = entry.freshness(now);
        if freshness == Freshness::Absent {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Some((entry.clone(), freshness));
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some((entry.clone(), freshness))
    }

    fn put(&self, entry: CacheEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(entry.key.as_str().to_string(), entry);
    }

    fn delete(&self, key: &CacheKey) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.pop(key.as_str());
    }

    fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    fn stats(&self) -> L0Stats {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        L0Stats {
            entries: entries.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrydns_domain::Answer;

    fn entry(qname: &str, now: u64) -> CacheEntry {
        let key = CacheKey::new(qname, sentrydns_domain::RecordType::A, 1);
        CacheEntry::new(key, Answer::new(std::sync::Arc::from(&b""[..]), false), 300, 60, 1, 86400, now)
    }

    #[test]
    fn put_then_get_hits() {
        let cache = LruL0Cache::new(4);
        let e = entry("example.com", 0);
        cache.put(e.clone());
        let (got, freshness) = cache.get(&e.key, 0).unwrap();
        assert_eq!(got.key.as_str(), e.key.as_str());
        assert_eq!(freshness, Freshness::Fresh);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn hard_expired_entry_is_retained_not_evicted_on_get() {
        let cache = LruL0Cache::new(4);
        let e = entry("example.com", 0);
        let hard_expiry = e.hard_expiry;
        cache.put(e.clone());
        let (got, freshness) = cache.get(&e.key, hard_expiry + 1).unwrap();
        assert_eq!(freshness, Freshness::Absent);
        assert_eq!(got.key.as_str(), e.key.as_str());
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn capacity_evicts_lru() {
        let cache = LruL0Cache::new(1);
        let a = entry("a.com", 0);
        let b = entry("b.com", 0);
        cache.put(a.clone());
        cache.put(b.clone());
        assert!(cache.get(&a.key, 0).is_none());
        assert!(cache.get(&b.key, 0).is_some());
    }
}
