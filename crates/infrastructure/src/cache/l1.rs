//! DashMap-backed shared cache tier (§4.2), playing the role a clustered
//! key-value store would in a multi-process deployment. Expiry candidates
//! are indexed by a sorted `BTreeMap<u64, HashSet<String>>` keyed on the
//! caller-supplied index buckets, so the sweeper's windowed scan (§4.5)
//! never has to walk the whole table. Leases live in a separate map keyed
//! under the same `dnsmeta:` namespace a Redis-backed adapter would use.

use async_trait::async_trait;
use dashmap::DashMap;
use sentrydns_application::ports::{L1Stats, L1Store};
use sentrydns_domain::{CacheEntry, CacheKey, Freshness, ResolverError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

struct Lease {
    owner_token: u64,
    expires_at: u64,
}

pub struct DashMapL1Store {
    entries: DashMap<String, CacheEntry>,
    /// index bucket -> set of keys expiring around that bucket.
    index: Mutex<BTreeMap<u64, Vec<String>>>,
    leases: DashMap<String, Lease>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for DashMapL1Store {
    fn default() -> Self {
        Self::new()
    }
}

impl DashMapL1Store {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            index: Mutex::new(BTreeMap::new()),
            leases: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl L1Store for DashMapL1Store {
    async fn get_with_ttl(
        &self,
        key: &CacheKey,
        now: u64,
    ) -> Result<Option<(CacheEntry, Freshness)>, ResolverError> {
        let Some(entry) = self.entries.get(key.as_str()) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };
        let freshness = entry.freshness(now);
        if freshness == Freshness::Absent {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(Some((entry.clone(), freshness)));
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some((entry.clone(), freshness)))
    }

    async fn set_with_index(
        &self,
        entry: CacheEntry,
        index_buckets: &[u64],
    ) -> Result<(), ResolverError> {
        let key = entry.key.as_str().to_string();
        self.entries.insert(key.clone(), entry);
        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        for bucket in index_buckets {
            index.entry(*bucket).or_default().push(key.clone());
        }
        Ok(())
    }

    async fn expiry_candidates(
        &self,
        window_start: u64,
        window_end: u64,
        max: usize,
    ) -> Result<Vec<CacheKey>, ResolverError> {
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        for (_, keys) in index.range(window_start..=window_end) {
            for k in keys {
                if out.len() >= max {
                    return Ok(out);
                }
                out.push(CacheKey(k.clone()));
            }
        }
        Ok(out)
    }

    async fn increment_hit(&self, key: &CacheKey, sampled_delta: u64) {
        if let Some(mut entry) = self.entries.get_mut(key.as_str()) {
            entry.hit_count_window = entry.hit_count_window.saturating_add(sampled_delta);
        }
    }

    async fn increment_sweep_hit(&self, key: &CacheKey) {
        if let Some(mut entry) = self.entries.get_mut(key.as_str()) {
            entry.sweep_hit_count = entry.sweep_hit_count.saturating_add(1);
        }
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), ResolverError> {
        self.entries.remove(key.as_str());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ResolverError> {
        self.entries.clear();
        self.index.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }

    fn stats(&self) -> L1Stats {
        L1Stats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    async fn try_acquire_lease(
        &self,
        key: &CacheKey,
        owner_token: u64,
        ttl_secs: u64,
        now: u64,
    ) -> Result<bool, ResolverError> {
        let lease_key = format!("dnsmeta:lease:{}", key.as_str());
        match self.leases.entry(lease_key) {
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Lease {
                    owner_token,
                    expires_at: now + ttl_secs,
                });
                Ok(true)
            }
            dashmap::mapref::entry::Entry::Occupied(mut o) => {
                if o.get().expires_at <= now {
                    o.insert(Lease {
                        owner_token,
                        expires_at: now + ttl_secs,
                    });
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn release_lease(&self, key: &CacheKey, owner_token: u64) -> Result<(), ResolverError> {
        let lease_key = format!("dnsmeta:lease:{}", key.as_str());
        if let Some(lease) = self.leases.get(&lease_key) {
            if lease.owner_token == owner_token {
                drop(lease);
                self.leases.remove(&lease_key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrydns_domain::Answer;
    use std::sync::Arc;

    fn entry(qname: &str, now: u64) -> CacheEntry {
        let key = CacheKey::new(qname, sentrydns_domain::RecordType::A, 1);
        CacheEntry::new(key, Answer::new(Arc::from(&b""[..]), false), 300, 60, 1, 86400, now)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = DashMapL1Store::new();
        let e = entry("example.com", 0);
        let hard = e.hard_expiry;
        store.set_with_index(e.clone(), &[hard]).await.unwrap();
        let (got, freshness) = store.get_with_ttl(&e.key, 0).await.unwrap().unwrap();
        assert_eq!(got.key.as_str(), e.key.as_str());
        assert_eq!(freshness, Freshness::Fresh);
    }

    #[tokio::test]
    async fn hard_expired_entry_is_retained_not_evicted_on_get() {
        let store = DashMapL1Store::new();
        let e = entry("example.com", 0);
        let hard_expiry = e.hard_expiry;
        store.set_with_index(e.clone(), &[hard_expiry]).await.unwrap();
        let (got, freshness) = store.get_with_ttl(&e.key, hard_expiry + 1).await.unwrap().unwrap();
        assert_eq!(freshness, Freshness::Absent);
        assert_eq!(got.key.as_str(), e.key.as_str());
    }

    #[tokio::test]
    async fn expiry_candidates_respects_window_and_max() {
        let store = DashMapL1Store::new();
        for i in 0..5u64 {
            let e = entry(&format!("host{i}.com"), 0);
            store.set_with_index(e, &[100 + i]).await.unwrap();
        }
        let candidates = store.expiry_candidates(100, 102, 10).await.unwrap();
        assert_eq!(candidates.len(), 3);
        let limited = store.expiry_candidates(100, 104, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn lease_is_exclusive_until_expiry() {
        let store = DashMapL1Store::new();
        let key = CacheKey::new("example.com", sentrydns_domain::RecordType::A, 1);
        assert!(store.try_acquire_lease(&key, 1, 10, 0).await.unwrap());
        assert!(!store.try_acquire_lease(&key, 2, 10, 5).await.unwrap());
        store.release_lease(&key, 1).await.unwrap();
        assert!(store.try_acquire_lease(&key, 2, 10, 5).await.unwrap());
    }
}
