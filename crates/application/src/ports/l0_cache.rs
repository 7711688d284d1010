//! L0: the fixed-capacity in-process LRU (§4.2). Never suspends (§5).

use sentrydns_domain::{CacheEntry, CacheKey, Freshness};

#[derive(Debug, Clone, Copy, Default)]
pub struct L0Stats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// In-process LRU front for the cache. Implementations must be `Send + Sync`
/// and must not suspend — callers on the hot path rely on that.
pub trait L0Cache: Send + Sync {
    fn get(&self, key: &CacheKey, now: u64) -> Option<(CacheEntry, Freshness)>;
    fn put(&self, entry: CacheEntry);
    fn delete(&self, key: &CacheKey);
    fn clear(&self);
    fn stats(&self) -> L0Stats;
}
