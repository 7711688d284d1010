//! L1: the shared store behind L0 (§4.2). A logical key-value interface
//! with per-key TTL and a sortable index for the sweeper (§4.5).
//!
//! Modeled as one trait with four operation groups and one error kind, per
//! the "Cache interface over two backends" design note: a concrete
//! production adapter and an in-process mock (a table of entries plus an
//! optional injected error) both implement it.

use async_trait::async_trait;
use sentrydns_domain::{CacheEntry, CacheKey, Freshness, ResolverError};

#[derive(Debug, Clone, Copy, Default)]
pub struct L1Stats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[async_trait]
pub trait L1Store: Send + Sync {
    async fn get_with_ttl(
        &self,
        key: &CacheKey,
        now: u64,
    ) -> Result<Option<(CacheEntry, Freshness)>, ResolverError>;

    /// `index_buckets` are sortable time windows (typically `[hard_expiry]`,
    /// sometimes more if an adapter buckets coarser than per-second) used by
    /// [`Self::expiry_candidates`] to enumerate sweep candidates without a
    /// full scan.
    async fn set_with_index(
        &self,
        entry: CacheEntry,
        index_buckets: &[u64],
    ) -> Result<(), ResolverError>;

    async fn expiry_candidates(
        &self,
        window_start: u64,
        window_end: u64,
        max: usize,
    ) -> Result<Vec<CacheKey>, ResolverError>;

    async fn increment_hit(&self, key: &CacheKey, sampled_delta: u64);
    async fn increment_sweep_hit(&self, key: &CacheKey);

    async fn delete(&self, key: &CacheKey) -> Result<(), ResolverError>;
    async fn clear(&self) -> Result<(), ResolverError>;

    fn stats(&self) -> L1Stats;

    /// Refresh lease (§4.5): a `setnx`-with-TTL keyed under `dnsmeta:*`,
    /// atomic across replicas sharing this store. Returns `true` on
    /// acquisition, `false` when another owner currently holds it.
    async fn try_acquire_lease(
        &self,
        key: &CacheKey,
        owner_token: u64,
        ttl_secs: u64,
        now: u64,
    ) -> Result<bool, ResolverError>;

    /// Idempotent: releasing a lease you don't hold (expired or never
    /// acquired) is a no-op.
    async fn release_lease(&self, key: &CacheKey, owner_token: u64) -> Result<(), ResolverError>;
}
