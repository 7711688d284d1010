//! `cache` section (§6): TTL clamps, stale-serving, sweeper and refresh tuning.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_min_ttl")]
    pub min_ttl: u32,

    #[serde(default = "default_max_ttl")]
    pub max_ttl: u32,

    #[serde(default = "default_negative_ttl")]
    pub negative_ttl: u32,

    #[serde(default = "default_servfail_backoff")]
    pub servfail_backoff_secs: u32,

    #[serde(default = "default_true")]
    pub serve_stale: bool,

    #[serde(default = "default_stale_ttl")]
    pub stale_ttl_secs: u32,

    #[serde(default = "default_expired_entry_ttl")]
    pub expired_entry_ttl_secs: u32,

    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_sweep_window")]
    pub sweep_window_secs: u64,

    #[serde(default = "default_sweep_min_hits")]
    pub sweep_min_hits: u32,

    #[serde(default = "default_sweep_hit_window")]
    pub sweep_hit_window_secs: u64,

    #[serde(default = "default_hot_threshold")]
    pub hot_threshold: u32,

    #[serde(default = "default_hit_window")]
    pub hit_window_secs: u64,

    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,

    #[serde(default = "default_redis_lru_size")]
    pub redis_lru_size: usize,

    #[serde(default = "default_refresh_upstream_fail_log_interval")]
    pub refresh_upstream_fail_log_interval_secs: u64,

    /// §4.1 step 5: a fresh hit becomes refresh-eligible once its soft-expiry
    /// is within this many seconds, provided it's also hot enough.
    #[serde(default = "default_refresh_min_ttl")]
    pub refresh_min_ttl_secs: u32,

    #[serde(default = "default_servfail_max_entries")]
    pub servfail_max_entries: usize,

    #[serde(default = "default_servfail_threshold")]
    pub servfail_threshold: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_ttl: default_min_ttl(),
            max_ttl: default_max_ttl(),
            negative_ttl: default_negative_ttl(),
            servfail_backoff_secs: default_servfail_backoff(),
            serve_stale: true,
            stale_ttl_secs: default_stale_ttl(),
            expired_entry_ttl_secs: default_expired_entry_ttl(),
            max_inflight: default_max_inflight(),
            max_batch_size: default_max_batch_size(),
            sweep_interval_secs: default_sweep_interval(),
            sweep_window_secs: default_sweep_window(),
            sweep_min_hits: default_sweep_min_hits(),
            sweep_hit_window_secs: default_sweep_hit_window(),
            hot_threshold: default_hot_threshold(),
            hit_window_secs: default_hit_window(),
            lock_ttl_secs: default_lock_ttl(),
            redis_lru_size: default_redis_lru_size(),
            refresh_upstream_fail_log_interval_secs: default_refresh_upstream_fail_log_interval(),
            refresh_min_ttl_secs: default_refresh_min_ttl(),
            servfail_max_entries: default_servfail_max_entries(),
            servfail_threshold: default_servfail_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_min_ttl() -> u32 {
    1
}
fn default_max_ttl() -> u32 {
    86_400
}
fn default_negative_ttl() -> u32 {
    60
}
fn default_servfail_backoff() -> u32 {
    30
}
fn default_stale_ttl() -> u32 {
    30
}
fn default_expired_entry_ttl() -> u32 {
    30
}
fn default_max_inflight() -> usize {
    256
}
fn default_max_batch_size() -> usize {
    512
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_sweep_window() -> u64 {
    10
}
fn default_sweep_min_hits() -> u32 {
    1
}
fn default_sweep_hit_window() -> u64 {
    3600
}
fn default_hot_threshold() -> u32 {
    5
}
fn default_hit_window() -> u64 {
    300
}
fn default_lock_ttl() -> u64 {
    5
}
fn default_redis_lru_size() -> usize {
    200_000
}
fn default_refresh_upstream_fail_log_interval() -> u64 {
    60
}
fn default_refresh_min_ttl() -> u32 {
    30
}
fn default_servfail_max_entries() -> usize {
    10_000
}
fn default_servfail_threshold() -> u32 {
    3
}
