//! `upstreams[]` and `resolver` sections (§6).

use serde::{Deserialize, Serialize};

use crate::upstream::LoadBalancingStrategy;

pub use crate::upstream::Upstream as UpstreamDef;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub strategy: LoadBalancingStrategy,

    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    #[serde(default = "default_upstream_backoff_ms")]
    pub upstream_backoff_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategy: LoadBalancingStrategy::default(),
            upstream_timeout_ms: default_upstream_timeout_ms(),
            upstream_backoff_ms: default_upstream_backoff_ms(),
        }
    }
}

fn default_upstream_timeout_ms() -> u64 {
    2000
}

fn default_upstream_backoff_ms() -> u64 {
    0
}
