//! `blocklists` section (§6): global sources plus allow/deny overrides.

use serde::{Deserialize, Serialize};

/// A named service (`youtube`, `tiktok`, ...) and the domains that classify
/// a qname as belonging to it, for `client_groups.*.family_time`'s
/// per-service scoping (§6.2).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceDefinition {
    pub name: String,
    #[serde(default)]
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlocklistsConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub allowlist: Vec<String>,

    #[serde(default)]
    pub denylist: Vec<String>,

    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

impl Default for BlocklistsConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            sources: vec![],
            allowlist: vec![],
            denylist: vec![],
            services: vec![],
        }
    }
}

fn default_refresh_interval() -> u64 {
    86_400
}
