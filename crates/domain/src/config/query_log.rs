//! `query_log` section (§6, §4.1 step 8): sink capacity and exclude lists.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryLogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Suffix-matched; `ads.example.com` also suppresses `*.ads.example.com`.
    #[serde(default)]
    pub exclude_domains: Vec<String>,

    #[serde(default)]
    pub exclude_clients: Vec<String>,
}

impl Default for QueryLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: default_channel_capacity(),
            exclude_domains: Vec::new(),
            exclude_clients: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    4096
}
