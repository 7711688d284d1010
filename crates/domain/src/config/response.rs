//! `response` section (§6): the shape of a blocked answer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedResponse {
    Nxdomain,
    Ip(String),
}

impl Default for BlockedResponse {
    fn default() -> Self {
        Self::Nxdomain
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseConfig {
    #[serde(default)]
    pub blocked: BlockedResponse,

    #[serde(default = "default_blocked_ttl")]
    pub blocked_ttl: u32,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            blocked: BlockedResponse::default(),
            blocked_ttl: default_blocked_ttl(),
        }
    }
}

fn default_blocked_ttl() -> u32 {
    60
}
