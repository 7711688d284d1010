//! Upstream definitions and health tracking.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
    Tls,
    Quic,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
            Protocol::Tls => "tls",
            Protocol::Quic => "quic",
            Protocol::Https => "https",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Upstream {
    pub name: String,
    pub address: String,
    pub protocol: Protocol,
}

/// `failover`, `round_robin` (spec's name for what config calls
/// `round_robin`, teacher's config calls it `Balanced`) and `weighted`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    #[default]
    Failover,
    RoundRobin,
    Weighted,
}

/// Per-upstream liveness tracked by the dispatcher, never persisted.
#[derive(Debug, Clone, Default)]
pub struct UpstreamHealth {
    pub backoff_until: u64,
    pub last_success: u64,
    pub ewma_rtt_millis: f64,
}

impl UpstreamHealth {
    pub fn is_skipped(&self, now: u64) -> bool {
        now < self.backoff_until
    }

    pub fn record_success(&mut self, now: u64, sample_rtt_millis: f64) {
        self.backoff_until = 0;
        self.last_success = now;
        self.ewma_rtt_millis = if self.ewma_rtt_millis == 0.0 {
            sample_rtt_millis
        } else {
            0.875 * self.ewma_rtt_millis + 0.125 * sample_rtt_millis
        };
    }

    pub fn record_failure(&mut self, now: u64, backoff_secs: u64) {
        if backoff_secs > 0 {
            self.backoff_until = now + backoff_secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_skips_until_expiry() {
        let mut h = UpstreamHealth::default();
        h.record_failure(100, 200);
        assert!(h.is_skipped(150));
        assert!(!h.is_skipped(300));
    }

    #[test]
    fn success_clears_backoff_and_updates_ewma() {
        let mut h = UpstreamHealth::default();
        h.record_failure(100, 200);
        h.record_success(150, 40.0);
        assert_eq!(h.backoff_until, 0);
        assert_eq!(h.ewma_rtt_millis, 40.0);
        h.record_success(160, 80.0);
        assert!((h.ewma_rtt_millis - (0.875 * 40.0 + 0.125 * 80.0)).abs() < 1e-9);
    }
}
