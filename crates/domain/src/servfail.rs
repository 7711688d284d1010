//! SERVFAIL tracker entry. Bounded growth and eviction live in
//! the infrastructure adapter; this is the per-key record it manages.

#[derive(Debug, Clone)]
pub struct ServfailEntry {
    pub count: u32,
    pub first_seen: u64,
    pub last_log_emitted: u64,
    pub last_touch: u64,
}

impl ServfailEntry {
    pub fn new(now: u64) -> Self {
        Self {
            count: 0,
            first_seen: now,
            last_log_emitted: 0,
            last_touch: now,
        }
    }

    pub fn record(&mut self, now: u64) {
        self.count += 1;
        self.last_touch = now;
    }

    pub fn should_short_circuit(&self, threshold: u32) -> bool {
        self.count > threshold
    }

    /// Whether a "refresh upstream failed" log entry may fire now, given the
    /// rate limit. Updates `last_log_emitted` as a side effect when it does.
    pub fn try_log(&mut self, now: u64, interval_secs: u64) -> bool {
        if now.saturating_sub(self.last_log_emitted) >= interval_secs {
            self.last_log_emitted = now;
            true
        } else {
            false
        }
    }
}
