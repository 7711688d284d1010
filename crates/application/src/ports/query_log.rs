//! Query-log sink port (§4.1 step 8). Emission is via a bounded channel at
//! the adapter; a full channel drops the event rather than blocking the
//! client-visible path (§5).

use sentrydns_domain::QueryEvent;

pub trait QueryLogSink: Send + Sync {
    /// Never blocks. Returns `false` (and increments an internal dropped
    /// counter) when the sink is saturated.
    fn emit(&self, event: QueryEvent) -> bool;

    /// Whether `qname`/`client_name` should be suppressed from the log per
    /// the configured exclude lists.
    fn is_excluded(&self, qname: &str, client_name: &str) -> bool;
}
