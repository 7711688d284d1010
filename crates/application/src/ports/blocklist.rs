//! Blocklist matcher port (§4.3). The heavy structures (bloom filter,
//! suffix trie) are an infrastructure concern; this crate only names the
//! decision contract and the config it reloads from.

use sentrydns_domain::config::{ClientGroupConfig, ServiceDefinition};
use sentrydns_domain::BlockDecision;

pub trait BlocklistMatcher: Send + Sync {
    /// Decides in constant expected time whether `qname` is blocked for
    /// `group_id` at `now` (unix seconds). Pause and scheduled windows are
    /// evaluated inside the implementation, which owns the wall-clock to
    /// local-time conversion.
    fn decide(&self, qname: &str, group_id: &str, now_unix: u64) -> BlockDecision;

    /// Atomically swaps the denylist/allowlist/group/service-catalog
    /// snapshot. In-flight lookups keep observing the snapshot they
    /// captured.
    fn apply_config(
        &self,
        denylist: &[String],
        allowlist: &[String],
        groups: &[ClientGroupConfig],
        services: &[ServiceDefinition],
    );

    /// Global time-gated skip: while `now < paused_until`, every lookup
    /// returns [`BlockDecision::Allowed`].
    fn pause_until(&self, until_unix: u64);
    fn resume(&self);
}
