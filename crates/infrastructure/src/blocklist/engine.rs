//! [`BlocklistMatcher`] implementation (§4.3): global bloom-filter fast path
//! plus exact/wildcard sets, with per-group allow/deny overrides and the
//! pause/family-time schedules resolved against [`GroupBlocklist`].

use super::bloom::AtomicBloom;
use super::suffix_trie::SuffixTrie;
use arc_swap::ArcSwap;
use chrono::{Datelike, Timelike, Utc};
use compact_str::CompactString;
use dashmap::{DashMap, DashSet};
use rustc_hash::FxBuildHasher;
use sentrydns_application::ports::BlocklistMatcher;
use sentrydns_domain::config::{ClientGroupConfig, ServiceDefinition};
use sentrydns_domain::{BlockDecision, GroupBlocklist, ServiceCatalog};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const BLOOM_FP_RATE: f64 = 0.01;

/// One group's exact/wildcard allow and deny overrides, on top of the global
/// lists (unless `inherit_global` is false).
struct GroupRules {
    inherit_global: bool,
    deny_exact: DashSet<CompactString, FxBuildHasher>,
    deny_wildcard: SuffixTrie,
    allow_exact: DashSet<CompactString, FxBuildHasher>,
    allow_wildcard: SuffixTrie,
    schedule: GroupBlocklist,
}

struct Snapshot {
    global_bloom: AtomicBloom,
    global_exact: DashSet<CompactString, FxBuildHasher>,
    global_wildcard: SuffixTrie,
    global_allow_exact: DashSet<CompactString, FxBuildHasher>,
    global_allow_wildcard: SuffixTrie,
    groups: DashMap<String, GroupRules, FxBuildHasher>,
    services: ServiceCatalog,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            global_bloom: AtomicBloom::new(1024, BLOOM_FP_RATE),
            global_exact: DashSet::default(),
            global_wildcard: SuffixTrie::new(),
            global_allow_exact: DashSet::default(),
            global_allow_wildcard: SuffixTrie::new(),
            groups: DashMap::default(),
            services: ServiceCatalog::default(),
        }
    }

    fn is_allowed(&self, qname: &str, group_id: &str) -> bool {
        if let Some(group) = self.groups.get(group_id) {
            if group.allow_exact.contains(qname) || group.allow_wildcard.lookup(qname) {
                return true;
            }
        }
        self.global_allow_exact.contains(qname) || self.global_allow_wildcard.lookup(qname)
    }

    fn is_denied(&self, qname: &str, group_id: &str) -> bool {
        if let Some(group) = self.groups.get(group_id) {
            if group.deny_exact.contains(qname) || group.deny_wildcard.lookup(qname) {
                return true;
            }
            if !group.inherit_global {
                return false;
            }
        }
        if !self.global_bloom.check(&qname) {
            return false;
        }
        self.global_exact.contains(qname) || self.global_wildcard.lookup(qname)
    }
}

/// Holds the current immutable [`Snapshot`] plus the mutable pause gate.
/// `apply_config` builds a whole new snapshot and swaps it in atomically so
/// in-flight lookups never observe a half-built filter.
pub struct BloomBlocklistMatcher {
    snapshot: ArcSwap<Snapshot>,
    paused_until: AtomicU64,
}

impl Default for BloomBlocklistMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl BloomBlocklistMatcher {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::empty()),
            paused_until: AtomicU64::new(0),
        }
    }
}

impl BlocklistMatcher for BloomBlocklistMatcher {
    fn decide(&self, qname: &str, group_id: &str, now_unix: u64) -> BlockDecision {
        if now_unix < self.paused_until.load(Ordering::Relaxed) {
            return BlockDecision::Allowed;
        }

        let snapshot = self.snapshot.load();

        if let Some(group) = snapshot.groups.get(group_id) {
            let (weekday, now_minutes) = local_weekday_and_minutes(now_unix);
            let services = snapshot.services.services_for(qname);
            if let Some(forced) = group.schedule.schedule_forces_block(&services, weekday, now_minutes)
            {
                return if forced {
                    BlockDecision::Blocked
                } else {
                    BlockDecision::Allowed
                };
            }
        }

        if snapshot.is_allowed(qname, group_id) {
            return BlockDecision::Allowed;
        }
        if snapshot.is_denied(qname, group_id) {
            return BlockDecision::Blocked;
        }
        BlockDecision::Allowed
    }

    fn apply_config(
        &self,
        denylist: &[String],
        allowlist: &[String],
        groups: &[ClientGroupConfig],
        services: &[ServiceDefinition],
    ) {
        let global_bloom = AtomicBloom::new(denylist.len().max(16), BLOOM_FP_RATE);
        let global_exact: DashSet<CompactString, FxBuildHasher> = DashSet::default();
        let mut global_wildcard = SuffixTrie::new();
        for pattern in denylist {
            let normalized = normalize(pattern);
            global_bloom.set(&normalized.as_str());
            if normalized.starts_with("*.") {
                global_wildcard.insert_wildcard(&normalized);
            } else {
                global_exact.insert(CompactString::new(&normalized));
            }
        }

        let global_allow_exact: DashSet<CompactString, FxBuildHasher> = DashSet::default();
        let mut global_allow_wildcard = SuffixTrie::new();
        for pattern in allowlist {
            let normalized = normalize(pattern);
            if normalized.starts_with("*.") {
                global_allow_wildcard.insert_wildcard(&normalized);
            } else {
                global_allow_exact.insert(CompactString::new(&normalized));
            }
        }

        let group_rules: DashMap<String, GroupRules, FxBuildHasher> = DashMap::default();
        for group in groups {
            let deny_exact: DashSet<CompactString, FxBuildHasher> = DashSet::default();
            let mut deny_wildcard = SuffixTrie::new();
            for pattern in &group.blocklist.deny {
                let normalized = normalize(pattern);
                if normalized.starts_with("*.") {
                    deny_wildcard.insert_wildcard(&normalized);
                } else {
                    deny_exact.insert(CompactString::new(&normalized));
                }
            }
            let allow_exact: DashSet<CompactString, FxBuildHasher> = DashSet::default();
            let mut allow_wildcard = SuffixTrie::new();
            for pattern in &group.blocklist.allow {
                let normalized = normalize(pattern);
                if normalized.starts_with("*.") {
                    allow_wildcard.insert_wildcard(&normalized);
                } else {
                    allow_exact.insert(CompactString::new(&normalized));
                }
            }
            let schedule = GroupBlocklist {
                group_id: group.id.clone(),
                inherit_global: group.blocklist.inherit_global,
                scheduled_pause: group.scheduled_pause.clone().map(Into::into),
                family_time: group.family_time.clone().map(Into::into),
            };
            group_rules.insert(
                group.id.clone(),
                GroupRules {
                    inherit_global: group.blocklist.inherit_global,
                    deny_exact,
                    deny_wildcard,
                    allow_exact,
                    allow_wildcard,
                    schedule,
                },
            );
        }

        let service_catalog = ServiceCatalog::new(
            services
                .iter()
                .map(|s| (s.name.clone(), s.domains.clone()))
                .collect(),
        );

        let next = Snapshot {
            global_bloom,
            global_exact,
            global_wildcard,
            global_allow_exact,
            global_allow_wildcard,
            groups: group_rules,
            services: service_catalog,
        };
        self.snapshot.store(Arc::new(next));
    }

    fn pause_until(&self, until_unix: u64) {
        self.paused_until.store(until_unix, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.paused_until.store(0, Ordering::Relaxed);
    }
}

fn normalize(pattern: &str) -> String {
    let p = pattern.trim();
    let p = p.strip_prefix("||").unwrap_or(p);
    let p = p.strip_suffix('^').unwrap_or(p);
    p.trim_end_matches('.').to_ascii_lowercase()
}

fn local_weekday_and_minutes(now_unix: u64) -> (u8, u16) {
    let dt = chrono::DateTime::<Utc>::from_timestamp(now_unix as i64, 0).unwrap_or_default();
    let weekday = dt.weekday().num_days_from_monday() as u8;
    let minutes = (dt.hour() * 60 + dt.minute()) as u16;
    (weekday, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher_with(denylist: &[&str], allowlist: &[&str]) -> BloomBlocklistMatcher {
        let m = BloomBlocklistMatcher::new();
        let deny: Vec<String> = denylist.iter().map(|s| s.to_string()).collect();
        let allow: Vec<String> = allowlist.iter().map(|s| s.to_string()).collect();
        m.apply_config(&deny, &allow, &[], &[]);
        m
    }

    #[test]
    fn exact_deny_blocks() {
        let m = matcher_with(&["ads.example.com"], &[]);
        assert_eq!(
            m.decide("ads.example.com", "default", 0),
            BlockDecision::Blocked
        );
        assert_eq!(
            m.decide("example.com", "default", 0),
            BlockDecision::Allowed
        );
    }

    #[test]
    fn wildcard_deny_blocks_subdomains() {
        let m = matcher_with(&["*.doubleclick.net"], &[]);
        assert_eq!(
            m.decide("ad.doubleclick.net", "default", 0),
            BlockDecision::Blocked
        );
    }

    #[test]
    fn allowlist_overrides_denylist() {
        let m = matcher_with(&["*.ads.example.com"], &["safe.ads.example.com"]);
        assert_eq!(
            m.decide("safe.ads.example.com", "default", 0),
            BlockDecision::Allowed
        );
        assert_eq!(
            m.decide("tracker.ads.example.com", "default", 0),
            BlockDecision::Blocked
        );
    }

    #[test]
    fn family_time_blocks_only_the_classified_service() {
        use sentrydns_domain::config::{
            ClientGroupConfig, GroupBlocklistConfig, ScheduleConfig, ServiceDefinition,
        };

        let m = BloomBlocklistMatcher::new();
        let kids = ClientGroupConfig {
            id: "kids".to_string(),
            name: "Kids".to_string(),
            blocklist: GroupBlocklistConfig::default(),
            safe_search: false,
            family_time: Some(ScheduleConfig {
                start_minutes: 0,
                end_minutes: 1440,
                days_mask: 0b1111111,
                services: vec!["youtube".to_string()],
            }),
            scheduled_pause: None,
        };
        let services = vec![ServiceDefinition {
            name: "youtube".to_string(),
            domains: vec!["youtube.com".to_string()],
        }];
        m.apply_config(&[], &[], &[kids], &services);

        assert_eq!(
            m.decide("www.youtube.com", "kids", 0),
            BlockDecision::Blocked
        );
        assert_eq!(
            m.decide("example.com", "kids", 0),
            BlockDecision::Allowed
        );
    }

    #[test]
    fn pause_allows_everything() {
        let m = matcher_with(&["ads.example.com"], &[]);
        m.pause_until(1_000);
        assert_eq!(
            m.decide("ads.example.com", "default", 500),
            BlockDecision::Allowed
        );
        assert_eq!(
            m.decide("ads.example.com", "default", 1_500),
            BlockDecision::Blocked
        );
    }
}
