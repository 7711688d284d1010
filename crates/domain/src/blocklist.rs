//! Data shared by the blocklist matcher's group/schedule logic.
//!
//! The matcher's heavy structures (bloom filter, suffix trie, exact sets)
//! are an infrastructure concern — they need third-party crates this crate
//! deliberately doesn't depend on. What's pure logic lives here: scheduling
//! windows, per-group policy, and the decision outcome.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDecision {
    Allowed,
    Blocked,
}

/// `(start, end)` in minutes-since-local-midnight, a day-of-week bitmask
/// (bit 0 = Monday .. bit 6 = Sunday) and an optional service scope.
/// `end < start` wraps across midnight.
#[derive(Debug, Clone)]
pub struct ScheduledWindow {
    pub start_minutes: u16,
    pub end_minutes: u16,
    pub days_mask: u8,
    pub services: Vec<String>,
}

impl ScheduledWindow {
    /// `weekday`: 0 = Monday .. 6 = Sunday, `now_minutes`: minutes since
    /// local midnight.
    pub fn is_active(&self, weekday: u8, now_minutes: u16) -> bool {
        if self.days_mask & (1 << weekday) == 0 {
            return false;
        }
        if self.start_minutes <= self.end_minutes {
            now_minutes >= self.start_minutes && now_minutes < self.end_minutes
        } else {
            now_minutes >= self.start_minutes || now_minutes < self.end_minutes
        }
    }
}

/// Per-group blocklist policy (the scheduling half; set membership lives in
/// the infrastructure snapshot keyed by the same `group_id`).
#[derive(Debug, Clone)]
pub struct GroupBlocklist {
    pub group_id: String,
    pub inherit_global: bool,
    pub scheduled_pause: Option<ScheduledWindow>,
    pub family_time: Option<ScheduledWindow>,
}

impl GroupBlocklist {
    /// Resolves the two optional schedules into whether blocking applies
    /// right now. `services` is every service name the query's qname
    /// classifies as (usually zero or one); `family_time` wins over
    /// `scheduled_pause` on an overlapping window if any of them match — see
    /// DESIGN.md's Open Question resolution.
    pub fn schedule_forces_block(&self, services: &[&str], weekday: u8, now_minutes: u16) -> Option<bool> {
        let family_active = self.family_time.as_ref().is_some_and(|w| {
            w.is_active(weekday, now_minutes)
                && services.iter().any(|s| w.services.iter().any(|x| x == s))
        });
        if family_active {
            return Some(true);
        }
        let paused = self
            .scheduled_pause
            .as_ref()
            .is_some_and(|w| w.is_active(weekday, now_minutes));
        if paused {
            return Some(false);
        }
        None
    }
}

/// Maps a qname to the service name(s) it belongs to, via suffix match
/// against each service's configured domain list. Pure lookup table; the
/// config layer owns populating it from `BlocklistsConfig::services`.
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    entries: Vec<(String, Vec<String>)>,
}

impl ServiceCatalog {
    pub fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        Self { entries }
    }

    /// Every service name whose domain list matches `qname`, either exactly
    /// or as a subdomain.
    pub fn services_for(&self, qname: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, domains)| {
                domains
                    .iter()
                    .any(|d| qname == d.as_str() || qname.ends_with(&format!(".{d}")))
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Immutable snapshot identity: a generation counter bumped on every
/// `apply_config`, so callers can detect whether they observed a stale view.
#[derive(Debug, Clone, Copy, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

// Re-exported for callers that only need the set-shape, defined in
// infrastructure (where the bloom filter and tries actually live). Kept here
// as a type alias seam so application-layer ports can name it without
// depending on infrastructure.
pub type BlocklistSet = Generation;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_without_wrap() {
        let w = ScheduledWindow {
            start_minutes: 480,
            end_minutes: 1020,
            days_mask: 0b0011111,
            services: vec![],
        };
        assert!(w.is_active(2, 600));
        assert!(!w.is_active(2, 100));
        assert!(!w.is_active(5, 600));
    }

    #[test]
    fn window_wraps_midnight() {
        let w = ScheduledWindow {
            start_minutes: 1320,
            end_minutes: 360,
            days_mask: 0b1111111,
            services: vec![],
        };
        assert!(w.is_active(0, 1400));
        assert!(w.is_active(0, 100));
        assert!(!w.is_active(0, 700));
    }

    #[test]
    fn family_time_wins_over_scheduled_pause() {
        let group = GroupBlocklist {
            group_id: "kids".into(),
            inherit_global: true,
            scheduled_pause: Some(ScheduledWindow {
                start_minutes: 0,
                end_minutes: 1440,
                days_mask: 0b1111111,
                services: vec![],
            }),
            family_time: Some(ScheduledWindow {
                start_minutes: 0,
                end_minutes: 1440,
                days_mask: 0b1111111,
                services: vec!["youtube".into()],
            }),
        };
        assert_eq!(group.schedule_forces_block(&["youtube"], 0, 600), Some(true));
    }

    #[test]
    fn service_catalog_matches_exact_and_subdomain() {
        let catalog = ServiceCatalog::new(vec![(
            "youtube".to_string(),
            vec!["youtube.com".to_string(), "ytimg.com".to_string()],
        )]);
        assert_eq!(catalog.services_for("youtube.com"), vec!["youtube"]);
        assert_eq!(catalog.services_for("i9.ytimg.com"), vec!["youtube"]);
        assert!(catalog.services_for("example.com").is_empty());
    }
}
