//! `client_groups[]` section (§6): per-group blocklist policy and schedules.

use serde::{Deserialize, Serialize};

use crate::blocklist::ScheduledWindow;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupBlocklistConfig {
    #[serde(default = "default_true")]
    pub inherit_global: bool,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub allow: Vec<String>,

    #[serde(default)]
    pub deny: Vec<String>,
}

impl Default for GroupBlocklistConfig {
    fn default() -> Self {
        Self {
            inherit_global: true,
            sources: vec![],
            allow: vec![],
            deny: vec![],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// Minutes since local midnight.
    pub start_minutes: u16,
    pub end_minutes: u16,
    /// Bit 0 = Monday .. bit 6 = Sunday.
    pub days_mask: u8,
    #[serde(default)]
    pub services: Vec<String>,
}

impl From<ScheduleConfig> for ScheduledWindow {
    fn from(s: ScheduleConfig) -> Self {
        ScheduledWindow {
            start_minutes: s.start_minutes,
            end_minutes: s.end_minutes,
            days_mask: s.days_mask,
            services: s.services,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientGroupConfig {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub blocklist: GroupBlocklistConfig,

    #[serde(default)]
    pub safe_search: bool,

    /// Maps to [`crate::blocklist::GroupBlocklist::family_time`]; the
    /// [`crate::blocklist::GroupBlocklist::scheduled_pause`] half comes from
    /// a separate schedule entry, not modeled per-group in config today.
    #[serde(default)]
    pub family_time: Option<ScheduleConfig>,

    #[serde(default)]
    pub scheduled_pause: Option<ScheduleConfig>,
}

fn default_true() -> bool {
    true
}
