//! Control-surface state (§4.6, §4.7, §9.5 component #10): the handful of
//! shared, hot-reloadable pieces this thin API dispatches into. Everything
//! else — the resolution pipeline itself, the two cache tiers, the upstream
//! dispatcher — lives in the composition root and is never reached from
//! here.

use sentrydns_application::ports::BlocklistMatcher;
use sentrydns_application::reload::{ClientRegistry, LocalRecordsRegistry};
use sentrydns_application::stats::StatsRegistry;
use sentrydns_domain::Config;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    pub stats: Arc<StatsRegistry>,
    pub blocklist: Arc<dyn BlocklistMatcher>,
    pub clients: Arc<ClientRegistry>,
    pub local_records: Arc<LocalRecordsRegistry>,
    pub config: Arc<RwLock<Config>>,
    pub config_path: Option<Arc<str>>,
}
