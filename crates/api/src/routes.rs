use crate::handlers;
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

/// The control-surface router (§2 component #10): hot-reload dispatch and
/// stats aggregation only. Everything else the teacher's API exposed — the
/// full CRUD admin surface over clients/groups/blocklist sources/managed
/// domains — is out of scope here (§1): those are thin glue around the core
/// this crate doesn't implement.
pub fn create_api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .route("/config/reload", post(handlers::reload_config))
        .with_state(state)
}
