use crate::state::AppState;
use axum::{extract::State, Json};
use tracing::instrument;

#[instrument(skip(state), name = "api_get_stats")]
pub async fn get_stats(State(state): State<AppState>) -> Json<sentrydns_application::stats::StatsSnapshot> {
    Json(state.stats.snapshot())
}
