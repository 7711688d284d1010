//! Control-surface HTTP adapter (§2 component #10). A thin axum router over
//! the hot-reloadable registries and the stats snapshot; the resolution
//! pipeline, cache tiers and upstream dispatcher live in the composition
//! root and are never reached from here.

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use errors::ApiError;
pub use routes::create_api_routes;
pub use state::AppState;
