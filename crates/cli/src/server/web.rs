//! Mounts the control-surface router (§2 component #10) on its own listen
//! address. Unlike the teacher's web server this carries no dashboard: the
//! admin UI and its CRUD API are out of scope (§1), so there's nothing left
//! to serve but the thin `sentrydns_api` router itself.

use sentrydns_api::{create_api_routes, AppState};
use std::net::SocketAddr;
use tracing::info;

pub async fn start_web_server(bind_addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    info!(bind_address = %bind_addr, "starting control-surface API");

    let app = create_api_routes(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
