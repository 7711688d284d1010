use crate::errors::ApiError;
use crate::state::AppState;
use axum::{extract::State, Json};
use sentrydns_domain::config::ConfigError;
use sentrydns_domain::{ClientTable, Config, LocalRecordsTable};
use serde_json::{json, Value};
use tracing::{error, info, instrument};

/// Hot-reload dispatch (§4.6, §9.3 "apply_config"): re-reads the config file
/// from disk and atomically swaps every subsystem's snapshot. Structural
/// changes (upstreams, listen addresses) only take effect on restart; the
/// sections dispatched here are exactly the ones each subsystem's
/// `apply_config` accepts.
#[instrument(skip(state), name = "api_reload_config")]
pub async fn reload_config(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    info!("config reload requested");

    let config_path = state
        .config_path
        .clone()
        .map(|p| p.to_string())
        .or_else(Config::get_config_path)
        .ok_or_else(|| {
            error!("no config file found for reload");
            ConfigError::FileRead("<none>".to_string(), "no config path configured".to_string())
        })?;

    let new_config = Config::load(Some(&config_path), Default::default()).map_err(|e| {
        error!(error = %e, "failed to reload config from file");
        e
    })?;

    new_config.validate().map_err(|e| {
        error!(error = %e, "reloaded config failed validation");
        e
    })?;

    state.blocklist.apply_config(
        &new_config.blocklists.denylist,
        &new_config.blocklists.allowlist,
        &new_config.client_groups,
        &new_config.blocklists.services,
    );
    state
        .clients
        .apply_config(ClientTable::build(&new_config.client_identification));
    state
        .local_records
        .apply_config(LocalRecordsTable::build(&new_config.local_records));

    let groups_reloaded = new_config.client_groups.len();
    let local_records_reloaded = new_config.local_records.len();

    {
        let mut config = state.config.write().await;
        *config = new_config;
    }

    info!(groups_reloaded, local_records_reloaded, "config reloaded");
    Ok(Json(json!({
        "success": true,
        "message": "configuration reloaded",
        "details": {
            "config_path": config_path,
            "client_groups_reloaded": groups_reloaded,
            "local_records_reloaded": local_records_reloaded,
        },
    })))
}
