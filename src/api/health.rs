use axum::extract::State;
use axum::Json;

use crate::api::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Ready once the service is wired; reports the limits it was configured with.
pub async fn ready(State(state): State<AppState>) -> Json<serde_json::Value> {
    let limits = state.service.limits();
    Json(serde_json::json!({
        "status": "ready",
        "matrixMaxLevel": limits.matrix_max_level,
        "commissionMaxLevel": limits.commission_max_level,
        "teamVolumeDepth": limits.team_volume_depth,
    }))
}
