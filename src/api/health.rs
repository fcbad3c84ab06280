use axum::{extract::State, Json};
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub wallet: String,
    pub cache_backend: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let wallet = if state.wallet.is_some() {
        "connected"
    } else {
        "disabled"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        wallet: wallet.to_string(),
        cache_backend: state.cache.backend_name().to_string(),
    })
}
