use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::collections::HashMap;

use super::AppState;
use crate::{
    error::Result,
    models::{ApiResponse, LaunchParams},
    services::SessionView,
};

/// GET /api/v1/launch?source=&uid=&callback=&type=&botName=
pub async fn launch(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ApiResponse<SessionView>>> {
    let params = LaunchParams::from_query(&query);
    let view = state.sessions.launch(params).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SessionView>>> {
    Ok(Json(ApiResponse::success(state.sessions.view(&id)?)))
}

/// POST /api/v1/sessions/{id}/transaction
pub async fn submit_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SessionView>>> {
    let view = state.sessions.submit_transaction(&id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// POST /api/v1/sessions/{id}/signature
pub async fn sign_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SessionView>>> {
    let view = state.sessions.sign_message(&id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// POST /api/v1/sessions/{id}/connect
pub async fn connect_wallet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SessionView>>> {
    let view = state.sessions.announce_connection(&id).await?;
    Ok(Json(ApiResponse::success(view)))
}
