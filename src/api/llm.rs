// Prompt proxy served by the `llm_proxy` binary.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::LlmClient;

#[derive(Clone)]
pub struct LlmState {
    pub client: Arc<LlmClient>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub choices: Vec<Value>,
}

const GENERATE_FAILED: &str = "Failed to generate text";

fn failure(status: StatusCode, details: String) -> Response {
    (
        status,
        Json(json!({"error": GENERATE_FAILED, "details": details})),
    )
        .into_response()
}

/// GET /
pub async fn health() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

/// POST /generate
pub async fn generate(
    State(state): State<LlmState>,
    body: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let prompt = match body {
        Ok(Json(req)) => req.prompt,
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    if prompt.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "prompt is required".to_string());
    }

    match state.client.generate(&prompt).await {
        Ok(choices) => Json(GenerateResponse { choices }).into_response(),
        Err(e) => {
            tracing::error!("Error generating text: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Only the listed origins, only `GET, POST, OPTIONS`.
pub fn allow_list_cors(raw: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if origins.is_empty() {
        tracing::warn!("LLM proxy has no valid allowed origins; cross-origin calls will fail");
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

pub fn build_llm_router(state: LlmState, allowed_origins: &str) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/generate", post(generate))
        .layer(allow_list_cors(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
