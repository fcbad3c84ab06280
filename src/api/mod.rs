// src/api/mod.rs

pub mod boxes;
pub mod callbacks;
pub mod health;
pub mod llm;
pub mod sessions;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{
    config::Config,
    error::Result,
    services::{BoxCache, CallbackDispatcher, QueryLoader, SessionStore},
    storage::KeyValueStore,
    wallet::{WalletConnector, WalletEvents},
};

/// Everything the handlers share. Built once at the composition root.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub dispatcher: Arc<CallbackDispatcher>,
    pub cache: Arc<BoxCache>,
    pub wallet: Option<Arc<dyn WalletConnector>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        wallet: Option<Arc<dyn WalletConnector>>,
        events: &WalletEvents,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let dispatcher = Arc::new(CallbackDispatcher::from_config(&config)?);
        let loader = QueryLoader::new(std::time::Duration::from_secs(config.fetch_timeout_secs))?;
        let sessions = SessionStore::new(loader, dispatcher.clone(), wallet.clone(), events);
        let cache = Arc::new(BoxCache::new(
            store,
            config.box_cache_max_items,
            config.box_cache_chunk_size,
        ));

        Ok(Self {
            config,
            sessions,
            dispatcher,
            cache,
            wallet,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_from_origins(&state.config.cors_allowed_origins);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Sessions & operation handlers
        .route("/api/v1/launch", get(sessions::launch))
        .route("/api/v1/sessions/{id}", get(sessions::get_session))
        .route(
            "/api/v1/sessions/{id}/transaction",
            post(sessions::submit_transaction),
        )
        .route("/api/v1/sessions/{id}/signature", post(sessions::sign_message))
        .route("/api/v1/sessions/{id}/connect", post(sessions::connect_wallet))
        // Callbacks
        .route(
            "/api/v1/callbacks/dead-letters",
            get(callbacks::dead_letters),
        )
        // Box cache
        .route(
            "/api/v1/boxes",
            get(boxes::list_boxes).delete(boxes::clear_boxes),
        )
        .route(
            "/api/v1/boxes/{address}",
            get(boxes::get_box).put(boxes::put_box),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` or empty means permissive; otherwise a comma-separated origin list.
pub fn cors_from_origins(raw: &str) -> CorsLayer {
    let raw = raw.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
