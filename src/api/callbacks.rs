use axum::{extract::State, Json};

use super::AppState;
use crate::{
    error::Result,
    models::ApiResponse,
    services::DeadLetter,
};

/// GET /api/v1/callbacks/dead-letters
pub async fn dead_letters(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<DeadLetter>>>> {
    Ok(Json(ApiResponse::success(state.dispatcher.dead_letters())))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{spawn_app, state_with};
    use crate::config::Config;
    use crate::models::{CallbackPayload, OperationResult};
    use crate::services::callback_dispatcher::LogSink;
    use crate::wallet::WalletEvents;
    use serde_json::Value;

    #[tokio::test]
    async fn lists_undeliverable_callbacks() {
        let events = WalletEvents::new();
        let state = state_with(Config::default(), None, &events);
        let dispatcher = state.dispatcher.clone();
        let app = spawn_app(state).await;

        let _ = dispatcher
            .dispatch(
                "abc",
                "ftp://example.org/hook",
                &CallbackPayload::Transaction(OperationResult::hash("0xabc")),
                &LogSink,
            )
            .await;

        let body: Value = reqwest::get(format!("{}/api/v1/callbacks/dead-letters", app))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let letters = body["data"].as_array().unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0]["uid"], "abc");
        assert_eq!(letters[0]["label"], "transaction");
        assert_eq!(letters[0]["error"]["kind"], "bad_url");
    }
}
