use axum::{
    extract::{Path, State},
    Json,
};

use super::AppState;
use crate::{
    error::{AppError, Result},
    models::{ApiResponse, CachedBox},
    utils::is_evm_address,
};

/// GET /api/v1/boxes
pub async fn list_boxes(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<CachedBox>>>> {
    Ok(Json(ApiResponse::success(state.cache.list().await)))
}

/// GET /api/v1/boxes/{address}
pub async fn get_box(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ApiResponse<CachedBox>>> {
    let snapshot = state
        .cache
        .get(&address)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Box {} not cached", address)))?;
    Ok(Json(ApiResponse::success(snapshot)))
}

/// PUT /api/v1/boxes/{address}
pub async fn put_box(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(mut snapshot): Json<CachedBox>,
) -> Result<Json<ApiResponse<CachedBox>>> {
    if !is_evm_address(&address) {
        return Err(AppError::BadRequest(format!(
            "Invalid box address: {}",
            address
        )));
    }
    if !snapshot.address.is_empty() && !snapshot.address.eq_ignore_ascii_case(&address) {
        return Err(AppError::BadRequest(
            "Body address does not match path".to_string(),
        ));
    }
    snapshot.address = address.clone();

    let stored = state.cache.upsert(snapshot).await.ok_or_else(|| {
        AppError::Conflict(format!(
            "Box {} was not kept: older than every cached box or storage was reset",
            address
        ))
    })?;
    Ok(Json(ApiResponse::success(stored)))
}

/// DELETE /api/v1/boxes
pub async fn clear_boxes(State(state): State<AppState>) -> Result<Json<ApiResponse<String>>> {
    state.cache.clear().await;
    Ok(Json(ApiResponse::success("Box cache cleared".to_string())))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{spawn_app, state_with};
    use crate::config::Config;
    use crate::wallet::WalletEvents;
    use serde_json::{json, Value};

    fn address(byte: &str) -> String {
        format!("0x{}", byte.repeat(20))
    }

    #[tokio::test]
    async fn put_get_list_and_clear() {
        let events = WalletEvents::new();
        let app = spawn_app(state_with(Config::default(), None, &events)).await;
        let http = reqwest::Client::new();

        let stored: Value = http
            .put(format!("{}/api/v1/boxes/{}", app, address("AB")))
            .json(&json!({
                "bets": [{"bettor": address("01"), "outcome": 1, "amount": 2.5}],
                "imageData": "data:image/png;base64,AAAA",
                "lastUpdated": 10,
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stored["data"]["address"], address("ab"));
        assert!(stored["data"].get("imageData").is_none());

        http.put(format!("{}/api/v1/boxes/{}", app, address("cd")))
            .json(&json!({"lastUpdated": 20}))
            .send()
            .await
            .unwrap();

        let listed: Value = http
            .get(format!("{}/api/v1/boxes", app))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let addresses: Vec<&str> = listed["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["address"].as_str().unwrap())
            .collect();
        assert_eq!(addresses, vec![address("cd"), address("ab")]);

        let one = http
            .get(format!("{}/api/v1/boxes/{}", app, address("ab")))
            .send()
            .await
            .unwrap();
        assert_eq!(one.status(), 200);

        http.delete(format!("{}/api/v1/boxes", app))
            .send()
            .await
            .unwrap();
        let missing = http
            .get(format!("{}/api/v1/boxes/{}", app, address("ab")))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn rejects_mismatched_or_invalid_address() {
        let events = WalletEvents::new();
        let app = spawn_app(state_with(Config::default(), None, &events)).await;
        let http = reqwest::Client::new();

        let invalid = http
            .put(format!("{}/api/v1/boxes/not-an-address", app))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(invalid.status(), 400);

        let mismatched = http
            .put(format!("{}/api/v1/boxes/{}", app, address("ab")))
            .json(&json!({"address": address("cd")}))
            .send()
            .await
            .unwrap();
        assert_eq!(mismatched.status(), 400);
    }

    #[tokio::test]
    async fn put_reports_box_that_was_not_kept() {
        let events = WalletEvents::new();
        let config = Config {
            box_cache_max_items: 1,
            ..Config::default()
        };
        let app = spawn_app(state_with(config, None, &events)).await;
        let http = reqwest::Client::new();

        let newer = http
            .put(format!("{}/api/v1/boxes/{}", app, address("ab")))
            .json(&json!({"lastUpdated": 200}))
            .send()
            .await
            .unwrap();
        assert_eq!(newer.status(), 200);

        let older = http
            .put(format!("{}/api/v1/boxes/{}", app, address("cd")))
            .json(&json!({"lastUpdated": 100}))
            .send()
            .await
            .unwrap();
        assert_eq!(older.status(), 409);

        let missing = http
            .get(format!("{}/api/v1/boxes/{}", app, address("cd")))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }
}
