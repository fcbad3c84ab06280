use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::{
    error::{AppError, Result},
    models::{LaunchParams, OperationKind, OperationRequest},
    schema::ValidationError,
};

/// Why a launch could not reach the ready state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoaderError {
    MissingSource,
    InvalidSource { message: String },
    Fetch { message: String },
    InvalidPayload { message: String },
    Validation(ValidationError),
}

impl std::fmt::Display for LoaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoaderError::MissingSource => write!(f, "missing source parameter"),
            LoaderError::InvalidSource { message } => write!(f, "invalid source: {}", message),
            LoaderError::Fetch { message } => write!(f, "fetch failed: {}", message),
            LoaderError::InvalidPayload { message } => write!(f, "invalid payload: {}", message),
            LoaderError::Validation(err) => write!(f, "{}", err),
        }
    }
}

/// `loading -> error | ready`
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderState {
    Loading,
    Error(LoaderError),
    Ready(OperationRequest),
}

impl LoaderState {
    pub fn phase(&self) -> &'static str {
        match self {
            LoaderState::Loading => "loading",
            LoaderState::Error(_) => "error",
            LoaderState::Ready(OperationRequest::Transaction(_)) => "awaiting-transaction",
            LoaderState::Ready(OperationRequest::Signature(_)) => "awaiting-signature",
        }
    }

    pub fn operation(&self) -> Option<&OperationRequest> {
        match self {
            LoaderState::Ready(op) => Some(op),
            _ => None,
        }
    }
}

/// Fetches the caller's operation payload and validates it.
#[derive(Clone)]
pub struct QueryLoader {
    http: reqwest::Client,
}

impl QueryLoader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    pub async fn load(&self, params: &LaunchParams) -> LoaderState {
        let source = match params.source.as_deref() {
            Some(source) => source,
            None => return LoaderState::Error(LoaderError::MissingSource),
        };

        let payload = match self.fetch(source).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!("Operation fetch from {} failed: {}", source, err);
                return LoaderState::Error(err);
            }
        };

        match parse_operation(params.kind, payload) {
            Ok(op) => {
                tracing::info!(
                    "Loaded {} operation from {} (uid={})",
                    params.kind.as_str(),
                    source,
                    params.uid.as_deref().unwrap_or("-")
                );
                LoaderState::Ready(op)
            }
            Err(err) => {
                tracing::warn!("Operation from {} rejected: {}", source, err);
                LoaderState::Error(err)
            }
        }
    }

    async fn fetch(&self, source: &str) -> std::result::Result<Value, LoaderError> {
        let url = parse_http_url(source).map_err(|message| LoaderError::InvalidSource { message })?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| LoaderError::Fetch {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LoaderError::Fetch {
                message: format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| LoaderError::InvalidPayload {
                message: e.to_string(),
            })
    }
}

fn parse_operation(
    kind: OperationKind,
    payload: Value,
) -> std::result::Result<OperationRequest, LoaderError> {
    OperationRequest::parse(kind, payload).map_err(|err| match err {
        AppError::Validation(v) => LoaderError::Validation(v),
        other => LoaderError::InvalidPayload {
            message: other.to_string(),
        },
    })
}

/// Only absolute http(s) URLs are fetched or posted to.
pub fn parse_http_url(raw: &str) -> std::result::Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn transaction_payload() -> Value {
        json!({
            "chainId": 8453,
            "address": format!("0x{}", "11".repeat(20)),
            "abi": ["function foo()"],
            "functionName": "foo",
            "args": [],
        })
    }

    fn signature_payload() -> Value {
        json!({
            "domain": {
                "name": "Witbot",
                "version": "1",
                "chainId": 8453,
                "verifyingContract": format!("0x{}", "22".repeat(20)),
            },
            "primaryType": "Bet",
            "types": {"Bet": [{"name": "amount", "type": "uint256"}]},
            "message": {"amount": "1"},
        })
    }

    fn params(base: &str, path: &str, kind: &str) -> LaunchParams {
        let mut query = HashMap::new();
        query.insert("source".to_string(), format!("{}{}", base, path));
        query.insert("type".to_string(), kind.to_string());
        query.insert("uid".to_string(), "abc".to_string());
        LaunchParams::from_query(&query)
    }

    fn loader() -> QueryLoader {
        QueryLoader::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn transaction_payload_reaches_transaction_ready() {
        let base = serve(Router::new().route("/op", get(|| async { Json(transaction_payload()) })))
            .await;
        let state = loader().load(&params(&base, "/op", "transaction")).await;
        assert_eq!(state.phase(), "awaiting-transaction");
        assert!(matches!(
            state.operation(),
            Some(OperationRequest::Transaction(_))
        ));
    }

    #[tokio::test]
    async fn signature_type_selects_signature_flow() {
        let base = serve(Router::new().route("/op", get(|| async { Json(signature_payload()) })))
            .await;
        let state = loader().load(&params(&base, "/op", "signature")).await;
        assert_eq!(state.phase(), "awaiting-signature");
    }

    #[tokio::test]
    async fn payload_missing_address_is_an_error() {
        let base = serve(Router::new().route(
            "/op",
            get(|| async {
                let mut payload = transaction_payload();
                payload.as_object_mut().unwrap().remove("address");
                Json(payload)
            }),
        ))
        .await;
        let state = loader().load(&params(&base, "/op", "transaction")).await;
        match state {
            LoaderState::Error(LoaderError::Validation(err)) => {
                assert_eq!(err.fields(), vec!["address"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_source_fails_fast() {
        let state = loader().load(&LaunchParams::from_query(&HashMap::new())).await;
        assert_eq!(state, LoaderState::Error(LoaderError::MissingSource));
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let base = serve(Router::new().route(
            "/op",
            get(|| async { (StatusCode::NOT_FOUND, "gone") }),
        ))
        .await;
        let state = loader().load(&params(&base, "/op", "transaction")).await;
        match state {
            LoaderState::Error(LoaderError::Fetch { message }) => assert!(message.contains("404")),
            other => panic!("expected fetch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_invalid_payload() {
        let base = serve(Router::new().route("/op", get(|| async { "not json" }))).await;
        let state = loader().load(&params(&base, "/op", "transaction")).await;
        assert!(matches!(
            state,
            LoaderState::Error(LoaderError::InvalidPayload { .. })
        ));
    }

    #[tokio::test]
    async fn non_http_source_is_rejected_without_fetching() {
        let mut query = HashMap::new();
        query.insert("source".to_string(), "file:///etc/passwd".to_string());
        let state = loader().load(&LaunchParams::from_query(&query)).await;
        assert!(matches!(
            state,
            LoaderState::Error(LoaderError::InvalidSource { .. })
        ));
    }
}
