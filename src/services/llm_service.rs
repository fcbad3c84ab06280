use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::{
    config::Config,
    error::{AppError, Result},
};

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Value>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_url: Url,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let api_url = Url::parse(api_url)
            .map_err(|e| AppError::Internal(format!("Invalid LLM API URL: {}", e)))?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("LLM HTTP client init failed: {}", e)))?;
        Ok(Self {
            http,
            api_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
            max_tokens,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.llm_api_url,
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            config.llm_max_tokens,
            Duration::from_secs(config.llm_timeout_secs),
        )
    }

    /// Sends `prompt` as a single user message.
    ///
    /// # Returns
    /// * `Ok(choices)` with the upstream `choices` array untouched.
    /// * `Err(AppError::ExternalAPI)` on transport failure, non-2xx status or
    ///   an unparseable body.
    pub async fn generate(&self, prompt: &str) -> Result<Vec<Value>> {
        let body = CompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        };

        let mut request = self.http.post(self.api_url.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.trim());
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::ExternalAPI(format!("LLM request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalAPI(format!(
                "LLM API returned {}: {}",
                status,
                text.chars().take(300).collect::<String>()
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalAPI(format!("LLM response parse failed: {}", e)))?;
        tracing::debug!("LLM returned {} choice(s)", parsed.choices.len());
        Ok(parsed.choices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    fn client(url: &str, key: Option<&str>) -> LlmClient {
        LlmClient::new(
            url,
            key.map(str::to_string),
            "gpt-4o-mini".to_string(),
            64,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn forwards_prompt_and_returns_choices() {
        let url = serve(Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(
                    headers.get("authorization").unwrap().to_str().unwrap(),
                    "Bearer sk-test"
                );
                assert_eq!(body["model"], "gpt-4o-mini");
                assert_eq!(body["max_tokens"], 64);
                assert_eq!(body["messages"][0]["role"], "user");
                let content = body["messages"][0]["content"].as_str().unwrap().to_string();
                Json(json!({"choices": [{"message": {"content": format!("echo: {}", content)}}]}))
            }),
        ))
        .await;

        let choices = client(&url, Some("sk-test")).generate("hello").await.unwrap();
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0]["message"]["content"], "echo: hello");
    }

    #[tokio::test]
    async fn upstream_error_is_external_api_error() {
        let url = serve(Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        ))
        .await;

        let err = client(&url, None).generate("hello").await.unwrap_err();
        assert!(matches!(err, AppError::ExternalAPI(msg) if msg.contains("401")));
    }

    #[test]
    fn rejects_invalid_api_url() {
        let err = LlmClient::new("::nope", None, "m".to_string(), 1, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
