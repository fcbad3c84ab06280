use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::CallbackPayload,
    schema::ValidationError,
    services::query_loader::parse_http_url,
    utils::now_millis,
};

/// Bounded exponential backoff between delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.callback_max_attempts.max(1),
            base_delay: Duration::from_millis(config.callback_backoff_base_ms),
            max_delay: Duration::from_millis(config.callback_backoff_max_ms),
        }
    }

    /// Delay before the attempt following failed attempt number `failures` (1-based).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let candidate = self.base_delay.saturating_mul(1_u32 << exponent);
        candidate.clamp(self.base_delay, self.max_delay.max(self.base_delay))
    }
}

/// Why a callback was not delivered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchError {
    /// The payload did not match its schema; nothing was sent.
    Invalid(ValidationError),
    /// The callback URL is not an absolute http(s) URL.
    BadUrl { url: String, message: String },
    /// The receiver answered with a non-retryable status.
    Rejected { status: u16, body: String },
    /// Retries ran out on transport errors or retryable statuses.
    Exhausted { attempts: u32, last_error: String },
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Invalid(err) => write!(f, "{}", err),
            DispatchError::BadUrl { url, message } => {
                write!(f, "invalid callback url {}: {}", url, message)
            }
            DispatchError::Rejected { status, body } => {
                write!(f, "callback rejected with HTTP {}: {}", status, body)
            }
            DispatchError::Exhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "callback failed after {} attempt(s): {}",
                attempts, last_error
            ),
        }
    }
}

/// Receives every delivery failure. Implemented for plain closures.
pub trait ErrorSink: Send + Sync {
    fn report(&self, label: &str, error: &DispatchError);
}

impl<F> ErrorSink for F
where
    F: Fn(&str, &DispatchError) + Send + Sync,
{
    fn report(&self, label: &str, error: &DispatchError) {
        self(label, error)
    }
}

/// Sink that only logs.
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, label: &str, error: &DispatchError) {
        tracing::warn!("Undelivered {} callback: {}", label, error);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub uid: String,
    pub url: String,
    pub label: String,
    pub body: serde_json::Value,
    pub error: DispatchError,
    pub failed_at: i64,
}

/// Most recent undeliverable callbacks, oldest evicted first.
pub struct DeadLetterQueue {
    capacity: usize,
    entries: Mutex<VecDeque<DeadLetter>>,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn push(&self, letter: DeadLetter) {
        if self.capacity == 0 {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            while entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(letter);
        }
    }

    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub attempts: u32,
    pub status: u16,
}

enum AttemptError {
    Retryable(String),
    Permanent { status: u16, body: String },
}

/// Posts callback payloads to the caller's webhook.
pub struct CallbackDispatcher {
    http: reqwest::Client,
    policy: RetryPolicy,
    dead_letters: DeadLetterQueue,
}

impl CallbackDispatcher {
    pub fn new(policy: RetryPolicy, timeout: Duration, dead_letter_capacity: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            policy,
            dead_letters: DeadLetterQueue::new(dead_letter_capacity),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            RetryPolicy::from_config(config),
            Duration::from_secs(config.callback_timeout_secs),
            config.dead_letter_capacity,
        )
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.snapshot()
    }

    /// Validates `payload`, then POSTs `{...payload, uid, <kind>: true}` to
    /// `url`. Failures go to `sink` and the dead-letter queue.
    pub async fn dispatch(
        &self,
        uid: &str,
        url: &str,
        payload: &CallbackPayload,
        sink: &dyn ErrorSink,
    ) -> std::result::Result<Delivery, DispatchError> {
        let label = payload.label();
        let result = self.deliver(uid, url, payload).await;

        match &result {
            Ok(delivery) => tracing::info!(
                "Delivered {} callback for uid={} (status={}, attempts={})",
                label,
                uid,
                delivery.status,
                delivery.attempts
            ),
            Err(err) => {
                tracing::warn!("Failed {} callback for uid={}: {}", label, uid, err);
                sink.report(label, err);
                self.dead_letters.push(DeadLetter {
                    uid: uid.to_string(),
                    url: url.to_string(),
                    label: label.to_string(),
                    body: payload.body(),
                    error: err.clone(),
                    failed_at: now_millis(),
                });
            }
        }
        result
    }

    async fn deliver(
        &self,
        uid: &str,
        url: &str,
        payload: &CallbackPayload,
    ) -> std::result::Result<Delivery, DispatchError> {
        payload
            .schema()
            .validate(&payload.body())
            .map_err(DispatchError::Invalid)?;
        let target = parse_http_url(url).map_err(|message| DispatchError::BadUrl {
            url: url.to_string(),
            message,
        })?;
        let envelope = payload.envelope(uid);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(target.clone(), &envelope).await {
                Ok(status) => {
                    return Ok(Delivery {
                        attempts: attempt,
                        status,
                    })
                }
                Err(AttemptError::Permanent { status, body }) => {
                    return Err(DispatchError::Rejected { status, body })
                }
                Err(AttemptError::Retryable(last_error)) => {
                    if attempt >= self.policy.max_attempts {
                        return Err(DispatchError::Exhausted {
                            attempts: attempt,
                            last_error,
                        });
                    }
                    let delay = self.policy.backoff(attempt);
                    tracing::debug!(
                        "Callback attempt {} to {} failed: {} (retry in {:?})",
                        attempt,
                        target,
                        last_error,
                        delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        url: url::Url,
        envelope: &crate::models::CallbackEnvelope,
    ) -> std::result::Result<u16, AttemptError> {
        let response = self
            .http
            .post(url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }
        let body: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(AttemptError::Retryable(format!("HTTP {}: {}", status, body)))
        } else {
            Err(AttemptError::Permanent {
                status: status.as_u16(),
                body,
            })
        }
    }
}
