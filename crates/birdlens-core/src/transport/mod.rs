//! Transport/retry layer
//!
//! One HTTP GET per page against `<base_url>/<endpoint>`, with the RapidAPI
//! identification headers and a bounded timeout. Outcome classification is
//! split from the fetch loop: [`RetryPolicy`] is a pure decision table over
//! (error, retry count), and all waiting goes through the [`Sleeper`] trait
//! so tests can run the loop without real time passing.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Consecutive 429 retries allowed before a step fails as rate limited.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 4;
/// Retries allowed for 5xx responses before they become fatal.
pub const MAX_SERVER_ERROR_RETRIES: u32 = 2;

const MAX_BODY_SNIPPET_CHARS: usize = 500;

/// Transport-level failure for one page fetch.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Non-success HTTP status, body attached for diagnosis.
    #[error("HTTP Error {status}: {body}")]
    Status { status: u16, body: String },
    /// Connection failure or timeout.
    #[error("Request failed: {0}")]
    Network(String),
    /// Response body that did not parse as JSON; carries a truncated snippet.
    #[error("Invalid JSON response from API: {reason}. Response text: {snippet}")]
    MalformedBody { reason: String, snippet: String },
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Fetches one decoded page from the remote API.
///
/// The engine only ever talks to this trait, never to a concrete HTTP
/// client, so tests drive it with scripted fakes.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn get_page(
        &self,
        endpoint: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, TransportError>;
}

#[async_trait]
impl ApiTransport for std::sync::Arc<dyn ApiTransport> {
    async fn get_page(
        &self,
        endpoint: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        (**self).get_page(endpoint, params).await
    }
}

/// Async sleep seam. Production uses [`TokioSleeper`]; tests substitute a
/// recorder so backoff sequences are observable without waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// What to do about one failed page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then re-issue the same page request.
    RetryAfter(Duration),
    /// Give up on the step.
    Fail {
        message: String,
        status_code: Option<u16>,
    },
}

/// Retry classification for transport failures.
///
/// 429 backs off exponentially (1s, 2s, 4s, 8s) and fails once the retry
/// budget is spent, without a final wait. 5xx waits linearly for a couple of
/// attempts. Everything else is fatal on first sight.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_rate_limit_retries: u32,
    pub max_server_error_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: MAX_RATE_LIMIT_RETRIES,
            max_server_error_retries: MAX_SERVER_ERROR_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Classify one failure given how many retries this page has already
    /// consumed. Pure function, no waiting happens here.
    pub fn decide(&self, error: &TransportError, retry_count: u32) -> RetryDecision {
        match error {
            TransportError::Status { status: 429, .. } => {
                if retry_count >= self.max_rate_limit_retries {
                    RetryDecision::Fail {
                        message: "Rate limit exceeded after multiple retries.".to_string(),
                        status_code: Some(429),
                    }
                } else {
                    RetryDecision::RetryAfter(Duration::from_secs(1u64 << retry_count))
                }
            }
            TransportError::Status { status, .. }
                if *status >= 500 && retry_count < self.max_server_error_retries =>
            {
                RetryDecision::RetryAfter(Duration::from_secs(u64::from(retry_count) + 1))
            }
            TransportError::Status { status, .. } => RetryDecision::Fail {
                message: error.to_string(),
                status_code: Some(*status),
            },
            other => RetryDecision::Fail {
                message: other.to_string(),
                status_code: None,
            },
        }
    }
}

/// RapidAPI client configuration.
#[derive(Debug, Clone)]
pub struct RapidApiConfig {
    /// API key sent in the `X-RapidAPI-Key` header.
    pub api_key: String,
    /// Host identifier sent in the `X-RapidAPI-Host` header.
    pub host: String,
    /// Base endpoint URL.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RapidApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            host: "twitter-api45.p.rapidapi.com".to_string(),
            base_url: "https://twitter-api45.p.rapidapi.com".to_string(),
            timeout_secs: 45,
        }
    }
}

/// HTTP transport against the RapidAPI Twitter gateway.
pub struct RapidApiClient {
    client: reqwest::Client,
    config: RapidApiConfig,
}

impl RapidApiClient {
    pub fn new(config: RapidApiConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ApiTransport for RapidApiClient {
    async fn get_page(
        &self,
        endpoint: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, TransportError> {
        let url = self.build_url(endpoint);
        tracing::debug!(url = %url, param_count = params.len(), "requesting page");

        let response = self
            .client
            .get(&url)
            .header("X-RapidAPI-Key", &self.config.api_key)
            .header("X-RapidAPI-Host", &self.config.host)
            .query(&query_pairs(params))
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| TransportError::MalformedBody {
            reason: e.to_string(),
            snippet: truncate_body(&body),
        })
    }
}

/// Flatten resolved parameters into query pairs. Sequence values fan out
/// into one repeated pair per element; nulls are dropped.
fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), scalar_text(item)));
                }
            }
            other => pairs.push((key.clone(), scalar_text(other))),
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_BODY_SNIPPET_CHARS).collect()
}
