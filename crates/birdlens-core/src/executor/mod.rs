//! Step executor
//!
//! The executor drives one plan step end to end:
//! - resolve parameter dependencies against prior step results
//! - fetch pages until the cursor runs out or the page budget is spent
//! - retry transient failures on the same page per the retry policy
//! - normalize accumulated pages into one canonical result record
//!
//! Nothing escapes as a Rust error: every outcome is a [`StepResult`], with
//! `error` set and no data on failure, so the plan runner can treat results
//! uniformly.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::normalizer::{extract_page_items, merge_pages};
use crate::resolver::resolve_params;
use crate::transport::{ApiTransport, RetryDecision, RetryPolicy, Sleeper, TokioSleeper};
use crate::types::{StepPlan, StepResult};

/// Page budget for steps that do not declare their own.
pub const DEFAULT_MAX_PAGES: u32 = 3;
/// Politeness delay between successful page fetches.
pub const PAGE_THROTTLE: Duration = Duration::from_millis(500);

/// Executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Applied when a step carries no `max_pages`.
    pub default_max_pages: u32,
    /// Delay between successive successful page fetches. Not applied before
    /// the first fetch or after the terminal page.
    pub page_throttle: Duration,
    /// Retry classification for transport failures.
    pub retry_policy: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_max_pages: DEFAULT_MAX_PAGES,
            page_throttle: PAGE_THROTTLE,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Executes one plan step at a time against an injected transport.
pub struct StepExecutor<T, S = TokioSleeper> {
    transport: T,
    sleeper: S,
    config: ExecutorConfig,
}

struct StepFailure {
    message: String,
    status_code: Option<u16>,
}

struct PageLoopOutcome {
    accumulated: Vec<Value>,
    data_key: Option<String>,
    last_page: Option<Value>,
}

impl<T: ApiTransport> StepExecutor<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            sleeper: TokioSleeper,
            config: ExecutorConfig::default(),
        }
    }
}

impl<T: ApiTransport, S: Sleeper> StepExecutor<T, S> {
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Swap the sleep implementation, e.g. for tests that must not wait.
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> StepExecutor<T, S2> {
        StepExecutor {
            transport: self.transport,
            sleeper,
            config: self.config,
        }
    }

    /// Execute one step, reading prior results only for dependency
    /// resolution. Always returns a record, never an error.
    pub async fn execute_step(&self, plan: &StepPlan, previous: &[StepResult]) -> StepResult {
        tracing::info!(
            endpoint = %plan.endpoint,
            step = plan.step,
            reason = %plan.reason,
            "step execution started"
        );

        if plan.endpoint.is_empty() {
            return StepResult::failure(plan.endpoint.as_str(), "Missing endpoint in plan step.");
        }

        let resolved = match resolve_params(plan, previous) {
            Ok(resolved) => resolved,
            Err(error) => {
                tracing::error!(
                    endpoint = %plan.endpoint,
                    error = %error,
                    "parameter resolution failed"
                );
                return StepResult::failure(
                    plan.endpoint.as_str(),
                    format!("Failed to resolve parameter: {}", error),
                );
            }
        };

        let outcome = match self.fetch_pages(plan, &resolved).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                let mut result = StepResult::failure(plan.endpoint.as_str(), failure.message);
                if let Some(code) = failure.status_code {
                    result = result.with_status_code(code);
                }
                return result;
            }
        };

        let merged = merge_pages(
            outcome.accumulated,
            outcome.data_key.as_deref(),
            outcome.last_page.as_ref(),
        );

        // The upstream API sometimes tunnels an error mapping through a 200.
        if let Some(error_value) = merged.get("error") {
            let message = match error_value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            tracing::warn!(
                endpoint = %plan.endpoint,
                error = %message,
                "response body carried an error key"
            );
            return StepResult::failure(plan.endpoint.as_str(), message).with_step_info(
                plan.step,
                resolved,
                plan.reason.as_str(),
            );
        }

        tracing::info!(
            endpoint = %plan.endpoint,
            step = plan.step,
            "step execution completed"
        );
        StepResult::success(
            plan.endpoint.as_str(),
            plan.step,
            resolved,
            plan.reason.as_str(),
            merged,
        )
    }

    async fn fetch_pages(
        &self,
        plan: &StepPlan,
        resolved: &Map<String, Value>,
    ) -> Result<PageLoopOutcome, StepFailure> {
        let max_pages = plan.max_pages.unwrap_or(self.config.default_max_pages);
        let mut current_page: u32 = 0;
        let mut next_cursor: Option<String> = None;
        let mut retry_count: u32 = 0;
        let mut accumulated: Vec<Value> = Vec::new();
        let mut data_key: Option<String> = None;
        let mut last_page: Option<Value> = None;

        while current_page < max_pages {
            let mut request_params = resolved.clone();
            if let Some(cursor) = &next_cursor {
                request_params.insert("cursor".to_string(), Value::String(cursor.clone()));
            }
            tracing::debug!(
                endpoint = %plan.endpoint,
                page = current_page + 1,
                cursor = ?next_cursor,
                "fetching page"
            );

            let page = match self.transport.get_page(&plan.endpoint, &request_params).await {
                Ok(page) => page,
                Err(error) => match self.config.retry_policy.decide(&error, retry_count) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::warn!(
                            endpoint = %plan.endpoint,
                            page = current_page + 1,
                            retry = retry_count + 1,
                            delay_secs = delay.as_secs(),
                            error = %error,
                            "transient failure, backing off"
                        );
                        self.sleeper.sleep(delay).await;
                        retry_count += 1;
                        continue;
                    }
                    RetryDecision::Fail {
                        message,
                        status_code,
                    } => {
                        tracing::error!(
                            endpoint = %plan.endpoint,
                            page = current_page + 1,
                            error = %message,
                            "page fetch failed"
                        );
                        return Err(StepFailure {
                            message,
                            status_code,
                        });
                    }
                },
            };

            let extraction = extract_page_items(
                &page,
                current_page as usize,
                plan.data_key.as_deref(),
                data_key.as_deref(),
            );
            data_key = extraction.data_key;
            accumulated.extend(extraction.items);

            current_page += 1;
            next_cursor = extract_cursor(&page);
            last_page = Some(page);
            retry_count = 0;

            if next_cursor.is_none() || current_page >= max_pages {
                tracing::debug!(
                    endpoint = %plan.endpoint,
                    pages = current_page,
                    has_next_cursor = next_cursor.is_some(),
                    "finished fetching"
                );
                break;
            }

            self.sleeper.sleep(self.config.page_throttle).await;
        }

        Ok(PageLoopOutcome {
            accumulated,
            data_key,
            last_page,
        })
    }
}

/// Pull the continuation cursor from a page. A truthy `next_cursor` wins;
/// otherwise a string-typed `cursor` field; otherwise pagination stops.
fn extract_cursor(page: &Value) -> Option<String> {
    let map = page.as_object()?;
    if let Some(value) = map.get("next_cursor") {
        if let Some(text) = truthy_cursor_text(value) {
            return Some(text);
        }
    }
    match map.get("cursor") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn truthy_cursor_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64().map(|f| f != 0.0).unwrap_or(true) => Some(n.to_string()),
        _ => None,
    }
}
