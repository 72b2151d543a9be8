//! Result summarization via the LLM.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use birdlens_core::StepResult;

use crate::llm::{truncate_for_log, LlmClient, LlmRequest};

const MAX_STEP_DATA_CHARS: usize = 50_000;
const MAX_PROMPT_LOG_CHARS: usize = 4_000;

const SUMMARIZER_PROMPT_TEMPLATE: &str = r#"
You are an AI assistant summarizing Twitter data retrieved via API calls.
The user asked the following question:
"{original_query}"

The following data was retrieved in sequence according to the plan:
{retrieved_data_summary}

Summarize the key findings from the retrieved data concisely and directly answer the user's original question. Focus on the most relevant information. Do not just list the data structures.
If the data indicates an error or that something wasn't found, reflect that in the summary.
"#;

/// Summarizer trait. Always produces user-facing text; LLM failures are
/// folded into an apologetic message rather than propagated.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, original_query: &str, results: &[StepResult]) -> String;
}

/// Summarizer settings for LLM calls.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub model: String,
    pub temperature: f32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro-latest".to_string(),
            temperature: 0.05,
        }
    }
}

/// LLM-based summarizer
pub struct LlmSummarizer<C: LlmClient> {
    client: C,
    config: SummarizerConfig,
}

impl<C: LlmClient> LlmSummarizer<C> {
    pub fn new(client: C, config: SummarizerConfig) -> Self {
        Self { client, config }
    }
}

/// Render step results as `--- Step N Result ---` blocks of pretty JSON,
/// each bounded so one bloated step cannot swallow the whole prompt.
fn build_data_summary(results: &[StepResult]) -> String {
    if results.is_empty() {
        return "No data was retrieved or provided for summarization.".to_string();
    }

    let mut summary = String::new();
    for (i, result) in results.iter().enumerate() {
        let step_num = result.step_executed.unwrap_or(i as u32 + 1);
        let endpoint = if result.endpoint.is_empty() {
            "N/A"
        } else {
            result.endpoint.as_str()
        };

        let payload = match result.data() {
            Some(data) => data.clone(),
            None => Value::String("No data or error for this step".to_string()),
        };
        let mut step_data =
            serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
        if step_data.chars().count() > MAX_STEP_DATA_CHARS {
            step_data = step_data.chars().take(MAX_STEP_DATA_CHARS).collect();
            step_data.push_str("\n... (truncated)");
        }

        summary.push_str(&format!(
            "--- Step {} Result (Endpoint: {}) ---\n",
            step_num, endpoint
        ));
        summary.push_str(&step_data);
        summary.push_str("\n\n");
    }
    summary
}

#[async_trait]
impl<C: LlmClient> Summarizer for LlmSummarizer<C> {
    async fn summarize(&self, original_query: &str, results: &[StepResult]) -> String {
        let data_summary = build_data_summary(results);
        let prompt = SUMMARIZER_PROMPT_TEMPLATE
            .replace("{original_query}", original_query)
            .replace("{retrieved_data_summary}", &data_summary);

        info!(
            model = %self.config.model,
            result_count = results.len(),
            "summarizer request prepared"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                prompt = %truncate_for_log(&prompt, MAX_PROMPT_LOG_CHARS),
                "summarizer prompt"
            );
        }

        let request = LlmRequest {
            system: String::new(),
            user: prompt,
            model: self.config.model.clone(),
            temperature: self.config.temperature,
        };
        match self.client.complete(request).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "summarization failed");
                format!(
                    "Sorry, I encountered an error while summarizing the results: {}",
                    e
                )
            }
        }
    }
}
