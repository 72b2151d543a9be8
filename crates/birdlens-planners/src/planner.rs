//! LLM planning: prompt assembly and structured reply parsing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use birdlens_core::StepPlan;

use crate::catalog::PromptCatalog;
use crate::llm::{truncate_for_log, LlmClient, LlmRequest};

const MAX_PROMPT_LOG_CHARS: usize = 4_000;
const MAX_LLM_OUTPUT_LOG_CHARS: usize = 8_000;

const PLANNER_PROMPT_TEMPLATE: &str = r#"
You are an expert AI assistant tasked with exploring Twitter data using a specific set of API tools.
Your goal is to understand the user's request, determine if it's clear and feasible with the available tools, and either ask for clarification or create a step-by-step execution plan for the available API endpoints.

**Available Tools (API Endpoints):**
{endpoints_spec}

**Data Ontology & Synonyms:**
{ontology_spec}

**Conversation History:**
{history}

**Instructions:**
1.  Analyze the **Current User Request** based on the **Conversation History**, **Available Tools**, and **Ontology**. Identify retweets in timelines by checking for the presence of the 'retweeted_tweet' object.
2.  **Check Feasibility & Clarity:** Can the request be fulfilled with the tools? Is it specific enough?
3.  **If Vague or Unfeasible:** Respond with `response_type: CLARIFICATION` and provide a clear `message_to_user` asking for more details or explaining why it cannot be done.
4.  **If Clear and Feasible:** Respond with `response_type: PLAN`. Create a JSON list under the `api_plan` key. Each object in the list represents an API call step:
    * `step`: A sequential number (1, 2, ...).
    * `endpoint`: The exact endpoint URL suffix (e.g., "timeline.php").
    * `params`: A dictionary of required and optional parameters extracted or inferred from the request. Use the **Ontology** to map user terms to API parameter names (e.g., 'user' might map to 'screenname').
    * `reason`: Briefly explain why this step is needed.
    * `max_pages` (Optional): For endpoints that return lists (like timelines, followers, search), specify the number of pages to retrieve. Default to 5 pages if the user doesn't specify, but adjust based on their request (e.g., 'latest 10 tweets' might be 1 page, 'all followers' might need more than 5). Use the fallback default only if calculation is impossible.
    * **Data Dependencies:** How parameters get values from previous steps:
        * **Simple Dependency:** For simple dependencies (referencing a single value from a previous step), use the format `"$step<N>.<output_key>.<nested_key>..."` as the parameter value string. For accessing elements within a list, use numeric indices separated by dots (e.g., `"$step1.timeline.0.tweet_id"` to access the `tweet_id` of the first item in the `timeline` list from step 1). Do NOT use bracket notation like `[0]`. The execution engine will resolve this dot-notation path.
        * **List Dependency (IMPORTANT):** If a parameter needs multiple values extracted from a *list* in a previous step's result (e.g., getting all original author user IDs from retweets in a timeline):
            * Instead of a string value for the parameter, use a JSON object with the following structure:
                ```json
                "param_name_expecting_multiple_values": {
                  "source_step": <N>,
                  "source_list_path": "path.to.the.list.in.stepN.result", // e.g., "timeline"
                  "extract_field": "field.to.extract.from.each.item", // e.g., "retweeted_tweet.author.rest_id"
                  "join_with": ","  // Optional: Specify separator (e.g., comma for screennames.php rest_ids). If omitted, the executor will receive a list. Ensure the correct format is generated for the target API.
                }
                ```
            * **Example for `screennames.php` needing comma-separated `rest_ids` from retweets in a timeline:**
                ```json
                "params": {
                   "rest_ids": {
                      "source_step": 1,
                      "source_list_path": "timeline", // Assumes step 1 result has a 'timeline' list
                      // Use the CORRECT path based on actual API response for retweets:
                      "extract_field": "retweeted_tweet.author.rest_id",
                      "join_with": "," // Join the extracted IDs with a comma
                   }
                }
                ```
5.  **Output Format:** Respond ONLY with a single JSON object containing:
    * `response_type`: "CLARIFICATION", "PLAN", or "ERROR" (for internal planning issues).
    * `message_to_user`: (Optional) A message for the user (required for CLARIFICATION/ERROR, optional for PLAN status updates like "Okay, I will fetch...").
    * `api_plan`: (Required if `response_type` is "PLAN") The list of API call steps as described above.

**Current User Request:**
{user_query}

**Your JSON Response:**
"#;

/// Structured planner reply: either an executable plan or a request for a
/// better query. Serializes to the same wire shape the LLM produces, which
/// is what session history stores.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "response_type")]
pub enum PlannerReply {
    #[serde(rename = "PLAN")]
    Plan {
        #[serde(rename = "message_to_user", skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(rename = "api_plan")]
        steps: Vec<StepPlan>,
    },
    #[serde(rename = "CLARIFICATION")]
    Clarification {
        #[serde(rename = "message_to_user")]
        message: String,
    },
}

/// Planning errors
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("llm error: {0}")]
    Llm(String),
    #[error("invalid planner JSON: {0}")]
    InvalidJson(String),
    #[error("invalid planner response structure: {0}")]
    InvalidStructure(String),
    #[error("planner reported: {0}")]
    Reported(String),
}

impl PlanError {
    /// User-facing phrasing for a failed planning turn. Every variant is
    /// recoverable by rephrasing or retrying.
    pub fn user_message(&self) -> String {
        match self {
            PlanError::Llm(detail) => {
                format!("Sorry, I encountered an error during planning: {}", detail)
            }
            PlanError::InvalidJson(_) => {
                "Sorry, I received an invalid response format from the planning module. \
                 Please try rephrasing."
                    .to_string()
            }
            PlanError::InvalidStructure(detail) => format!(
                "Sorry, there was an issue with the planned response structure: {}",
                detail
            ),
            PlanError::Reported(message) => message.clone(),
        }
    }
}

/// Planner trait
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, user_query: &str, history: &str) -> Result<PlannerReply, PlanError>;
}

/// Planner settings for LLM calls.
#[derive(Debug, Clone)]
pub struct LlmPlannerConfig {
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmPlannerConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro-latest".to_string(),
            temperature: 0.05,
        }
    }
}

/// LLM-based planner
pub struct LlmPlanner<C: LlmClient> {
    client: C,
    catalog: PromptCatalog,
    config: LlmPlannerConfig,
}

impl<C: LlmClient> LlmPlanner<C> {
    pub fn new(client: C, catalog: PromptCatalog, config: LlmPlannerConfig) -> Self {
        Self {
            client,
            catalog,
            config,
        }
    }

    fn build_prompt(&self, user_query: &str, history: &str) -> String {
        PLANNER_PROMPT_TEMPLATE
            .replace("{endpoints_spec}", &self.catalog.endpoints_for_prompt())
            .replace("{ontology_spec}", &self.catalog.ontology_for_prompt())
            .replace("{history}", history)
            .replace("{user_query}", user_query)
    }
}

#[async_trait]
impl<C: LlmClient> Planner for LlmPlanner<C> {
    async fn plan(&self, user_query: &str, history: &str) -> Result<PlannerReply, PlanError> {
        let prompt = self.build_prompt(user_query, history);
        info!(
            model = %self.config.model,
            temperature = self.config.temperature,
            query_len = user_query.len(),
            history_len = history.len(),
            "planner request prepared"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                prompt = %truncate_for_log(&prompt, MAX_PROMPT_LOG_CHARS),
                "planner prompt"
            );
        }

        let request = LlmRequest {
            system: String::new(),
            user: prompt,
            model: self.config.model.clone(),
            temperature: self.config.temperature,
        };
        let output = self
            .client
            .complete(request)
            .await
            .map_err(|e| PlanError::Llm(e.to_string()))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                llm_output = %truncate_for_log(&output, MAX_LLM_OUTPUT_LOG_CHARS),
                "planner raw llm output"
            );
        }

        let reply = parse_reply(&output)?;
        match &reply {
            PlannerReply::Plan { steps, .. } => {
                info!(step_count = steps.len(), "planner produced a plan")
            }
            PlannerReply::Clarification { .. } => {
                info!("planner asked for clarification")
            }
        }
        Ok(reply)
    }
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    response_type: Option<String>,
    #[serde(default)]
    message_to_user: Option<String>,
    #[serde(default)]
    api_plan: Option<Vec<StepPlan>>,
}

/// Parse raw LLM output into a structured reply.
pub(crate) fn parse_reply(raw: &str) -> Result<PlannerReply, PlanError> {
    let cleaned = strip_code_fences(raw);
    let wire: WireReply =
        serde_json::from_str(cleaned).map_err(|e| PlanError::InvalidJson(e.to_string()))?;

    let response_type = wire.response_type.ok_or_else(|| {
        PlanError::InvalidStructure("response missing 'response_type'".to_string())
    })?;

    match response_type.as_str() {
        "PLAN" => {
            let has_message = wire
                .message_to_user
                .as_deref()
                .map(|m| !m.is_empty())
                .unwrap_or(false);
            if wire.api_plan.is_none() && !has_message {
                return Err(PlanError::InvalidStructure(
                    "PLAN response missing 'api_plan' and explanation message".to_string(),
                ));
            }
            Ok(PlannerReply::Plan {
                message: wire.message_to_user,
                steps: wire.api_plan.unwrap_or_default(),
            })
        }
        "CLARIFICATION" => {
            let message = wire
                .message_to_user
                .filter(|m| !m.is_empty())
                .ok_or_else(|| {
                    PlanError::InvalidStructure(
                        "CLARIFICATION response missing 'message_to_user'".to_string(),
                    )
                })?;
            Ok(PlannerReply::Clarification { message })
        }
        "ERROR" => {
            let message = wire
                .message_to_user
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "The planner reported an internal error.".to_string());
            Err(PlanError::Reported(message))
        }
        other => Err(PlanError::InvalidStructure(format!(
            "unexpected response_type '{}'",
            other
        ))),
    }
}

/// Strip a leading ```json fence and trailing ``` fence, if present.
fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use birdlens_core::ParamValue;
    use serde_json::json;

    #[test]
    fn test_parse_plan_reply() {
        let raw = r#"{
            "response_type": "PLAN",
            "message_to_user": "Okay, fetching the timeline.",
            "api_plan": [
                {
                    "step": 1,
                    "endpoint": "timeline.php",
                    "params": {"screenname": "elonmusk"},
                    "reason": "Fetch recent tweets",
                    "max_pages": 2
                }
            ]
        }"#;

        match parse_reply(raw) {
            Ok(PlannerReply::Plan { message, steps }) => {
                assert_eq!(message.as_deref(), Some("Okay, fetching the timeline."));
                assert_eq!(steps.len(), 1);
                assert_eq!(steps[0].endpoint, "timeline.php");
                assert_eq!(steps[0].max_pages, Some(2));
                assert_eq!(
                    steps[0].params.get("screenname"),
                    Some(&ParamValue::literal(json!("elonmusk")))
                );
            }
            other => panic!("expected plan reply, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_reply_strips_json_fences() {
        let raw = "```json\n{\"response_type\": \"CLARIFICATION\", \"message_to_user\": \"Which account?\"}\n```";
        match parse_reply(raw) {
            Ok(PlannerReply::Clarification { message }) => {
                assert_eq!(message, "Which account?");
            }
            other => panic!("expected clarification, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_reply_untagged_fence_is_invalid_json() {
        let raw = "```\n{\"response_type\": \"PLAN\", \"api_plan\": []}\n```";
        assert!(matches!(parse_reply(raw), Err(PlanError::InvalidJson(_))));
    }

    #[test]
    fn test_parse_reply_missing_response_type() {
        let result = parse_reply(r#"{"api_plan": []}"#);
        assert!(matches!(result, Err(PlanError::InvalidStructure(_))));
    }

    #[test]
    fn test_parse_plan_without_steps_or_message() {
        let result = parse_reply(r#"{"response_type": "PLAN"}"#);
        assert!(matches!(result, Err(PlanError::InvalidStructure(_))));
    }

    #[test]
    fn test_parse_plan_message_only_defaults_to_empty_steps() {
        let raw = r#"{"response_type": "PLAN", "message_to_user": "Nothing to fetch."}"#;
        match parse_reply(raw) {
            Ok(PlannerReply::Plan { message, steps }) => {
                assert_eq!(message.as_deref(), Some("Nothing to fetch."));
                assert!(steps.is_empty());
            }
            other => panic!("expected plan reply, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_clarification_requires_message() {
        let result = parse_reply(r#"{"response_type": "CLARIFICATION"}"#);
        assert!(matches!(result, Err(PlanError::InvalidStructure(_))));
    }

    #[test]
    fn test_parse_error_reply_is_reported() {
        let raw = r#"{"response_type": "ERROR", "message_to_user": "Planning was blocked."}"#;
        match parse_reply(raw) {
            Err(PlanError::Reported(message)) => {
                assert_eq!(message, "Planning was blocked.");
            }
            other => panic!("expected reported error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unexpected_response_type() {
        let result = parse_reply(r#"{"response_type": "CHAOS"}"#);
        match result {
            Err(PlanError::InvalidStructure(detail)) => assert!(detail.contains("CHAOS")),
            other => panic!("expected structure error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_has_retryable_user_message() {
        let error = parse_reply("the dog ate my JSON").unwrap_err();
        assert!(error.user_message().contains("try rephrasing"));
    }

    #[test]
    fn test_build_prompt_embeds_all_sections() {
        let catalog = PromptCatalog::new("[ENDPOINTS-MARKER]", "[ONTOLOGY-MARKER]");
        let planner = LlmPlanner::new(
            MockLlmClient {
                response: String::new(),
            },
            catalog,
            LlmPlannerConfig::default(),
        );

        let prompt = planner.build_prompt("who retweeted jack?", "## Turn 1\nUser: hi\n");
        assert!(prompt.contains("[ENDPOINTS-MARKER]"));
        assert!(prompt.contains("[ONTOLOGY-MARKER]"));
        assert!(prompt.contains("## Turn 1\nUser: hi\n"));
        assert!(prompt.contains("who retweeted jack?"));
        assert!(prompt.contains("**Your JSON Response:**"));
    }

    #[test]
    fn test_plan_roundtrip_through_mock_client() {
        tokio_test::block_on(async {
            let planner = LlmPlanner::new(
                MockLlmClient {
                    response: r#"```json
{"response_type": "PLAN", "api_plan": [{"step": 1, "endpoint": "screenname.php", "params": {"screenname": "jack"}, "reason": "Look up the user"}]}
```"#
                        .to_string(),
                },
                PromptCatalog::default(),
                LlmPlannerConfig::default(),
            );

            match planner.plan("who is jack?", "No history yet.").await {
                Ok(PlannerReply::Plan { steps, .. }) => {
                    assert_eq!(steps.len(), 1);
                    assert_eq!(steps[0].endpoint, "screenname.php");
                }
                other => panic!("expected plan reply, got {:?}", other),
            }
        });
    }

    #[test]
    fn test_plan_reply_serializes_to_wire_shape() {
        let reply = PlannerReply::Plan {
            message: Some("On it.".to_string()),
            steps: vec![],
        };
        let wire = serde_json::to_value(&reply).expect("serialize");
        assert_eq!(wire["response_type"], "PLAN");
        assert_eq!(wire["message_to_user"], "On it.");
        assert_eq!(wire["api_plan"], json!([]));
    }
}
