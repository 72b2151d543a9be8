//! Planner and summarizer implementations for birdlens.
//!
//! This crate turns natural-language queries into structured API call plans
//! and retrieved data back into readable answers:
//! - `LlmPlanner` prompts Gemini with the endpoint catalog, ontology, and
//!   conversation history, then parses the structured reply.
//! - `LlmSummarizer` condenses executed step results into a final answer.
//! - `format_history` renders prior turns for the planner prompt.

mod catalog;
mod gemini;
mod history;
mod llm;
mod planner;
mod summarizer;

pub use catalog::{CatalogError, PromptCatalog};
pub use gemini::{GeminiClient, GeminiClientConfig};
pub use history::{format_history, SessionTurn};
pub use llm::{LlmClient, LlmError, LlmRequest, MockLlmClient};
pub use planner::{LlmPlanner, LlmPlannerConfig, PlanError, Planner, PlannerReply};
pub use summarizer::{LlmSummarizer, Summarizer, SummarizerConfig};
