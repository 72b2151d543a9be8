//! Conversation history rendering for the planner prompt.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One completed exchange: the user's query, the structured planner reply,
/// and the summary shown to the user (when the turn produced one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTurn {
    pub user_query: String,
    pub assistant_reply: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl SessionTurn {
    pub fn new(user_query: impl Into<String>, assistant_reply: Value) -> Self {
        Self {
            user_query: user_query.into(),
            assistant_reply,
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// Render turns as `## Turn N` blocks for the prompt, newest last.
///
/// Turns are scanned newest-first against the character budget so the most
/// recent context survives truncation. The sole turn is never dropped, even
/// when it exceeds the budget on its own.
pub fn format_history(turns: &[SessionTurn], char_budget: usize) -> String {
    if turns.is_empty() {
        return "No history yet.".to_string();
    }

    let mut kept: Vec<String> = Vec::new();
    let mut used_chars = 0usize;
    let turn_count = turns.len();

    for (i, turn) in turns.iter().rev().enumerate() {
        let mut block = format!("## Turn {}\n", turn_count - i);
        block.push_str(&format!("User: {}\n", turn.user_query));
        block.push_str(&format!(
            "Assistant Response: {}\n",
            serde_json::to_string(&turn.assistant_reply).unwrap_or_default()
        ));
        match &turn.summary {
            Some(summary) if !summary.is_empty() => {
                block.push_str(&format!("Assistant Summary: {}\n\n", summary));
            }
            _ => block.push('\n'),
        }

        let block_chars = block.chars().count();
        if used_chars + block_chars > char_budget && !kept.is_empty() {
            tracing::debug!(
                dropped_turns = turn_count - kept.len(),
                "history truncated to fit prompt budget"
            );
            break;
        }

        kept.insert(0, block);
        used_chars += block_chars;
    }

    kept.concat()
}
