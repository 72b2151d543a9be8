//! Post-execution narrowing for reply-focused questions.
//!
//! Timeline endpoints return everything an account posted; when the user
//! asked specifically for replies, the summarizer gets a much better prompt
//! if the first step's timeline is narrowed to actual reply tweets first.

use serde_json::{json, Value};

use birdlens_core::StepResult;

/// Heuristic over the user's phrasing: the question asks for replies a
/// particular account made.
fn wants_reply_filter(query: &str) -> bool {
    let lowered = query.to_lowercase();
    lowered.contains("replies") && (lowered.contains("made by") || lowered.contains("from"))
}

/// Narrow the first step's `timeline` list to items that are replies.
/// Returns `None` when the query does not ask for replies or the first
/// result carries no timeline list; later steps pass through unchanged.
pub(crate) fn apply_reply_filter(query: &str, results: &[StepResult]) -> Option<Vec<StepResult>> {
    if !wants_reply_filter(query) {
        return None;
    }
    let first = results.first()?;
    let Some(timeline) = first
        .data()
        .and_then(|d| d.get("timeline"))
        .and_then(Value::as_array)
    else {
        tracing::warn!(
            endpoint = %first.endpoint,
            "no timeline list in first step result, skipping reply filter"
        );
        return None;
    };

    let replies: Vec<Value> = timeline.iter().filter(|item| is_reply(item)).cloned().collect();
    tracing::info!(
        total = timeline.len(),
        replies = replies.len(),
        "narrowed timeline to reply tweets"
    );

    let mut narrowed = first.clone();
    narrowed.data = Some(json!({ "timeline": replies }));

    let mut filtered = Vec::with_capacity(results.len());
    filtered.push(narrowed);
    filtered.extend(results.iter().skip(1).cloned());
    Some(filtered)
}

fn is_reply(item: &Value) -> bool {
    match item.get("in_reply_to_status_id_str") {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::Bool(b)) => *b,
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn timeline_result(items: Value) -> StepResult {
        StepResult::success(
            "timeline.php",
            1,
            Map::new(),
            "fetch tweets",
            json!({ "timeline": items }),
        )
    }

    #[test]
    fn test_trigger_requires_reply_phrasing() {
        let results = vec![timeline_result(json!([{ "tweet_id": "1" }]))];
        assert!(apply_reply_filter("show tweets from @x", &results).is_none());
        assert!(apply_reply_filter("show replies to tweet 5", &results).is_none());
        assert!(apply_reply_filter("show replies made by @x", &results).is_some());
        assert!(apply_reply_filter("list the replies from @x", &results).is_some());
    }

    #[test]
    fn test_keeps_only_reply_items() {
        let results = vec![timeline_result(json!([
            { "tweet_id": "1", "in_reply_to_status_id_str": "9" },
            { "tweet_id": "2" },
            { "tweet_id": "3", "in_reply_to_status_id_str": null },
            { "tweet_id": "4", "in_reply_to_status_id_str": "" },
            { "tweet_id": "5", "in_reply_to_status_id_str": "12" }
        ]))];

        let filtered = apply_reply_filter("replies from @x", &results).expect("filter applies");
        let timeline = filtered[0]
            .data()
            .and_then(|d| d.get("timeline"))
            .and_then(Value::as_array)
            .expect("timeline");
        let ids: Vec<&str> = timeline
            .iter()
            .filter_map(|t| t.get("tweet_id").and_then(Value::as_str))
            .collect();
        assert_eq!(ids, vec!["1", "5"]);
    }

    #[test]
    fn test_no_matching_replies_leaves_empty_timeline() {
        let results = vec![timeline_result(json!([{ "tweet_id": "2" }]))];
        let filtered = apply_reply_filter("replies from @x", &results).expect("filter applies");
        assert_eq!(
            filtered[0].data(),
            Some(&json!({ "timeline": [] }))
        );
    }

    #[test]
    fn test_missing_timeline_passes_through() {
        let results = vec![StepResult::success(
            "screenname.php",
            1,
            Map::new(),
            "profile lookup",
            json!({ "screen_name": "jack" }),
        )];
        assert!(apply_reply_filter("replies from @x", &results).is_none());
    }

    #[test]
    fn test_later_steps_pass_through_unchanged() {
        let second = StepResult::success(
            "screenname.php",
            2,
            Map::new(),
            "profile lookup",
            json!({ "screen_name": "jack" }),
        );
        let results = vec![
            timeline_result(json!([{ "tweet_id": "1", "in_reply_to_status_id_str": "9" }])),
            second.clone(),
        ];

        let filtered = apply_reply_filter("replies from @x", &results).expect("filter applies");
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[1], second);
    }
}
