//! Result normalizer
//!
//! Two responsibilities, both pure:
//! - per page, extract the "list of items" from a decoded response body
//! - at the end of a step, merge every page's items into one canonical
//!   structure that looks the same no matter how many pages were fetched
//!
//! Responses from the upstream API are heterogeneous: some endpoints return
//! a bare JSON array, most wrap the interesting list under an
//! endpoint-specific key, and single-object endpoints (one user, one tweet)
//! return a mapping with no list at all.

use serde_json::{Map, Value};

/// Known list-bearing keys, probed in priority order.
///
/// "affilates" is the remote API's own spelling.
pub const LIST_KEYS: &[&str] = &[
    "timeline",
    "followers",
    "following",
    "users",
    "trends",
    "retweets",
    "affilates",
    "members",
    "sharings",
    "results",
    "data",
];

/// Outcome of extracting items from one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageExtraction {
    /// Items contributed by this page, possibly empty.
    pub items: Vec<Value>,
    /// The sticky list key after this page. Carries the previous value
    /// through unchanged when this page discovers nothing new.
    pub data_key: Option<String>,
}

/// Extract the item list from one decoded page.
///
/// `page_index` is 0-based. `declared_key` is the list key the plan named,
/// if any; it is tried before the probe order but only until some key has
/// actually produced a list. `sticky_key` is the key a previous page found;
/// once set it is preferred for the remainder of the step, with the probe
/// order as fallback when a later page stops honoring it.
///
/// A first page with no recognizable list is treated as a single-object
/// response and wrapped as a one-element list. Later pages with no list
/// contribute zero items rather than failing the step.
pub fn extract_page_items(
    page: &Value,
    page_index: usize,
    declared_key: Option<&str>,
    sticky_key: Option<&str>,
) -> PageExtraction {
    let carried = sticky_key.map(str::to_string);
    match page {
        Value::Array(items) => {
            tracing::debug!(count = items.len(), "response root is a list");
            PageExtraction {
                items: items.clone(),
                data_key: carried,
            }
        }
        Value::Object(map) => {
            if let Some(key) = sticky_key {
                if let Some(Value::Array(items)) = map.get(key) {
                    return PageExtraction {
                        items: items.clone(),
                        data_key: carried,
                    };
                }
            }
            if sticky_key.is_none() {
                if let Some(key) = declared_key {
                    if let Some(Value::Array(items)) = map.get(key) {
                        tracing::debug!(key = %key, "list data found under plan-declared key");
                        return PageExtraction {
                            items: items.clone(),
                            data_key: Some(key.to_string()),
                        };
                    }
                }
            }
            for key in LIST_KEYS {
                if let Some(Value::Array(items)) = map.get(*key) {
                    tracing::debug!(key = %key, "list data found under probed key");
                    return PageExtraction {
                        items: items.clone(),
                        data_key: Some((*key).to_string()),
                    };
                }
            }
            if page_index == 0 && sticky_key.is_none() {
                tracing::debug!("treating whole mapping response as a single item");
                PageExtraction {
                    items: vec![page.clone()],
                    data_key: None,
                }
            } else {
                tracing::warn!(
                    page = page_index + 1,
                    expected_key = ?sticky_key,
                    "no list data found on page, contributing zero items"
                );
                PageExtraction {
                    items: Vec::new(),
                    data_key: carried,
                }
            }
        }
        other => {
            if page_index == 0 {
                tracing::warn!("unexpected response root type, wrapping as single item");
                PageExtraction {
                    items: vec![other.clone()],
                    data_key: None,
                }
            } else {
                tracing::warn!(
                    page = page_index + 1,
                    "ignoring unexpected response root type on later page"
                );
                PageExtraction {
                    items: Vec::new(),
                    data_key: carried,
                }
            }
        }
    }
}

/// Merge accumulated page items into the canonical step data.
///
/// With a discovered list key the canonical shape is that key mapped to all
/// accumulated items, plus every other top-level key from the last page
/// except the cursor fields and the list key itself. A lone mapping item is
/// flattened rather than wrapped. Multiple items with no discovered key go
/// under a `results` key. Zero items yield an empty mapping, or the known
/// key mapped to an empty list.
pub fn merge_pages(
    accumulated: Vec<Value>,
    data_key: Option<&str>,
    last_page: Option<&Value>,
) -> Value {
    if let Some(key) = data_key {
        let mut merged = Map::new();
        merged.insert(key.to_string(), Value::Array(accumulated));
        if let Some(Value::Object(last)) = last_page {
            for (other_key, value) in last {
                if other_key != key && other_key != "next_cursor" && other_key != "cursor" {
                    merged.insert(other_key.clone(), value.clone());
                }
            }
        }
        return Value::Object(merged);
    }

    let mut accumulated = accumulated;
    match accumulated.len() {
        1 if accumulated[0].is_object() => accumulated.remove(0),
        0 => Value::Object(Map::new()),
        _ => {
            let mut merged = Map::new();
            merged.insert("results".to_string(), Value::Array(accumulated));
            Value::Object(merged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_probe_order_prefers_timeline_over_data() {
        let page = json!({ "data": [1], "timeline": [2] });
        let extraction = extract_page_items(&page, 0, None, None);
        assert_eq!(extraction.items, vec![json!(2)]);
        assert_eq!(extraction.data_key.as_deref(), Some("timeline"));
    }

    #[test]
    fn test_declared_key_wins_before_probe_order() {
        let page = json!({ "timeline": [1], "custom": [2] });
        let extraction = extract_page_items(&page, 0, Some("custom"), None);
        assert_eq!(extraction.items, vec![json!(2)]);
        assert_eq!(extraction.data_key.as_deref(), Some("custom"));
    }

    #[test]
    fn test_declared_key_falls_back_to_probe_when_absent() {
        let page = json!({ "followers": [{ "id": 1 }] });
        let extraction = extract_page_items(&page, 0, Some("custom"), None);
        assert_eq!(extraction.items, vec![json!({ "id": 1 })]);
        assert_eq!(extraction.data_key.as_deref(), Some("followers"));
    }

    #[test]
    fn test_sticky_key_is_reused_on_later_pages() {
        let page = json!({ "timeline": [3, 4], "users": [9] });
        let extraction = extract_page_items(&page, 1, None, Some("timeline"));
        assert_eq!(extraction.items, vec![json!(3), json!(4)]);
        assert_eq!(extraction.data_key.as_deref(), Some("timeline"));
    }

    #[test]
    fn test_broken_sticky_key_falls_back_to_probe() {
        let page = json!({ "users": [{ "id": 7 }] });
        let extraction = extract_page_items(&page, 1, None, Some("timeline"));
        assert_eq!(extraction.items, vec![json!({ "id": 7 })]);
        assert_eq!(extraction.data_key.as_deref(), Some("users"));
    }

    #[test]
    fn test_first_page_single_object_is_wrapped() {
        let page = json!({ "rest_id": "42", "screen_name": "jack" });
        let extraction = extract_page_items(&page, 0, None, None);
        assert_eq!(extraction.items, vec![page.clone()]);
        assert_eq!(extraction.data_key, None);
    }

    #[test]
    fn test_later_page_without_list_contributes_nothing() {
        let page = json!({ "status": "ok" });
        let extraction = extract_page_items(&page, 2, None, Some("timeline"));
        assert!(extraction.items.is_empty());
        assert_eq!(extraction.data_key.as_deref(), Some("timeline"));
    }

    #[test]
    fn test_bare_array_root_is_the_item_list() {
        let page = json!([{ "id": 1 }, { "id": 2 }]);
        let extraction = extract_page_items(&page, 0, None, None);
        assert_eq!(extraction.items.len(), 2);
        assert_eq!(extraction.data_key, None);
    }

    #[test]
    fn test_scalar_root_wraps_on_first_page_only() {
        let first = extract_page_items(&json!("oops"), 0, None, None);
        assert_eq!(first.items, vec![json!("oops")]);
        let later = extract_page_items(&json!("oops"), 1, None, None);
        assert!(later.items.is_empty());
    }

    #[test]
    fn test_merge_with_key_strips_cursors_and_keeps_siblings() {
        let last_page = json!({
            "timeline": [{ "id": 3 }],
            "next_cursor": "abc",
            "cursor": "def",
            "user": "jack"
        });
        let merged = merge_pages(
            vec![json!({ "id": 1 }), json!({ "id": 2 }), json!({ "id": 3 })],
            Some("timeline"),
            Some(&last_page),
        );
        assert_eq!(
            merged,
            json!({
                "timeline": [{ "id": 1 }, { "id": 2 }, { "id": 3 }],
                "user": "jack"
            })
        );
    }

    #[test]
    fn test_merge_single_mapping_is_flattened_verbatim() {
        let item = json!({ "rest_id": "42", "screen_name": "jack" });
        let merged = merge_pages(vec![item.clone()], None, Some(&item));
        assert_eq!(merged, item);
    }

    #[test]
    fn test_merge_multiple_items_without_key_wraps_in_results() {
        let merged = merge_pages(vec![json!(1), json!(2)], None, None);
        assert_eq!(merged, json!({ "results": [1, 2] }));
    }

    #[test]
    fn test_merge_single_non_mapping_item_wraps_in_results() {
        let merged = merge_pages(vec![json!("x")], None, None);
        assert_eq!(merged, json!({ "results": ["x"] }));
    }

    #[test]
    fn test_merge_zero_items() {
        assert_eq!(merge_pages(vec![], None, None), json!({}));
        assert_eq!(
            merge_pages(vec![], Some("timeline"), None),
            json!({ "timeline": [] })
        );
    }
}
