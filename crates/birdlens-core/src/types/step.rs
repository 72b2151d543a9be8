//! Step plan definitions
//!
//! A StepPlan is one planner-produced instruction: which endpoint to call,
//! with which parameters, and how many pages to fetch. Parameter values may
//! reference data produced by earlier steps; the reference grammar is part of
//! the planner wire contract and is parsed once, at deserialization.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Error raised when a parameter value uses the reference grammar incorrectly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamParseError {
    #[error("malformed scalar reference '{raw}': {reason}")]
    MalformedScalarRef { raw: String, reason: String },
    #[error("malformed list reference: {0}")]
    MalformedListRef(String),
}

/// Scalar reference into a prior step's data tree.
///
/// Wire form: `"$step<N>.<dotted.path>"`. `N` is 1-based; path segments that
/// are all digits index into sequences. An empty path addresses the whole
/// data tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarRef {
    /// 1-based step number being referenced
    pub step: usize,
    /// Dot-separated path below that step's `data` (may be empty)
    pub path: String,
}

impl ScalarRef {
    pub fn new(step: usize, path: impl Into<String>) -> Self {
        Self {
            step,
            path: path.into(),
        }
    }

    /// Parse the `$step<N>.<path>` wire form.
    pub fn parse(raw: &str) -> Result<Self, ParamParseError> {
        let rest = raw
            .strip_prefix("$step")
            .ok_or_else(|| ParamParseError::MalformedScalarRef {
                raw: raw.to_string(),
                reason: "missing '$step' prefix".to_string(),
            })?;
        let (digits, path) = match rest.split_once('.') {
            Some((head, tail)) => (head, tail),
            None => (rest, ""),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParamParseError::MalformedScalarRef {
                raw: raw.to_string(),
                reason: "expected a step number after '$step'".to_string(),
            });
        }
        let step = digits
            .parse::<usize>()
            .map_err(|_| ParamParseError::MalformedScalarRef {
                raw: raw.to_string(),
                reason: "step number out of range".to_string(),
            })?;
        Ok(Self {
            step,
            path: path.to_string(),
        })
    }
}

impl fmt::Display for ScalarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "$step{}", self.step)
        } else {
            write!(f, "$step{}.{}", self.step, self.path)
        }
    }
}

/// List reference: fan out one field from every element of a list in a prior
/// step's data.
///
/// Wire form is the four-field object. With `join_with` the extracted values
/// collapse to one separator-joined string; without it the parameter stays a
/// sequence and the transport layer repeats the query key per element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRef {
    /// 1-based step number being referenced
    pub source_step: usize,
    /// Path to the source list below that step's `data`
    pub source_list_path: String,
    /// Path applied to every list element
    pub extract_field: String,
    /// Optional separator; stringifies and joins the extracted values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_with: Option<String>,
}

impl ListRef {
    pub fn new(
        source_step: usize,
        source_list_path: impl Into<String>,
        extract_field: impl Into<String>,
    ) -> Self {
        Self {
            source_step,
            source_list_path: source_list_path.into(),
            extract_field: extract_field.into(),
            join_with: None,
        }
    }

    pub fn with_join(mut self, separator: impl Into<String>) -> Self {
        self.join_with = Some(separator.into());
        self
    }
}

/// One step parameter value: a literal, or a reference to prior step data.
///
/// The planner emits references inside plain JSON (strings with a `$step`
/// prefix, objects carrying `source_step`), so classification happens here
/// rather than at resolution time. A value that looks like a reference but
/// does not parse as one is a deserialization error, never a silent literal.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Literal(Value),
    ScalarRef(ScalarRef),
    ListRef(ListRef),
}

impl ParamValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn scalar_ref(step: usize, path: impl Into<String>) -> Self {
        Self::ScalarRef(ScalarRef::new(step, path))
    }

    pub fn list_ref(list_ref: ListRef) -> Self {
        Self::ListRef(list_ref)
    }

    /// Whether this value needs prior step data to resolve.
    pub fn is_reference(&self) -> bool {
        !matches!(self, Self::Literal(_))
    }

    /// Classify a raw wire value into the reference grammar.
    pub fn from_wire(value: Value) -> Result<Self, ParamParseError> {
        match value {
            Value::String(s) if s.starts_with("$step") => {
                Ok(Self::ScalarRef(ScalarRef::parse(&s)?))
            }
            Value::Object(map) if map.contains_key("source_step") => {
                let list_ref: ListRef = serde_json::from_value(Value::Object(map))
                    .map_err(|e| ParamParseError::MalformedListRef(e.to_string()))?;
                Ok(Self::ListRef(list_ref))
            }
            other => Ok(Self::Literal(other)),
        }
    }

    /// Render back to the wire form.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::ScalarRef(r) => Value::String(r.to_string()),
            // ListRef serialization cannot fail: all fields are plain data
            Self::ListRef(r) => serde_json::to_value(r).unwrap_or(Value::Null),
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_wire(value).map_err(D::Error::custom)
    }
}

/// A single step of an API call plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPlan {
    /// 1-based position in the plan
    #[serde(default)]
    pub step: u32,
    /// Endpoint path relative to the API base URL, e.g. "timeline.php".
    /// Tolerated empty at parse time; the executor rejects it per step.
    #[serde(default)]
    pub endpoint: String,
    /// Query parameters; values may reference prior step data
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    /// Page budget for cursor pagination; engine default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    /// Planner's stated purpose for this call
    #[serde(default)]
    pub reason: String,
    /// Expected list-bearing response key, checked before the probe heuristics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_key: Option<String>,
}

impl StepPlan {
    /// Create a new step plan
    pub fn new(step: u32, endpoint: impl Into<String>) -> Self {
        Self {
            step,
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
            max_pages: None,
            reason: String::new(),
            data_key: None,
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Add a literal parameter
    pub fn with_literal(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), ParamValue::literal(value));
        self
    }

    /// Set the page budget
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Set the planner reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Declare the expected list-bearing response key
    pub fn with_data_key(mut self, data_key: impl Into<String>) -> Self {
        self.data_key = Some(data_key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_ref_parses_step_and_path() {
        let r = ScalarRef::parse("$step2.user.profile.id").expect("parse");
        assert_eq!(r.step, 2);
        assert_eq!(r.path, "user.profile.id");
        assert_eq!(r.to_string(), "$step2.user.profile.id");
    }

    #[test]
    fn test_scalar_ref_without_path_addresses_whole_tree() {
        let r = ScalarRef::parse("$step1").expect("parse");
        assert_eq!(r.step, 1);
        assert_eq!(r.path, "");
        assert_eq!(r.to_string(), "$step1");
    }

    #[test]
    fn test_scalar_ref_rejects_missing_step_number() {
        assert!(ScalarRef::parse("$step.foo").is_err());
        assert!(ScalarRef::parse("$stepX.foo").is_err());
    }

    #[test]
    fn test_param_value_classifies_wire_forms() {
        let literal = ParamValue::from_wire(json!("elonmusk")).expect("literal");
        assert_eq!(literal, ParamValue::literal("elonmusk"));

        let scalar = ParamValue::from_wire(json!("$step1.rest_id")).expect("scalar");
        assert_eq!(scalar, ParamValue::scalar_ref(1, "rest_id"));

        let list = ParamValue::from_wire(json!({
            "source_step": 1,
            "source_list_path": "followers",
            "extract_field": "screen_name",
            "join_with": ","
        }))
        .expect("list");
        assert_eq!(
            list,
            ParamValue::list_ref(ListRef::new(1, "followers", "screen_name").with_join(","))
        );
    }

    #[test]
    fn test_param_value_rejects_malformed_references() {
        // Looks like a scalar reference but has no step number
        assert!(ParamValue::from_wire(json!("$stepfoo.bar")).is_err());
        // Carries source_step but misses required fields
        assert!(ParamValue::from_wire(json!({ "source_step": 1 })).is_err());
    }

    #[test]
    fn test_param_value_object_without_source_step_is_literal() {
        let value = json!({ "screenname": "jack" });
        let parsed = ParamValue::from_wire(value.clone()).expect("literal object");
        assert_eq!(parsed, ParamValue::Literal(value));
    }

    #[test]
    fn test_step_plan_deserializes_planner_wire_format() {
        let plan: StepPlan = serde_json::from_value(json!({
            "step": 2,
            "endpoint": "following.php",
            "params": {
                "screenname": "$step1.profile.screen_name",
                "ids": {
                    "source_step": 1,
                    "source_list_path": "followers",
                    "extract_field": "rest_id",
                    "join_with": ","
                },
                "count": 20
            },
            "max_pages": 2,
            "reason": "list accounts followed by the top follower"
        }))
        .expect("plan");

        assert_eq!(plan.step, 2);
        assert_eq!(plan.endpoint, "following.php");
        assert_eq!(plan.max_pages, Some(2));
        assert_eq!(
            plan.params.get("screenname"),
            Some(&ParamValue::scalar_ref(1, "profile.screen_name"))
        );
        assert_eq!(plan.params.get("count"), Some(&ParamValue::literal(20)));
        assert!(matches!(
            plan.params.get("ids"),
            Some(ParamValue::ListRef(_))
        ));
    }

    #[test]
    fn test_step_plan_round_trips_references() {
        let plan = StepPlan::new(1, "timeline.php")
            .with_param("screenname", ParamValue::scalar_ref(1, "screen_name"))
            .with_literal("count", 20)
            .with_reason("fetch recent tweets");
        let wire = serde_json::to_value(&plan).expect("serialize");
        assert_eq!(
            wire.get("params").and_then(|p| p.get("screenname")),
            Some(&json!("$step1.screen_name"))
        );
        let back: StepPlan = serde_json::from_value(wire).expect("deserialize");
        assert_eq!(back, plan);
    }
}
