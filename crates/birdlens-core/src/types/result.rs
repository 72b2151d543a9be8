//! Step result record
//!
//! One record per executed step, shared by every downstream consumer (the
//! resolver of later steps, the summarizer, the graph builder). The shape is
//! stable across success and failure so consumers key off the presence of
//! `error`: exactly one of `data`/`error` is ever set.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of executing one plan step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Endpoint the step called (or tried to call)
    pub endpoint: String,
    /// Step number from the plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_executed: Option<u32>,
    /// Fully resolved parameters the request was issued with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_params: Option<Map<String, Value>>,
    /// Planner reason carried over from the step plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Canonical merged data; absent on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description; absent on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// HTTP status behind the failure, when one is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl StepResult {
    /// Successful step with canonical merged data
    pub fn success(
        endpoint: impl Into<String>,
        step_executed: u32,
        executed_params: Map<String, Value>,
        reason: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            step_executed: Some(step_executed),
            executed_params: Some(executed_params),
            reason: Some(reason.into()),
            data: Some(data),
            error: None,
            status_code: None,
        }
    }

    /// Failed step
    pub fn failure(endpoint: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            step_executed: None,
            executed_params: None,
            reason: None,
            data: None,
            error: Some(error.into()),
            status_code: None,
        }
    }

    /// Attach the HTTP status behind a failure
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Attach step identity to a failure record
    pub fn with_step_info(
        mut self,
        step_executed: u32,
        executed_params: Map<String, Value>,
        reason: impl Into<String>,
    ) -> Self {
        self.step_executed = Some(step_executed);
        self.executed_params = Some(executed_params);
        self.reason = Some(reason.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Canonical data, present only on success
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Failure description, present only on failure
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True when this step holds non-empty data. Empty containers, empty
    /// strings, zero, false, and null all count as "nothing retrieved".
    pub fn has_data(&self) -> bool {
        match &self.data {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(map)) => !map.is_empty(),
        }
    }
}
