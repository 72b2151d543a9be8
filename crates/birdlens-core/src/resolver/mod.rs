//! Dependency resolver
//!
//! Turns a step plan's parameter mapping into concrete query parameter
//! values, resolving scalar and list references against prior step results.
//! Resolution is a pure function of the plan and the prior results; the
//! first failing parameter aborts the whole step before any network call.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{ListRef, ParamValue, ScalarRef, StepPlan, StepResult};

/// Error raised while resolving one step's parameters.
///
/// Always fatal to the step and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("parameter '{param}': invalid step reference {step} ({available} prior result(s) available)")]
    StepOutOfRange {
        param: String,
        step: usize,
        available: usize,
    },
    #[error("parameter '{param}': no data found from step {step}")]
    NoStepData { param: String, step: usize },
    #[error("parameter '{param}': path '{path}' not found in data from step {step}: {reason}")]
    PathNotFound {
        param: String,
        step: usize,
        path: String,
        reason: String,
    },
    #[error("parameter '{param}': path '{path}' did not resolve to a list in step {step}")]
    NotAList {
        param: String,
        step: usize,
        path: String,
    },
    #[error("parameter '{param}': list reference is missing source_list_path or extract_field")]
    IncompleteListRef { param: String },
}

/// Resolve every parameter of `plan` against the prior step results.
pub fn resolve_params(
    plan: &StepPlan,
    previous: &[StepResult],
) -> Result<Map<String, Value>, ResolveError> {
    let mut resolved = Map::new();
    for (key, value) in &plan.params {
        let concrete = match value {
            ParamValue::Literal(v) => v.clone(),
            ParamValue::ScalarRef(r) => resolve_scalar(key, r, previous)?,
            ParamValue::ListRef(r) => resolve_list(key, r, previous)?,
        };
        resolved.insert(key.clone(), concrete);
    }
    Ok(resolved)
}

fn resolve_scalar(
    param: &str,
    reference: &ScalarRef,
    previous: &[StepResult],
) -> Result<Value, ResolveError> {
    let source = lookup_step_data(param, reference.step, previous)?;
    let value =
        navigate(source, &reference.path).map_err(|reason| ResolveError::PathNotFound {
            param: param.to_string(),
            step: reference.step,
            path: reference.path.clone(),
            reason,
        })?;
    tracing::debug!(param = %param, reference = %reference, "resolved scalar reference");
    Ok(value.clone())
}

fn resolve_list(
    param: &str,
    reference: &ListRef,
    previous: &[StepResult],
) -> Result<Value, ResolveError> {
    if reference.source_list_path.is_empty() || reference.extract_field.is_empty() {
        return Err(ResolveError::IncompleteListRef {
            param: param.to_string(),
        });
    }

    let source = lookup_step_data(param, reference.source_step, previous)?;
    let list =
        navigate(source, &reference.source_list_path).map_err(|reason| {
            ResolveError::PathNotFound {
                param: param.to_string(),
                step: reference.source_step,
                path: reference.source_list_path.clone(),
                reason,
            }
        })?;
    let Value::Array(items) = list else {
        return Err(ResolveError::NotAList {
            param: param.to_string(),
            step: reference.source_step,
            path: reference.source_list_path.clone(),
        });
    };

    let mut extracted: Vec<Value> = Vec::new();
    for item in items {
        match navigate(item, &reference.extract_field) {
            Ok(value) => extracted.push(value.clone()),
            Err(_) => {
                tracing::warn!(
                    param = %param,
                    field = %reference.extract_field,
                    list_path = %reference.source_list_path,
                    "field not found in one element of source list, skipping"
                );
            }
        }
    }

    if extracted.is_empty() {
        tracing::warn!(
            param = %param,
            field = %reference.extract_field,
            list_path = %reference.source_list_path,
            "no values extracted from source list, resolving to empty string"
        );
        return Ok(Value::String(String::new()));
    }

    match &reference.join_with {
        Some(separator) => {
            let joined = extracted
                .iter()
                .map(stringify)
                .collect::<Vec<_>>()
                .join(separator);
            Ok(Value::String(joined))
        }
        None => Ok(Value::Array(extracted)),
    }
}

/// Look up a referenced step's data, enforcing the 1-based range check and
/// rejecting steps that errored or produced nothing usable.
fn lookup_step_data<'a>(
    param: &str,
    step: usize,
    previous: &'a [StepResult],
) -> Result<&'a Value, ResolveError> {
    if step < 1 || step > previous.len() {
        return Err(ResolveError::StepOutOfRange {
            param: param.to_string(),
            step,
            available: previous.len(),
        });
    }
    let result = &previous[step - 1];
    match result.data() {
        Some(data) if result.has_data() => Ok(data),
        _ => Err(ResolveError::NoStepData {
            param: param.to_string(),
            step,
        }),
    }
}

/// Walk a dot-separated path through a JSON tree.
///
/// All-digit segments index sequences; other segments look up mapping keys.
/// The empty path addresses the tree itself. Missing keys, out-of-range
/// indices, wrong container types, and null results are all faults.
fn navigate<'a>(data: &'a Value, path: &str) -> Result<&'a Value, String> {
    if path.is_empty() {
        return Ok(data);
    }
    let mut current = data;
    for segment in path.split('.') {
        let is_index = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());
        if is_index {
            // parse cannot fail after the all-digits check, besides overflow
            let index: usize = segment
                .parse()
                .map_err(|_| format!("index '{}' out of range", segment))?;
            match current {
                Value::Array(items) => {
                    current = items.get(index).ok_or_else(|| {
                        format!(
                            "index {} out of range (sequence has {} element(s))",
                            index,
                            items.len()
                        )
                    })?;
                }
                _ => return Err(format!("segment '{}' indexes a non-sequence value", segment)),
            }
        } else {
            match current {
                Value::Object(map) => {
                    current = map
                        .get(segment)
                        .ok_or_else(|| format!("key '{}' not found", segment))?;
                }
                _ => {
                    return Err(format!(
                        "segment '{}' applied to a non-mapping value",
                        segment
                    ))
                }
            }
        }
    }
    if current.is_null() {
        return Err("path resolved to null".to_string());
    }
    Ok(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
