//! Plan runner
//!
//! Runs a whole plan sequentially: steps execute in ascending step order,
//! each one sees the full list of prior results for dependency resolution,
//! and the first step that errors halts the rest of the plan. Partial
//! execution is surfaced, not hidden: the failing result stays in the
//! outcome alongside everything that completed before it.

use std::fmt;
use std::time::Instant;

use crate::executor::StepExecutor;
use crate::transport::{ApiTransport, Sleeper, TokioSleeper};
use crate::types::{Plan, StepPlan, StepResult};

/// Where and why a plan stopped early.
#[derive(Debug, Clone)]
pub struct PlanHalt {
    /// 1-based position in the executed order, not the plan's step label.
    pub position: usize,
    pub endpoint: String,
    pub error: String,
}

impl fmt::Display for PlanHalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error in Step {} ({}): {}",
            self.position, self.endpoint, self.error
        )
    }
}

/// Everything a plan execution produced.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// One record per executed step, in execution order, including the
    /// failing record when the plan halted.
    pub results: Vec<StepResult>,
    pub halt: Option<PlanHalt>,
}

impl PlanOutcome {
    pub fn halted(&self) -> bool {
        self.halt.is_some()
    }

    /// True when at least one successful step retrieved non-empty data.
    pub fn has_any_data(&self) -> bool {
        self.results
            .iter()
            .any(|result| result.is_success() && result.has_data())
    }
}

/// Sequential plan orchestrator over a [`StepExecutor`].
pub struct PlanRunner<T, S = TokioSleeper> {
    executor: StepExecutor<T, S>,
}

impl<T: ApiTransport, S: Sleeper> PlanRunner<T, S> {
    pub fn new(executor: StepExecutor<T, S>) -> Self {
        Self { executor }
    }

    pub async fn run(&self, plan: &Plan) -> PlanOutcome {
        let steps = plan.sorted_steps();
        let mut results: Vec<StepResult> = Vec::with_capacity(steps.len());
        let started = Instant::now();

        for (position, step) in steps.iter().enumerate() {
            tracing::info!(
                position = position + 1,
                endpoint = %step.endpoint,
                "running plan step"
            );

            let mut result = self.executor.execute_step(step, &results).await;
            result.step_executed = Some(effective_step_number(step, position));

            if let Some(error) = result.error().map(str::to_string) {
                let halt = PlanHalt {
                    position: position + 1,
                    endpoint: step.endpoint.clone(),
                    error,
                };
                tracing::error!(
                    position = halt.position,
                    endpoint = %halt.endpoint,
                    error = %halt.error,
                    "plan halted on step failure"
                );
                results.push(result);
                return PlanOutcome {
                    results,
                    halt: Some(halt),
                };
            }

            results.push(result);
        }

        tracing::info!(
            steps = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "plan execution complete"
        );
        PlanOutcome {
            results,
            halt: None,
        }
    }
}

/// Plans number their own steps; unnumbered steps fall back to their
/// 1-based execution position.
fn effective_step_number(step: &StepPlan, position: usize) -> u32 {
    if step.step != 0 {
        step.step
    } else {
        position as u32 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use crate::types::ParamValue;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RoutedTransport {
        routes: Arc<Mutex<HashMap<String, Result<Value, TransportError>>>>,
        calls: Arc<Mutex<Vec<(String, Map<String, Value>)>>>,
    }

    impl RoutedTransport {
        fn route(self, endpoint: &str, response: Result<Value, TransportError>) -> Self {
            self.routes
                .lock()
                .unwrap()
                .insert(endpoint.to_string(), response);
            self
        }

        fn called_endpoints(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(endpoint, _)| endpoint.clone())
                .collect()
        }

        fn call_params(&self, index: usize) -> Map<String, Value> {
            self.calls.lock().unwrap()[index].1.clone()
        }
    }

    #[async_trait]
    impl ApiTransport for RoutedTransport {
        async fn get_page(
            &self,
            endpoint: &str,
            params: &Map<String, Value>,
        ) -> Result<Value, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((endpoint.to_string(), params.clone()));
            self.routes
                .lock()
                .unwrap()
                .get(endpoint)
                .cloned()
                .unwrap_or_else(|| panic!("no route for endpoint '{}'", endpoint))
        }
    }

    fn runner(transport: &RoutedTransport) -> PlanRunner<RoutedTransport> {
        PlanRunner::new(StepExecutor::new(transport.clone()))
    }

    #[test]
    fn test_steps_run_in_ascending_step_order() {
        tokio_test::block_on(async {
            let transport = RoutedTransport::default()
                .route("second.php", Ok(json!({ "timeline": [{ "id": 2 }] })))
                .route("first.php", Ok(json!({ "timeline": [{ "id": 1 }] })));
            let plan = Plan::new(vec![
                StepPlan::new(2, "second.php").with_max_pages(1),
                StepPlan::new(1, "first.php").with_max_pages(1),
            ]);

            let outcome = runner(&transport).run(&plan).await;

            assert!(!outcome.halted());
            assert_eq!(
                transport.called_endpoints(),
                vec!["first.php".to_string(), "second.php".to_string()]
            );
            assert_eq!(outcome.results[0].step_executed, Some(1));
            assert_eq!(outcome.results[1].step_executed, Some(2));
        });
    }

    #[test]
    fn test_first_error_halts_remaining_steps() {
        tokio_test::block_on(async {
            let transport = RoutedTransport::default()
                .route("a.php", Ok(json!({ "timeline": [{ "id": 1 }] })))
                .route(
                    "b.php",
                    Err(TransportError::Status {
                        status: 404,
                        body: "gone".to_string(),
                    }),
                )
                .route("c.php", Ok(json!({ "timeline": [] })));
            let plan = Plan::new(vec![
                StepPlan::new(1, "a.php").with_max_pages(1),
                StepPlan::new(2, "b.php").with_max_pages(1),
                StepPlan::new(3, "c.php").with_max_pages(1),
            ]);

            let outcome = runner(&transport).run(&plan).await;

            assert!(outcome.halted());
            assert_eq!(outcome.results.len(), 2);
            assert!(!transport
                .called_endpoints()
                .contains(&"c.php".to_string()));

            let halt = outcome.halt.expect("halt");
            assert_eq!(halt.position, 2);
            assert_eq!(halt.endpoint, "b.php");
            let message = halt.to_string();
            assert!(message.starts_with("Error in Step 2 (b.php):"));
            assert!(message.contains("HTTP Error 404"));
        });
    }

    #[test]
    fn test_later_steps_see_earlier_results() {
        tokio_test::block_on(async {
            let transport = RoutedTransport::default()
                .route("screenname.php", Ok(json!({ "rest_id": "42" })))
                .route("usertimeline.php", Ok(json!({ "timeline": [{ "id": 9 }] })));
            let plan = Plan::new(vec![
                StepPlan::new(1, "screenname.php")
                    .with_literal("screenname", "jack")
                    .with_max_pages(1),
                StepPlan::new(2, "usertimeline.php")
                    .with_param("rest_id", ParamValue::scalar_ref(1, "rest_id"))
                    .with_max_pages(1),
            ]);

            let outcome = runner(&transport).run(&plan).await;

            assert!(!outcome.halted());
            assert_eq!(transport.call_params(1).get("rest_id"), Some(&json!("42")));
        });
    }

    #[test]
    fn test_unnumbered_steps_take_their_position() {
        tokio_test::block_on(async {
            let transport = RoutedTransport::default()
                .route("a.php", Ok(json!({ "timeline": [{ "id": 1 }] })))
                .route("b.php", Ok(json!({ "timeline": [{ "id": 2 }] })));
            let plan = Plan::new(vec![
                StepPlan::new(0, "a.php").with_max_pages(1),
                StepPlan::new(0, "b.php").with_max_pages(1),
            ]);

            let outcome = runner(&transport).run(&plan).await;

            assert_eq!(outcome.results[0].step_executed, Some(1));
            assert_eq!(outcome.results[1].step_executed, Some(2));
        });
    }

    #[test]
    fn test_empty_plan_yields_empty_outcome() {
        tokio_test::block_on(async {
            let transport = RoutedTransport::default();
            let outcome = runner(&transport).run(&Plan::new(vec![])).await;

            assert!(outcome.results.is_empty());
            assert!(!outcome.halted());
            assert!(!outcome.has_any_data());
        });
    }

    #[test]
    fn test_empty_object_data_counts_as_no_data() {
        tokio_test::block_on(async {
            let transport = RoutedTransport::default().route("empty.php", Ok(json!({})));
            let plan = Plan::new(vec![StepPlan::new(1, "empty.php").with_max_pages(1)]);

            let outcome = runner(&transport).run(&plan).await;

            assert!(!outcome.halted());
            assert!(!outcome.has_any_data());

            // An empty list under a discovered key still counts as data.
            let transport =
                RoutedTransport::default().route("list.php", Ok(json!({ "timeline": [] })));
            let plan = Plan::new(vec![StepPlan::new(1, "list.php").with_max_pages(1)]);
            let outcome = runner(&transport).run(&plan).await;
            assert!(outcome.has_any_data());
        });
    }
}
