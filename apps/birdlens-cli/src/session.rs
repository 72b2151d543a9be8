//! One conversational session: plan, execute, summarize, remember.
//!
//! A session owns the planner, the plan runner, the summarizer, the turn
//! history fed back into planning prompts, and the entity graph accumulated
//! from every executed step. `handle_query` always produces a user-facing
//! answer; failures along the way degrade into apologetic text instead of
//! propagating.

use serde_json::{json, Value};

use birdlens_core::{ApiTransport, Plan, PlanRunner, Sleeper, StepPlan, TokioSleeper};
use birdlens_graph::EntityGraph;
use birdlens_planners::{format_history, Planner, PlannerReply, SessionTurn, Summarizer};

use crate::filter::apply_reply_filter;

pub struct ExplorerSession<T, S = TokioSleeper> {
    planner: Box<dyn Planner>,
    summarizer: Box<dyn Summarizer>,
    runner: PlanRunner<T, S>,
    history_char_budget: usize,
    turns: Vec<SessionTurn>,
    graph: EntityGraph,
}

impl<T, S> ExplorerSession<T, S> {
    /// Entity graph accumulated across the session so far.
    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn turns(&self) -> &[SessionTurn] {
        &self.turns
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }
}

impl<T: ApiTransport, S: Sleeper> ExplorerSession<T, S> {
    pub fn new(
        planner: Box<dyn Planner>,
        summarizer: Box<dyn Summarizer>,
        runner: PlanRunner<T, S>,
        history_char_budget: usize,
    ) -> Self {
        Self {
            planner,
            summarizer,
            runner,
            history_char_budget,
            turns: Vec::new(),
            graph: EntityGraph::new(),
        }
    }

    /// Run one full turn and return the answer text. Progress lines are
    /// printed to stdout as the turn advances.
    pub async fn handle_query(&mut self, query: &str) -> String {
        tracing::info!(turn = self.turns.len() + 1, "handling user query");
        let history = format_history(&self.turns, self.history_char_budget);

        let (reply_value, answer) = match self.planner.plan(query, &history).await {
            Ok(reply) => {
                let reply_value = serde_json::to_value(&reply).unwrap_or(Value::Null);
                let answer = match reply {
                    PlannerReply::Clarification { message } => message,
                    PlannerReply::Plan { message, steps } => {
                        self.execute_plan(query, message, steps).await
                    }
                };
                (reply_value, answer)
            }
            Err(err) => {
                tracing::warn!(error = %err, "planning failed");
                let message = err.user_message();
                let reply_value = json!({
                    "response_type": "ERROR",
                    "message_to_user": &message,
                });
                (reply_value, message)
            }
        };

        self.turns
            .push(SessionTurn::new(query, reply_value).with_summary(answer.clone()));
        answer
    }

    async fn execute_plan(
        &mut self,
        query: &str,
        message: Option<String>,
        steps: Vec<StepPlan>,
    ) -> String {
        let status = message.filter(|m| !m.is_empty());
        if let Some(status) = &status {
            println!("{status}");
        }
        if steps.is_empty() {
            return status
                .unwrap_or_else(|| "I generated a plan but it was empty. Please try again.".to_string());
        }

        println!("Executing plan with {} step(s)...", steps.len());
        let plan = Plan::new(steps);
        let outcome = self.runner.run(&plan).await;

        // Even a halted run may have retrieved graphable data first.
        self.graph.ingest_all(&outcome.results);

        if let Some(halt) = &outcome.halt {
            return format!(
                "I encountered an error during execution and couldn't complete your request:\n```\n{halt}\n```"
            );
        }
        if !outcome.has_any_data() {
            return "I executed the plan, but no data was retrieved to summarize.".to_string();
        }

        let filtered = apply_reply_filter(query, &outcome.results);
        let summary_input = filtered.as_deref().unwrap_or(&outcome.results);
        self.summarizer.summarize(query, summary_input).await
    }
}
