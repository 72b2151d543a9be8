//! Plan definitions

use serde::{Deserialize, Serialize};

use super::step::StepPlan;

/// An ordered sequence of API call steps produced by the planner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    pub steps: Vec<StepPlan>,
}

impl Plan {
    pub fn new(steps: Vec<StepPlan>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Steps in execution order: ascending step number, stable for ties
    pub fn sorted_steps(&self) -> Vec<StepPlan> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(|s| s.step);
        steps
    }
}

impl From<Vec<StepPlan>> for Plan {
    fn from(steps: Vec<StepPlan>) -> Self {
        Self::new(steps)
    }
}
