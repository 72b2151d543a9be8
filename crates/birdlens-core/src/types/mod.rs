//! Core type definitions

pub mod plan;
pub mod result;
pub mod step;

pub use plan::Plan;
pub use result::StepResult;
pub use step::{ListRef, ParamParseError, ParamValue, ScalarRef, StepPlan};
