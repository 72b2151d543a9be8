//! # Birdlens Core
//!
//! Step execution engine for birdlens.
//!
//! This crate contains:
//! - Plan / Step / StepResult definitions and the parameter reference grammar
//! - Dependency resolution across plan steps
//! - Cursor-based pagination with per-page retry/backoff
//! - Result normalization into one canonical record per step
//! - Sequential plan running with halt-on-error
//!
//! This crate does NOT care about:
//! - How plans are produced (see birdlens-planners)
//! - How results are rendered or summarized
//! - Which process owns the HTTP credentials (they are injected)

pub mod executor;
pub mod normalizer;
pub mod resolver;
pub mod runner;
pub mod transport;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::executor::{ExecutorConfig, StepExecutor};
    pub use crate::normalizer::{extract_page_items, merge_pages, PageExtraction, LIST_KEYS};
    pub use crate::resolver::{resolve_params, ResolveError};
    pub use crate::runner::{PlanHalt, PlanOutcome, PlanRunner};
    pub use crate::transport::{
        ApiTransport, RapidApiClient, RapidApiConfig, RetryDecision, RetryPolicy, Sleeper,
        TokioSleeper, TransportError,
    };
    pub use crate::types::{ListRef, ParamValue, Plan, ScalarRef, StepPlan, StepResult};
}

// Re-export key types at crate root
pub use executor::{ExecutorConfig, StepExecutor};
pub use runner::{PlanHalt, PlanOutcome, PlanRunner};
pub use transport::{
    ApiTransport, RapidApiClient, RapidApiConfig, Sleeper, TokioSleeper, TransportError,
};
pub use types::{ListRef, ParamValue, Plan, ScalarRef, StepPlan, StepResult};
