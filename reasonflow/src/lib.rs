//! # Reasonflow
//!
//! A bounded task-execution engine for completion-driven agents.
//!
//! Reasonflow routes a unit of work through a validated stage pipeline and
//! hands it to one of several reasoning patterns:
//!
//! - **Railway outcomes**: every stage, executor and council result is an
//!   [`Outcome`](core::Outcome) with stage-attributed failures
//! - **Validated pipelines**: unknown stage names fail at construction, not at
//!   first call
//! - **Circuit breaking**: per-resource failure counting in front of the
//!   completion service
//! - **Reasoning patterns**: ReAct, PreAct, ReWOO and Reflexion, each bounded by
//!   wall-clock, iteration and history limits
//! - **Council review**: weighted voting with veto holders and a hard round cap
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reasonflow::prelude::*;
//!
//! let services = EngineServices::builder(EngineConfig::default(), completion).build()?;
//! let registry = StageRegistry::with_builtins();
//! let pipeline = Pipeline::new(&["intake", "guard", "route", "execute"], PipelineMode::Direct, &registry, services)?;
//!
//! match pipeline.call("summarise the release notes").await {
//!     Outcome::Ok(report) => println!("{}", report.answer.unwrap_or_default()),
//!     Outcome::Err(failure) => eprintln!("{failure}"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod completion;
pub mod config;
pub mod context;
pub mod core;
pub mod council;
pub mod errors;
pub mod events;
pub mod executor;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod stages;
pub mod storage;
pub mod testing;
pub mod tools;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::completion::{
        CompletionOptions, CompletionResponse, CompletionService, GuardedCompletion,
    };
    pub use crate::config::{EngineConfig, JsonFileRules, RuleProvider, SeedCell, StaticRules};
    pub use crate::context::{TaskContext, TaskInput, TaskReport};
    pub use crate::core::{ErrorCategory, Failure, Outcome, OutcomeKind};
    pub use crate::council::{Council, Participant, Verdict, Vote};
    pub use crate::errors::{PipelineValidationError, ReasonflowError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::executor::{Artifact, Executor, ReasoningPattern};
    pub use crate::pipeline::{
        CallOptions, EngineServices, Pipeline, PipelineMode, StageRegistry,
    };
    pub use crate::resilience::{CircuitBreaker, CircuitState, SelectedResource};
    pub use crate::stages::Stage;
    pub use crate::storage::{InMemoryStore, KeyValueStore};
    pub use crate::tools::{Tool, ToolCall, ToolKind, ToolRegistry};
}
