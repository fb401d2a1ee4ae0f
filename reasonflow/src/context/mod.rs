//! Per-invocation task state and the normalized report.
//!
//! A [`TaskContext`] is owned by exactly one pipeline call and is moved from
//! stage to stage; nothing in it is shared across invocations.

mod input;
mod report;

pub use input::TaskInput;
pub use report::TaskReport;

use crate::executor::ReasoningPattern;
use crate::pipeline::PipelineMode;
use crate::resilience::SelectedResource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

/// Selections made while a task moves through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Reasoning pattern, set once by the route stage or a caller override.
    pub pattern: Option<ReasoningPattern>,
    /// Completion resource, set once by the guard stage.
    pub resource: Option<SelectedResource>,
    /// Remaining iteration budget.
    pub budget_remaining: Option<usize>,
    /// Pipeline mode.
    pub mode: PipelineMode,
}

/// Mutable state of one task invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    /// Unique run id.
    pub run_id: Uuid,
    /// When the invocation started.
    pub created_at: DateTime<Utc>,
    /// The (bounded, UTF-8) input text.
    pub input: String,
    /// Stage results keyed by name.
    pub results: Map<String, Value>,
    /// Pattern, resource and budget selections.
    pub metadata: TaskMetadata,
    /// Non-fatal problems noticed along the way.
    pub warnings: Vec<String>,
}

impl TaskContext {
    /// Creates a context for `input`.
    #[must_use]
    pub fn new(input: impl Into<String>, mode: PipelineMode) -> Self {
        Self {
            run_id: crate::utils::generate_run_id(),
            created_at: Utc::now(),
            input: input.into(),
            results: Map::new(),
            metadata: TaskMetadata {
                mode,
                ..TaskMetadata::default()
            },
            warnings: Vec::new(),
        }
    }

    /// Uses a caller-provided run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Pre-selects the reasoning pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: ReasoningPattern) -> Self {
        self.metadata.pattern = Some(pattern);
        self
    }

    /// Stores a stage result.
    pub fn set_result(&mut self, key: impl Into<String>, value: Value) {
        self.results.insert(key.into(), value);
    }

    /// Reads a stage result.
    #[must_use]
    pub fn result(&self, key: &str) -> Option<&Value> {
        self.results.get(key)
    }

    /// Returns the current answer, if a stage produced one.
    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        self.results.get("answer").and_then(Value::as_str)
    }

    /// Records a warning and logs it.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        warn!(run_id = %self.run_id, warning = %warning, "Task warning");
        self.warnings.push(warning);
    }

    /// Returns the selected resource, if any.
    #[must_use]
    pub const fn resource(&self) -> Option<&SelectedResource> {
        self.metadata.resource.as_ref()
    }
}
