//! Validated stage pipeline.

use super::{EngineServices, PipelineMode, StageRegistry};
use crate::context::{TaskContext, TaskInput, TaskReport};
use crate::core::Outcome;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::executor::ReasoningPattern;
use crate::stages::Stage;
use crate::utils::truncate_chars;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Skip routing and use this pattern.
    pub pattern: Option<ReasoningPattern>,
    /// Use this run id instead of a fresh one.
    pub run_id: Option<Uuid>,
}

impl CallOptions {
    /// Forces a reasoning pattern.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: ReasoningPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Sets the run id.
    #[must_use]
    pub const fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// An ordered list of stages, validated at construction.
///
/// Calls are independent: each gets its own [`TaskContext`], so one pipeline
/// may serve concurrent calls.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    mode: PipelineMode,
    services: EngineServices,
}

impl Pipeline {
    /// Builds a pipeline from registered stage names.
    ///
    /// Fails on the first name the registry does not know, listing every
    /// available stage.
    pub fn new<S: AsRef<str>>(
        names: &[S],
        mode: PipelineMode,
        registry: &StageRegistry,
        services: EngineServices,
    ) -> Result<Self, PipelineValidationError> {
        if names.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages")
                .with_stages(registry.available())
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-004-EMPTY", "Pipeline has no stages")
                        .with_fix_hint("List at least one registered stage."),
                ));
        }

        let stages = names
            .iter()
            .map(|name| registry.build(name.as_ref(), &services))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            stages = ?names.iter().map(AsRef::as_ref).collect::<Vec<_>>(),
            mode = %mode,
            "Pipeline built"
        );
        Ok(Self {
            stages,
            mode,
            services,
        })
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Gets the mode.
    #[must_use]
    pub const fn mode(&self) -> PipelineMode {
        self.mode
    }

    /// Gets the engine services.
    #[must_use]
    pub const fn services(&self) -> &EngineServices {
        &self.services
    }

    /// Runs every stage on `input`.
    pub async fn call(&self, input: impl Into<TaskInput>) -> Outcome<TaskReport> {
        self.call_with(input, CallOptions::default()).await
    }

    /// Runs every stage on `input` with per-call overrides.
    pub async fn call_with(&self, input: impl Into<TaskInput>, options: CallOptions) -> Outcome<TaskReport> {
        let ctx = self.prepare(input.into(), options);
        let span = info_span!("pipeline", run_id = %ctx.run_id, mode = %self.mode);
        self.run_stages(ctx).instrument(span).await
    }

    fn prepare(&self, input: TaskInput, options: CallOptions) -> TaskContext {
        let (text, decode_warning) = input.into_text();
        let mut ctx = TaskContext::new(String::new(), self.mode);
        if let Some(run_id) = options.run_id {
            ctx = ctx.with_run_id(run_id);
        }
        if let Some(pattern) = options.pattern {
            ctx = ctx.with_pattern(pattern);
        }
        if let Some(warning) = decode_warning {
            ctx.add_warning(warning);
        }

        let max = self.services.config().limits.max_input_length;
        let (bounded, truncated) = truncate_chars(&text, max);
        if truncated {
            ctx.add_warning(format!(
                "input truncated from {} to {max} characters",
                text.chars().count()
            ));
        }
        ctx.input = bounded;
        ctx
    }

    async fn run_stages(&self, ctx: TaskContext) -> Outcome<TaskReport> {
        let events = self.services.events();
        let run_id = ctx.run_id;
        let started = Instant::now();
        let mut outcome = Outcome::ok(ctx);

        for stage in &self.stages {
            let name = stage.name();
            events.try_emit("stage.started", Some(json!({ "stage": name, "run_id": run_id })));
            let stage_started = Instant::now();

            outcome = outcome
                .and_then_async(name, |ctx| stage.run(ctx))
                .await;

            let elapsed_ms = u64::try_from(stage_started.elapsed().as_millis()).unwrap_or(u64::MAX);
            match outcome.failure() {
                None => {
                    events.try_emit(
                        "stage.completed",
                        Some(json!({ "stage": name, "run_id": run_id, "elapsed_ms": elapsed_ms })),
                    );
                }
                Some(failure) => {
                    warn!(stage = %name, category = %failure.category, error = %failure, "Stage failed");
                    events.try_emit(
                        "stage.failed",
                        Some(json!({
                            "stage": name,
                            "run_id": run_id,
                            "category": failure.category,
                            "error": failure.message,
                        })),
                    );
                    break;
                }
            }
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        events.try_emit(
            "pipeline.completed",
            Some(json!({
                "run_id": run_id,
                "outcome": outcome.kind(),
                "elapsed_ms": elapsed_ms,
            })),
        );
        info!(outcome = %outcome.kind(), elapsed_ms, "Pipeline finished");
        outcome.map(TaskReport::from_context)
    }
}
