//! Bounded reasoning-pattern execution.
//!
//! Every pattern shares the same guards:
//! - a wall-clock [`Deadline`] checked at the top of every iteration
//! - a FIFO-bounded [`HistoryBuffer`]
//! - the [`Sanitizer`] in front of every tool call
//! - an iteration budget
//!
//! Guard failures stop a run immediately; transient completion failures are
//! recorded as observations and the loop moves on.

mod deadline;
mod history;
mod preact;
pub mod protocol;
mod react;
mod reflexion;
mod rewoo;
mod run;
mod sanitizer;

pub use deadline::Deadline;
pub use history::{HistoryBuffer, HistoryEntry};
#[cfg(test)]
pub use reflexion::MockEvaluator;
pub use reflexion::{Evaluation, Evaluator, ReflexionTrace};
pub use sanitizer::Sanitizer;

use crate::completion::GuardedCompletion;
use crate::config::Limits;
use crate::core::{Failure, Outcome};
use crate::council::{Council, CouncilReport, ReviewScope};
use crate::resilience::SelectedResource;
use crate::storage::KeyValueStore;
use crate::tools::ToolRegistry;
use run::RunState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// The closed set of reasoning strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningPattern {
    /// Reason, act, observe loop.
    #[default]
    ReAct,
    /// Full plan first, ReAct repair on invalidation.
    PreAct,
    /// Evidence plan, one execution phase, one solver call.
    ReWoo,
    /// Attempts with self-evaluation and lessons.
    Reflexion,
}

impl ReasoningPattern {
    /// All patterns.
    pub const ALL: [Self; 4] = [Self::ReAct, Self::PreAct, Self::ReWoo, Self::Reflexion];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReAct => "react",
            Self::PreAct => "preact",
            Self::ReWoo => "rewoo",
            Self::Reflexion => "reflexion",
        }
    }

    /// Picks a pattern from keywords in the goal.
    #[must_use]
    pub fn route(goal: &str) -> Self {
        let goal = goal.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| goal.contains(w));

        if has(&["improve", "refine", "polish", "critique", "draft", "rewrite"]) {
            Self::Reflexion
        } else if has(&["compare", "gather", "collect", "research", "survey", "each of"]) {
            Self::ReWoo
        } else if has(&["step by step", "plan", "steps", "then", "migrate", "set up"]) {
            Self::PreAct
        } else {
            Self::ReAct
        }
    }
}

impl fmt::Display for ReasoningPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown reasoning pattern '{s}' (expected react, preact, rewoo or reflexion)")
            })
    }
}

/// What a pattern hands back to the executor.
#[derive(Debug, Clone)]
pub(crate) struct PatternResult {
    pub(crate) answer: String,
    pub(crate) iterations: usize,
    pub(crate) reflexion: Option<ReflexionTrace>,
}

impl PatternResult {
    pub(crate) const fn new(answer: String, iterations: usize) -> Self {
        Self {
            answer,
            iterations,
            reflexion: None,
        }
    }

    pub(crate) fn with_reflexion(mut self, trace: ReflexionTrace) -> Self {
        self.reflexion = Some(trace);
        self
    }
}

/// Result of one executor run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Pattern that produced the answer.
    pub pattern: ReasoningPattern,
    /// Final answer, after council review in deliberate runs.
    pub answer: String,
    /// Iterations spent.
    pub iterations: usize,
    /// Completion calls made by the pattern.
    pub completion_calls: usize,
    /// Retained observation history.
    pub history: Vec<HistoryEntry>,
    /// Reflexion trace, for reflexion runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflexion: Option<ReflexionTrace>,
    /// Council report, for deliberate runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub council: Option<CouncilReport>,
}

/// One unit of work for [`Executor::run`].
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    /// Run id, used for history persistence.
    pub run_id: Uuid,
    /// The goal text.
    pub goal: String,
    /// Pattern to dispatch to.
    pub pattern: ReasoningPattern,
    /// Resource selected for the whole run.
    pub resource: SelectedResource,
    /// Submit the answer to the council.
    pub deliberate: bool,
    /// Remaining iteration budget; capped by the configured maximum.
    pub budget: Option<usize>,
}

impl ExecutionTask {
    /// Creates a direct-mode task.
    #[must_use]
    pub fn new(goal: impl Into<String>, pattern: ReasoningPattern, resource: SelectedResource) -> Self {
        Self {
            run_id: crate::utils::generate_run_id(),
            goal: goal.into(),
            pattern,
            resource,
            deliberate: false,
            budget: None,
        }
    }

    /// Sets the run id.
    #[must_use]
    pub const fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Enables council review.
    #[must_use]
    pub const fn deliberate(mut self, deliberate: bool) -> Self {
        self.deliberate = deliberate;
        self
    }

    /// Sets the iteration budget.
    #[must_use]
    pub const fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }
}

/// Runs reasoning patterns against the guarded completion service.
pub struct Executor {
    completion: GuardedCompletion,
    tools: Arc<ToolRegistry>,
    sanitizer: Sanitizer,
    limits: Limits,
    store: Option<Arc<dyn KeyValueStore>>,
    council: Option<Arc<Council>>,
    evaluator: Option<Arc<dyn Evaluator>>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("tools", &self.tools)
            .field("limits", &self.limits)
            .field("has_council", &self.council.is_some())
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        completion: GuardedCompletion,
        tools: Arc<ToolRegistry>,
        sanitizer: Sanitizer,
        limits: Limits,
    ) -> Self {
        Self {
            completion,
            tools,
            sanitizer,
            limits,
            store: None,
            council: None,
            evaluator: None,
        }
    }

    /// Persists run history to `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Enables council review for deliberate tasks.
    #[must_use]
    pub fn with_council(mut self, council: Arc<Council>) -> Self {
        self.council = Some(council);
        self
    }

    /// Replaces the completion-based reflexion evaluator.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub(crate) const fn completion(&self) -> &GuardedCompletion {
        &self.completion
    }

    /// Gets the tool registry.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub(crate) const fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    /// Gets the limits.
    #[must_use]
    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Dispatches `task` to its pattern once and returns the artifact.
    pub async fn run(&self, task: &ExecutionTask) -> Outcome<Artifact> {
        let span = info_span!("executor", run_id = %task.run_id, pattern = %task.pattern);
        self.run_inner(task).instrument(span).await.into()
    }

    async fn run_inner(&self, task: &ExecutionTask) -> Result<Artifact, Failure> {
        let max_iterations = task
            .budget
            .map_or(self.limits.max_iterations, |b| b.min(self.limits.max_iterations));
        if max_iterations == 0 {
            return Err(Failure::termination("iteration budget exhausted before execution"));
        }

        let mut state = RunState::new(
            self,
            &task.resource,
            Deadline::start(self.limits.wall_clock_limit()),
        );
        let outcome = match task.pattern {
            ReasoningPattern::ReAct => react::run(&mut state, &task.goal, max_iterations).await,
            ReasoningPattern::PreAct => preact::run(&mut state, &task.goal, max_iterations).await,
            ReasoningPattern::ReWoo => rewoo::run(&mut state, &task.goal, max_iterations).await,
            ReasoningPattern::Reflexion => {
                reflexion::run(
                    &mut state,
                    &task.goal,
                    self.limits.max_reflexion_attempts.min(max_iterations),
                    self.evaluator.as_deref(),
                )
                .await
            }
        };

        if let Some(store) = &self.store {
            state.history.persist(store.as_ref(), task.run_id);
        }
        let result = outcome?;
        info!(
            iterations = result.iterations,
            completion_calls = state.completion_calls,
            "Pattern finished"
        );

        let mut artifact = Artifact {
            pattern: task.pattern,
            answer: result.answer,
            iterations: result.iterations,
            completion_calls: state.completion_calls,
            history: state.history.entries(),
            reflexion: result.reflexion,
            council: None,
        };

        if task.deliberate {
            match &self.council {
                Some(council) => {
                    let scope = ReviewScope::new(task.resource.clone()).with_deadline(state.deadline);
                    let report = council
                        .converge(&task.goal, &artifact.answer, &scope)
                        .await
                        .into_result()
                        .map_err(|f| f.labelled("council"))?;
                    artifact.answer.clone_from(&report.final_artifact);
                    artifact.council = Some(report);
                }
                None => warn!("Deliberate task without a council, skipping review"),
            }
        }

        Ok(artifact)
    }
}

#[cfg(test)]
mod tests;
