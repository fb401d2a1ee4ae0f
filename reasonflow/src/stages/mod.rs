//! Stage trait and implementations.
//!
//! Stages are the units a pipeline threads a [`TaskContext`] through. Each
//! one receives the context by value and hands it back on the `Ok` track.

mod builtin;

pub use builtin::{
    AskStage, ExecuteStage, GuardStage, IntakeStage, LintStage, ReviewStage, RouteStage,
};

use crate::context::TaskContext;
use crate::core::Outcome;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Runs the stage on the context of one invocation.
    async fn run(&self, ctx: TaskContext) -> Outcome<TaskContext>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(TaskContext) -> Outcome<TaskContext> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(TaskContext) -> Outcome<TaskContext> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(TaskContext) -> Outcome<TaskContext> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(TaskContext) -> Outcome<TaskContext> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: TaskContext) -> Outcome<TaskContext> {
        (self.func)(ctx)
    }
}
