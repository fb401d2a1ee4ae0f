//! Mutable state shared by every pattern during one run.

use super::{Deadline, Executor, HistoryBuffer};
use crate::core::Failure;
use crate::events::get_event_sink;
use crate::resilience::SelectedResource;
use crate::tools::ToolCall;
use crate::utils::preview;
use tracing::debug;

/// Longest observation kept in history.
const MAX_OBSERVATION_CHARS: usize = 2_000;

pub(crate) struct RunState<'a> {
    executor: &'a Executor,
    resource: &'a SelectedResource,
    pub(crate) deadline: Deadline,
    pub(crate) history: HistoryBuffer,
    pub(crate) completion_calls: usize,
}

impl<'a> RunState<'a> {
    pub(crate) fn new(
        executor: &'a Executor,
        resource: &'a SelectedResource,
        deadline: Deadline,
    ) -> Self {
        Self {
            executor,
            resource,
            deadline,
            history: HistoryBuffer::new(executor.limits().max_history_size),
            completion_calls: 0,
        }
    }

    /// Fails once the wall-clock limit is reached, carrying the last observation.
    pub(crate) fn check_deadline(&self) -> Result<(), Failure> {
        self.deadline.check(self.history.last())
    }

    /// Termination failure for an exhausted iteration budget.
    pub(crate) fn budget_exhausted(&self, pattern: &str, limit: usize) -> Failure {
        Failure::termination(format!(
            "{pattern} exhausted its iteration budget of {limit} without a final answer"
        ))
        .with_partial(serde_json::json!({ "last_observation": self.history.last() }))
    }

    pub(crate) fn tools_block(&self) -> String {
        self.executor.tools().prompt_block()
    }

    /// One guarded completion call bounded by the run deadline.
    pub(crate) async fn ask(&mut self, prompt: &str) -> Result<String, Failure> {
        self.completion_calls += 1;
        self.executor
            .completion()
            .complete(prompt, self.resource, Some(&self.deadline))
            .await
            .map(|response| response.content)
            .map_err(Failure::from)
    }

    pub(crate) fn observe(&mut self, observation: impl Into<String>) {
        self.history.push(observation);
    }

    /// Sanitizes and runs a tool call, recording the observation.
    ///
    /// Never fails: unknown tools, blocked input and tool errors all become
    /// observations the next completion can react to.
    pub(crate) async fn act(&mut self, call: &ToolCall) -> String {
        let observation = match self.executor.tools().get(&call.name) {
            Err(e) => format!(
                "Error: {e}. Available tools: {}",
                self.executor.tools().names().join(", ")
            ),
            Ok(tool) => match self.executor.sanitizer().check(call, tool.kind()).await {
                Err(blocked) => {
                    get_event_sink().try_emit(
                        "tool.blocked",
                        Some(serde_json::json!({
                            "tool": call.name,
                            "reason": blocked.to_string(),
                        })),
                    );
                    blocked.to_string()
                }
                Ok(()) => {
                    match tokio::time::timeout(
                        self.deadline.remaining(),
                        tool.invoke(&call.raw_input),
                    )
                    .await
                    {
                        Ok(Ok(output)) => preview(&output, MAX_OBSERVATION_CHARS),
                        Ok(Err(e)) if e.is_blocked() => e.to_string(),
                        Ok(Err(e)) => format!("Error: {e}"),
                        Err(_) => format!("Error: tool '{}' did not finish before the deadline", call.name),
                    }
                }
            },
        };

        debug!(tool = %call.name, observation = %preview(&observation, 120), "Tool observation");
        self.observe(format!("{call} => {observation}"));
        observation
    }
}

/// Returns true for observations that report a failed or blocked call.
pub(crate) fn is_failure_observation(observation: &str) -> bool {
    observation.starts_with("Error:") || observation.starts_with("BLOCKED")
}
