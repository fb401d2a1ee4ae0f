//! ReAct: reason, act, observe until a final answer.

use super::protocol::{parse_step, Step};
use super::run::RunState;
use super::PatternResult;
use crate::core::Failure;
use tracing::debug;

fn prompt(goal: &str, tools: &str, history: &str) -> String {
    let history = if history.is_empty() { "(nothing yet)" } else { history };
    format!(
        "You are solving a task one step at a time.\n\
         Task: {goal}\n\n\
         Tools:\n{tools}\n\n\
         History:\n{history}\n\n\
         Reply with either\n\
         Thought: <reasoning>\nAction: <tool>[<input>]\n\
         or\n\
         Final Answer: <answer>"
    )
}

/// Runs the loop for at most `max_iterations` completion turns.
pub(crate) async fn run(
    state: &mut RunState<'_>,
    goal: &str,
    max_iterations: usize,
) -> Result<PatternResult, Failure> {
    for iteration in 1..=max_iterations {
        state.check_deadline()?;

        let prompt = prompt(goal, &state.tools_block(), &state.history.render());
        let reply = match state.ask(&prompt).await {
            Ok(reply) => reply,
            Err(failure) if failure.is_transient() => {
                state.observe(format!("Error: completion failed: {failure}"));
                continue;
            }
            Err(failure) => return Err(failure),
        };

        match parse_step(&reply) {
            Step::Final(answer) => {
                debug!(iteration, "ReAct reached a final answer");
                return Ok(PatternResult::new(answer, iteration));
            }
            Step::Act { thought, call } => {
                if let Some(thought) = thought {
                    state.observe(format!("Thought: {thought}"));
                }
                state.act(&call).await;
            }
            Step::Think(thought) => state.observe(format!("Thought: {thought}")),
        }
    }

    Err(state.budget_exhausted("react", max_iterations))
}
