//! PreAct: plan everything up front, execute in order, repair with ReAct.

use super::protocol::{extract_answer, parse_plan, PlanStep};
use super::run::{is_failure_observation, RunState};
use super::{react, PatternResult};
use crate::core::Failure;
use tracing::{info, warn};

fn plan_prompt(goal: &str, tools: &str) -> String {
    format!(
        "Task: {goal}\n\nTools:\n{tools}\n\n\
         Write the complete plan before doing anything. One step per line, as\n\
         N. tool[input]\n\
         Append ` if: <text>` to a step that only makes sense when the previous\n\
         result mentions <text>."
    )
}

fn synthesis_prompt(goal: &str, history: &str) -> String {
    format!(
        "Task: {goal}\n\nResults of the executed plan:\n{history}\n\n\
         Reply with Final Answer: <answer>"
    )
}

/// Why a step no longer applies given the previous observation.
fn invalidation(step: &PlanStep, previous: Option<&str>) -> Option<String> {
    let previous = previous?;
    if is_failure_observation(previous) {
        return Some("the previous step failed".to_string());
    }
    let precondition = step.precondition.as_deref()?;
    if previous.to_lowercase().contains(&precondition.to_lowercase()) {
        None
    } else {
        Some(format!("precondition '{precondition}' not met"))
    }
}

pub(crate) async fn run(
    state: &mut RunState<'_>,
    goal: &str,
    max_iterations: usize,
) -> Result<PatternResult, Failure> {
    state.check_deadline()?;

    let plan_text = match state.ask(&plan_prompt(goal, &state.tools_block())).await {
        Ok(text) => text,
        Err(failure) if failure.is_transient() => {
            state.observe(format!("Error: planning failed: {failure}"));
            return repair(state, goal, max_iterations, 1).await;
        }
        Err(failure) => return Err(failure),
    };

    let steps = parse_plan(&plan_text);
    if steps.is_empty() {
        warn!("Planner produced no executable steps, falling back to ReAct");
        state.observe("Planner produced no executable steps");
        return repair(state, goal, max_iterations, 1).await;
    }
    info!(steps = steps.len(), "Executing plan");

    let mut iterations = 1;
    let mut previous: Option<String> = None;
    for step in &steps {
        state.check_deadline()?;

        if let Some(reason) = invalidation(step, previous.as_deref()) {
            info!(step = step.number, reason = %reason, "Plan step invalidated, repairing");
            state.observe(format!("Plan step {} invalidated: {reason}", step.number));
            return repair(state, goal, max_iterations, iterations).await;
        }
        // One iteration stays reserved for synthesis.
        if iterations + 2 > max_iterations {
            return Err(state.budget_exhausted("preact", max_iterations));
        }

        iterations += 1;
        previous = Some(state.act(&step.call).await);
    }

    state.check_deadline()?;
    if iterations >= max_iterations {
        return Err(state.budget_exhausted("preact", max_iterations));
    }
    let reply = state
        .ask(&synthesis_prompt(goal, &state.history.render()))
        .await?;
    Ok(PatternResult::new(extract_answer(&reply), iterations + 1))
}

/// Hands the remaining budget to a ReAct loop seeded with the history so far.
async fn repair(
    state: &mut RunState<'_>,
    goal: &str,
    max_iterations: usize,
    spent: usize,
) -> Result<PatternResult, Failure> {
    let remaining = max_iterations.saturating_sub(spent);
    if remaining == 0 {
        return Err(state.budget_exhausted("preact", max_iterations));
    }
    let repaired = react::run(state, goal, remaining).await?;
    Ok(PatternResult::new(repaired.answer, spent + repaired.iterations))
}
