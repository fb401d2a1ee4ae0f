//! ReWOO: plan with evidence placeholders, execute once, solve once.

use super::protocol::{extract_answer, parse_evidence_plan, substitute_evidence};
use super::run::RunState;
use super::PatternResult;
use crate::core::Failure;
use crate::tools::ToolCall;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::info;

fn plan_prompt(goal: &str, tools: &str) -> String {
    format!(
        "Task: {goal}\n\nTools:\n{tools}\n\n\
         Plan how to gather the evidence you need. For each piece of evidence write\n\
         Plan: <why>\n#E<n> = tool[input]\n\
         Inputs may refer to earlier evidence as #E<n>."
    )
}

fn solver_prompt(goal: &str, plan: &str, evidence: &BTreeMap<usize, String>) -> String {
    let mut collected = String::new();
    for (index, value) in evidence {
        let _ = writeln!(collected, "#E{index} = {value}");
    }
    if collected.is_empty() {
        collected.push_str("(no evidence collected)\n");
    }
    format!(
        "Task: {goal}\n\nPlan:\n{plan}\n\nEvidence:\n{collected}\n\
         Using only this evidence, reply with Final Answer: <answer>"
    )
}

pub(crate) async fn run(
    state: &mut RunState<'_>,
    goal: &str,
    max_iterations: usize,
) -> Result<PatternResult, Failure> {
    state.check_deadline()?;
    let plan = state.ask(&plan_prompt(goal, &state.tools_block())).await?;
    let steps = parse_evidence_plan(&plan);
    info!(steps = steps.len(), "Executing evidence plan");

    let mut iterations = 1;
    let mut evidence = BTreeMap::new();
    for step in &steps {
        state.check_deadline()?;
        // One iteration stays reserved for the solver.
        if iterations + 2 > max_iterations {
            return Err(state.budget_exhausted("rewoo", max_iterations));
        }

        let call = ToolCall::new(
            step.call.name.clone(),
            substitute_evidence(&step.call.raw_input, &evidence),
        );
        let observation = state.act(&call).await;
        evidence.insert(step.index, observation);
        iterations += 1;
    }

    state.check_deadline()?;
    if iterations >= max_iterations {
        return Err(state.budget_exhausted("rewoo", max_iterations));
    }
    let reply = state.ask(&solver_prompt(goal, &plan, &evidence)).await?;
    Ok(PatternResult::new(extract_answer(&reply), iterations + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_prompt_lists_evidence() {
        let mut evidence = BTreeMap::new();
        evidence.insert(2, "beta".to_string());
        evidence.insert(1, "alpha".to_string());
        let prompt = solver_prompt("goal", "#E1 = a[b]", &evidence);
        let alpha = prompt.find("#E1 = alpha").unwrap();
        let beta = prompt.find("#E2 = beta").unwrap();
        assert!(alpha < beta);
    }

    #[test]
    fn test_solver_prompt_without_evidence() {
        assert!(solver_prompt("goal", "", &BTreeMap::new()).contains("(no evidence collected)"));
    }
}
