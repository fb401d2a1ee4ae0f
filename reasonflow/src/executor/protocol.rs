//! Line protocol spoken between the patterns and the completion service.
//!
//! ```text
//! Thought: I should list the directory first.
//! Action: read_file[README.md]
//! ...
//! Final Answer: the project is a CLI.
//! ```

use crate::tools::ToolCall;
use once_cell::sync::Lazy;
use regex::Regex;

#[allow(clippy::expect_used)]
static FINAL_ANSWER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)final\s+answer\s*:\s*(.*)$").expect("valid regex"));

#[allow(clippy::expect_used)]
static ACTION_BRACKETED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(?:^|\n)\s*action\s*:\s*([a-z_][\w-]*)\s*\[(.*?)\][ \t]*(?:\r?\n|$)")
        .expect("valid regex")
});

#[allow(clippy::expect_used)]
static ACTION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*action\s*:\s*([a-z_][\w-]*)\s*$").expect("valid regex")
});

#[allow(clippy::expect_used)]
static ACTION_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)action\s+input\s*:\s*(.*)$").expect("valid regex"));

#[allow(clippy::expect_used)]
static THOUGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*thought\s*:\s*(.+)$").expect("valid regex"));

#[allow(clippy::expect_used)]
static PLAN_STEP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+)[.)]\s*([a-z_][\w-]*)\s*\[(.*)\]\s*(?:if\s*:\s*(.+))?$")
        .expect("valid regex")
});

#[allow(clippy::expect_used)]
static EVIDENCE_STEP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*#e(\d+)\s*=\s*([a-z_][\w-]*)\s*\[(.*)\]\s*$").expect("valid regex")
});

#[allow(clippy::expect_used)]
static EVIDENCE_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"#E(\d+)").expect("valid regex"));

/// One parsed completion turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The model is done.
    Final(String),
    /// The model wants a tool run.
    Act {
        /// Reasoning that preceded the action, if stated.
        thought: Option<String>,
        /// The requested call.
        call: ToolCall,
    },
    /// Reasoning only; no action and no answer.
    Think(String),
}

/// Parses a ReAct-style completion. When both an action and a final answer
/// appear, whichever comes first wins.
#[must_use]
pub fn parse_step(text: &str) -> Step {
    let final_answer = FINAL_ANSWER.captures(text);
    let action = parse_action(text);

    let final_pos = final_answer
        .as_ref()
        .and_then(|c| c.get(0))
        .map(|m| m.start());
    match (action, final_pos) {
        (Some((pos, call)), Some(fpos)) if pos < fpos => Step::Act {
            thought: parse_thought(text),
            call,
        },
        (_, Some(_)) => Step::Final(
            final_answer
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
        ),
        (Some((_, call)), None) => Step::Act {
            thought: parse_thought(text),
            call,
        },
        (None, None) => Step::Think(parse_thought(text).unwrap_or_else(|| text.trim().to_string())),
    }
}

fn parse_action(text: &str) -> Option<(usize, ToolCall)> {
    if let Some(caps) = ACTION_BRACKETED.captures(text) {
        let whole = caps.get(0)?;
        return Some((
            whole.start(),
            ToolCall::new(&caps[1], caps[2].trim()),
        ));
    }

    let name = ACTION_NAME.captures(text)?;
    let start = name.get(0)?.start();
    let input = ACTION_INPUT
        .captures(&text[start..])
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    Some((start, ToolCall::new(&name[1], input)))
}

fn parse_thought(text: &str) -> Option<String> {
    THOUGHT
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Extracts the answer from a free-form completion.
#[must_use]
pub fn extract_answer(text: &str) -> String {
    FINAL_ANSWER
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or_else(|| text.trim().to_string(), |m| m.as_str().trim().to_string())
}

/// A PreAct plan step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// Step number as written by the planner.
    pub number: usize,
    /// The call to make.
    pub call: ToolCall,
    /// Text the previous observation must contain for this step to still apply.
    pub precondition: Option<String>,
}

/// Parses `N. tool[input] if: <text>` plan lines.
#[must_use]
pub fn parse_plan(text: &str) -> Vec<PlanStep> {
    text.lines()
        .filter_map(|line| {
            let caps = PLAN_STEP.captures(line)?;
            Some(PlanStep {
                number: caps[1].parse().ok()?,
                call: ToolCall::new(&caps[2], caps[3].trim()),
                precondition: caps
                    .get(4)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|s| !s.is_empty()),
            })
        })
        .collect()
}

/// A ReWOO evidence step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceStep {
    /// Evidence index (`#E<index>`).
    pub index: usize,
    /// The call whose input may reference earlier evidence.
    pub call: ToolCall,
}

/// Parses `#En = tool[input]` plan lines.
#[must_use]
pub fn parse_evidence_plan(text: &str) -> Vec<EvidenceStep> {
    text.lines()
        .filter_map(|line| {
            let caps = EVIDENCE_STEP.captures(line)?;
            Some(EvidenceStep {
                index: caps[1].parse().ok()?,
                call: ToolCall::new(&caps[2], caps[3].trim()),
            })
        })
        .collect()
}

/// Replaces `#En` references with collected evidence; unknown references stay.
#[must_use]
pub fn substitute_evidence(input: &str, evidence: &std::collections::BTreeMap<usize, String>) -> String {
    EVIDENCE_REF
        .replace_all(input, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| evidence.get(&i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
