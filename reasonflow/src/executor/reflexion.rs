//! Reflexion: attempt, evaluate, learn a lesson, retry from the original goal.
//!
//! Each attempt prompt is built fresh from the immutable original goal plus
//! the lessons so far. Earlier prompts are never edited or appended to.

use super::protocol::extract_answer;
use super::run::RunState;
use super::PatternResult;
use crate::core::Failure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt::Write as _;
use tracing::{debug, info};

/// Verdict on one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whether the attempt solves the goal.
    pub passed: bool,
    /// What was wrong or right with it.
    pub feedback: String,
}

impl Evaluation {
    /// A passing evaluation.
    #[must_use]
    pub fn pass(feedback: impl Into<String>) -> Self {
        Self {
            passed: true,
            feedback: feedback.into(),
        }
    }

    /// A failing evaluation.
    #[must_use]
    pub fn fail(feedback: impl Into<String>) -> Self {
        Self {
            passed: false,
            feedback: feedback.into(),
        }
    }

    /// Parses a `PASS`/`FAIL: <reason>` reply. Anything else fails.
    #[must_use]
    pub fn parse(reply: &str) -> Self {
        let trimmed = reply.trim();
        let (verdict, rest) = trimmed
            .split_once([':', '\n', ' '])
            .unwrap_or((trimmed, ""));
        let feedback = rest.trim().to_string();
        if verdict.eq_ignore_ascii_case("pass") {
            Self::pass(feedback)
        } else if verdict.eq_ignore_ascii_case("fail") {
            Self::fail(feedback)
        } else {
            Self::fail(format!("unrecognized evaluation: {trimmed}"))
        }
    }
}

/// Judges whether an attempt satisfies the goal.
///
/// When no evaluator is installed, the executor asks the completion service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Evaluates `answer` against `goal`.
    async fn evaluate(&self, goal: &str, answer: &str) -> Result<Evaluation, Failure>;
}

/// Record of a reflexion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflexionTrace {
    /// The goal exactly as given.
    pub original_goal: String,
    /// Every attempt prompt, in order.
    pub prompts: Vec<String>,
    /// Lessons learned from failed attempts.
    pub lessons: Vec<String>,
}

impl ReflexionTrace {
    fn new(goal: &str) -> Self {
        Self {
            original_goal: goal.to_string(),
            prompts: Vec::new(),
            lessons: Vec::new(),
        }
    }

    fn attempt_prompt(&self) -> String {
        let mut prompt = format!("Task: {}\n", self.original_goal);
        if !self.lessons.is_empty() {
            prompt.push_str("\nLessons from earlier attempts:\n");
            for lesson in &self.lessons {
                let _ = writeln!(prompt, "- {lesson}");
            }
        }
        prompt.push_str("\nReply with Final Answer: <answer>");
        prompt
    }
}

fn evaluation_prompt(goal: &str, answer: &str) -> String {
    format!(
        "Task: {goal}\n\nProposed answer:\n{answer}\n\n\
         Does the answer fully solve the task? Reply `PASS` or `FAIL: <what is wrong>`."
    )
}

fn lesson_prompt(goal: &str, answer: &str, feedback: &str) -> String {
    format!(
        "Task: {goal}\n\nA previous answer was rejected.\nAnswer:\n{answer}\nFeedback: {feedback}\n\n\
         State in one sentence what to do differently next time."
    )
}

pub(crate) async fn run(
    state: &mut RunState<'_>,
    goal: &str,
    max_attempts: usize,
    evaluator: Option<&dyn Evaluator>,
) -> Result<PatternResult, Failure> {
    let mut trace = ReflexionTrace::new(goal);
    let mut last_answer: Option<String> = None;

    for attempt in 1..=max_attempts {
        if let Err(failure) = state.check_deadline() {
            return Err(with_trace(failure, &trace, last_answer.as_deref()));
        }

        let prompt = trace.attempt_prompt();
        trace.prompts.push(prompt.clone());

        let answer = match state.ask(&prompt).await {
            Ok(reply) => extract_answer(&reply),
            Err(failure) if failure.is_transient() => {
                trace
                    .lessons
                    .push(format!("Attempt {attempt} produced no answer ({failure})."));
                continue;
            }
            Err(failure) => return Err(with_trace(failure, &trace, last_answer.as_deref())),
        };
        state.observe(format!("Attempt {attempt}: {answer}"));

        let evaluation = match evaluator {
            Some(evaluator) => evaluator.evaluate(&trace.original_goal, &answer).await,
            None => state
                .ask(&evaluation_prompt(&trace.original_goal, &answer))
                .await
                .map(|reply| Evaluation::parse(&reply)),
        };
        let evaluation = match evaluation {
            Ok(evaluation) => evaluation,
            Err(failure) if failure.is_transient() => {
                Evaluation::fail(format!("evaluation unavailable: {failure}"))
            }
            Err(failure) => return Err(with_trace(failure, &trace, Some(&answer))),
        };

        if evaluation.passed {
            info!(attempt, "Reflexion attempt passed");
            return Ok(PatternResult::new(answer, attempt).with_reflexion(trace));
        }

        debug!(attempt, feedback = %evaluation.feedback, "Reflexion attempt failed");
        let lesson = match state
            .ask(&lesson_prompt(&trace.original_goal, &answer, &evaluation.feedback))
            .await
        {
            Ok(reply) => reply.trim().to_string(),
            Err(failure) if failure.is_transient() => evaluation.feedback.clone(),
            Err(failure) => return Err(with_trace(failure, &trace, Some(&answer))),
        };
        trace.lessons.push(lesson);
        last_answer = Some(answer);
    }

    let failure = Failure::termination(format!(
        "reflexion found no passing answer after {max_attempts} attempts"
    ));
    Err(with_trace(failure, &trace, last_answer.as_deref()))
}

/// Adds the trace to the failure's partial result, keeping what is already there.
fn with_trace(mut failure: Failure, trace: &ReflexionTrace, last_answer: Option<&str>) -> Failure {
    let mut partial = match failure.partial.take() {
        Some(Value::Object(fields)) => fields,
        Some(other) => {
            let mut fields = Map::new();
            fields.insert("previous".to_string(), other);
            fields
        }
        None => Map::new(),
    };
    partial.insert("last_answer".to_string(), json!(last_answer));
    partial.insert("trace".to_string(), json!(trace));
    failure.with_partial(Value::Object(partial))
}
