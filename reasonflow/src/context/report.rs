//! Normalized pipeline output.

use super::TaskContext;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Result keys that may carry the answer, in priority order.
const ANSWER_KEYS: [&str; 3] = ["answer", "final_answer", "output"];

/// What a successful pipeline call returns.
///
/// Well-known result keys are lifted into typed fields; everything else a
/// stage stored is preserved in `extra` so custom stages lose nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    /// Run id of the invocation.
    pub run_id: Uuid,
    /// The final answer, if any stage produced one.
    pub answer: Option<String>,
    /// Reasoning pattern used.
    pub pattern: Option<String>,
    /// Completion resource used.
    pub resource: Option<String>,
    /// Iterations spent by the executor.
    pub iterations: Option<u64>,
    /// Council review summary.
    pub review: Option<Value>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
    /// Every other result key.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl TaskReport {
    /// Builds the report from a finished context.
    #[must_use]
    pub fn from_context(ctx: TaskContext) -> Self {
        let mut results = ctx.results;

        let mut answer = None;
        for key in ANSWER_KEYS {
            if let Some(value) = results.remove(key) {
                if answer.is_none() {
                    answer = value_to_text(value);
                }
            }
        }
        let iterations = results.remove("iterations").and_then(|v| v.as_u64());
        let review = results.remove("review");

        Self {
            run_id: ctx.run_id,
            answer,
            pattern: ctx.metadata.pattern.map(|p| p.to_string()),
            resource: ctx.metadata.resource.map(|r| r.id),
            iterations,
            review,
            warnings: ctx.warnings,
            extra: results,
        }
    }

    /// Renders the report for terminal output.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.answer.clone().unwrap_or_else(|| "(no answer)".to_string());
        for warning in &self.warnings {
            out.push_str("\nwarning: ");
            out.push_str(warning);
        }
        out
    }
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ReasoningPattern;
    use crate::pipeline::PipelineMode;
    use crate::resilience::SelectedResource;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_known_keys_are_lifted() {
        let mut ctx = TaskContext::new("q", PipelineMode::Direct)
            .with_pattern(ReasoningPattern::ReWoo);
        ctx.metadata.resource = Some(SelectedResource::new("primary", 0));
        ctx.set_result("answer", json!("done"));
        ctx.set_result("iterations", json!(4));
        ctx.add_warning("input truncated");

        let report = TaskReport::from_context(ctx);
        assert_eq!(report.answer.as_deref(), Some("done"));
        assert_eq!(report.pattern.as_deref(), Some("rewoo"));
        assert_eq!(report.resource.as_deref(), Some("primary"));
        assert_eq!(report.iterations, Some(4));
        assert_eq!(report.warnings, vec!["input truncated".to_string()]);
        assert!(report.extra.is_empty());
    }

    #[test]
    fn test_alias_keys_and_extra() {
        let mut ctx = TaskContext::new("q", PipelineMode::Direct);
        ctx.set_result("final_answer", json!("aliased"));
        ctx.set_result("custom_score", json!(0.9));

        let report = TaskReport::from_context(ctx);
        assert_eq!(report.answer.as_deref(), Some("aliased"));
        assert_eq!(report.extra.get("custom_score"), Some(&json!(0.9)));
        assert!(!report.extra.contains_key("final_answer"));
    }

    #[test]
    fn test_answer_key_wins_over_aliases() {
        let mut ctx = TaskContext::new("q", PipelineMode::Direct);
        ctx.set_result("output", json!("alias"));
        ctx.set_result("answer", json!("primary"));
        assert_eq!(
            TaskReport::from_context(ctx).answer.as_deref(),
            Some("primary")
        );
    }

    #[test]
    fn test_render_includes_warnings() {
        let mut ctx = TaskContext::new("q", PipelineMode::Direct);
        ctx.add_warning("w1");
        let rendered = TaskReport::from_context(ctx).render();
        assert_eq!(rendered, "(no answer)\nwarning: w1");
    }
}
