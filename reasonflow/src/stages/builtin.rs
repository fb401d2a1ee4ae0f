//! Built-in stages registered by [`StageRegistry::with_builtins`](crate::pipeline::StageRegistry::with_builtins).

use super::Stage;
use crate::context::TaskContext;
use crate::core::{Failure, Outcome};
use crate::council::{CouncilReport, ReviewScope};
use crate::executor::{Deadline, ExecutionTask, ReasoningPattern};
use crate::pipeline::{EngineServices, PipelineMode};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Compact council summary stored under `results["review"]`.
pub(crate) fn review_summary(report: &CouncilReport) -> Value {
    json!({
        "converged": report.converged,
        "rounds": report.rounds.len(),
        "score": report.final_score,
        "oscillation_detected": report.oscillation_detected,
        "vetoed_by": report.rounds.last().map(|r| r.vetoed_by.clone()).unwrap_or_default(),
    })
}

fn require_resource(ctx: &TaskContext, stage: &str) -> Result<crate::resilience::SelectedResource, Failure> {
    ctx.resource().cloned().ok_or_else(|| {
        Failure::configuration(format!(
            "no completion resource selected; add the guard stage before {stage}"
        ))
    })
}

/// Validates the input and seeds the iteration budget.
#[derive(Debug, Clone)]
pub struct IntakeStage {
    max_iterations: usize,
}

impl IntakeStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(services: &EngineServices) -> Self {
        Self {
            max_iterations: services.config().limits.max_iterations,
        }
    }
}

#[async_trait]
impl Stage for IntakeStage {
    fn name(&self) -> &str {
        "intake"
    }

    async fn run(&self, mut ctx: TaskContext) -> Outcome<TaskContext> {
        if ctx.input.trim().is_empty() {
            return Outcome::fail(Failure::stage("input is empty"));
        }
        let length = ctx.input.chars().count();
        ctx.set_result("input_length", json!(length));
        ctx.metadata.budget_remaining.get_or_insert(self.max_iterations);
        debug!(length, budget = ?ctx.metadata.budget_remaining, "Input accepted");
        Outcome::ok(ctx)
    }
}

/// Selects the completion resource once for the invocation.
#[derive(Debug, Clone)]
pub struct GuardStage {
    services: EngineServices,
}

impl GuardStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(services: &EngineServices) -> Self {
        Self {
            services: services.clone(),
        }
    }
}

#[async_trait]
impl Stage for GuardStage {
    fn name(&self) -> &str {
        "guard"
    }

    async fn run(&self, mut ctx: TaskContext) -> Outcome<TaskContext> {
        if ctx.resource().is_some() {
            return Outcome::ok(ctx);
        }
        self.services
            .selector()
            .select(&self.services.config().resources)
            .map(|resource| {
                info!(resource = %resource.id, tier = resource.tier, "Resource selected");
                ctx.metadata.resource = Some(resource);
                ctx
            })
    }
}

/// Selects the reasoning pattern once: caller override or keyword heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteStage;

#[async_trait]
impl Stage for RouteStage {
    fn name(&self) -> &str {
        "route"
    }

    async fn run(&self, mut ctx: TaskContext) -> Outcome<TaskContext> {
        let pattern = *ctx
            .metadata
            .pattern
            .get_or_insert_with(|| ReasoningPattern::route(&ctx.input));
        info!(pattern = %pattern, "Pattern routed");
        Outcome::ok(ctx)
    }
}

/// Runs the executor for the routed pattern.
#[derive(Debug, Clone)]
pub struct ExecuteStage {
    services: EngineServices,
}

impl ExecuteStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(services: &EngineServices) -> Self {
        Self {
            services: services.clone(),
        }
    }

    async fn execute(&self, mut ctx: TaskContext) -> Result<TaskContext, Failure> {
        let resource = require_resource(&ctx, "execute")?;
        let pattern = *ctx
            .metadata
            .pattern
            .get_or_insert_with(|| ReasoningPattern::route(&ctx.input));

        let mut task = ExecutionTask::new(ctx.input.clone(), pattern, resource)
            .with_run_id(ctx.run_id)
            .deliberate(ctx.metadata.mode == PipelineMode::Deliberate);
        if let Some(budget) = ctx.metadata.budget_remaining {
            task = task.with_budget(budget);
        }

        let artifact = self.services.executor().run(&task).await.into_result()?;

        ctx.metadata.budget_remaining = ctx
            .metadata
            .budget_remaining
            .map(|budget| budget.saturating_sub(artifact.iterations));
        ctx.set_result("answer", json!(artifact.answer));
        ctx.set_result("iterations", json!(artifact.iterations));
        ctx.set_result("completion_calls", json!(artifact.completion_calls));
        if let Some(report) = &artifact.council {
            ctx.set_result("review", review_summary(report));
        }
        if let Some(trace) = &artifact.reflexion {
            ctx.set_result("reflexion", json!(trace));
        }
        Ok(ctx)
    }
}

#[async_trait]
impl Stage for ExecuteStage {
    fn name(&self) -> &str {
        "execute"
    }

    async fn run(&self, ctx: TaskContext) -> Outcome<TaskContext> {
        self.execute(ctx).await.into()
    }
}

/// One guarded completion call for the input.
#[derive(Debug, Clone)]
pub struct AskStage {
    services: EngineServices,
}

impl AskStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(services: &EngineServices) -> Self {
        Self {
            services: services.clone(),
        }
    }

    async fn ask(&self, mut ctx: TaskContext) -> Result<TaskContext, Failure> {
        let resource = require_resource(&ctx, "ask")?;
        let deadline = Deadline::start(self.services.config().limits.wall_clock_limit());
        let response = self
            .services
            .completion()
            .complete(&ctx.input, &resource, Some(&deadline))
            .await?;
        ctx.set_result("answer", json!(response.content));
        ctx.set_result("model", json!(response.model));
        Ok(ctx)
    }
}

#[async_trait]
impl Stage for AskStage {
    fn name(&self) -> &str {
        "ask"
    }

    async fn run(&self, ctx: TaskContext) -> Outcome<TaskContext> {
        self.ask(ctx).await.into()
    }
}

/// Checks the answer (or the input) against the content rules.
///
/// Findings are recorded under `results["lint"]`; malformed or slow patterns
/// count as no match and the stage never fails.
#[derive(Debug, Clone)]
pub struct LintStage {
    services: EngineServices,
}

impl LintStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(services: &EngineServices) -> Self {
        Self {
            services: services.clone(),
        }
    }
}

#[async_trait]
impl Stage for LintStage {
    fn name(&self) -> &str {
        "lint"
    }

    async fn run(&self, mut ctx: TaskContext) -> Outcome<TaskContext> {
        let (target, text) = match ctx.answer() {
            Some(answer) => ("answer", answer.to_string()),
            None => ("input", ctx.input.clone()),
        };

        let matcher = self.services.matcher();
        let mut findings = Vec::new();
        for (category, patterns) in &self.services.rules().categories {
            for pattern in patterns {
                if let Some(matched) = matcher.find(pattern, &text).await {
                    findings.push(json!({
                        "category": category,
                        "pattern": pattern,
                        "matched": matched,
                    }));
                }
            }
        }

        info!(target_field = target, findings = findings.len(), "Content rules checked");
        ctx.set_result(
            "lint",
            json!({
                "target": target,
                "findings": findings,
            }),
        );
        Outcome::ok(ctx)
    }
}

/// Submits the current answer to the council.
#[derive(Debug, Clone)]
pub struct ReviewStage {
    services: EngineServices,
}

impl ReviewStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(services: &EngineServices) -> Self {
        Self {
            services: services.clone(),
        }
    }

    async fn review(&self, mut ctx: TaskContext) -> Result<TaskContext, Failure> {
        let answer = ctx
            .answer()
            .map(str::to_string)
            .ok_or_else(|| Failure::stage("no answer to review"))?;
        let scope = ReviewScope {
            resource: ctx.resource().cloned(),
            deadline: Some(Deadline::start(
                self.services.config().limits.wall_clock_limit(),
            )),
        };

        let report = self
            .services
            .council()
            .converge(&ctx.input, &answer, &scope)
            .await
            .into_result()?;
        ctx.set_result("answer", json!(report.final_artifact));
        ctx.set_result("review", review_summary(&report));
        Ok(ctx)
    }
}

#[async_trait]
impl Stage for ReviewStage {
    fn name(&self) -> &str {
        "review"
    }

    async fn run(&self, ctx: TaskContext) -> Outcome<TaskContext> {
        self.review(ctx).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorCategory;
    use crate::resilience::SelectedResource;
    use crate::testing::{test_config, test_services, ScriptedCompletionService};
    use pretty_assertions::assert_eq;

    fn ctx(input: &str) -> TaskContext {
        TaskContext::new(input, PipelineMode::Direct)
    }

    #[tokio::test]
    async fn test_intake_rejects_blank_input() {
        let services = test_services(test_config(), ScriptedCompletionService::new()).unwrap();
        let failure = IntakeStage::new(&services)
            .run(ctx("   "))
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(failure.message, "input is empty");
    }

    #[tokio::test]
    async fn test_intake_seeds_budget() {
        let services = test_services(test_config(), ScriptedCompletionService::new()).unwrap();
        let ctx = IntakeStage::new(&services)
            .run(ctx("héllo"))
            .await
            .into_result()
            .unwrap();
        assert_eq!(ctx.result("input_length"), Some(&json!(5)));
        assert_eq!(ctx.metadata.budget_remaining, Some(10));
    }

    #[tokio::test]
    async fn test_guard_fails_when_all_circuits_open() {
        let services = test_services(test_config(), ScriptedCompletionService::new()).unwrap();
        for _ in 0..3 {
            services.breaker().record_failure("primary");
            services.breaker().record_failure("fallback");
        }
        let failure = GuardStage::new(&services)
            .run(ctx("q"))
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(failure.category, ErrorCategory::Guard);
    }

    #[tokio::test]
    async fn test_guard_falls_back_to_next_tier() {
        let services = test_services(test_config(), ScriptedCompletionService::new()).unwrap();
        for _ in 0..3 {
            services.breaker().record_failure("primary");
        }
        let ctx = GuardStage::new(&services).run(ctx("q")).await.into_result().unwrap();
        assert_eq!(ctx.resource().map(|r| r.id.as_str()), Some("fallback"));
    }

    #[tokio::test]
    async fn test_route_keeps_override() {
        let routed = RouteStage
            .run(ctx("compare the two crates").with_pattern(ReasoningPattern::Reflexion))
            .await
            .into_result()
            .unwrap();
        assert_eq!(routed.metadata.pattern, Some(ReasoningPattern::Reflexion));

        let routed = RouteStage.run(ctx("compare the two crates")).await.into_result().unwrap();
        assert_eq!(routed.metadata.pattern, Some(ReasoningPattern::ReWoo));
    }

    #[tokio::test]
    async fn test_ask_requires_resource() {
        let services = test_services(test_config(), ScriptedCompletionService::new()).unwrap();
        let failure = AskStage::new(&services).run(ctx("q")).await.into_result().unwrap_err();
        assert_eq!(failure.category, ErrorCategory::Configuration);
    }

    #[tokio::test]
    async fn test_lint_records_findings_and_ignores_bad_patterns() {
        let config = test_config()
            .with_content_rule("placeholders", vec!["lorem ipsum".to_string(), "(unclosed".to_string()])
            .with_content_rule("hedging", vec![r"\bmaybe\b".to_string()]);
        let services = test_services(config, ScriptedCompletionService::new()).unwrap();

        let mut input = ctx("q");
        input.set_result("answer", json!("Lorem Ipsum dolor"));
        let linted = LintStage::new(&services).run(input).await.into_result().unwrap();

        let lint = linted.result("lint").unwrap();
        assert_eq!(lint["target"], "answer");
        let findings = lint["findings"].as_array().unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0]["category"], "placeholders");
        assert_eq!(findings[0]["matched"], "Lorem Ipsum");
    }

    #[tokio::test]
    async fn test_review_requires_answer() {
        let services = test_services(test_config(), ScriptedCompletionService::new()).unwrap();
        let failure = ReviewStage::new(&services).run(ctx("q")).await.into_result().unwrap_err();
        assert_eq!(failure.message, "no answer to review");
    }

    #[tokio::test]
    async fn test_review_stores_summary() {
        let services = test_services(test_config(), ScriptedCompletionService::new()).unwrap();
        let mut input = ctx("q");
        input.metadata.resource = Some(SelectedResource::new("primary", 0));
        input.set_result("answer", json!("ship it"));

        let reviewed = ReviewStage::new(&services).run(input).await.into_result().unwrap();
        assert_eq!(reviewed.answer(), Some("ship it"));
        assert_eq!(reviewed.result("review").unwrap()["converged"], true);
    }
}
