//! Pattern-level tests driving the executor with scripted completions.

use super::*;
use crate::config::{CouncilConfig, SanitizerConfig};
use crate::council::Verdict;
use crate::resilience::CircuitBreaker;
use crate::storage::InMemoryStore;
use crate::testing::{EchoReviser, RecordingTool, ScriptedCompletionService, StaticReviewer};
use crate::tools::ToolKind;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::Duration;

fn executor_with(service: ScriptedCompletionService, tools: ToolRegistry, limits: Limits) -> Executor {
    let breaker = Arc::new(CircuitBreaker::new(limits.failures_before_trip));
    let completion = GuardedCompletion::new(Arc::new(service), breaker, limits.call_timeout());
    let sanitizer = Sanitizer::new(
        &SanitizerConfig {
            working_root: Some(PathBuf::from("/srv/workspace")),
            ..SanitizerConfig::default()
        },
        limits.regex_timeout(),
    )
    .unwrap();
    Executor::new(completion, Arc::new(tools), sanitizer, limits)
}

fn executor(service: ScriptedCompletionService, tools: ToolRegistry) -> Executor {
    executor_with(service, tools, Limits::default())
}

fn task(goal: &str, pattern: ReasoningPattern) -> ExecutionTask {
    ExecutionTask::new(goal, pattern, SelectedResource::new("primary", 0))
}

#[test]
fn test_pattern_names_round_trip_through_display() {
    for pattern in ReasoningPattern::ALL {
        assert_eq!(pattern.to_string().parse::<ReasoningPattern>(), Ok(pattern));
    }
    assert_eq!("ReWOO".parse::<ReasoningPattern>(), Ok(ReasoningPattern::ReWoo));
    assert!("tree-of-thought".parse::<ReasoningPattern>().is_err());
}

#[test]
fn test_route_heuristic() {
    assert_eq!(ReasoningPattern::route("refine this paragraph"), ReasoningPattern::Reflexion);
    assert_eq!(ReasoningPattern::route("Compare tokio and async-std"), ReasoningPattern::ReWoo);
    assert_eq!(
        ReasoningPattern::route("build it step by step"),
        ReasoningPattern::PreAct
    );
    assert_eq!(ReasoningPattern::route("what time is it"), ReasoningPattern::ReAct);
}

#[tokio::test]
async fn test_react_uses_tool_and_answers() {
    let search = RecordingTool::new("search").with_reply("rust is a language");
    let service = ScriptedCompletionService::new()
        .then_reply("Thought: I should look it up\nAction: search[rust]")
        .then_reply("Final Answer: found it");
    let executor = executor(service.clone(), ToolRegistry::new().with_tool(Arc::new(search.clone())));

    let artifact = executor
        .run(&task("what is rust", ReasoningPattern::ReAct))
        .await
        .into_result()
        .unwrap();

    assert_eq!(artifact.answer, "found it");
    assert_eq!(artifact.iterations, 2);
    assert_eq!(artifact.completion_calls, 2);
    assert_eq!(search.calls(), vec!["rust"]);
    assert!(artifact
        .history
        .iter()
        .any(|e| e.observation == "search[rust] => rust is a language"));
    assert!(service.prompts()[1].contains("rust is a language"));
}

#[tokio::test]
async fn test_blocked_call_never_reaches_tool() {
    let shell = RecordingTool::new("shell").with_kind(ToolKind::Command);
    let service = ScriptedCompletionService::new()
        .then_reply("Action: shell[rm -rf /]")
        .then_reply("Final Answer: gave up");
    let executor = executor(service.clone(), ToolRegistry::new().with_tool(Arc::new(shell.clone())));

    let artifact = executor
        .run(&task("clean the disk", ReasoningPattern::ReAct))
        .await
        .into_result()
        .unwrap();

    assert!(shell.calls().is_empty());
    assert!(artifact
        .history
        .iter()
        .any(|e| e.observation.starts_with("shell[rm -rf /] => BLOCKED")));
    assert!(service.prompts()[1].contains("BLOCKED"));
}

#[tokio::test]
async fn test_unknown_tool_becomes_observation() {
    let service = ScriptedCompletionService::new()
        .then_reply("Action: teleport[mars]")
        .then_reply("Final Answer: stayed home");
    let executor = executor(service, ToolRegistry::new());

    let artifact = executor
        .run(&task("go to mars", ReasoningPattern::ReAct))
        .await
        .into_result()
        .unwrap();
    assert!(artifact.history[0].observation.contains("Error: Tool not found: teleport"));
}

#[tokio::test]
async fn test_react_budget_exhaustion_is_termination() {
    let service = ScriptedCompletionService::new().with_fallback("Thought: still pondering");
    let limits = Limits {
        max_iterations: 3,
        ..Limits::default()
    };
    let executor = executor_with(service.clone(), ToolRegistry::new(), limits);

    let failure = executor
        .run(&task("ponder", ReasoningPattern::ReAct))
        .await
        .into_result()
        .unwrap_err();

    assert!(failure.is_termination());
    assert_eq!(service.call_count(), 3);
    assert_eq!(
        failure.partial.unwrap()["last_observation"],
        "Thought: still pondering"
    );
}

#[tokio::test(start_paused = true)]
async fn test_deadline_failure_carries_last_observation() {
    let service = ScriptedCompletionService::new()
        .then_reply("Thought: first idea")
        .then_delay(Duration::from_secs(30), "Final Answer: too late");
    let limits = Limits {
        wall_clock_limit_secs: 5.0,
        ..Limits::default()
    };
    let executor = executor_with(service, ToolRegistry::new(), limits);

    let failure = executor
        .run(&task("slow task", ReasoningPattern::ReAct))
        .await
        .into_result()
        .unwrap_err();

    assert!(failure.is_termination());
    assert!(failure.message.contains("wall-clock limit"));
    let last = failure.partial.unwrap()["last_observation"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(last.starts_with("Error: completion failed"));
}

#[tokio::test]
async fn test_reflexion_keeps_original_goal() {
    let goal = "add two and two";
    let service = ScriptedCompletionService::new().with_fallback("Final Answer: 5");
    let mut evaluator = MockEvaluator::new();
    evaluator
        .expect_evaluate()
        .withf(|g, _answer| g.to_string() == "add two and two")
        .times(3)
        .returning(|_, _| Ok(Evaluation::fail("arithmetic is wrong")));
    let executor = executor(service, ToolRegistry::new()).with_evaluator(Arc::new(evaluator));

    let failure = executor
        .run(&task(goal, ReasoningPattern::Reflexion))
        .await
        .into_result()
        .unwrap_err();

    assert!(failure.is_termination());
    let partial = failure.partial.unwrap();
    assert_eq!(partial["last_answer"], "5");
    let trace: ReflexionTrace = serde_json::from_value(partial["trace"].clone()).unwrap();
    assert_eq!(trace.original_goal.as_bytes(), goal.as_bytes());
    assert_eq!(trace.prompts.len(), 3);
    assert_eq!(trace.lessons.len(), 3);
    for prompt in &trace.prompts {
        assert!(prompt.starts_with("Task: add two and two\n"));
    }
    assert_ne!(trace.prompts[0], trace.prompts[1]);
    assert_ne!(trace.prompts[1], trace.prompts[2]);
}

#[tokio::test]
async fn test_reflexion_passes_on_second_attempt() {
    let service = ScriptedCompletionService::new()
        .then_reply("Final Answer: 5")
        .then_reply("Double-check the sum.")
        .then_reply("Final Answer: 4");
    let mut evaluator = MockEvaluator::new();
    let mut calls = 0;
    evaluator.expect_evaluate().times(2).returning(move |_, _| {
        calls += 1;
        if calls == 1 {
            Ok(Evaluation::fail("wrong"))
        } else {
            Ok(Evaluation::pass("correct"))
        }
    });
    let executor = executor(service, ToolRegistry::new()).with_evaluator(Arc::new(evaluator));

    let artifact = executor
        .run(&task("add two and two", ReasoningPattern::Reflexion))
        .await
        .into_result()
        .unwrap();

    assert_eq!(artifact.answer, "4");
    assert_eq!(artifact.iterations, 2);
    let trace = artifact.reflexion.unwrap();
    assert_eq!(trace.lessons, vec!["Double-check the sum.".to_string()]);
    assert!(trace.prompts[1].contains("- Double-check the sum."));
}

#[tokio::test]
async fn test_preact_repairs_invalidated_plan() {
    let search = RecordingTool::new("search").with_reply("no results");
    let service = ScriptedCompletionService::new()
        .then_reply("1. search[tokio]\n2. search[tokio docs] if: found")
        .then_reply("Final Answer: nothing to report");
    let executor = executor(service, ToolRegistry::new().with_tool(Arc::new(search.clone())));

    let artifact = executor
        .run(&task("find tokio docs", ReasoningPattern::PreAct))
        .await
        .into_result()
        .unwrap();

    assert_eq!(artifact.answer, "nothing to report");
    assert_eq!(artifact.iterations, 3);
    assert_eq!(search.calls(), vec!["tokio"]);
    assert!(artifact
        .history
        .iter()
        .any(|e| e.observation == "Plan step 2 invalidated: precondition 'found' not met"));
}

#[tokio::test]
async fn test_preact_runs_valid_plan_then_synthesizes() {
    let search = RecordingTool::new("search").with_reply("found 3 pages");
    let service = ScriptedCompletionService::new()
        .then_reply("1. search[tokio]\n2. search[tokio docs] if: found")
        .then_reply("Final Answer: three pages");
    let executor = executor(service, ToolRegistry::new().with_tool(Arc::new(search.clone())));

    let artifact = executor
        .run(&task("find tokio docs", ReasoningPattern::PreAct))
        .await
        .into_result()
        .unwrap();

    assert_eq!(artifact.answer, "three pages");
    assert_eq!(search.calls(), vec!["tokio", "tokio docs"]);
    assert_eq!(artifact.iterations, 4);
}

#[tokio::test]
async fn test_rewoo_substitutes_evidence() {
    let search = RecordingTool::new("search").with_reply("rust-1.80");
    let lookup = RecordingTool::new("lookup").with_reply("released 2024");
    let service = ScriptedCompletionService::new()
        .then_reply("Plan: find the version\n#E1 = search[rust]\nPlan: date it\n#E2 = lookup[#E1 release]")
        .then_reply("Final Answer: 2024");
    let tools = ToolRegistry::new()
        .with_tool(Arc::new(search))
        .with_tool(Arc::new(lookup.clone()));
    let executor = executor(service.clone(), tools);

    let artifact = executor
        .run(&task("when was the latest rust released", ReasoningPattern::ReWoo))
        .await
        .into_result()
        .unwrap();

    assert_eq!(artifact.answer, "2024");
    assert_eq!(lookup.calls(), vec!["rust-1.80 release"]);
    assert_eq!(artifact.completion_calls, 2);
    let solver_prompt = &service.prompts()[1];
    assert!(solver_prompt.contains("#E1 = rust-1.80"));
    assert!(solver_prompt.contains("#E2 = released 2024"));
}

fn capped(max_iterations: usize) -> Limits {
    Limits {
        max_iterations,
        ..Limits::default()
    }
}

#[tokio::test]
async fn test_preact_synthesis_stays_within_iteration_cap() {
    let search = RecordingTool::new("search").with_reply("found it");
    let service = ScriptedCompletionService::new()
        .then_reply("1. search[tokio]")
        .then_reply("Final Answer: found");
    let executor = executor_with(
        service,
        ToolRegistry::new().with_tool(Arc::new(search.clone())),
        capped(3),
    );

    let artifact = executor
        .run(&task("find tokio", ReasoningPattern::PreAct))
        .await
        .into_result()
        .unwrap();

    assert_eq!(artifact.answer, "found");
    assert_eq!(artifact.iterations, 3);
    assert_eq!(search.calls(), vec!["tokio"]);
}

#[tokio::test]
async fn test_preact_without_room_for_synthesis_is_termination() {
    let search = RecordingTool::new("search").with_reply("found it");
    let service = ScriptedCompletionService::new()
        .then_reply("1. search[tokio]")
        .then_reply("Final Answer: found");
    let executor = executor_with(
        service.clone(),
        ToolRegistry::new().with_tool(Arc::new(search.clone())),
        capped(2),
    );

    let failure = executor
        .run(&task("find tokio", ReasoningPattern::PreAct))
        .await
        .into_result()
        .unwrap_err();

    assert!(failure.is_termination());
    assert!(search.calls().is_empty());
    assert_eq!(service.call_count(), 1);
}

#[tokio::test]
async fn test_rewoo_stays_within_iteration_cap() {
    let plan = "Plan: look\n#E1 = search[rust]";
    let search = RecordingTool::new("search").with_reply("rust-1.80");

    let service = ScriptedCompletionService::new()
        .then_reply(plan)
        .then_reply("Final Answer: 1.80");
    let executor = executor_with(
        service,
        ToolRegistry::new().with_tool(Arc::new(search.clone())),
        capped(3),
    );
    let artifact = executor
        .run(&task("latest rust", ReasoningPattern::ReWoo))
        .await
        .into_result()
        .unwrap();
    assert_eq!(artifact.iterations, 3);

    let service = ScriptedCompletionService::new()
        .then_reply(plan)
        .then_reply("Final Answer: 1.80");
    let executor = executor_with(
        service.clone(),
        ToolRegistry::new().with_tool(Arc::new(search.clone())),
        capped(2),
    );
    let failure = executor
        .run(&task("latest rust", ReasoningPattern::ReWoo))
        .await
        .into_result()
        .unwrap_err();
    assert!(failure.is_termination());
    assert_eq!(service.call_count(), 1);
    // Only the first run reached the tool.
    assert_eq!(search.calls(), vec!["rust"]);
}

#[tokio::test]
async fn test_rewoo_empty_plan_solves_within_cap() {
    let service = ScriptedCompletionService::new()
        .then_reply("no tools needed")
        .then_reply("Final Answer: 4");
    let executor = executor_with(service, ToolRegistry::new(), capped(2));

    let artifact = executor
        .run(&task("add two and two", ReasoningPattern::ReWoo))
        .await
        .into_result()
        .unwrap();

    assert_eq!(artifact.answer, "4");
    assert_eq!(artifact.iterations, 2);
}

#[tokio::test]
async fn test_reflexion_attempts_respect_task_budget() {
    let service = ScriptedCompletionService::new().with_fallback("Final Answer: 5");
    let mut evaluator = MockEvaluator::new();
    evaluator
        .expect_evaluate()
        .times(1)
        .returning(|_, _| Ok(Evaluation::fail("wrong")));
    let executor =
        executor(service.clone(), ToolRegistry::new()).with_evaluator(Arc::new(evaluator));

    let failure = executor
        .run(&task("add two and two", ReasoningPattern::Reflexion).with_budget(1))
        .await
        .into_result()
        .unwrap_err();

    assert!(failure.is_termination());
    // One attempt plus its lesson.
    assert_eq!(service.call_count(), 2);
    let trace: ReflexionTrace =
        serde_json::from_value(failure.partial.unwrap()["trace"].clone()).unwrap();
    assert_eq!(trace.prompts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reflexion_deadline_keeps_last_observation() {
    let service = ScriptedCompletionService::new()
        .then_reply("Final Answer: 5")
        .then_delay(Duration::from_secs(30), "Add more carefully.");
    let mut evaluator = MockEvaluator::new();
    evaluator
        .expect_evaluate()
        .returning(|_, _| Ok(Evaluation::fail("wrong")));
    let limits = Limits {
        wall_clock_limit_secs: 5.0,
        ..Limits::default()
    };
    let executor =
        executor_with(service, ToolRegistry::new(), limits).with_evaluator(Arc::new(evaluator));

    let failure = executor
        .run(&task("add two and two", ReasoningPattern::Reflexion))
        .await
        .into_result()
        .unwrap_err();

    assert!(failure.is_termination());
    assert!(failure.message.contains("wall-clock limit"));
    let partial = failure.partial.unwrap();
    assert_eq!(partial["last_observation"], "Attempt 1: 5");
    assert_eq!(partial["last_answer"], "5");
    assert_eq!(partial["trace"]["prompts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_zero_budget_fails_before_any_call() {
    let service = ScriptedCompletionService::new().then_reply("Final Answer: x");
    let executor = executor(service.clone(), ToolRegistry::new());

    let failure = executor
        .run(&task("q", ReasoningPattern::ReAct).with_budget(0))
        .await
        .into_result()
        .unwrap_err();
    assert!(failure.is_termination());
    assert_eq!(service.call_count(), 0);
}

#[tokio::test]
async fn test_history_is_persisted() {
    let store = Arc::new(InMemoryStore::new());
    let service = ScriptedCompletionService::new()
        .then_reply("Thought: hmm")
        .then_reply("Final Answer: done");
    let executor = executor(service, ToolRegistry::new()).with_store(store.clone());
    let task = task("q", ReasoningPattern::ReAct);

    executor.run(&task).await.into_result().unwrap();

    let saved = store.get(&format!("history:{}", task.run_id)).unwrap().unwrap();
    assert_eq!(saved[0]["observation"], "Thought: hmm");
}

#[tokio::test]
async fn test_deliberate_failure_is_labelled_council() {
    let council = Council::from_config(
        &CouncilConfig {
            max_rounds: 2,
            ..CouncilConfig::default()
        },
        Arc::new(StaticReviewer::new(Verdict::Reject)),
        Arc::new(EchoReviser::with_suffix("!")),
    )
    .unwrap();
    let service = ScriptedCompletionService::new().then_reply("Final Answer: draft");
    let executor = executor(service, ToolRegistry::new()).with_council(Arc::new(council));

    let failure = executor
        .run(&task("q", ReasoningPattern::ReAct).deliberate(true))
        .await
        .into_result()
        .unwrap_err();

    assert!(failure.message.starts_with("council: "));
    assert_eq!(failure.partial.unwrap()["proposal"], "draft!");
}

#[tokio::test]
async fn test_deliberate_success_attaches_report() {
    let council = Council::from_config(
        &CouncilConfig::default(),
        Arc::new(StaticReviewer::new(Verdict::Approve)),
        Arc::new(EchoReviser::new()),
    )
    .unwrap();
    let service = ScriptedCompletionService::new().then_reply("Final Answer: ship it");
    let executor = executor(service, ToolRegistry::new()).with_council(Arc::new(council));

    let artifact = executor
        .run(&task("q", ReasoningPattern::ReAct).deliberate(true))
        .await
        .into_result()
        .unwrap();

    assert_eq!(artifact.answer, "ship it");
    assert!(artifact.council.unwrap().converged);
}
