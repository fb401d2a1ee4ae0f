//! Command-line front end for reasonflow.
//!
//! Builds one pipeline from the flags and feeds it a file, a single question
//! or stdin lines. Reports are printed to stdout and failures to stderr; any
//! failed call makes the process exit non-zero.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod offline;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use offline::OfflineCompletion;
use reasonflow::completion::CompletionService;
use reasonflow::config::EngineConfig;
use reasonflow::core::Outcome;
use reasonflow::executor::ReasoningPattern;
use reasonflow::observability::{init_tracing, LogFormat};
use reasonflow::pipeline::{CallOptions, EngineServices, Pipeline, PipelineMode, StageRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "reasonflow", version, about = "Bounded reasoning-pattern task runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Comma-separated stage names, in order.
    #[arg(long, global = true, default_value = "intake,guard,route,execute")]
    stages: String,

    /// `direct` or `deliberate` (council review).
    #[arg(long, global = true, default_value_t = PipelineMode::Direct)]
    mode: PipelineMode,

    /// Force a reasoning pattern instead of routing by keywords.
    #[arg(long, global = true)]
    pattern: Option<ReasoningPattern>,

    /// JSON engine configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Completion endpoint URL.
    #[arg(long, global = true, env = "REASONFLOW_ENDPOINT")]
    endpoint: Option<String>,

    /// Bearer token for the endpoint.
    #[arg(long, global = true, env = "REASONFLOW_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Answer locally by echoing the task.
    #[arg(long, global = true)]
    offline: bool,

    /// `pretty`, `compact` or `json`.
    #[arg(long, global = true, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline once with the contents of a file.
    Run {
        /// Input file; invalid UTF-8 is replaced.
        file: PathBuf,
    },
    /// Run the pipeline once with a question.
    Ask {
        /// Question text.
        text: Vec<String>,
    },
    /// Run the pipeline for every line read from stdin.
    Repl,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    }
}

/// Returns whether every call succeeded.
async fn run() -> Result<bool> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let pipeline = build_pipeline(&cli)?;
    let options = CallOptions {
        pattern: cli.pattern,
        ..CallOptions::default()
    };
    info!(stages = ?pipeline.stage_names(), mode = %pipeline.mode(), "Pipeline ready");

    match &cli.command {
        Command::Run { file } => {
            let bytes = std::fs::read(file).with_context(|| format!("read {}", file.display()))?;
            Ok(report(pipeline.call_with(bytes, options).await))
        }
        Command::Ask { text } => {
            let question = text.join(" ");
            if question.trim().is_empty() {
                bail!("ask needs a question");
            }
            Ok(report(pipeline.call_with(question, options).await))
        }
        Command::Repl => repl(&pipeline, options).await,
    }
}

fn build_pipeline(cli: &Cli) -> Result<Pipeline> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("load configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let service = completion_service(cli, &config)?;
    let services = EngineServices::builder(config, service)
        .build()
        .context("build engine services")?;

    let stages: Vec<&str> = cli
        .stages
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    Pipeline::new(&stages[..], cli.mode, &StageRegistry::with_builtins(), services)
        .context("build pipeline")
}

#[cfg(feature = "http")]
fn completion_service(cli: &Cli, config: &EngineConfig) -> Result<Arc<dyn CompletionService>> {
    use reasonflow::completion::HttpCompletionService;
    use tracing::debug;

    if cli.offline {
        return Ok(Arc::new(OfflineCompletion));
    }
    let Some(endpoint) = &cli.endpoint else {
        bail!("no completion endpoint; pass --endpoint or --offline");
    };
    let mut service = HttpCompletionService::new(endpoint.as_str(), config.limits.call_timeout())
        .context("create completion client")?;
    if let Some(key) = &cli.api_key {
        service = service.with_api_key(key.as_str());
    }
    debug!(endpoint = %endpoint, "Using HTTP completion service");
    Ok(Arc::new(service))
}

#[cfg(not(feature = "http"))]
fn completion_service(cli: &Cli, _config: &EngineConfig) -> Result<Arc<dyn CompletionService>> {
    if cli.endpoint.is_some() && !cli.offline {
        bail!("built without the `http` feature; only --offline is available");
    }
    Ok(Arc::new(OfflineCompletion))
}

async fn repl(pipeline: &Pipeline, options: CallOptions) -> Result<bool> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut all_ok = true;
    while let Some(line) = lines.next_line().await.context("read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        all_ok &= report(pipeline.call_with(line, options).await);
    }
    Ok(all_ok)
}

fn report(outcome: Outcome<reasonflow::context::TaskReport>) -> bool {
    match outcome {
        Outcome::Ok(report) => {
            println!("{}", report.render());
            true
        }
        Outcome::Err(failure) => {
            eprintln!("{failure}");
            if let Some(partial) = &failure.partial {
                eprintln!("partial: {partial}");
            }
            false
        }
    }
}
