use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mragent_agents::LlmSpecialists;
use mragent_core::llm::build_model;
use mragent_core::metrics::init_metrics_from_env;
use mragent_core::orchestrator::{load_negative_experience, write_records};
use mragent_core::retrieval::build_retriever;
use mragent_core::{
    BatchConfig, BatchOrchestrator, BatchRecord, Config, ConfigLoader, Coordinator, Event,
    EventCollector, ExperienceRoute, RunLogInput, RunOutcome, RunReport, RunRequest, RunTrace,
    TelemetryOptions, init_telemetry, load_questions, log_run_completion, persist_trace,
    run_with_retries,
};
use serde::Serialize;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "mragent",
    version,
    about = "Coordinator-driven multi-agent question answering"
)]
struct Cli {
    /// Configuration file (defaults to $MRAGENT_CONFIG, then ./mragent.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer one question.
    Run(RunArgs),
    /// Answer every question in a file and write scored JSONL records.
    Batch(BatchArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Question to answer.
    #[arg(long)]
    question: String,

    /// Optional run id (a UUID is generated otherwise).
    #[arg(long)]
    run_id: Option<String>,

    /// Directory to write the run trace into.
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Earlier batch output whose first unfaithful record is shown as a negative example.
    #[arg(long)]
    experience: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// JSON array or JSONL file of questions.
    #[arg(long)]
    questions: PathBuf,

    /// Where to write one JSON record per run.
    #[arg(long, default_value = "results.jsonl")]
    output: PathBuf,

    /// Maximum number of runs in flight.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Runs per question.
    #[arg(long, default_value_t = 1)]
    samples: usize,

    /// Earlier batch output whose first unfaithful record is shown as a negative example.
    #[arg(long)]
    experience: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load(cli.config.clone())?;

    init_telemetry(TelemetryOptions {
        env_filter: Some(config.logging.level.clone()),
        with_target: false,
        ..TelemetryOptions::default()
    })?;
    init_metrics_from_env("mragent")?;

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(&config, args).await?,
            Command::Batch(args) => batch_command(&config, args).await?,
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

fn build_coordinator(config: &Config) -> Result<Coordinator> {
    let agent_model = build_model(&config.agent_model)?;
    let environment_model = match &config.environment_model {
        Some(model) => build_model(model)?,
        None => agent_model.clone(),
    };
    let retriever = build_retriever(&config.retriever)?;
    let specialists = LlmSpecialists::new(agent_model.clone(), environment_model);
    Ok(Coordinator::new(
        agent_model,
        retriever,
        Arc::new(specialists),
        config.execution.clone(),
    ))
}

fn load_experience(path: Option<&Path>) -> Result<Option<ExperienceRoute>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let experience = load_negative_experience(path)?;
    if experience.is_none() {
        warn!(path = %path.display(), "no unfaithful record found; running without experience");
    }
    Ok(experience)
}

#[derive(Serialize)]
struct RunSummary<'a> {
    run_id: &'a str,
    question: &'a str,
    success: bool,
    attempts: usize,
    response: Option<&'a str>,
    verified_documents: Vec<&'a str>,
    errors: &'a [String],
    trace_path: Option<String>,
}

async fn run_command(config: &Config, args: RunArgs) -> Result<()> {
    let coordinator = build_coordinator(config)?;
    let run_id = args.run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let trace = RunTrace::new(run_id.clone());
    info!(%run_id, question = %args.question, "starting run");

    let mut request = RunRequest::new(args.question.clone()).with_trace(trace.clone());
    if let Some(experience) = load_experience(args.experience.as_deref())? {
        request = request.with_experience(experience);
    }
    let report = run_with_retries(&coordinator, request).await;

    let trace_path = match &args.trace_dir {
        Some(dir) => Some(
            persist_trace(dir, &run_id, &trace.events())?
                .display()
                .to_string(),
        ),
        None => None,
    };
    let verified = verified_ids(&report);
    log_completion(&run_id, &report, verified.clone(), trace_path.clone());

    let summary = RunSummary {
        run_id: &run_id,
        question: &args.question,
        success: report.success,
        attempts: report.attempts,
        response: report.response(),
        verified_documents: verified.iter().map(String::as_str).collect(),
        errors: &report.errors,
        trace_path,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if !report.success {
        anyhow::bail!("run {run_id} failed after {} attempts", report.attempts);
    }
    Ok(())
}

async fn batch_command(config: &Config, args: BatchArgs) -> Result<()> {
    let items = load_questions(&args.questions)?;
    info!(
        questions = items.len(),
        path = %args.questions.display(),
        "loaded questions"
    );

    let (events, receiver) = EventCollector::new();
    let coordinator = build_coordinator(config)?.with_events(events.clone());
    let mut orchestrator = BatchOrchestrator::new(
        Arc::new(coordinator),
        BatchConfig {
            max_concurrent_runs: args.concurrency,
            samples_per_question: args.samples,
        },
        events,
    );
    if let Some(experience) = load_experience(args.experience.as_deref())? {
        orchestrator = orchestrator.with_experience(experience);
    }

    let progress = tokio::spawn(report_progress(receiver));
    let (records, report) = orchestrator.execute(&items).await?;
    drop(orchestrator);
    progress.await.context("progress reporter panicked")?;

    write_records(&args.output, &records)?;
    for record in &records {
        log_record(record);
    }
    info!(
        total = report.total_runs,
        succeeded = report.successful_runs,
        failed = report.failed_runs,
        duration_ms = report.duration_ms,
        output = %args.output.display(),
        "batch complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Log lifecycle events until every sender is gone.
async fn report_progress(mut receiver: UnboundedReceiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match event {
            Event::RunStarted { run_key, .. } => info!(%run_key, "run started"),
            Event::ActionDispatched {
                run_id, turn, agent, ..
            } => tracing::debug!(%run_id, turn, %agent, "action dispatched"),
            Event::RunFinished {
                run_key,
                outcome,
                attempts,
                duration_ms,
                ..
            } => match outcome {
                RunOutcome::Success => info!(%run_key, attempts, duration_ms, "run finished"),
                RunOutcome::Failure { reason } => {
                    warn!(%run_key, attempts, duration_ms, %reason, "run failed")
                }
            },
        }
    }
}

fn verified_ids(report: &RunReport) -> Vec<String> {
    report
        .output
        .as_ref()
        .map(|output| {
            output
                .verified_documents
                .iter()
                .map(|doc| doc.original_id.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn log_completion(
    run_id: &str,
    report: &RunReport,
    verified_documents: Vec<String>,
    trace_path: Option<String>,
) {
    let input = RunLogInput {
        run_id: run_id.to_string(),
        question: report.question.clone(),
        response: report.response().map(str::to_string),
        success: report.success,
        attempts: report.attempts,
        errors: report.errors.clone(),
        verified_documents,
        trace_path,
    };
    if let Err(err) = log_run_completion(input) {
        warn!(%run_id, error = %err, "failed to write run log");
    }
}

fn log_record(record: &BatchRecord) {
    let input = RunLogInput {
        run_id: record.run_id.clone().unwrap_or_else(|| record.run_key()),
        question: record.question.clone(),
        response: record.response.clone(),
        success: record.success,
        attempts: record.attempts,
        errors: record.errors.clone(),
        verified_documents: record.verified_documents.clone(),
        trace_path: None,
    };
    if let Err(err) = log_run_completion(input) {
        warn!(run_key = %record.run_key(), error = %err, "failed to write run log");
    }
}
