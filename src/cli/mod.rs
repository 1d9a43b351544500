//! Command-line interface for reportflow.
//!
//! Provides commands for processing a report, checking status,
//! listing runs, resuming paused runs and retrying failed ones.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::task::JoinHandle;

use crate::adapters::{Collaborators, HttpCollaborator};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    FileSnapshotStore, MilestoneNotice, NotificationSink, Orchestrator, PipelineRun,
    RandomEstimator, Reporter, RunOutcome, StatusMessage,
};
use crate::domain::{Document, DocumentType, Pipeline, PipelineStatus};

/// reportflow - turn financial reports into scripts, audio and video
#[derive(Parser, Debug)]
#[command(name = "reportflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a report document
    Process {
        /// Path to the PDF report
        file: PathBuf,

        /// Kind of report
        #[arg(short = 't', long = "type", value_enum)]
        document_type: ReportType,

        /// Project the report belongs to (defaults to the file name)
        #[arg(short, long)]
        subject: Option<String>,
    },

    /// Show the persisted pipeline for a project
    Status {
        /// Project identifier
        subject: String,
    },

    /// List persisted pipelines
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Resume a paused or interrupted pipeline
    Resume {
        /// Project identifier
        subject: String,
    },

    /// Retry the failed stage of a pipeline
    Retry {
        /// Project identifier
        subject: String,
    },

    /// Show resolved configuration
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportType {
    /// Quarterly report for investors
    Quarterly,
    /// Board report for board members
    Board,
}

impl From<ReportType> for DocumentType {
    fn from(t: ReportType) -> Self {
        match t {
            ReportType::Quarterly => DocumentType::Quarterly,
            ReportType::Board => DocumentType::Board,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::load_config()?;

        match self.command {
            Commands::Process {
                file,
                document_type,
                subject,
            } => process(&cfg, &file, document_type.into(), subject).await,
            Commands::Status { subject } => show_status(&cfg, &subject).await,
            Commands::Runs { limit } => list_runs(&cfg, limit).await,
            Commands::Resume { subject } => resume(&cfg, &subject).await,
            Commands::Retry { subject } => retry(&cfg, &subject).await,
            Commands::Config => show_config(&cfg),
        }
    }
}

/// Prints reporter output to stderr
struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn status(&self, message: &StatusMessage) {
        eprintln!("  {}", message.message);
    }

    fn milestone(&self, notice: &MilestoneNotice) {
        eprintln!("[{}%] {}", notice.percent, notice.message);
    }
}

fn build_orchestrator(cfg: &ResolvedConfig) -> Orchestrator {
    let mut http = HttpCollaborator::new(cfg.endpoints.clone(), cfg.limits.clone());
    if let Some(ref key) = cfg.api_key {
        http = http.with_api_key(key.clone());
    }

    Orchestrator::new(
        Collaborators::from_single(Arc::new(http)),
        Arc::new(FileSnapshotStore::open_default(cfg)),
    )
    .with_estimator(Arc::new(RandomEstimator::new(cfg.progress.clone())))
    .with_settings(cfg.orchestrator_settings())
}

fn default_subject(file: &Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string())
}

/// Process a document from scratch
async fn process(
    cfg: &ResolvedConfig,
    file: &Path,
    document_type: DocumentType,
    subject: Option<String>,
) -> Result<()> {
    let subject = subject.unwrap_or_else(|| default_subject(file));
    let document = Document::from_path(subject.clone(), file).await?;

    let orchestrator = build_orchestrator(cfg);
    let reporter = Reporter::new().spawn(orchestrator.subscribe(), Arc::new(ConsoleSink));

    eprintln!(
        "Processing {} ({} report, project '{}')",
        file.display(),
        document_type,
        subject
    );
    let run = orchestrator
        .start(document, document_type)
        .await
        .context("Failed to start pipeline")?;

    finish(orchestrator, reporter, run).await
}

/// Resume a paused (or interrupted) pipeline
async fn resume(cfg: &ResolvedConfig, subject: &str) -> Result<()> {
    let orchestrator = build_orchestrator(cfg);
    let pipeline = orchestrator
        .restore(subject)
        .await?
        .with_context(|| format!("No pipeline found for '{}'", subject))?;

    let reporter = Reporter::new().spawn(orchestrator.subscribe(), Arc::new(ConsoleSink));
    let run = orchestrator.resume(pipeline).await?;

    finish(orchestrator, reporter, run).await
}

/// Retry the failed stage of a pipeline
async fn retry(cfg: &ResolvedConfig, subject: &str) -> Result<()> {
    let orchestrator = build_orchestrator(cfg);
    let pipeline = orchestrator
        .restore(subject)
        .await?
        .with_context(|| format!("No pipeline found for '{}'", subject))?;

    let reporter = Reporter::new().spawn(orchestrator.subscribe(), Arc::new(ConsoleSink));
    let run = orchestrator.retry_failed_stage(pipeline).await?;

    finish(orchestrator, reporter, run).await
}

/// Wait for a run (Ctrl-C pauses it) and print the outcome
async fn finish(
    orchestrator: Orchestrator,
    reporter: JoinHandle<Reporter>,
    run: PipelineRun,
) -> Result<()> {
    let control = run.control();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nPausing...");
            if let Err(e) = control.pause().await {
                eprintln!("Could not pause: {}", e);
            }
        }
    });

    let outcome = run.wait().await;
    interrupt.abort();

    // Closing the event channel lets the reporter drain and stop
    drop(orchestrator);
    if let Err(e) = reporter.await {
        tracing::warn!(error = %e, "Reporter task ended abnormally");
    }

    match outcome? {
        RunOutcome::Completed { pipeline, result } => {
            println!("{}", result.script_text);
            eprintln!();
            eprintln!("Audio: {}", result.audio_url);
            match result.video_url() {
                Some(url) => eprintln!("Video: {}", url),
                None => eprintln!("Video: unavailable"),
            }
            if !result.script_alternatives.is_empty() {
                eprintln!("Alternative scripts: {}", result.script_alternatives.len());
            }
            eprintln!("\n[Pipeline {} completed]", pipeline.id);
        }
        RunOutcome::Failed {
            pipeline,
            stage_id,
            error_message,
        } => {
            eprintln!(
                "\n[Pipeline {} failed at {}: {}]",
                pipeline.id,
                stage_id.display_name(),
                error_message
            );
            eprintln!("Retry with: reportflow retry {}", pipeline.subject_id);
            std::process::exit(1);
        }
        RunOutcome::Paused { pipeline } => {
            eprintln!(
                "\n[Pipeline {} paused at {} ({:.0}%)]",
                pipeline.id,
                pipeline
                    .current_stage()
                    .map(|s| s.name.as_str())
                    .unwrap_or("-"),
                pipeline.overall_progress
            );
            eprintln!("Resume with: reportflow resume {}", pipeline.subject_id);
        }
    }

    Ok(())
}

/// Show the status of a project's pipeline
async fn show_status(cfg: &ResolvedConfig, subject: &str) -> Result<()> {
    let orchestrator = build_orchestrator(cfg);
    let Some(pipeline) = orchestrator.load(subject).await? else {
        println!("No pipeline found for '{}' (completed runs are not kept)", subject);
        return Ok(());
    };

    print_pipeline(&pipeline);
    Ok(())
}

fn print_pipeline(pipeline: &Pipeline) {
    println!("Pipeline ID: {}", pipeline.id);
    println!("Project: {}", pipeline.subject_id);
    println!("Type: {}", pipeline.document_type);
    println!("Status: {}", pipeline.status);
    println!("Started: {}", pipeline.start_time);
    println!("Updated: {}", pipeline.last_update);
    println!("Progress: {:.0}%", pipeline.overall_progress);
    println!(
        "Remaining: ~{}s",
        pipeline.estimated_time_remaining_ms / 1000
    );
    println!("\nStages:");
    for (idx, stage) in pipeline.stages.iter().enumerate() {
        let marker = if idx == pipeline.current_stage_index {
            ">"
        } else {
            " "
        };
        println!(
            "{} {:<20} {:<11} {:>3}%",
            marker,
            stage.name,
            format!("{:?}", stage.status).to_lowercase(),
            stage.progress
        );
        if let Some(ref error) = stage.error_message {
            println!("    error: {}", error);
        }
    }

    match pipeline.status {
        PipelineStatus::Paused => {
            println!("\nResume with: reportflow resume {}", pipeline.subject_id)
        }
        PipelineStatus::Failed => {
            println!("\nRetry with: reportflow retry {}", pipeline.subject_id)
        }
        _ => {}
    }
}

/// List persisted pipelines
async fn list_runs(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let orchestrator = build_orchestrator(cfg);
    let pipelines = orchestrator.runs().await?;

    if pipelines.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!(
        "{:<24} {:<10} {:<11} {:<20} {:>5}",
        "PROJECT", "TYPE", "STATUS", "STAGE", "DONE"
    );
    println!("{}", "-".repeat(74));

    for pipeline in pipelines.iter().take(limit) {
        println!(
            "{:<24} {:<10} {:<11} {:<20} {:>4.0}%",
            pipeline.subject_id,
            pipeline.document_type.to_string(),
            pipeline.status.to_string(),
            pipeline
                .current_stage()
                .map(|s| s.name.as_str())
                .unwrap_or("-"),
            pipeline.overall_progress
        );
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("Config file: {}", cfg.config_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none - using defaults)".to_string()));
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Pipelines: {}", cfg.pipelines_dir().display());
    println!();
    println!("Endpoints:");
    println!("  Extract:  {}", cfg.endpoints.url(&cfg.endpoints.extract));
    println!("  Analyze:  {}", cfg.endpoints.url(&cfg.endpoints.analyze));
    match cfg.endpoints.scripts {
        Some(ref scripts) => println!("  Scripts:  {}", cfg.endpoints.url(scripts)),
        None => println!("  Scripts:  (analysis draft)"),
    }
    println!("  Audio:    {}", cfg.endpoints.url(&cfg.endpoints.audio));
    println!("  Video:    {}", cfg.endpoints.url(&cfg.endpoints.video));
    println!("  API key:  {}", if cfg.api_key.is_some() { "set" } else { "not set" });
    println!();
    println!("Limits:");
    println!("  Max document size:  {} bytes", cfg.limits.max_document_bytes);
    println!("  Timeout:            {}s", cfg.limits.timeout_seconds);
    println!("  Synthesis timeout:  {}s", cfg.limits.synthesis_timeout_seconds);
    println!("  Min extracted text: {} chars", cfg.limits.min_text_chars);
    println!();
    println!("Voice: {}", cfg.voice_id);
    println!("Avatar: {}", cfg.avatar_id.as_deref().unwrap_or("(none - video placeholder)"));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_process_command() {
        let cli = Cli::try_parse_from([
            "reportflow",
            "process",
            "q3.pdf",
            "--type",
            "board",
            "--subject",
            "acme-q3",
        ])
        .unwrap();

        match cli.command {
            Commands::Process {
                file,
                document_type,
                subject,
            } => {
                assert_eq!(file, PathBuf::from("q3.pdf"));
                assert_eq!(DocumentType::from(document_type), DocumentType::Board);
                assert_eq!(subject.as_deref(), Some("acme-q3"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_report_type_is_rejected() {
        assert!(Cli::try_parse_from(["reportflow", "process", "q3.pdf", "--type", "annual"]).is_err());
    }

    #[test]
    fn test_default_subject_is_file_stem() {
        assert_eq!(default_subject(Path::new("/reports/acme-q3.pdf")), "acme-q3");
    }
}
