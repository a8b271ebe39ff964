//! meshpipe - text-to-3D generation pipeline
//!
//! CLI entry point for running generations and inspecting remote tasks.

use std::fs;
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tokio::sync::broadcast;
use tracing::{debug, info};

use meshpipe::api::GenerationClient;
use meshpipe::cli::{Cli, Command, OutputFormat, generate_after_help};
use meshpipe::config::Config;
use meshpipe::domain::Stage;
use meshpipe::events::{EventLogEntry, PipelineEvent};
use meshpipe::pipeline::Orchestrator;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("meshpipe")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("meshpipe.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Generate {
            prompt,
            refine,
            no_import,
            art_style,
            polycount,
            format,
        }) => {
            let mut config = config;
            if let Some(art_style) = art_style {
                config.preview.art_style = art_style;
            }
            if let Some(polycount) = polycount {
                config.preview.target_polycount = polycount;
            }
            if no_import {
                config.import.enabled = false;
            }
            cmd_generate(&config, &prompt, refine, format).await
        }
        Some(Command::Status { task_id, stage, format }) => cmd_status(&config, &task_id, stage, format).await,
        Some(Command::Config) => cmd_config(&config),
        None => {
            Cli::command().after_help(generate_after_help()).print_help()?;
            Ok(())
        }
    }
}

async fn cmd_generate(config: &Config, prompt: &str, refine: bool, format: OutputFormat) -> Result<()> {
    debug!(prompt_len = prompt.len(), refine, ?format, "cmd_generate: called");
    config.validate()?;

    let orchestrator = Orchestrator::from_config(config)?;
    let printer = tokio::spawn(print_events(orchestrator.subscribe(), format.clone()));

    let mut outcome = orchestrator.submit_preview(prompt).await;

    if refine && outcome.is_ok() {
        let session = orchestrator.session().await;
        match session.succeeded_preview() {
            Some(preview) if orchestrator.readiness().await.can_submit_refine => {
                outcome = orchestrator.submit_refine(&preview.id).await;
            }
            _ => info!("cmd_generate: preview not refinable, skipping refine"),
        }
    }

    let state = orchestrator.state().await;
    let readiness = orchestrator.readiness().await;
    let session = orchestrator.session().await;

    // Closing the last sender ends the printer
    drop(orchestrator);
    let _ = printer.await;

    let artifact = session.artifact().map(|a| a.handle.to_string());
    match format {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "session_id": session.id(),
                "state": state.name(),
                "description": state.describe(),
                "readiness": readiness,
                "preview_task": session.preview_task(),
                "refine_task": session.refine_task(),
                "artifact": artifact,
                "degraded": session.degraded().map(|reason| reason.to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!();
            let label = if state.is_failure() {
                state.name().red().bold()
            } else {
                state.name().green().bold()
            };
            println!("{} {}", label, state.describe());
            if let Some(reason) = session.degraded() {
                println!("  {}", reason.to_string().yellow());
            }
            println!(
                "  can submit preview: {}  can submit refine: {}  can place: {}",
                readiness.can_submit_preview, readiness.can_submit_refine, readiness.can_place
            );
            if let Some(handle) = &artifact {
                println!("  model: {}", handle);
            }
        }
    }

    match outcome {
        Ok(_) => Ok(()),
        Err(e) => Err(eyre!("{}", e)),
    }
}

async fn print_events(mut rx: broadcast::Receiver<PipelineEvent>, format: OutputFormat) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "print_events: lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match format {
            OutputFormat::Json => {
                if let Ok(line) = serde_json::to_string(&EventLogEntry::new(event)) {
                    eprintln!("{}", line);
                }
            }
            OutputFormat::Text => {
                if let Some(line) = render_event(&event) {
                    println!("{}", line);
                }
            }
        }
    }
}

fn render_event(event: &PipelineEvent) -> Option<String> {
    let line = match event {
        PipelineEvent::SubmissionStarted { stage, .. } => format!("{} Submitting {} task", "→".cyan(), stage),
        PipelineEvent::TaskSubmitted { stage, task_id, .. } => format!("  {} task {} created", stage, task_id.bold()),
        PipelineEvent::PollProgress {
            stage,
            status,
            progress,
            attempt,
            ..
        } => format!("  [{}] {} {:>3}% (poll {})", stage, status, progress, attempt),
        PipelineEvent::TaskFinished { stage, status, .. } => {
            let status = if status == "SUCCEEDED" {
                status.green()
            } else {
                status.red()
            };
            format!("  [{}] {}", stage, status)
        }
        PipelineEvent::ImportStarted { url, .. } => format!("  downloading {}", url.dimmed()),
        PipelineEvent::ImportFinished { success: true, message, .. } => {
            format!("  {} {}", "imported".green(), message)
        }
        PipelineEvent::ImportFinished { message, .. } => format!("  {} {}", "import failed:".yellow(), message),
        PipelineEvent::Failed { stage, message, .. } => format!("{} {} failed: {}", "✗".red(), stage, message),
        PipelineEvent::StaleResultDiscarded { stage, .. } => {
            format!("  {} late {} result discarded", "!".yellow(), stage)
        }
        PipelineEvent::StateChanged { .. } | PipelineEvent::SessionReset { .. } => return None,
    };
    Some(line)
}

async fn cmd_status(config: &Config, task_id: &str, stage: Stage, format: OutputFormat) -> Result<()> {
    debug!(%task_id, %stage, ?format, "cmd_status: called");
    config.validate()?;

    let client = GenerationClient::from_config(config)?;
    let record = client.fetch_status(task_id, stage).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Text => {
            println!("{} ({})", record.id.bold(), record.stage);
            println!("  status:   {}", record.status);
            println!("  progress: {}%", record.progress);
            if let Some(prompt) = &record.prompt {
                println!("  prompt:   {}", prompt);
            }
            if let Some(url) = record.model_url() {
                println!("  model:    {}", url);
            }
            if let Some(url) = &record.thumbnail_url {
                println!("  preview:  {}", url);
            }
            if let Some(message) = record.error_message() {
                println!("  error:    {}", message.red());
            }
            if let Some(finished) = record.timestamps.finished_at {
                println!("  finished: {}", finished.to_rfc3339());
            }
        }
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    print!("{}", serde_yaml::to_string(config).context("Failed to serialize configuration")?);
    Ok(())
}
