//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::Stage;

/// meshpipe - text-to-3D generation pipeline
#[derive(Parser)]
#[command(
    name = "mp",
    about = "Generate 3D models from text prompts through a preview/refine pipeline",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a model: preview, then optionally refine
    Generate {
        /// Text prompt describing the model
        prompt: String,

        /// Refine the preview once it succeeds
        #[arg(short, long)]
        refine: bool,

        /// Do not download the resulting model
        #[arg(long)]
        no_import: bool,

        /// Art style override (realistic, sculpture, ...)
        #[arg(long)]
        art_style: Option<String>,

        /// Target polycount override
        #[arg(long)]
        polycount: Option<u32>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the status of an existing remote task
    Status {
        /// Remote task id
        #[arg(value_name = "TASK_ID")]
        task_id: String,

        /// Stage the task belongs to
        #[arg(short, long, default_value = "preview")]
        stage: Stage,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("meshpipe")
        .join("logs")
        .join("meshpipe.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text
pub fn generate_after_help() -> String {
    format!(
        "The API key is read from the environment variable named by service.api-key-env (default MESHY_API_KEY).\n\nLogs are written to: {}\n",
        get_log_path().display()
    )
}

/// Output format for command results
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Valid options: text, json", s)),
        }
    }
}
