//! # Canvas CLI
//!
//! Command-line interface for the Canvas job service:
//! - `start` runs the service in the foreground
//! - `send` enqueues a job message
//! - `config` validates and prints the resolved configuration

use canvas_queue::{JobMessage, ProviderType, QueueClientFactory, QueueError, JOB_NAME_KEY};
use canvas_service::{ConfigError, ServiceConfig, ServiceError};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn, Instrument};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// Canvas CLI - background jobs for the Canvas web app
#[derive(Debug, Parser)]
#[command(name = "canvas")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run and feed the Canvas background job service")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "CANVAS_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Logging level, overrides the configured level
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the job service in the foreground
    Start,

    /// Enqueue a job message on the configured queue
    Send {
        /// Name of the job to run
        #[arg(short, long)]
        job: String,

        /// Extra message field as key=value, may be repeated
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// Validate configuration
    Config {
        /// Show resolved configuration, secrets redacted
        #[arg(short, long)]
        show: bool,

        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },
}

/// Configuration format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

// ============================================================================
// Errors
// ============================================================================

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Failed to render output: {message}")]
    Output { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } => 2,
            Self::Configuration(_) => 3,
            Self::Queue(_) => 4,
            Self::Service(e) => e.exit_code(),
            Self::Output { .. } | Self::Io(_) => 5,
        }
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Parse the command line and run the chosen command
pub async fn run_cli() -> Result<(), CliError> {
    execute(Cli::parse(), &mut std::io::stdout()).await
}

/// Run an already parsed command, writing command output to `out`
pub async fn execute(cli: Cli, out: &mut dyn Write) -> Result<(), CliError> {
    let mut config = canvas_service::load_config(cli.config.as_deref())?;
    apply_logging_overrides(&mut config, &cli);

    match cli.command {
        Commands::Start => {
            canvas_service::init_tracing(&config.logging, &config.environment)?;
            let span = canvas_service::root_span(&config.environment, &config.release);
            canvas_service::run(config).instrument(span).await?;
            Ok(())
        }
        Commands::Send { job, fields } => {
            canvas_service::init_tracing(&config.logging, &config.environment)?;
            send_job(&config, &job, fields, out).await
        }
        Commands::Config { show, format } => {
            // Logging stays off so the rendered configuration is the only output.
            if show {
                writeln!(out, "{}", render_config(&config, format)?)?;
            } else {
                writeln!(out, "Configuration is valid")?;
            }
            Ok(())
        }
    }
}

fn apply_logging_overrides(config: &mut ServiceConfig, cli: &Cli) {
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json = Some(true);
    }
}

/// Build the message for `job` with extra `fields`
pub fn build_message(job: &str, fields: Vec<(String, String)>) -> Result<JobMessage, CliError> {
    if job.trim().is_empty() {
        return Err(CliError::InvalidArgument {
            arg: "--job".to_string(),
            message: "job name must not be empty".to_string(),
        });
    }

    let mut message = JobMessage::for_job(job);
    for (key, value) in fields {
        if key == JOB_NAME_KEY {
            return Err(CliError::InvalidArgument {
                arg: "--field".to_string(),
                message: format!("'{}' is set with --job", JOB_NAME_KEY),
            });
        }
        message.insert(key, value);
    }
    Ok(message)
}

/// Enqueue one job message and print its message id
pub async fn send_job(
    config: &ServiceConfig,
    job: &str,
    fields: Vec<(String, String)>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let message = build_message(job, fields)?;
    let client = QueueClientFactory::create_client(config.queue.clone())?;

    if client.provider_type() == ProviderType::InMemory {
        warn!("The in-memory queue is local to this process; no service will see this message");
    }

    let message_id = client.send(&message).await?;
    info!(job = %job, message_id = %message_id, queue = %client.queue_name(), "Job enqueued");

    writeln!(out, "{}", message_id)?;
    Ok(())
}

/// Render the configuration with secrets redacted
pub fn render_config(config: &ServiceConfig, format: ConfigFormat) -> Result<String, CliError> {
    let redacted = config.redacted();
    match format {
        ConfigFormat::Yaml => serde_yaml::to_string(&redacted).map_err(|e| CliError::Output {
            message: e.to_string(),
        }),
        ConfigFormat::Json => {
            serde_json::to_string_pretty(&redacted).map_err(|e| CliError::Output {
                message: e.to_string(),
            })
        }
    }
}

/// Parse a `key=value` message field
pub fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        Some(_) => Err(format!("field '{}' has an empty key", raw)),
        None => Err(format!("field '{}' must be key=value", raw)),
    }
}
