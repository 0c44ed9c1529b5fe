//! Error types for the service

use canvas_jobs::EmailError;
use canvas_queue::QueueError;

/// Service startup and runtime errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Queue setup failed: {0}")]
    Queue(#[from] QueueError),

    #[error("Emailer setup failed: {0}")]
    Email(#[from] EmailError),

    #[error("Metrics setup failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Logging setup failed: {message}")]
    Telemetry { message: String },

    #[error("Failed to install signal handler: {message}")]
    Signal { message: String },
}

impl ServiceError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
            Self::Queue(_) | Self::Email(_) | Self::Metrics(_) => 4,
            Self::Telemetry { .. } | Self::Signal { .. } => 5,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid queue or runner configuration: {0}")]
    Queue(#[from] canvas_queue::ConfigurationError),
}
