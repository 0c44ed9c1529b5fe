//! Configuration types and loading for the service
//!
//! Sources are applied in order, later ones overriding earlier ones:
//!
//! 1. `/etc/canvas/service.yaml`
//! 2. `config/service.yaml`
//! 3. An explicit file, from the command line or `CANVAS_CONFIG_FILE`
//! 4. Environment variables prefixed `CANVAS__`, with `__` between keys,
//!    e.g. `CANVAS__SERVER__PORT=9090` sets `server.port`
//!
//! Every field has a default, so no files and no environment still give a
//! valid configuration. A malformed file or a value of the wrong type is an
//! error.

use crate::error::ConfigError;
use canvas_jobs::{EmailerConfig, RunnerConfig};
use canvas_queue::{ProviderConfig, QueueConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "CANVAS_CONFIG_FILE";

const ENV_PREFIX: &str = "CANVAS";
const ENV_SEPARATOR: &str = "__";
const DEFAULT_CONFIG_FILES: [&str; 2] = ["/etc/canvas/service", "config/service"];
const REDACTED: &str = "<REDACTED>";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Deployment environment, `development` selects human-readable logs
    pub environment: String,

    /// Release identifier attached to every log line
    pub release: String,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Queue the runner polls
    pub queue: QueueConfig,

    /// Polling loop tuning
    pub runner: RunnerConfig,

    /// Email delivery; the newsletter jobs are disabled when absent
    pub email: Option<EmailerConfig>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            release: env!("CARGO_PKG_VERSION").to_string(),
            server: ServerConfig::default(),
            queue: QueueConfig::default(),
            runner: RunnerConfig::default(),
            email: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "environment".to_string(),
            });
        }

        self.queue.validate()?;
        self.runner.validate()?;
        self.logging.validate()?;

        if let Some(email) = &self.email {
            if email.token.is_empty() {
                return Err(ConfigError::Missing {
                    key: "email.token".to_string(),
                });
            }
            if email.base_url.is_empty() {
                return Err(ConfigError::Missing {
                    key: "email.base_url".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Copy of this configuration with every secret replaced, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();

        if let Some(email) = config.email.as_mut() {
            if !email.token.is_empty() {
                email.token = REDACTED.to_string();
            }
        }

        if let ProviderConfig::AwsSqs(sqs) = &mut config.queue.provider {
            if sqs.secret_access_key.is_some() {
                sqs.secret_access_key = Some(REDACTED.to_string());
            }
        }

        config
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `canvas_jobs=debug,info`
    pub level: String,

    /// Force JSON (`true`) or human-readable (`false`) output; by default
    /// only `development` logs are human-readable
    pub json: Option<bool>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: None,
        }
    }
}

impl LoggingConfig {
    pub fn use_json(&self, environment: &str) -> bool {
        self.json.unwrap_or(environment != "development")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        EnvFilter::try_new(&self.level).map_err(|e| ConfigError::Invalid {
            message: format!("logging.level '{}': {}", self.level, e),
        })?;
        Ok(())
    }
}

/// Load and validate the service configuration
///
/// `explicit_path` takes precedence over `CANVAS_CONFIG_FILE`; either way the
/// named file must exist.
pub fn load_config(explicit_path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let from_env = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|path| !path.is_empty())
        .map(PathBuf::from);
    let explicit = explicit_path.map(Path::to_path_buf).or(from_env);

    load_from(
        &DEFAULT_CONFIG_FILES,
        explicit.as_deref(),
        environment_source(),
    )
}

fn environment_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

fn load_from(
    default_files: &[&str],
    explicit: Option<&Path>,
    environment: config::Environment,
) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder();

    for file in default_files {
        builder = builder.add_source(
            config::File::with_name(file)
                .required(false)
                .format(config::FileFormat::Yaml),
        );
    }

    if let Some(path) = explicit {
        info!(path = %path.display(), "Loading configuration from explicit path");
        builder = builder.add_source(
            config::File::from(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    let config: ServiceConfig = builder
        .add_source(environment)
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}
