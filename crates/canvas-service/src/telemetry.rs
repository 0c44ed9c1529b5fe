//! Logging setup for the service binaries

use crate::config::LoggingConfig;
use crate::error::ServiceError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level when set. Output is
/// human-readable in `development` and JSON elsewhere unless the logging
/// configuration forces one or the other.
pub fn init_tracing(logging: &LoggingConfig, environment: &str) -> Result<(), ServiceError> {
    let filter = env_filter(logging)?;
    let json = logging.use_json(environment);

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init()
        .map_err(|e| ServiceError::Telemetry {
            message: e.to_string(),
        })
}

/// Span that every service log line is recorded under
pub fn root_span(environment: &str, release: &str) -> tracing::Span {
    tracing::info_span!("canvas", environment = %environment, release = %release)
}

fn env_filter(logging: &LoggingConfig) -> Result<EnvFilter, ServiceError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&logging.level).map_err(|e| ServiceError::Telemetry {
            message: format!("invalid log level '{}': {}", logging.level, e),
        }),
    }
}
