//! # Canvas Service
//!
//! Runs the background job runner next to a small HTTP server exposing
//! health and Prometheus metrics. SIGINT or SIGTERM stops polling; the
//! service exits once every running job has finished.

pub mod config;
pub mod error;
pub mod server;
pub mod telemetry;

pub use config::{load_config, LoggingConfig, ServerConfig, ServiceConfig, CONFIG_FILE_ENV};
pub use error::{ConfigError, ServiceError};
pub use server::{create_router, AppState};
pub use telemetry::{init_tracing, root_span};

use canvas_jobs::{PostmarkEmailer, PrometheusJobMetrics, Runner};
use canvas_queue::QueueClientFactory;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Run the service until SIGINT or SIGTERM
pub async fn run(config: ServiceConfig) -> Result<(), ServiceError> {
    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone())?;
    run_until(config, shutdown).await
}

/// Run the service until `shutdown` is cancelled
///
/// Returns once the runner has drained and the HTTP server has stopped.
pub async fn run_until(
    config: ServiceConfig,
    shutdown: CancellationToken,
) -> Result<(), ServiceError> {
    let (runner, metrics_registry) = build_runner(&config)?;
    let listener = server::bind(&config.server).await?;
    let state = AppState::new(Arc::new(metrics_registry), runner.state());

    info!(
        environment = %config.environment,
        release = %config.release,
        queue = %config.queue.queue_name,
        "Starting service"
    );

    let server_shutdown = shutdown.clone();
    let server = async move {
        let result = server::serve(listener, state, server_shutdown.clone()).await;
        if let Err(e) = &result {
            error!(error = %e, "HTTP server failed, stopping the runner");
            server_shutdown.cancel();
        }
        result
    };

    let (server_result, ()) = tokio::join!(server, runner.start(shutdown));
    server_result?;

    info!("Service stopped");
    Ok(())
}

/// Build the runner and the metrics registry it reports to
pub fn build_runner(
    config: &ServiceConfig,
) -> Result<(Runner, prometheus::Registry), ServiceError> {
    let queue = QueueClientFactory::create_client(config.queue.clone())?;

    let metrics_registry = prometheus::Registry::new();
    let metrics = PrometheusJobMetrics::new(&metrics_registry)?;

    let mut runner = Runner::new(queue)
        .with_metrics(Arc::new(metrics))
        .with_config(config.runner.clone());

    match &config.email {
        Some(email) => {
            runner = runner.with_emailer(Arc::new(PostmarkEmailer::new(email.clone())?));
        }
        None => warn!("No email configuration, newsletter jobs are disabled"),
    }

    Ok((runner, metrics_registry))
}

/// Cancel `shutdown` on the first SIGINT or SIGTERM
pub fn cancel_on_signal(shutdown: CancellationToken) -> Result<(), ServiceError> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).map_err(|e| {
            ServiceError::Signal {
                message: e.to_string(),
            }
        })?;

    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async move {
            terminate.recv().await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Received SIGINT, shutting down"),
                Err(e) => {
                    error!(error = %e, "Failed to listen for SIGINT");
                    return;
                }
            },
            _ = terminate => info!("Received SIGTERM, shutting down"),
            _ = shutdown.cancelled() => return,
        }

        shutdown.cancel();
    });

    Ok(())
}
