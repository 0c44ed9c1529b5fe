//! HTTP surface of the service: health and Prometheus metrics

use crate::config::ServerConfig;
use crate::error::ServiceError;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use canvas_jobs::{encode_text, RunnerState};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    metrics_registry: Arc<prometheus::Registry>,
    runner_state: watch::Receiver<RunnerState>,
}

impl AppState {
    pub fn new(
        metrics_registry: Arc<prometheus::Registry>,
        runner_state: watch::Receiver<RunnerState>,
    ) -> Self {
        Self {
            metrics_registry,
            runner_state,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub runner: RunnerState,
    pub version: String,
}

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health_check))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the listener for `config`
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServiceError> {
    let address = config.address();
    TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address,
            message: e.to_string(),
        })
}

/// Serve until `shutdown` is cancelled, letting in-flight requests finish
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), ServiceError> {
    if let Ok(address) = listener.local_addr() {
        info!(address = %address, "Starting HTTP server");
    }

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Healthy while the runner is polling
async fn handle_health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let runner = *state.runner_state.borrow();
    let healthy = runner == RunnerState::Running;

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        runner,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

async fn handle_metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    encode_text(&state.metrics_registry).map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
