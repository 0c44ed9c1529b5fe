//! # Monitoring Module
//!
//! Metrics hooks for the job runner. The runner only depends on the
//! [`JobMetrics`] trait; [`crate::metrics::PrometheusJobMetrics`] is the
//! production implementation and [`NoOpJobMetrics`] discards everything.

use std::time::Duration;

/// Metrics collection interface for the job runner
///
/// Implementations must be cheap and non-blocking; they are called from the
/// polling loop and from every job task.
pub trait JobMetrics: Send + Sync {
    /// Record the outcome of one receive attempt
    ///
    /// `success` is false when the receive call failed or returned a message
    /// that could not be routed to a job.
    fn record_receive(&self, success: bool);

    /// Record a completed job run and its wall-clock duration
    fn record_job(&self, name: &str, success: bool, duration: Duration);
}

/// Metrics implementation that records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpJobMetrics;

impl JobMetrics for NoOpJobMetrics {
    fn record_receive(&self, _success: bool) {}

    fn record_job(&self, _name: &str, _success: bool, _duration: Duration) {}
}
