//! Prometheus metrics for the job runner.

use crate::monitoring::JobMetrics;
use prometheus::{CounterVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

/// Job runner metrics registered on a caller-owned registry
///
/// Using a dedicated [`Registry`] instead of the process-global default lets
/// several runners (and tests) coexist without name clashes.
#[derive(Debug, Clone)]
pub struct PrometheusJobMetrics {
    jobs_total: IntCounterVec,
    job_duration_seconds_total: CounterVec,
    receives_total: IntCounterVec,
}

impl PrometheusJobMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let jobs_total = IntCounterVec::new(
            Opts::new("app_jobs_total", "Total number of completed jobs"),
            &["name", "success"],
        )?;
        let job_duration_seconds_total = CounterVec::new(
            Opts::new(
                "app_job_duration_seconds_total",
                "Total time spent running jobs, in seconds",
            ),
            &["name", "success"],
        )?;
        let receives_total = IntCounterVec::new(
            Opts::new(
                "app_job_runner_receives_total",
                "Total number of job queue receive attempts",
            ),
            &["success"],
        )?;

        registry.register(Box::new(jobs_total.clone()))?;
        registry.register(Box::new(job_duration_seconds_total.clone()))?;
        registry.register(Box::new(receives_total.clone()))?;

        Ok(Self {
            jobs_total,
            job_duration_seconds_total,
            receives_total,
        })
    }

    /// Number of completed runs of `name` with the given outcome
    pub fn job_count(&self, name: &str, success: bool) -> u64 {
        self.jobs_total
            .with_label_values(&[name, success_label(success)])
            .get()
    }

    /// Total seconds spent in runs of `name` with the given outcome
    pub fn job_duration_seconds(&self, name: &str, success: bool) -> f64 {
        self.job_duration_seconds_total
            .with_label_values(&[name, success_label(success)])
            .get()
    }

    /// Number of receive attempts with the given outcome
    pub fn receive_count(&self, success: bool) -> u64 {
        self.receives_total
            .with_label_values(&[success_label(success)])
            .get()
    }
}

impl JobMetrics for PrometheusJobMetrics {
    fn record_receive(&self, success: bool) {
        self.receives_total
            .with_label_values(&[success_label(success)])
            .inc();
    }

    fn record_job(&self, name: &str, success: bool, duration: Duration) {
        let labels = [name, success_label(success)];
        self.jobs_total.with_label_values(&labels).inc();
        self.job_duration_seconds_total
            .with_label_values(&labels)
            .inc_by(duration.as_secs_f64());
    }
}

fn success_label(success: bool) -> &'static str {
    if success {
        "true"
    } else {
        "false"
    }
}

/// Render every metric in `registry` in the Prometheus text format
pub fn encode_text(registry: &Registry) -> Result<String, prometheus::Error> {
    TextEncoder::new().encode_to_string(&registry.gather())
}
