//! # Job Runner
//!
//! Polls the queue, routes each message to the handler named by its `job`
//! field and runs it on its own task.
//!
//! The runner moves through `Idle -> Running -> Draining -> Stopped`.
//! Cancelling the shutdown token stops polling; handlers already launched
//! keep running and [`Runner::start`] only returns once all of them have
//! finished.
//!
//! A message is deleted from the queue only after its handler succeeds.
//! Failed, panicking and unroutable deliveries are left alone and the queue
//! redelivers them once their visibility timeout passes.

use crate::emailer::EmailSender;
use crate::error::JobError;
use crate::monitoring::{JobMetrics, NoOpJobMetrics};
use crate::newsletter::register_newsletter_jobs;
use crate::registry::{JobContext, JobHandler, JobRegistry, Registry};
use canvas_queue::{ConfigurationError, QueueClient, ReceivedMessage};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;

// ============================================================================
// Runner State
// ============================================================================

/// Lifecycle of a [`Runner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    /// Built but not started
    Idle,
    /// Polling the queue and launching jobs
    Running,
    /// Polling stopped, waiting for launched jobs to finish
    Draining,
    /// Every launched job has finished
    Stopped,
}

impl std::fmt::Display for RunnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// ============================================================================
// Runner Configuration
// ============================================================================

/// Tuning for the polling loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Pause after a failed receive before polling again
    ///
    /// Raised to the error's [`canvas_queue::QueueError::retry_after`] hint
    /// when that is longer.
    pub receive_error_backoff_ms: u64,

    /// Upper bound on a single delete after a successful job
    pub delete_timeout_ms: u64,

    /// Maximum number of jobs running at once, unbounded when `None`
    pub max_concurrent_jobs: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            receive_error_backoff_ms: 1000,
            delete_timeout_ms: 1000,
            max_concurrent_jobs: None,
        }
    }
}

impl RunnerConfig {
    pub fn receive_error_backoff(&self) -> Duration {
        Duration::from_millis(self.receive_error_backoff_ms)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_millis(self.delete_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.delete_timeout_ms == 0 {
            return Err(ConfigurationError::Invalid {
                message: "runner.delete_timeout_ms must be greater than zero".to_string(),
            });
        }
        if self.max_concurrent_jobs == Some(0) {
            return Err(ConfigurationError::Invalid {
                message: "runner.max_concurrent_jobs must be greater than zero when set"
                    .to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Background job runner bound to one queue
pub struct Runner {
    queue: Arc<dyn QueueClient>,
    registry: JobRegistry,
    metrics: Arc<dyn JobMetrics>,
    emailer: Option<Arc<dyn EmailSender>>,
    config: RunnerConfig,
    state: watch::Sender<RunnerState>,
}

impl Runner {
    pub fn new(queue: Arc<dyn QueueClient>) -> Self {
        let (state, _) = watch::channel(RunnerState::Idle);
        Self {
            queue,
            registry: JobRegistry::new(),
            metrics: Arc::new(NoOpJobMetrics),
            emailer: None,
            config: RunnerConfig::default(),
            state,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn JobMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Enable the built-in newsletter jobs, sending through `emailer`
    pub fn with_emailer(mut self, emailer: Arc<dyn EmailSender>) -> Self {
        self.emailer = Some(emailer);
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Register `handler` under `name`, replacing any earlier handler
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H)
    where
        H: JobHandler + 'static,
    {
        self.registry.register(name, handler);
    }

    /// Subscribe to state changes
    pub fn state(&self) -> watch::Receiver<RunnerState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run until `shutdown` is cancelled and every launched job has finished
    pub async fn start(self, shutdown: CancellationToken) {
        let Runner {
            queue,
            mut registry,
            metrics,
            emailer,
            config,
            state,
        } = self;

        if let Some(emailer) = emailer {
            let mut builtin = JobRegistry::new();
            register_newsletter_jobs(&mut builtin, emailer);
            registry.register_missing(builtin);
        }

        let registry = Arc::new(registry);
        let capacity = config
            .max_concurrent_jobs
            .map(|limit| Arc::new(Semaphore::new(limit)));
        let tracker = TaskTracker::new();

        state.send_replace(RunnerState::Running);
        info!(
            queue = %queue.queue_name(),
            provider = %queue.provider_type(),
            jobs = ?registry.names(),
            max_concurrent_jobs = ?config.max_concurrent_jobs,
            "Job runner started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let permit = match &capacity {
                Some(semaphore) => match acquire(semaphore, &shutdown).await {
                    Some(permit) => Some(permit),
                    None => break,
                },
                None => None,
            };

            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = queue.receive() => result,
            };

            let received = match received {
                Ok(Some(received)) => received,
                Ok(None) => {
                    metrics.record_receive(true);
                    continue;
                }
                Err(e) => {
                    metrics.record_receive(false);
                    let backoff = e
                        .retry_after()
                        .map_or(config.receive_error_backoff(), |hint| {
                            hint.max(config.receive_error_backoff())
                        });
                    warn!(
                        error = %e,
                        transient = e.is_transient(),
                        backoff_ms = backoff.as_millis() as u64,
                        "Failed to receive message"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => continue,
                    }
                }
            };

            let Some(job_name) = received.job_name().map(str::to_string) else {
                metrics.record_receive(false);
                info!(
                    message_id = %received.message_id,
                    "Dropping message without a job name"
                );
                continue;
            };

            let Some(handler) = registry.get(&job_name) else {
                metrics.record_receive(false);
                info!(
                    name = %job_name,
                    message_id = %received.message_id,
                    "Dropping message for unknown job"
                );
                continue;
            };

            metrics.record_receive(true);
            debug!(
                name = %job_name,
                message_id = %received.message_id,
                delivery_count = received.delivery_count,
                "Launching job"
            );

            let run = JobRun {
                context: JobContext::new(shutdown.clone(), job_name, received.delivery_count),
                queue: queue.clone(),
                metrics: metrics.clone(),
                delete_timeout: config.delete_timeout(),
            };
            tracker.spawn(run.execute(handler, received, permit).in_current_span());
        }

        state.send_replace(RunnerState::Draining);
        info!(in_flight = tracker.len(), "Job runner draining");

        tracker.close();
        tracker.wait().await;

        state.send_replace(RunnerState::Stopped);
        info!("Job runner stopped");
    }
}

impl Registry for Runner {
    fn register_handler(&mut self, name: &str, handler: Arc<dyn JobHandler>) {
        self.registry.register_handler(name, handler);
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("queue", self.queue.queue_name())
            .field("registry", &self.registry)
            .field("emailer", &self.emailer.is_some())
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

/// Wait for a capacity permit, giving up when `shutdown` fires
async fn acquire(
    semaphore: &Arc<Semaphore>,
    shutdown: &CancellationToken,
) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        permit = semaphore.clone().acquire_owned() => permit.ok(),
    }
}

// ============================================================================
// Job Execution
// ============================================================================

/// Everything a launched job task needs besides the handler and message
struct JobRun {
    context: JobContext,
    queue: Arc<dyn QueueClient>,
    metrics: Arc<dyn JobMetrics>,
    delete_timeout: Duration,
}

impl JobRun {
    async fn execute(
        self,
        handler: Arc<dyn JobHandler>,
        received: ReceivedMessage,
        _permit: Option<OwnedSemaphorePermit>,
    ) {
        let job_name = self.context.job_name().to_string();
        let ReceivedMessage {
            message_id,
            message,
            receipt_handle,
            delivery_count,
            ..
        } = received;

        let started = Instant::now();
        let result = AssertUnwindSafe(handler.run(self.context, message))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(JobError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });
        let duration = started.elapsed();

        self.metrics.record_job(&job_name, result.is_ok(), duration);

        if let Err(e) = result {
            error!(
                name = %job_name,
                message_id = %message_id,
                delivery_count = delivery_count,
                duration_ms = duration.as_millis() as u64,
                error = %e,
                "Job failed"
            );
            return;
        }

        info!(
            name = %job_name,
            message_id = %message_id,
            duration_ms = duration.as_millis() as u64,
            "Job succeeded"
        );

        match tokio::time::timeout(self.delete_timeout, self.queue.delete(&receipt_handle)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                name = %job_name,
                message_id = %message_id,
                receipt_expired = receipt_handle.is_expired(),
                error = %e,
                "Failed to delete completed message, it will be redelivered"
            ),
            Err(_) => warn!(
                name = %job_name,
                message_id = %message_id,
                timeout_ms = self.delete_timeout.as_millis() as u64,
                "Timed out deleting completed message"
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
