//! # Job Registry
//!
//! Maps job names to handlers. A registry is filled before the runner
//! starts and is read-only afterwards: [`crate::Runner::start`] moves it
//! behind an `Arc` and only ever looks names up.

use crate::error::JobError;
use async_trait::async_trait;
use canvas_queue::JobMessage;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

// ============================================================================
// Job Context
// ============================================================================

/// Per-run context handed to a job handler
#[derive(Debug, Clone)]
pub struct JobContext {
    shutdown: CancellationToken,
    job_name: String,
    delivery_count: u32,
}

impl JobContext {
    pub fn new(
        shutdown: CancellationToken,
        job_name: impl Into<String>,
        delivery_count: u32,
    ) -> Self {
        Self {
            shutdown,
            job_name: job_name.into(),
            delivery_count,
        }
    }

    /// The runner's shutdown token
    ///
    /// Handlers may watch it to cut long work short, or cancel it to stop
    /// the runner.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// How many times the queue has delivered this message, starting at 1
    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }
}

// ============================================================================
// Job Handler
// ============================================================================

/// A named unit of background work
///
/// Returning `Ok` acknowledges the message. Returning an error leaves it on
/// the queue, so a handler may run more than once for the same message and
/// must tolerate that.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, context: JobContext, message: JobMessage) -> Result<(), JobError>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(JobContext, JobMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn run(&self, context: JobContext, message: JobMessage) -> Result<(), JobError> {
        (self)(context, message).await
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Something job handlers can be registered on
///
/// Implemented by [`JobRegistry`] and [`crate::Runner`] so job modules can
/// register themselves without caring which one they are given.
pub trait Registry {
    fn register_handler(&mut self, name: &str, handler: Arc<dyn JobHandler>);
}

/// Name to handler lookup table
#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any earlier handler
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H)
    where
        H: JobHandler + 'static,
    {
        self.register_handler(&name.into(), Arc::new(handler));
    }

    /// Look up the handler for `name`
    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered job names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Add every handler from `other` whose name is not registered here yet
    pub(crate) fn register_missing(&mut self, other: JobRegistry) {
        for (name, handler) in other.handlers {
            self.handlers.entry(name).or_insert(handler);
        }
    }
}

impl Registry for JobRegistry {
    fn register_handler(&mut self, name: &str, handler: Arc<dyn JobHandler>) {
        if self.handlers.insert(name.to_string(), handler).is_some() {
            tracing::debug!(name = %name, "Replaced job handler");
        }
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("names", &self.names())
            .finish()
    }
}
