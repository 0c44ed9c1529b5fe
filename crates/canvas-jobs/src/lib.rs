//! # Canvas Jobs
//!
//! Background job runner for Canvas. Jobs are registered by name, the
//! runner long-polls the queue and runs the matching handler for each
//! message on its own task.
//!
//! ## Module Organization
//!
//! - [`registry`] - Job handlers and the name to handler table
//! - [`runner`] - The polling loop and its lifecycle
//! - [`monitoring`] - Metrics hooks used by the runner
//! - [`metrics`] - Prometheus implementation of the metrics hooks
//! - [`emailer`] - Transactional email delivery
//! - [`newsletter`] - Built-in newsletter email jobs
//! - [`error`] - Job errors

pub mod emailer;
pub mod error;
pub mod metrics;
pub mod monitoring;
pub mod newsletter;
pub mod registry;
pub mod runner;

pub use emailer::{EmailAddress, EmailError, EmailSender, EmailerConfig, PostmarkEmailer};
pub use error::JobError;
pub use metrics::{encode_text, PrometheusJobMetrics};
pub use monitoring::{JobMetrics, NoOpJobMetrics};
pub use newsletter::{
    confirmation_email_message, register_newsletter_jobs, welcome_email_message,
    CONFIRMATION_EMAIL_JOB, WELCOME_EMAIL_JOB,
};
pub use registry::{JobContext, JobHandler, JobRegistry, Registry};
pub use runner::{Runner, RunnerConfig, RunnerState};
