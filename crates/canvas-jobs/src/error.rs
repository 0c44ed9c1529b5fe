//! Error types for job execution.

use crate::emailer::EmailError;
use thiserror::Error;

/// Failure of a single job run
///
/// A failed job is not acknowledged, so its message is delivered again once
/// the queue's visibility timeout passes.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Missing required field '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Email delivery failed: {0}")]
    Email(#[from] EmailError),

    #[error("Job panicked: {message}")]
    Panicked { message: String },

    #[error("Job failed: {message}")]
    Failed { message: String },
}

impl JobError {
    /// Create a generic failure for handlers without a more specific variant
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub(crate) fn missing_field(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }
}
