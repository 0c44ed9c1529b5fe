//! # Canvas Queue
//!
//! At-least-once message queue client used to hand jobs from the web tier to
//! the background job runner.
//!
//! This library provides:
//! - Provider-agnostic send / long-poll receive / delete-to-acknowledge
//! - An AWS SQS provider speaking the SQS Query API over HTTP
//! - An in-memory provider with visibility timeouts for tests and local runs
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Job messages, receipt handles and identifiers
//! - [`provider`] - Provider types and configuration
//! - [`client`] - Client traits and the standard client
//! - [`providers`] - Concrete provider implementations

pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

pub use client::{QueueClient, QueueClientFactory, QueueProvider, StandardQueueClient};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{
    JobMessage, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp, JOB_NAME_KEY,
};
pub use provider::{AwsSqsConfig, InMemoryConfig, ProviderConfig, ProviderType, QueueConfig};
pub use providers::{InMemoryProvider, SqsProvider};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
