//! Queue provider implementations.
//!
//! This module contains concrete implementations of the `QueueProvider`
//! trait for the supported queue backends.

pub mod memory;
pub mod sqs;

pub use memory::InMemoryProvider;
pub use sqs::{SqsError, SqsProvider};
