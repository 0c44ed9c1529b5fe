//! In-memory queue provider implementation for testing and development.
//!
//! This module provides a fully functional in-memory queue implementation that:
//! - Creates queues on first use
//! - Implements visibility timeouts with redelivery
//! - Long-polls receives, waking on new sends or visibility expiry
//! - Provides thread-safe concurrent access
//!
//! Time is measured with `tokio::time::Instant`, so tests can drive
//! visibility timeouts on a paused clock.

use crate::client::QueueProvider;
use crate::error::QueueError;
use crate::message::{JobMessage, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Storage for all queues
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
}

impl QueueStorage {
    fn new() -> Self {
        Self {
            queues: HashMap::new(),
        }
    }

    /// Get or create a queue
    fn get_or_create_queue(&mut self, queue_name: &QueueName) -> &mut InMemoryQueue {
        self.queues
            .entry(queue_name.clone())
            .or_insert_with(InMemoryQueue::new)
    }
}

/// Internal queue state for a single queue
struct InMemoryQueue {
    /// Messages waiting to be received
    pending: VecDeque<StoredMessage>,
    /// Delivered messages keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
}

impl InMemoryQueue {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.pending.len() + self.in_flight.len()
    }

    /// Return deliveries whose visibility timeout has passed to the pending list
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(entry) = self.in_flight.remove(&receipt) {
                tracing::debug!(
                    message_id = %entry.message.message_id,
                    delivery_count = entry.message.delivery_count,
                    "Visibility timeout expired, message will be redelivered"
                );
                self.pending.push_back(entry.message);
            }
        }
    }

    /// Deliver the next pending message, hiding it for `visibility`
    fn take_next(&mut self, now: Instant, visibility: Duration) -> Option<ReceivedMessage> {
        let mut message = self.pending.pop_front()?;
        message.delivery_count += 1;

        let receipt = uuid::Uuid::new_v4().to_string();
        let received = ReceivedMessage {
            message_id: message.message_id.clone(),
            message: message.message.clone(),
            receipt_handle: ReceiptHandle::new(receipt.clone(), Timestamp::after(visibility)),
            delivery_count: message.delivery_count,
            delivered_at: Timestamp::now(),
        };

        self.in_flight.insert(
            receipt,
            InFlightMessage {
                message,
                visible_at: now + visibility,
            },
        );

        Some(received)
    }

    /// Earliest instant at which an in-flight message becomes visible again
    fn next_visibility_expiry(&self) -> Option<Instant> {
        self.in_flight.values().map(|entry| entry.visible_at).min()
    }
}

/// A message stored in the queue with metadata
struct StoredMessage {
    message_id: MessageId,
    message: JobMessage,
    delivery_count: u32,
}

/// A delivered message that has not been deleted yet
struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory queue provider implementation
///
/// Cloning shares the underlying queues.
#[derive(Clone)]
pub struct InMemoryProvider {
    storage: Arc<Mutex<QueueStorage>>,
    notify: Arc<Notify>,
    config: InMemoryConfig,
}

impl InMemoryProvider {
    /// Create new in-memory provider with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(Mutex::new(QueueStorage::new())),
            notify: Arc::new(Notify::new()),
            config,
        }
    }

    /// Number of messages waiting to be received
    pub fn pending_count(&self, queue: &QueueName) -> usize {
        let mut storage = self.lock();
        let queue = storage.get_or_create_queue(queue);
        queue.requeue_expired(Instant::now());
        queue.pending.len()
    }

    /// Number of delivered messages that are neither deleted nor expired
    pub fn in_flight_count(&self, queue: &QueueName) -> usize {
        let mut storage = self.lock();
        let queue = storage.get_or_create_queue(queue);
        queue.requeue_expired(Instant::now());
        queue.in_flight.len()
    }

    // Guards are never held across an await.
    fn lock(&self) -> MutexGuard<'_, QueueStorage> {
        self.storage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueProvider for InMemoryProvider {
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &JobMessage,
    ) -> Result<MessageId, QueueError> {
        let message_id = MessageId::new();

        {
            let mut storage = self.lock();
            let target = storage.get_or_create_queue(queue);
            target.requeue_expired(Instant::now());

            if target.len() >= self.config.max_queue_size {
                return Err(QueueError::QueueFull {
                    queue_name: queue.to_string(),
                    max_size: self.config.max_queue_size,
                });
            }

            target.pending.push_back(StoredMessage {
                message_id: message_id.clone(),
                message: message.clone(),
                delivery_count: 0,
            });
        }

        self.notify.notify_waiters();
        tracing::trace!(queue = %queue, message_id = %message_id, "Message enqueued");

        Ok(message_id)
    }

    async fn receive_message(
        &self,
        queue: &QueueName,
        wait_time: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let deadline = Instant::now() + wait_time;
        let visibility = self.config.visibility_timeout();

        loop {
            // Register for wake-ups before looking at the queue so a send
            // landing between the check and the wait is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_expiry = {
                let mut storage = self.lock();
                let source = storage.get_or_create_queue(queue);
                let now = Instant::now();
                source.requeue_expired(now);

                if let Some(received) = source.take_next(now, visibility) {
                    return Ok(Some(received));
                }
                source.next_visibility_expiry()
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }

            let wake_at = next_expiry.map_or(deadline, |expiry| expiry.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let mut storage = self.lock();
        let source = storage.get_or_create_queue(queue);
        source.requeue_expired(Instant::now());

        match source.in_flight.remove(receipt.handle()) {
            Some(_) => Ok(()),
            None => Err(QueueError::MessageNotFound {
                receipt: receipt.handle().to_string(),
            }),
        }
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
