//! Client traits and implementations for queue operations.

use crate::error::QueueError;
use crate::message::{JobMessage, MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use crate::provider::{InMemoryConfig, ProviderConfig, ProviderType, QueueConfig};
use crate::providers::{InMemoryProvider, SqsProvider};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Queue operations bound to a single queue
///
/// Delivery is at-least-once: a received message stays invisible for the
/// provider's visibility timeout and is delivered again unless deleted with
/// the receipt handle of that delivery.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Enqueue a message
    async fn send(&self, message: &JobMessage) -> Result<MessageId, QueueError>;

    /// Long-poll for one message, returning `None` when the wait elapses empty
    async fn receive(&self) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Acknowledge a delivery so it is never redelivered
    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Get the queue this client is bound to
    fn queue_name(&self) -> &QueueName;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Interface implemented by specific queue providers (SQS, in-memory)
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Send single message
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &JobMessage,
    ) -> Result<MessageId, QueueError>;

    /// Receive single message, waiting up to `wait_time` for one to arrive
    async fn receive_message(
        &self,
        queue: &QueueName,
        wait_time: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Delete a delivered message
    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Factory for creating queue clients with appropriate providers
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Create queue client from configuration
    pub fn create_client(config: QueueConfig) -> Result<Arc<dyn QueueClient>, QueueError> {
        config.validate()?;
        let queue_name = QueueName::new(config.queue_name.as_str())?;

        let provider: Arc<dyn QueueProvider> = match &config.provider {
            ProviderConfig::InMemory(in_memory_config) => {
                Arc::new(InMemoryProvider::new(in_memory_config.clone()))
            }
            ProviderConfig::AwsSqs(aws_config) => Arc::new(SqsProvider::new(aws_config.clone())?),
        };

        tracing::info!(
            queue = %queue_name,
            provider = %provider.provider_type(),
            wait_time_seconds = config.wait_time_seconds,
            "Created queue client"
        );

        Ok(Arc::new(StandardQueueClient::new(
            provider,
            queue_name,
            config.wait_time(),
            config.operation_timeout(),
        )))
    }

    /// Create test client with in-memory provider
    pub fn create_test_client() -> Arc<dyn QueueClient> {
        let config = QueueConfig::default();
        let provider = InMemoryProvider::new(InMemoryConfig::default());
        Arc::new(StandardQueueClient::new(
            Arc::new(provider),
            QueueName::default(),
            config.wait_time(),
            config.operation_timeout(),
        ))
    }
}

/// Standard queue client implementation
///
/// Binds a provider to one queue and bounds every call with a timeout: sends
/// and deletes by the operation timeout, receives by the long-poll wait plus
/// the operation timeout.
pub struct StandardQueueClient {
    provider: Arc<dyn QueueProvider>,
    queue_name: QueueName,
    wait_time: Duration,
    operation_timeout: Duration,
}

impl StandardQueueClient {
    /// Create new standard queue client with provider
    pub fn new(
        provider: Arc<dyn QueueProvider>,
        queue_name: QueueName,
        wait_time: Duration,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            queue_name,
            wait_time,
            operation_timeout,
        }
    }

    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }
}

async fn bounded<T>(
    limit: Duration,
    operation: impl Future<Output = Result<T, QueueError>>,
) -> Result<T, QueueError> {
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| QueueError::Timeout { duration: limit })?
}

#[async_trait]
impl QueueClient for StandardQueueClient {
    async fn send(&self, message: &JobMessage) -> Result<MessageId, QueueError> {
        let size = message.to_json()?.len();
        let max_size = self.provider.provider_type().max_message_size();
        if size > max_size {
            return Err(QueueError::MessageTooLarge { size, max_size });
        }

        bounded(
            self.operation_timeout,
            self.provider.send_message(&self.queue_name, message),
        )
        .await
    }

    async fn receive(&self) -> Result<Option<ReceivedMessage>, QueueError> {
        bounded(
            self.wait_time + self.operation_timeout,
            self.provider.receive_message(&self.queue_name, self.wait_time),
        )
        .await
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        bounded(
            self.operation_timeout,
            self.provider.delete_message(&self.queue_name, receipt),
        )
        .await
    }

    fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    fn provider_type(&self) -> ProviderType {
        self.provider.provider_type()
    }
}
