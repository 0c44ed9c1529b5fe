//! Common test utilities for canvas integration tests
//!
//! This module provides:
//! - A queue backed by the in-memory provider that records receives and
//!   deletes and can be told to fail its first receives
//! - Helpers for metrics and waiting on queue state

use async_trait::async_trait;
use canvas_jobs::PrometheusJobMetrics;
use canvas_queue::{
    InMemoryConfig, InMemoryProvider, JobMessage, MessageId, ProviderType, QueueClient,
    QueueError, QueueName, ReceiptHandle, ReceivedMessage, StandardQueueClient,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Recording Queue
// ============================================================================

/// In-memory queue that records what the runner does with it
pub struct RecordingQueue {
    provider: InMemoryProvider,
    client: StandardQueueClient,
    failing_receives: AtomicU32,
    receive_times: Mutex<Vec<Instant>>,
    deleted: Mutex<Vec<String>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::with_visibility_timeout(Duration::from_secs(30))
    }

    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        let provider = InMemoryProvider::new(InMemoryConfig {
            visibility_timeout_seconds: visibility_timeout.as_secs(),
            ..Default::default()
        });
        let client = StandardQueueClient::new(
            Arc::new(provider.clone()),
            QueueName::default(),
            Duration::from_secs(1),
            Duration::from_secs(5),
        );

        Self {
            provider,
            client,
            failing_receives: AtomicU32::new(0),
            receive_times: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `count` receives fail with a connection error
    #[allow(dead_code)]
    pub fn fail_next_receives(&self, count: u32) {
        self.failing_receives.store(count, Ordering::SeqCst);
    }

    pub async fn push(&self, message: JobMessage) -> MessageId {
        self.client.send(&message).await.unwrap()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn receive_times(&self) -> Vec<Instant> {
        self.receive_times.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn pending(&self) -> usize {
        self.provider.pending_count(self.client.queue_name())
    }

    pub fn in_flight(&self) -> usize {
        self.provider.in_flight_count(self.client.queue_name())
    }
}

#[async_trait]
impl QueueClient for RecordingQueue {
    async fn send(&self, message: &JobMessage) -> Result<MessageId, QueueError> {
        self.client.send(message).await
    }

    async fn receive(&self) -> Result<Option<ReceivedMessage>, QueueError> {
        self.receive_times.lock().unwrap().push(Instant::now());

        let failing = self
            .failing_receives
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QueueError::ConnectionFailed {
                message: "simulated outage".to_string(),
            });
        }

        self.client.receive().await
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.client.delete(receipt).await?;
        self.deleted.lock().unwrap().push(receipt.handle().to_string());
        Ok(())
    }

    fn queue_name(&self) -> &QueueName {
        self.client.queue_name()
    }

    fn provider_type(&self) -> ProviderType {
        self.client.provider_type()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Prometheus metrics on a fresh registry
pub fn prometheus_metrics() -> (Arc<PrometheusJobMetrics>, prometheus::Registry) {
    let registry = prometheus::Registry::new();
    let metrics = Arc::new(PrometheusJobMetrics::new(&registry).unwrap());
    (metrics, registry)
}

/// Poll `condition` every 20ms until it holds or `limit` passes
#[allow(dead_code)]
pub async fn wait_until(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
