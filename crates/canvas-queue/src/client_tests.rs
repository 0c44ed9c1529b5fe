//! Tests for queue client traits and implementations.

use super::*;
use crate::message::Timestamp;
use crate::provider::AwsSqsConfig;
use std::sync::atomic::{AtomicU32, Ordering};

// ============================================================================
// Stub provider
// ============================================================================

/// Provider that reports itself as SQS, counts calls and can stall
struct StubProvider {
    sends: AtomicU32,
    stall: Option<Duration>,
    last_wait: std::sync::Mutex<Option<Duration>>,
}

impl StubProvider {
    fn new() -> Self {
        Self {
            sends: AtomicU32::new(0),
            stall: None,
            last_wait: std::sync::Mutex::new(None),
        }
    }

    fn stalling(duration: Duration) -> Self {
        Self {
            stall: Some(duration),
            ..Self::new()
        }
    }

    async fn maybe_stall(&self) {
        if let Some(duration) = self.stall {
            tokio::time::sleep(duration).await;
        }
    }
}

#[async_trait]
impl QueueProvider for StubProvider {
    async fn send_message(
        &self,
        _queue: &QueueName,
        _message: &JobMessage,
    ) -> Result<MessageId, QueueError> {
        self.maybe_stall().await;
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(MessageId::new())
    }

    async fn receive_message(
        &self,
        _queue: &QueueName,
        wait_time: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        *self.last_wait.lock().unwrap() = Some(wait_time);
        self.maybe_stall().await;
        Ok(None)
    }

    async fn delete_message(
        &self,
        _queue: &QueueName,
        _receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        self.maybe_stall().await;
        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AwsSqs
    }
}

fn client_for(provider: Arc<StubProvider>) -> StandardQueueClient {
    StandardQueueClient::new(
        provider,
        QueueName::new("jobs").unwrap(),
        Duration::from_secs(20),
        Duration::from_secs(5),
    )
}

// ============================================================================
// StandardQueueClient
// ============================================================================

mod standard_client {
    use super::*;

    #[tokio::test]
    async fn test_send_passes_through() {
        let provider = Arc::new(StubProvider::new());
        let client = client_for(provider.clone());

        client.send(&JobMessage::for_job("test")).await.unwrap();

        assert_eq!(provider.sends.load(Ordering::SeqCst), 1);
        assert_eq!(client.queue_name().as_str(), "jobs");
        assert_eq!(client.provider_type(), ProviderType::AwsSqs);
    }

    #[tokio::test]
    async fn test_oversized_message_rejected_before_send() {
        let provider = Arc::new(StubProvider::new());
        let client = client_for(provider.clone());

        let message = JobMessage::for_job("test").with_field("blob", "x".repeat(300 * 1024));
        let result = client.send(&message).await;

        match result {
            Err(QueueError::MessageTooLarge { size, max_size }) => {
                assert!(size > max_size);
                assert_eq!(max_size, 256 * 1024);
            }
            other => panic!("expected MessageTooLarge, got {:?}", other),
        }
        assert_eq!(provider.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_receive_uses_configured_wait() {
        let provider = Arc::new(StubProvider::new());
        let client = client_for(provider.clone());

        let received = client.receive().await.unwrap();

        assert!(received.is_none());
        assert_eq!(
            *provider.last_wait.lock().unwrap(),
            Some(Duration::from_secs(20))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_send_times_out() {
        let provider = Arc::new(StubProvider::stalling(Duration::from_secs(60)));
        let client = client_for(provider);

        let result = client.send(&JobMessage::for_job("test")).await;

        match result {
            Err(QueueError::Timeout { duration }) => assert_eq!(duration, Duration::from_secs(5)),
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_allows_wait_plus_operation_timeout() {
        // 24 seconds fits within the 20 second wait plus 5 second timeout
        let provider = Arc::new(StubProvider::stalling(Duration::from_secs(24)));
        let client = client_for(provider);
        assert!(client.receive().await.is_ok());

        let provider = Arc::new(StubProvider::stalling(Duration::from_secs(26)));
        let client = client_for(provider);
        assert!(matches!(
            client.receive().await,
            Err(QueueError::Timeout { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_delete_times_out() {
        let provider = Arc::new(StubProvider::stalling(Duration::from_secs(60)));
        let client = client_for(provider);
        let receipt = ReceiptHandle::new("r", Timestamp::now());

        assert!(matches!(
            client.delete(&receipt).await,
            Err(QueueError::Timeout { .. })
        ));
    }
}

// ============================================================================
// QueueClientFactory
// ============================================================================

mod factory {
    use super::*;

    #[tokio::test]
    async fn test_create_in_memory_client_round_trip() {
        let config = QueueConfig {
            wait_time_seconds: 0,
            ..Default::default()
        };
        let client = QueueClientFactory::create_client(config).unwrap();

        let sent = client.send(&JobMessage::for_job("test")).await.unwrap();
        let received = client.receive().await.unwrap().expect("message");
        assert_eq!(received.message_id, sent);

        client.delete(&received.receipt_handle).await.unwrap();
        assert!(client.receive().await.unwrap().is_none());
    }

    #[test]
    fn test_create_sqs_client() {
        let config = QueueConfig {
            provider: ProviderConfig::AwsSqs(AwsSqsConfig {
                access_key_id: Some("AKID".to_string()),
                secret_access_key: Some("secret".to_string()),
                endpoint_url: Some("http://localhost:9324".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let client = QueueClientFactory::create_client(config).unwrap();
        assert_eq!(client.provider_type(), ProviderType::AwsSqs);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = QueueConfig {
            queue_name: String::new(),
            ..Default::default()
        };

        assert!(matches!(
            QueueClientFactory::create_client(config),
            Err(QueueError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_create_test_client() {
        let client = QueueClientFactory::create_test_client();
        assert_eq!(client.provider_type(), ProviderType::InMemory);
        assert_eq!(client.queue_name().as_str(), "jobs");
    }
}
