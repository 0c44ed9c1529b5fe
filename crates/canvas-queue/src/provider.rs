//! Provider types and configuration.

use crate::error::ConfigurationError;
use crate::message::QueueName;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest long-poll wait SQS accepts
pub const SQS_MAX_WAIT_SECONDS: u64 = 20;

/// Longest visibility timeout SQS accepts (12 hours)
pub const SQS_MAX_VISIBILITY_TIMEOUT_SECONDS: u64 = 43_200;

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    AwsSqs,
    InMemory,
}

impl ProviderType {
    /// Get maximum message size for provider
    pub fn max_message_size(&self) -> usize {
        match self {
            Self::AwsSqs => 256 * 1024,         // 256KB
            Self::InMemory => 10 * 1024 * 1024, // 10MB
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwsSqs => f.write_str("aws_sqs"),
            Self::InMemory => f.write_str("in_memory"),
        }
    }
}

/// Configuration for queue client initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Name of the queue jobs are sent to and received from
    pub queue_name: String,
    /// Long-poll wait per receive call
    pub wait_time_seconds: u64,
    /// Upper bound on the network part of each queue call
    pub operation_timeout_seconds: u64,
    pub provider: ProviderConfig,
}

impl QueueConfig {
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_seconds)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }

    /// Check the configuration is usable before any provider is built
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        QueueName::new(self.queue_name.as_str()).map_err(|e| ConfigurationError::Invalid {
            message: format!("queue_name '{}': {}", self.queue_name, e),
        })?;

        if self.operation_timeout_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                message: "operation_timeout_seconds must be greater than zero".to_string(),
            });
        }

        match &self.provider {
            ProviderConfig::AwsSqs(sqs) => {
                if self.wait_time_seconds > SQS_MAX_WAIT_SECONDS {
                    return Err(ConfigurationError::Invalid {
                        message: format!(
                            "wait_time_seconds must be at most {} for SQS, got {}",
                            SQS_MAX_WAIT_SECONDS, self.wait_time_seconds
                        ),
                    });
                }
                sqs.validate()?;
                if sqs.request_timeout_seconds <= self.wait_time_seconds {
                    return Err(ConfigurationError::Invalid {
                        message: format!(
                            "request_timeout_seconds ({}) must exceed wait_time_seconds ({})",
                            sqs.request_timeout_seconds, self.wait_time_seconds
                        ),
                    });
                }
                Ok(())
            }
            ProviderConfig::InMemory(memory) => memory.validate(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: QueueName::default().to_string(),
            wait_time_seconds: SQS_MAX_WAIT_SECONDS,
            operation_timeout_seconds: 30,
            provider: ProviderConfig::InMemory(InMemoryConfig::default()),
        }
    }
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    AwsSqs(AwsSqsConfig),
    InMemory(InMemoryConfig),
}

impl ProviderConfig {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::AwsSqs(_) => ProviderType::AwsSqs,
            Self::InMemory(_) => ProviderType::InMemory,
        }
    }
}

/// AWS SQS configuration
///
/// Credentials left unset are read from `AWS_ACCESS_KEY_ID` and
/// `AWS_SECRET_ACCESS_KEY` when the provider is built.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsSqsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Override for SQS-compatible local servers, e.g. `http://localhost:9324`
    pub endpoint_url: Option<String>,
    pub request_timeout_seconds: u64,
    /// Visibility timeout requested on every receive, so receipt handles
    /// carry a known expiry
    pub visibility_timeout_seconds: u64,
}

impl AwsSqsConfig {
    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.region.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "queue.provider.region".to_string(),
            });
        }

        if self.visibility_timeout_seconds == 0
            || self.visibility_timeout_seconds > SQS_MAX_VISIBILITY_TIMEOUT_SECONDS
        {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "visibility_timeout_seconds must be between 1 and {}, got {}",
                    SQS_MAX_VISIBILITY_TIMEOUT_SECONDS, self.visibility_timeout_seconds
                ),
            });
        }

        if let Some(endpoint) = &self.endpoint_url {
            url::Url::parse(endpoint).map_err(|e| ConfigurationError::Invalid {
                message: format!("endpoint_url '{}': {}", endpoint, e),
            })?;
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }
}

impl Default for AwsSqsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: None,
            request_timeout_seconds: 30,
            visibility_timeout_seconds: 30,
        }
    }
}

impl std::fmt::Debug for AwsSqsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSqsConfig")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("visibility_timeout_seconds", &self.visibility_timeout_seconds)
            .finish()
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    pub max_queue_size: usize,
    /// How long a received message stays hidden before redelivery
    pub visibility_timeout_seconds: u64,
}

impl InMemoryConfig {
    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_queue_size == 0 {
            return Err(ConfigurationError::Invalid {
                message: "max_queue_size must be greater than zero".to_string(),
            });
        }
        // A zero window requeues a delivery before it can be deleted.
        if self.visibility_timeout_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                message: "visibility_timeout_seconds must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10000,
            visibility_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
