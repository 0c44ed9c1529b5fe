//! Message types for queue operations including core domain identifiers.

use crate::error::{SerializationError, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Reserved message key holding the name of the job to run.
pub const JOB_NAME_KEY: &str = "job";

const MAX_QUEUE_NAME_LENGTH: usize = 80;
const FIFO_SUFFIX: &str = ".fifo";

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name
///
/// Follows the SQS naming rules: 1-80 ASCII alphanumerics, hyphens or
/// underscores, with an optional `.fifo` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        let base = name.strip_suffix(FIFO_SUFFIX).unwrap_or(&name);

        if base.is_empty() || name.len() > MAX_QUEUE_NAME_LENGTH {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: format!("must be 1-{} characters", MAX_QUEUE_NAME_LENGTH),
            });
        }

        if !base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this names an SQS FIFO queue
    pub fn is_fifo(&self) -> bool {
        self.0.ends_with(FIFO_SUFFIX)
    }
}

impl Default for QueueName {
    /// The queue the service uses unless configured otherwise
    fn default() -> Self {
        Self("jobs".to_string())
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier assigned to a message by the queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Timestamp `duration` from now
    pub fn after(duration: Duration) -> Self {
        let delta =
            chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365));
        Self(Utc::now() + delta)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A unit of work travelling through the queue
///
/// A flat string-to-string map. The [`JOB_NAME_KEY`] entry selects the job
/// handler, every other entry is payload for that handler. Serialized as a
/// plain JSON object, e.g. `{"job":"welcome_email","email":"me@example.com"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobMessage(HashMap<String, String>);

impl JobMessage {
    /// Create an empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message addressed to the named job
    pub fn for_job(name: impl Into<String>) -> Self {
        Self::new().with_field(JOB_NAME_KEY, name)
    }

    /// Add a field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a field, returning the previous value if any
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Name of the job this message is addressed to, if any
    pub fn job_name(&self) -> Option<&str> {
        self.get(JOB_NAME_KEY)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encode as the JSON body sent over the wire
    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Decode a JSON body received from the queue
    pub fn from_json(body: &str) -> Result<Self, SerializationError> {
        serde_json::from_str(body).map_err(|e| SerializationError::InvalidBody {
            message: format!("expected a JSON object of strings: {}", e),
        })
    }
}

impl From<HashMap<String, String>> for JobMessage {
    fn from(fields: HashMap<String, String>) -> Self {
        Self(fields)
    }
}

impl<K, V> FromIterator<(K, V)> for JobMessage
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A message received from the queue with delivery metadata
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub message: JobMessage,
    pub receipt_handle: ReceiptHandle,
    /// Number of times this message has been delivered, starting at 1
    pub delivery_count: u32,
    pub delivered_at: Timestamp,
}

impl ReceivedMessage {
    pub fn job_name(&self) -> Option<&str> {
        self.message.job_name()
    }
}

/// Opaque token for acknowledging one delivery of a message
///
/// Each delivery of a message gets its own handle; a redelivered copy cannot
/// be deleted with the handle of an earlier delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHandle {
    handle: String,
    expires_at: Timestamp,
}

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>, expires_at: Timestamp) -> Self {
        Self {
            handle: handle.into(),
            expires_at,
        }
    }

    /// Get handle string
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Check if the visibility window of this delivery has passed
    pub fn is_expired(&self) -> bool {
        Timestamp::now() >= self.expires_at
    }

    /// Get time until expiry
    pub fn time_until_expiry(&self) -> Duration {
        (self.expires_at.as_datetime() - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
