//! AWS SQS provider implementation using the SQS Query API over HTTP.
//!
//! Requests are form-encoded POSTs to the regional endpoint (or a configured
//! override such as ElasticMQ or LocalStack) carrying the `QueueUrl`
//! parameter, signed with AWS Signature Version 4. Responses are XML.
//!
//! ## Key Features
//!
//! - **AWS Signature V4**: Manual request signing for authentication
//! - **Long polling**: `WaitTimeSeconds` up to the SQS maximum of 20 seconds
//! - **Queue URL caching**: one `GetQueueUrl` call per queue
//! - **Test-friendly**: Mock HTTP responses in unit tests
//!
//! Message bodies are the JSON encoding of [`JobMessage`], sent as plain text.

use crate::client::QueueProvider;
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::message::{JobMessage, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp};
use crate::provider::{AwsSqsConfig, ProviderType, SQS_MAX_WAIT_SECONDS};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[cfg(test)]
#[path = "sqs_tests.rs"]
mod tests;

const API_VERSION: &str = "2012-11-05";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

// ============================================================================
// Error Types
// ============================================================================

/// AWS SQS specific errors
#[derive(Debug, thiserror::Error)]
pub enum SqsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("SQS service error: {code}: {message}")]
    ServiceError { code: String, message: String },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl From<SqsError> for QueueError {
    fn from(error: SqsError) -> Self {
        match error {
            SqsError::Authentication(message) => QueueError::AuthenticationFailed { message },
            SqsError::NetworkError(message) => QueueError::ConnectionFailed { message },
            SqsError::ServiceError { code, message } => QueueError::ProviderError {
                provider: ProviderType::AwsSqs.to_string(),
                code,
                message,
            },
            SqsError::QueueNotFound(queue_name) => QueueError::QueueNotFound { queue_name },
            SqsError::InvalidReceipt(receipt) => QueueError::MessageNotFound { receipt },
            SqsError::ConfigurationError(message) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message })
            }
            SqsError::InvalidResponse(message) => {
                QueueError::SerializationError(SerializationError::InvalidResponse { message })
            }
        }
    }
}

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature Version 4 signer for request authentication
///
/// 1. Create canonical request (method, URI, query, headers, payload)
/// 2. Create string to sign (algorithm, timestamp, scope, request hash)
/// 3. Derive signing key (4-level HMAC chain)
/// 4. Calculate signature and build Authorization header
#[derive(Clone)]
struct AwsV4Signer {
    access_key: String,
    secret_key: String,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(access_key: String, secret_key: String, region: String) -> Self {
        Self {
            access_key,
            secret_key,
            region,
            service: "sqs".to_string(),
        }
    }

    /// Sign a form-encoded POST to `/`
    ///
    /// Returns the `Authorization` and `x-amz-date` headers to attach.
    fn sign_request(
        &self,
        host: &str,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> Result<Vec<(&'static str, String)>, SqsError> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        // Canonical headers must be sorted by name
        let canonical_headers = format!(
            "content-type:{}\nhost:{}\nx-amz-date:{}\n",
            FORM_CONTENT_TYPE, host, amz_date
        );
        let signed_headers = "content-type;host;x-amz-date";
        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "POST\n/\n\n{}\n{}\n{}",
            canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp)?;

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.access_key, credential_scope, signed_headers, signature
        );

        Ok(vec![("authorization", authorization), ("x-amz-date", amz_date)])
    }

    /// kSecret -> kDate -> kRegion -> kService -> kSigning -> signature
    fn calculate_signature(
        &self,
        string_to_sign: &str,
        date_stamp: &str,
    ) -> Result<String, SqsError> {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes())?;

        Ok(hex::encode(signature))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SqsError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| SqsError::ConfigurationError(format!("Invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Encode parameters as a form body with a stable (sorted) order
fn form_body(params: &[(&str, String)]) -> String {
    let mut pairs = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>();
    pairs.sort();
    pairs.join("&")
}

// ============================================================================
// AWS SQS Provider
// ============================================================================

/// AWS SQS queue provider implementation
///
/// The provider is thread-safe and can be shared across async tasks using
/// `Arc`. The queue URL cache is protected by an async `RwLock`.
pub struct SqsProvider {
    http_client: HttpClient,
    signer: Option<AwsV4Signer>,
    config: AwsSqsConfig,
    endpoint: url::Url,
    queue_url_cache: Arc<RwLock<HashMap<QueueName, String>>>,
}

impl SqsProvider {
    /// Create new AWS SQS provider
    ///
    /// Credentials missing from `config` are taken from `AWS_ACCESS_KEY_ID`
    /// and `AWS_SECRET_ACCESS_KEY`. Without credentials requests are sent
    /// unsigned, which only SQS-compatible local servers accept.
    pub fn new(config: AwsSqsConfig) -> Result<Self, SqsError> {
        if config.region.is_empty() {
            return Err(SqsError::ConfigurationError(
                "Region cannot be empty".to_string(),
            ));
        }

        let access_key = config
            .access_key_id
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok());
        let secret_key = config
            .secret_access_key
            .clone()
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok());

        let signer = match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => Some(AwsV4Signer::new(
                access_key,
                secret_key,
                config.region.clone(),
            )),
            _ => {
                tracing::warn!(
                    region = %config.region,
                    "No AWS credentials configured, SQS requests will be unsigned"
                );
                None
            }
        };

        let endpoint = config
            .endpoint_url
            .clone()
            .unwrap_or_else(|| format!("https://sqs.{}.amazonaws.com", config.region));
        let endpoint = url::Url::parse(&endpoint).map_err(|e| {
            SqsError::ConfigurationError(format!("Invalid endpoint '{}': {}", endpoint, e))
        })?;

        let http_client = HttpClient::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SqsError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            signer,
            config,
            endpoint,
            queue_url_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Get queue URL for a queue name, with caching
    async fn get_queue_url(&self, queue_name: &QueueName) -> Result<String, SqsError> {
        {
            let cache = self.queue_url_cache.read().await;
            if let Some(url) = cache.get(queue_name) {
                return Ok(url.clone());
            }
        }

        let response = self
            .make_request(&[
                ("Action", "GetQueueUrl".to_string()),
                ("QueueName", queue_name.as_str().to_string()),
            ])
            .await
            .map_err(|e| match e {
                SqsError::QueueNotFound(_) => SqsError::QueueNotFound(queue_name.to_string()),
                other => other,
            })?;

        let queue_url = parse_queue_url_response(&response)?;
        tracing::debug!(queue = %queue_name, queue_url = %queue_url, "Resolved SQS queue URL");

        let mut cache = self.queue_url_cache.write().await;
        cache.insert(queue_name.clone(), queue_url.clone());

        Ok(queue_url)
    }

    /// Host header value as the HTTP client will send it
    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// POST a signed Query API action and return the response body
    async fn make_request(&self, params: &[(&str, String)]) -> Result<String, SqsError> {
        let mut params = params.to_vec();
        params.push(("Version", API_VERSION.to_string()));
        let body = form_body(&params);

        let mut request = self
            .http_client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE);

        if let Some(signer) = &self.signer {
            for (name, value) in signer.sign_request(&self.host(), &body, &Utc::now())? {
                request = request.header(name, value);
            }
        }

        let response = request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                SqsError::NetworkError(format!("Request timeout: {}", e))
            } else if e.is_connect() {
                SqsError::NetworkError(format!("Connection failed: {}", e))
            } else {
                SqsError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| SqsError::NetworkError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(parse_error_response(&response_body, status.as_u16()));
        }

        Ok(response_body)
    }
}

impl fmt::Debug for SqsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqsProvider")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint.as_str())
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

#[async_trait]
impl QueueProvider for SqsProvider {
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &JobMessage,
    ) -> Result<MessageId, QueueError> {
        let queue_url = self.get_queue_url(queue).await?;
        let body = message.to_json()?;

        let mut params = vec![
            ("Action", "SendMessage".to_string()),
            ("QueueUrl", queue_url),
            ("MessageBody", body),
        ];
        if queue.is_fifo() {
            // FIFO queues require a group; all jobs share one.
            params.push(("MessageGroupId", "jobs".to_string()));
            params.push(("MessageDeduplicationId", uuid::Uuid::new_v4().to_string()));
        }

        let response = self.make_request(&params).await?;
        let message_id = parse_send_message_response(&response)?;

        tracing::debug!(queue = %queue, message_id = %message_id, "Sent SQS message");
        Ok(message_id)
    }

    async fn receive_message(
        &self,
        queue: &QueueName,
        wait_time: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let queue_url = self.get_queue_url(queue).await?;
        let wait_seconds = wait_time.as_secs().min(SQS_MAX_WAIT_SECONDS);
        let visibility = self.config.visibility_timeout();

        // The window starts when SQS hands the message out, which is after
        // this point, so the recorded expiry errs early.
        let expires_at = Timestamp::after(visibility);
        let response = self
            .make_request(&[
                ("Action", "ReceiveMessage".to_string()),
                ("QueueUrl", queue_url),
                ("MaxNumberOfMessages", "1".to_string()),
                ("WaitTimeSeconds", wait_seconds.to_string()),
                ("VisibilityTimeout", visibility.as_secs().to_string()),
                ("AttributeName.1", "ApproximateReceiveCount".to_string()),
            ])
            .await?;

        let Some(raw) = parse_receive_message_response(&response)?.into_iter().next() else {
            return Ok(None);
        };

        let message = JobMessage::from_json(&raw.body)?;
        let message_id = MessageId::from_str(&raw.message_id).unwrap_or_default();

        Ok(Some(ReceivedMessage {
            message_id,
            message,
            receipt_handle: ReceiptHandle::new(raw.receipt_handle, expires_at),
            delivery_count: raw.receive_count,
            delivered_at: Timestamp::now(),
        }))
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let queue_url = self.get_queue_url(queue).await?;

        self.make_request(&[
            ("Action", "DeleteMessage".to_string()),
            ("QueueUrl", queue_url),
            ("ReceiptHandle", receipt.handle().to_string()),
        ])
        .await?;

        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AwsSqs
    }
}

// ============================================================================
// XML Response Parsing
// ============================================================================

/// A message as found in a ReceiveMessage response
#[derive(Debug, Clone, PartialEq)]
struct RawMessage {
    message_id: String,
    receipt_handle: String,
    body: String,
    receive_count: u32,
}

/// Extract the text of the first `tag` element
fn first_element_text(xml: &str, tag: &[u8]) -> Result<Option<String>, SqsError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut inside = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == tag => inside = true,
            Ok(Event::Text(e)) if inside => {
                return e
                    .unescape()
                    .map(|s| Some(s.into_owned()))
                    .map_err(|e| SqsError::InvalidResponse(format!("Failed to parse XML: {}", e)));
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == tag => inside = false,
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(SqsError::InvalidResponse(format!("XML parsing error: {}", e))),
            _ => {}
        }
        buf.clear();
    }
}

fn parse_queue_url_response(xml: &str) -> Result<String, SqsError> {
    first_element_text(xml, b"QueueUrl")?
        .ok_or_else(|| SqsError::InvalidResponse("QueueUrl not found in response".to_string()))
}

fn parse_send_message_response(xml: &str) -> Result<MessageId, SqsError> {
    let id = first_element_text(xml, b"MessageId")?
        .ok_or_else(|| SqsError::InvalidResponse("MessageId not found in response".to_string()))?;
    MessageId::from_str(&id).map_err(|e| SqsError::InvalidResponse(e.to_string()))
}

/// Parse error response from XML
fn parse_error_response(xml: &str, status_code: u16) -> SqsError {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut error_code = None;
    let mut error_message = None;
    let mut in_error = false;
    let mut in_code = false;
    let mut in_message = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Error" => in_error = true,
                b"Code" if in_error => in_code = true,
                b"Message" if in_error => in_message = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_code {
                    error_code = e.unescape().ok().map(|s| s.into_owned());
                    in_code = false;
                } else if in_message {
                    error_message = e.unescape().ok().map(|s| s.into_owned());
                    in_message = false;
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Error" => in_error = false,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let code = error_code.unwrap_or_else(|| format!("HTTP{}", status_code));
    let message = error_message.unwrap_or_else(|| "Unknown error".to_string());

    match code.as_str() {
        "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
            SqsError::QueueNotFound(message)
        }
        "InvalidClientTokenId"
        | "UnrecognizedClientException"
        | "SignatureDoesNotMatch"
        | "MissingAuthenticationToken"
        | "AccessDenied" => SqsError::Authentication(format!("{}: {}", code, message)),
        "ReceiptHandleIsInvalid" | "InvalidReceiptHandle" => SqsError::InvalidReceipt(message),
        _ if status_code == 401 || status_code == 403 => {
            SqsError::Authentication(format!("{}: {}", code, message))
        }
        _ => SqsError::ServiceError { code, message },
    }
}

/// Parse ReceiveMessage XML response
fn parse_receive_message_response(xml: &str) -> Result<Vec<RawMessage>, SqsError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    #[derive(Clone, Copy, PartialEq)]
    enum Field {
        None,
        MessageId,
        ReceiptHandle,
        Body,
        AttributeName,
        AttributeValue,
    }

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut messages = Vec::new();
    let mut in_message = false;
    let mut field = Field::None;

    let mut message_id = None;
    let mut receipt_handle = None;
    let mut body = None;
    let mut receive_count = 1;
    let mut attribute_name: Option<String> = None;

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Message" => {
                    in_message = true;
                    message_id = None;
                    receipt_handle = None;
                    body = None;
                    receive_count = 1;
                }
                b"MessageId" if in_message => field = Field::MessageId,
                b"ReceiptHandle" if in_message => field = Field::ReceiptHandle,
                b"Body" if in_message => field = Field::Body,
                b"Name" if in_message => field = Field::AttributeName,
                b"Value" if in_message => field = Field::AttributeValue,
                _ => {}
            },
            Ok(Event::Text(e)) if field != Field::None => {
                let text = e
                    .unescape()
                    .map(|s| s.into_owned())
                    .map_err(|e| SqsError::InvalidResponse(format!("Failed to parse XML: {}", e)))?;
                match field {
                    Field::MessageId => message_id = Some(text),
                    Field::ReceiptHandle => receipt_handle = Some(text),
                    Field::Body => body = Some(text),
                    Field::AttributeName => attribute_name = Some(text),
                    Field::AttributeValue => {
                        if attribute_name.as_deref() == Some("ApproximateReceiveCount") {
                            receive_count = text.parse().unwrap_or(1);
                        }
                        attribute_name = None;
                    }
                    Field::None => {}
                }
                field = Field::None;
            }
            Ok(Event::End(ref e)) => {
                field = Field::None;
                if e.name().as_ref() == b"Message" {
                    in_message = false;
                    match (receipt_handle.take(), body.take()) {
                        (Some(receipt_handle), Some(body)) => messages.push(RawMessage {
                            message_id: message_id.take().unwrap_or_default(),
                            receipt_handle,
                            body,
                            receive_count,
                        }),
                        _ => tracing::warn!("Skipping SQS message without body or receipt handle"),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SqsError::InvalidResponse(format!("XML parsing error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}
