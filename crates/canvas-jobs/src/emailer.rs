//! # Emailer Module
//!
//! Transactional and marketing email delivery through the Postmark HTTP API.
//!
//! Jobs talk to the [`EmailSender`] trait; [`PostmarkEmailer`] is the
//! production implementation. Email bodies are rendered from templates
//! compiled into the binary, with `{{base_url}}` and `{{action_url}}`
//! placeholders replaced at send time.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
#[path = "emailer_tests.rs"]
mod tests;

const MARKETING_MESSAGE_STREAM: &str = "broadcast";
const TRANSACTIONAL_MESSAGE_STREAM: &str = "outbound";

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*$";

// ============================================================================
// Errors
// ============================================================================

/// Errors from sending email
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Invalid email address: '{address}'")]
    InvalidAddress { address: String },

    #[error("Email request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Email API returned status {status}: {body}")]
    Status { status: u16, body: String },
}

// ============================================================================
// Email Address
// ============================================================================

/// An email address as entered by a user
///
/// Construction does not validate; call [`EmailAddress::is_valid`] before
/// sending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Check the address against a permissive pattern
    ///
    /// Top-level domains are optional (`me@example` passes); empty labels are
    /// not (`me@example.` and `me@example..example` fail).
    pub fn is_valid(&self) -> bool {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        PATTERN
            .get_or_init(|| Regex::new(EMAIL_PATTERN).ok())
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Borrow the address for sending, rejecting it if it fails [`Self::is_valid`]
    fn as_recipient(&self) -> Result<&str, EmailError> {
        if !self.is_valid() {
            return Err(EmailError::InvalidAddress {
                address: self.0.clone(),
            });
        }
        Ok(&self.0)
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Sender trait
// ============================================================================

/// Sends the emails that newsletter jobs need
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send a confirmation link for a newsletter signup
    ///
    /// Transactional, since it answers a user action.
    async fn send_newsletter_confirmation_email(
        &self,
        to: &EmailAddress,
        token: &str,
    ) -> Result<(), EmailError>;

    /// Send the welcome email after a confirmed signup
    async fn send_newsletter_welcome_email(&self, to: &EmailAddress) -> Result<(), EmailError>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Emailer configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailerConfig {
    /// Public URL of the web app, used for links in emails
    pub base_url: String,
    /// Postmark API root
    pub api_url: String,
    /// Postmark server token
    pub token: String,
    pub marketing_email_name: String,
    pub marketing_email_address: String,
    pub transactional_email_name: String,
    pub transactional_email_address: String,
    pub timeout_seconds: u64,
}

impl Default for EmailerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_url: "https://api.postmarkapp.com".to_string(),
            token: String::new(),
            marketing_email_name: "Canvas bot".to_string(),
            marketing_email_address: "bot@marketing.example.com".to_string(),
            transactional_email_name: "Canvas bot".to_string(),
            transactional_email_address: "bot@transactional.example.com".to_string(),
            timeout_seconds: 3,
        }
    }
}

impl std::fmt::Debug for EmailerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailerConfig")
            .field("base_url", &self.base_url)
            .field("api_url", &self.api_url)
            .field("token", &"<REDACTED>")
            .field("marketing_email_name", &self.marketing_email_name)
            .field("marketing_email_address", &self.marketing_email_address)
            .field("transactional_email_name", &self.transactional_email_name)
            .field("transactional_email_address", &self.transactional_email_address)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

// ============================================================================
// Postmark
// ============================================================================

/// Request body for the Postmark single email endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkRequest<'a> {
    message_stream: &'a str,
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: String,
    text_body: String,
}

/// Emailer backed by the Postmark API
pub struct PostmarkEmailer {
    client: reqwest::Client,
    base_url: String,
    endpoint: String,
    token: String,
    marketing_from: String,
    transactional_from: String,
}

impl PostmarkEmailer {
    pub fn new(config: EmailerConfig) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoint: format!("{}/email", config.api_url.trim_end_matches('/')),
            token: config.token,
            marketing_from: name_and_email(
                &config.marketing_email_name,
                &config.marketing_email_address,
            ),
            transactional_from: name_and_email(
                &config.transactional_email_name,
                &config.transactional_email_address,
            ),
        })
    }

    async fn send(&self, request: PostmarkRequest<'_>) -> Result<(), EmailError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-Postmark-Server-Token", &self.token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() > 299 {
            tracing::info!(
                status = status.as_u16(),
                response = %body,
                "Error sending email"
            );
            return Err(EmailError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(stream = request.message_stream, subject = request.subject, "Sent email");
        Ok(())
    }
}

impl std::fmt::Debug for PostmarkEmailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostmarkEmailer")
            .field("endpoint", &self.endpoint)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl EmailSender for PostmarkEmailer {
    async fn send_newsletter_confirmation_email(
        &self,
        to: &EmailAddress,
        token: &str,
    ) -> Result<(), EmailError> {
        let to = to.as_recipient()?;
        let action_url = format!(
            "{}/newsletter/confirm?token={}",
            self.base_url,
            urlencoding::encode(token)
        );
        let keywords = [
            ("base_url", self.base_url.as_str()),
            ("action_url", action_url.as_str()),
        ];

        self.send(PostmarkRequest {
            message_stream: TRANSACTIONAL_MESSAGE_STREAM,
            from: &self.transactional_from,
            to,
            subject: "Confirm your subscription to the Canvas newsletter",
            html_body: render(CONFIRMATION_EMAIL_HTML, &keywords),
            text_body: render(CONFIRMATION_EMAIL_TEXT, &keywords),
        })
        .await
    }

    async fn send_newsletter_welcome_email(&self, to: &EmailAddress) -> Result<(), EmailError> {
        let to = to.as_recipient()?;
        let keywords = [("base_url", self.base_url.as_str())];

        self.send(PostmarkRequest {
            message_stream: MARKETING_MESSAGE_STREAM,
            from: &self.marketing_from,
            to,
            subject: "Welcome to the Canvas newsletter",
            html_body: render(WELCOME_EMAIL_HTML, &keywords),
            text_body: render(WELCOME_EMAIL_TEXT, &keywords),
        })
        .await
    }
}

// ============================================================================
// Templates
// ============================================================================

const CONFIRMATION_EMAIL_HTML: &str = include_str!("../emails/confirmation_email.html");
const CONFIRMATION_EMAIL_TEXT: &str = include_str!("../emails/confirmation_email.txt");
const WELCOME_EMAIL_HTML: &str = include_str!("../emails/welcome_email.html");
const WELCOME_EMAIL_TEXT: &str = include_str!("../emails/welcome_email.txt");

/// Replace every `{{keyword}}` in `template`
fn render(template: &str, keywords: &[(&str, &str)]) -> String {
    keywords
        .iter()
        .fold(template.to_string(), |email, (keyword, replacement)| {
            email.replace(&format!("{{{{{}}}}}", keyword), replacement)
        })
}

/// Format a sender as `Name <address>`
fn name_and_email(name: &str, email: &str) -> String {
    format!("{} <{}>", name, email)
}
