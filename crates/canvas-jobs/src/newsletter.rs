//! Newsletter signup jobs.
//!
//! The web tier enqueues these after a signup or a confirmation; the jobs
//! send the matching email.

use crate::emailer::{EmailAddress, EmailSender};
use crate::error::JobError;
use crate::registry::{JobContext, JobHandler, Registry};
use async_trait::async_trait;
use canvas_queue::JobMessage;
use std::sync::Arc;

#[cfg(test)]
#[path = "newsletter_tests.rs"]
mod tests;

pub const CONFIRMATION_EMAIL_JOB: &str = "confirmation_email";
pub const WELCOME_EMAIL_JOB: &str = "welcome_email";

const EMAIL_FIELD: &str = "email";
const TOKEN_FIELD: &str = "token";

/// Message asking for a confirmation email to be sent to a new subscriber
pub fn confirmation_email_message(email: &EmailAddress, token: &str) -> JobMessage {
    JobMessage::for_job(CONFIRMATION_EMAIL_JOB)
        .with_field(EMAIL_FIELD, email.as_str())
        .with_field(TOKEN_FIELD, token)
}

/// Message asking for a welcome email to be sent to a confirmed subscriber
pub fn welcome_email_message(email: &EmailAddress) -> JobMessage {
    JobMessage::for_job(WELCOME_EMAIL_JOB).with_field(EMAIL_FIELD, email.as_str())
}

/// Register both newsletter jobs on `registry`
pub fn register_newsletter_jobs<R>(registry: &mut R, emailer: Arc<dyn EmailSender>)
where
    R: Registry + ?Sized,
{
    registry.register_handler(
        CONFIRMATION_EMAIL_JOB,
        Arc::new(ConfirmationEmailJob::new(emailer.clone())),
    );
    registry.register_handler(WELCOME_EMAIL_JOB, Arc::new(WelcomeEmailJob::new(emailer)));
}

fn required_field<'a>(message: &'a JobMessage, field: &str) -> Result<&'a str, JobError> {
    message
        .get(field)
        .ok_or_else(|| JobError::missing_field(field))
}

fn email_field(message: &JobMessage) -> Result<EmailAddress, JobError> {
    let email = EmailAddress::new(required_field(message, EMAIL_FIELD)?);
    if !email.is_valid() {
        return Err(JobError::InvalidField {
            field: EMAIL_FIELD.to_string(),
            message: format!("'{}' is not a valid email address", email),
        });
    }
    Ok(email)
}

/// Sends the confirmation link for a newsletter signup
pub struct ConfirmationEmailJob {
    emailer: Arc<dyn EmailSender>,
}

impl ConfirmationEmailJob {
    pub fn new(emailer: Arc<dyn EmailSender>) -> Self {
        Self { emailer }
    }
}

#[async_trait]
impl JobHandler for ConfirmationEmailJob {
    async fn run(&self, _context: JobContext, message: JobMessage) -> Result<(), JobError> {
        let email = email_field(&message)?;
        let token = required_field(&message, TOKEN_FIELD)?;

        self.emailer
            .send_newsletter_confirmation_email(&email, token)
            .await?;
        Ok(())
    }
}

/// Sends the welcome email once a signup is confirmed
pub struct WelcomeEmailJob {
    emailer: Arc<dyn EmailSender>,
}

impl WelcomeEmailJob {
    pub fn new(emailer: Arc<dyn EmailSender>) -> Self {
        Self { emailer }
    }
}

#[async_trait]
impl JobHandler for WelcomeEmailJob {
    async fn run(&self, _context: JobContext, message: JobMessage) -> Result<(), JobError> {
        let email = email_field(&message)?;

        self.emailer.send_newsletter_welcome_email(&email).await?;
        Ok(())
    }
}
