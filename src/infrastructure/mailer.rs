//! Outbound email.
//!
//! [`HttpMailer`] hands messages to an HTTP mail relay. [`LogMailer`] only
//! logs them and is used when no relay is configured. Sending always happens
//! from a background task, so a failure here never reaches the client that
//! triggered it.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::domain::User;

/// Attempts made by [`HttpMailer`] before giving up.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Pause between two attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

// =============================================================================
// Mailer Error
// =============================================================================

/// Error type for mail delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailerError {
    /// The relay could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The relay did not answer in time.
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// The relay answered with a non-success status.
    #[error("Rejected by relay: {0}")]
    Rejected(String),
}

impl MailerError {
    fn from_reqwest(error: &reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
        } else if error.is_connect() {
            Self::ConnectionFailed(error.to_string())
        } else {
            Self::Rejected(error.to_string())
        }
    }
}

// =============================================================================
// Email
// =============================================================================

/// A rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

impl Email {
    /// The message sent after a user registers.
    #[must_use]
    pub fn welcome(user: &User) -> Self {
        let subject = "Welcome to Greenlight!".to_string();
        let plain_body = format!(
            "Hi {name},\n\n\
             Thanks for signing up for a Greenlight account. We're excited to have you on board!\n\n\
             For future reference, your user ID number is {id}.\n\n\
             Thanks,\n\nThe Greenlight Team\n",
            name = user.name,
            id = user.id,
        );
        let html_body = format!(
            "<!doctype html>\n<html>\n<body>\n\
             <p>Hi {name},</p>\n\
             <p>Thanks for signing up for a Greenlight account. We're excited to have you on board!</p>\n\
             <p>For future reference, your user ID number is {id}.</p>\n\
             <p>Thanks,</p>\n<p>The Greenlight Team</p>\n\
             </body>\n</html>\n",
            name = user.name,
            id = user.id,
        );

        Self {
            to: user.email.clone(),
            subject,
            plain_body,
            html_body,
        }
    }
}

// =============================================================================
// Mailer Trait
// =============================================================================

/// Delivers rendered messages.
pub trait Mailer: Send + Sync + std::fmt::Debug {
    fn send(&self, email: Email) -> BoxFuture<'_, Result<(), MailerError>>;
}

// =============================================================================
// HTTP Mailer
// =============================================================================

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    #[serde(flatten)]
    email: &'a Email,
}

/// Posts messages as JSON to a mail relay, retrying a fixed number of times.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    sender: String,
    timeout: Duration,
    attempts: u32,
    backoff: Duration,
}

impl HttpMailer {
    /// Creates a mailer for the relay at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, sender: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            sender: sender.into(),
            timeout,
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Overrides the retry schedule. `attempts` is clamped to at least one.
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    async fn post_once(&self, email: &Email) -> Result<(), MailerError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&RelayMessage {
                from: &self.sender,
                email,
            })
            .send()
            .await
            .map_err(|error| MailerError::from_reqwest(&error, self.timeout))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(MailerError::Rejected(format!("HTTP {}", response.status())))
        }
    }

    async fn send_with_retry(&self, email: Email) -> Result<(), MailerError> {
        let mut attempt = 1;
        loop {
            match self.post_once(&email).await {
                Ok(()) => {
                    tracing::debug!(to = %email.to, attempt, "Email delivered");
                    return Ok(());
                }
                Err(error) if attempt < self.attempts => {
                    tracing::warn!(to = %email.to, attempt, error = %error, "Email delivery failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::warn!(to = %email.to, attempt, error = %error, "Email delivery failed");
                    return Err(error);
                }
            }
        }
    }
}

impl Mailer for HttpMailer {
    fn send(&self, email: Email) -> BoxFuture<'_, Result<(), MailerError>> {
        Box::pin(self.send_with_retry(email))
    }
}

// =============================================================================
// Log Mailer
// =============================================================================

/// Logs messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: Email) -> BoxFuture<'_, Result<(), MailerError>> {
        Box::pin(async move {
            tracing::info!(
                to = %email.to,
                subject = %email.subject,
                body = %email.plain_body,
                "Email not sent: no relay configured"
            );
            Ok(())
        })
    }
}

// =============================================================================
// Stub Mailer
// =============================================================================

/// Records messages in memory. Used by tests.
#[derive(Debug, Clone, Default)]
pub struct StubMailer {
    sent: Arc<Mutex<Vec<Email>>>,
    failure: Option<MailerError>,
}

impl StubMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails with `error`. Nothing is recorded.
    #[must_use]
    pub fn failing(error: MailerError) -> Self {
        Self {
            sent: Arc::default(),
            failure: Some(error),
        }
    }

    /// Messages delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().clone()
    }
}

impl Mailer for StubMailer {
    fn send(&self, email: Email) -> BoxFuture<'_, Result<(), MailerError>> {
        Box::pin(async move {
            if let Some(error) = &self.failure {
                return Err(error.clone());
            }
            self.sent.lock().push(email);
            Ok(())
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
