use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from the mail relay.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Request construction or transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay answered with a non-success status
    #[error("Mail relay rejected notification: {0}")]
    Status(StatusCode),
}

/// One notification to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Recipient address
    pub recipient: String,

    /// Subject line
    pub subject: String,

    /// Plain-text body
    pub message: String,
}

/// Configuration for the mailer client.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Full URL of the relay's send endpoint.
    pub endpoint: String,

    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl MailerConfig {
    /// Config for the given endpoint with the default timeout.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for the mail relay service.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct MailerClient {
    client: reqwest::Client,
    config: MailerConfig,
}

impl MailerClient {
    /// Create a client for the configured relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: MailerConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Post one notification to the relay.
    ///
    /// Delivery beyond the relay is not observed: a success here means the
    /// relay accepted the message, nothing more.
    ///
    /// # Errors
    ///
    /// Returns `Http` for transport failures and `Status` when the relay
    /// answers with a non-2xx status.
    pub async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        debug!(
            recipient = %notification.recipient,
            subject = %notification.subject,
            "Sending notification to mail relay"
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Mail relay rejected notification");
            return Err(NotifyError::Status(status));
        }

        Ok(())
    }
}
