pub mod smtp;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::models::SenderAccount;

/// A file sent identically to every recipient of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// One composed message for exactly one recipient.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachments: Arc<[MailAttachment]>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Send failed: {0}")]
    Transport(String),
}

/// An authenticated channel to the provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailSession: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), MailError>;
}

/// Opens sessions for a sender. Opening is configuration only; no I/O happens
/// until the first `send`.
#[cfg_attr(test, mockall::automock)]
pub trait MailTransport: Send + Sync {
    fn open(&self, sender: &SenderAccount) -> Result<Box<dyn MailSession>, MailError>;
}

/// Mailer abstraction (SMTP in production, swappable in tests)
#[derive(Clone)]
pub struct Mailer {
    transport: Arc<dyn MailTransport>,
}

impl Mailer {
    /// Create an SMTP-backed mailer from the provider settings in `config`.
    pub fn smtp(config: &Config) -> Self {
        Self::with_transport(Arc::new(smtp::SmtpTransport::from_config(config)))
    }

    pub fn with_transport(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }

    /// Open one session for the whole batch.
    pub fn open_session(&self, sender: &SenderAccount) -> Result<Box<dyn MailSession>, MailError> {
        self.transport.open(sender)
    }
}
