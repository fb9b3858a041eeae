//! Outbound transactional email.
//!
//! Reducers compose an [`OutgoingEmail`] from [`templates`] and hand it to a
//! [`Mailer`]. Three mailers exist: SMTP for production, console for local
//! development and a recording mock for tests.

use async_trait::async_trait;

pub mod console;
pub mod mock;
pub mod smtp;
pub mod templates;

pub use console::ConsoleMailer;
pub use mock::RecordingMailer;
pub use smtp::SmtpMailer;

/// Mail delivery errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    /// Sender or recipient did not parse as a mailbox
    #[error("invalid address {address}: {reason}")]
    InvalidAddress {
        /// Offending address
        address: String,
        /// Parser message
        reason: String,
    },

    /// Message could not be assembled
    #[error("failed to build email: {0}")]
    Build(String),

    /// Transport refused or dropped the message
    #[error("failed to send email: {0}")]
    Transport(String),
}

/// File attached to an email
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown to the recipient
    pub filename: String,
    /// MIME type, e.g. `image/png`
    pub content_type: String,
    /// Raw bytes
    pub data: Vec<u8>,
}

/// An HTML email ready to send
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html_body: String,
    /// Optional single attachment
    pub attachment: Option<Attachment>,
}

/// Email delivery
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns a `NotificationError` if the message cannot be built or the
    /// transport rejects it.
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError>;
}
