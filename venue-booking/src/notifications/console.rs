//! Console mailer for local development.

use async_trait::async_trait;
use tracing::info;

use super::{Mailer, NotificationError, OutgoingEmail};

/// Logs every email instead of sending it
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleMailer;

impl ConsoleMailer {
    /// Create a console mailer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError> {
        let attachment = email
            .attachment
            .as_ref()
            .map(|a| format!("{} ({}, {} bytes)", a.filename, a.content_type, a.data.len()));

        info!(
            to = %email.to,
            subject = %email.subject,
            attachment = attachment.as_deref().unwrap_or("none"),
            "\n\n\
            ┌────────────────────────────────────────────────────────────────┐\n\
            │                       Outgoing Email                           │\n\
            └────────────────────────────────────────────────────────────────┘\n\
            {}\n",
            email.html_body
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_succeeds() {
        let result = ConsoleMailer::new()
            .send(OutgoingEmail {
                to: "ali@graduate.utm.my".to_string(),
                subject: "Hello".to_string(),
                html_body: "<p>Hello</p>".to_string(),
                attachment: None,
            })
            .await;

        assert!(result.is_ok());
    }
}
