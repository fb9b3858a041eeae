//! SMTP mailer using Lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::{Mailer, NotificationError, OutgoingEmail};

/// Sends real email through an authenticated SMTP relay (STARTTLS).
///
/// # Examples
///
/// ```ignore
/// let mailer = SmtpMailer::new(
///     "live.smtp.mailtrap.io",
///     587,
///     "api".to_string(),
///     "app_password".to_string(),
///     "hello@example.com",
///     "Venue Booking",
/// )?;
/// ```
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Create a mailer for `host:port` with the given credentials.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` if the sender does not parse, `Transport` if
    /// the relay cannot be configured.
    pub fn new(
        host: &str,
        port: u16,
        username: String,
        password: String,
        from_email: &str,
        from_name: &str,
    ) -> Result<Self, NotificationError> {
        let from = parse_mailbox(&format!("{from_name} <{from_email}>"))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| NotificationError::Transport(format!("SMTP relay error: {e}")))?
            .port(port)
            .credentials(Credentials::new(username, password))
            .build();

        Ok(Self { transport, from })
    }

    fn build_message(&self, email: OutgoingEmail) -> Result<Message, NotificationError> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject);

        let html = SinglePart::builder()
            .header(ContentType::TEXT_HTML)
            .body(email.html_body);

        let message = match email.attachment {
            None => builder.singlepart(html),
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| NotificationError::Build(format!("content type: {e}")))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(html)
                        .singlepart(
                            MimeAttachment::new(attachment.filename)
                                .body(attachment.data, content_type),
                        ),
                )
            }
        };

        message.map_err(|e| NotificationError::Build(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| NotificationError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError> {
        let to = email.to.clone();
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        debug!(to = %to, "Email sent");
        Ok(())
    }
}
