use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::sink::{Notification, NotificationSink, SinkError};

const SMTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub sender: String,
    pub recipients: Vec<String>,
}

/// SMTP sink: multipart text + HTML body with the source CSV attached.
/// One message addressed to every configured recipient.
pub struct EmailSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    recipients: Vec<Mailbox>,
}

impl EmailSink {
    pub fn new(settings: &SmtpSettings) -> Result<Self, SinkError> {
        // Implicit TLS on 465, STARTTLS otherwise.
        let builder = if settings.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        }
        .map_err(|e| SinkError::Smtp(e.to_string()))?;

        Ok(EmailSink {
            transport: builder
                .port(settings.port)
                .credentials(Credentials::new(
                    settings.user.clone(),
                    settings.password.clone(),
                ))
                .build(),
            sender: parse_mailbox(&settings.sender)?,
            recipients: settings
                .recipients
                .iter()
                .map(|r| parse_mailbox(r))
                .collect::<Result<_, _>>()?,
        })
    }

    async fn compose(&self, notification: &Notification<'_>) -> Result<Message, SinkError> {
        let alternative = MultiPart::alternative_plain_html(
            notification.text.to_string(),
            notification.html.to_string(),
        );

        let body = match notification.attachment {
            Some(path) => {
                let bytes = tokio::fs::read(path).await?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "export.csv".to_string());
                let csv_type = ContentType::parse("text/csv")
                    .map_err(|e| SinkError::Smtp(e.to_string()))?;
                MultiPart::mixed()
                    .multipart(alternative)
                    .singlepart(Attachment::new(filename).body(bytes, csv_type))
            }
            None => MultiPart::mixed().multipart(alternative),
        };

        let mut builder = Message::builder().from(self.sender.clone());
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }
        builder
            .subject(notification.subject)
            .multipart(body)
            .map_err(|e| SinkError::Smtp(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, SinkError> {
    address
        .parse()
        .map_err(|e| SinkError::Smtp(format!("invalid address {address:?}: {e}")))
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, notification: &Notification<'_>) -> Result<(), SinkError> {
        let message = self.compose(notification).await?;
        let sent = tokio::time::timeout(
            Duration::from_secs(SMTP_TIMEOUT_SECS),
            self.transport.send(message),
        )
        .await
        .map_err(|_| SinkError::Timeout(SMTP_TIMEOUT_SECS))?;

        sent.map_err(|e| SinkError::Smtp(e.to_string()))?;
        tracing::info!(recipients = self.recipients.len(), "summary e-mail sent");
        Ok(())
    }
}
