use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("smtp: {0}")]
    Smtp(String),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway refused: status {status}: {body}")]
    Gateway { status: u16, body: String },
    #[error("timed out after {0} s")]
    Timeout(u64),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// One outgoing notification. Each sink picks the parts it can carry: SMTP
/// takes everything, SMS keeps only `sms`, the webhook keeps only `text`.
pub struct Notification<'a> {
    pub subject: &'a str,
    pub text: &'a str,
    pub html: &'a str,
    pub sms: &'a str,
    /// Source CSV attached to the e-mail when present.
    pub attachment: Option<&'a Path>,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Stable name used in logs and failure reports.
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &Notification<'_>) -> Result<(), SinkError>;
}
