use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::payload::clamp_sms;
use crate::sink::{Notification, NotificationSink, SinkError};

const GATEWAY_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct SmsSettings {
    pub gateway_url: String,
    pub account_id: String,
    pub user_id: String,
    pub secret: String,
    pub sender_id: String,
    pub recipients: Vec<String>,
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
    accountid: &'a str,
    userid: &'a str,
    secret: &'a str,
    from: &'a str,
    to: &'a str,
    text: &'a str,
}

/// HTTP SMS gateway sink. Sends the one-line summary, never the full body.
pub struct SmsSink {
    client: reqwest::Client,
    settings: SmsSettings,
}

impl SmsSink {
    pub fn new(settings: SmsSettings) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(GATEWAY_TIMEOUT_SECS))
            .build()?;
        Ok(SmsSink { client, settings })
    }
}

#[async_trait]
impl NotificationSink for SmsSink {
    fn name(&self) -> &'static str {
        "sms"
    }

    async fn send(&self, notification: &Notification<'_>) -> Result<(), SinkError> {
        let text = clamp_sms(notification.sms);
        // One gateway call per configured number.
        for recipient in &self.settings.recipients {
            let request = GatewayRequest {
                accountid: &self.settings.account_id,
                userid: &self.settings.user_id,
                secret: &self.settings.secret,
                from: &self.settings.sender_id,
                to: recipient,
                text: &text,
            };

            let response = self
                .client
                .post(&self.settings.gateway_url)
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(SinkError::Gateway {
                    status: status.as_u16(),
                    body: response.text().await.unwrap_or_default(),
                });
            }
            tracing::info!(to = %recipient, chars = text.chars().count(), "sms sent");
        }
        Ok(())
    }
}
