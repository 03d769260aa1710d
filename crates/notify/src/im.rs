use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde_json::json;

use crate::sink::{Notification, NotificationSink, SinkError};

const WEBHOOK_TIMEOUT_SECS: u64 = 120;

/// How often the IM channel gets the summary. Parsed from
/// `NOTIFICATION_FREQUENCY`; anything unrecognised falls back to daily.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    /// Every N days.
    EveryDays(u32),
    /// On a fixed weekday, at most once per week.
    OnWeekday(Weekday),
}

impl Cadence {
    pub fn parse(raw: &str) -> Cadence {
        let value = raw.trim().to_lowercase();
        match value.as_str() {
            "" | "daily" | "quotidien" => Cadence::Daily,
            "weekly" | "hebdomadaire" => Cadence::Weekly,
            "monthly" | "mensuel" => Cadence::Monthly,
            _ => {
                if let Ok(days) = value.parse::<u32>() {
                    if days > 0 {
                        return Cadence::EveryDays(days);
                    }
                }
                if let Some(weekday) = parse_weekday(&value) {
                    return Cadence::OnWeekday(weekday);
                }
                tracing::warn!(frequency = raw, "unrecognised cadence, using daily");
                Cadence::Daily
            }
        }
    }

    /// Whether a send is due today given the last recorded send.
    pub fn due(self, last: Option<NaiveDate>, today: NaiveDate) -> bool {
        let elapsed = |last: NaiveDate| (today - last).num_days();
        match self {
            Cadence::Daily => last.is_none_or(|l| elapsed(l) >= 1),
            Cadence::Weekly => last.is_none_or(|l| elapsed(l) >= 7),
            Cadence::Monthly => last.is_none_or(|l| elapsed(l) >= 30),
            Cadence::EveryDays(days) => last.is_none_or(|l| elapsed(l) >= i64::from(days)),
            // The 6-day guard keeps a late manual run from doubling up the
            // following week.
            Cadence::OnWeekday(weekday) => {
                today.weekday() == weekday && last.is_none_or(|l| elapsed(l) >= 6)
            }
        }
    }
}

fn parse_weekday(value: &str) -> Option<Weekday> {
    match value {
        "monday" | "lundi" => Some(Weekday::Mon),
        "tuesday" | "mardi" => Some(Weekday::Tue),
        "wednesday" | "mercredi" => Some(Weekday::Wed),
        "thursday" | "jeudi" => Some(Weekday::Thu),
        "friday" | "vendredi" => Some(Weekday::Fri),
        "saturday" | "samedi" => Some(Weekday::Sat),
        "sunday" | "dimanche" => Some(Weekday::Sun),
        _ => None,
    }
}

/// `.last_im_notification` marker: one ISO-8601 timestamp, overwritten on
/// every send.
pub struct ImMarker {
    path: PathBuf,
}

impl ImMarker {
    pub fn new(path: PathBuf) -> Self {
        ImMarker { path }
    }

    pub fn last_sent(&self) -> Option<NaiveDate> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let raw = raw.trim();
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .map(|dt| dt.date())
            .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
            .ok()
    }

    pub fn record(&self, now: NaiveDateTime) -> Result<(), std::io::Error> {
        fs::write(&self.path, format!("{}\n", now.format("%Y-%m-%dT%H:%M:%S")))
    }
}

/// Instant-messaging webhook sink. Posts the SMS one-liner as JSON.
pub struct ImSink {
    client: reqwest::Client,
    webhook_url: String,
}

impl ImSink {
    pub fn new(webhook_url: String) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;
        Ok(ImSink { client, webhook_url })
    }
}

#[async_trait]
impl NotificationSink for ImSink {
    fn name(&self) -> &'static str {
        "im"
    }

    async fn send(&self, notification: &Notification<'_>) -> Result<(), SinkError> {
        let body = webhook_body(notification);
        let response = self.client.post(&self.webhook_url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Gateway {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        tracing::info!("im webhook notified");
        Ok(())
    }
}

fn webhook_body(notification: &Notification<'_>) -> serde_json::Value {
    json!({ "text": notification.sms })
}
