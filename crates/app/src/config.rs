use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;

use fourmi_core::Catalog;
use fourmi_notify::{Cadence, SmsSettings, SmtpSettings};

/// Append-only `path,mtime_epoch,date` lines; one per notified export.
pub const NOTIFIED_MARKER: &str = ".last_notified_csv";
pub const IM_MARKER: &str = ".last_im_notification";

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

/// Everything a run needs, resolved once from the environment and the
/// catalog file. Read-only afterwards.
pub struct Config {
    pub data_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub catalog: Catalog,
    pub reports_base_url: String,
    pub signing_key: Option<String>,
    pub smtp: Option<SmtpSettings>,
    pub sms: Option<SmsSettings>,
    pub im_webhook_url: Option<String>,
    pub im_cadence: Cadence,
    pub fetch_command: Option<String>,
    pub fetch_timeout_secs: u64,
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Comma-separated recipient lists such as `NOTIFICATION_EMAIL`.
fn env_list(name: &str) -> Vec<String> {
    env_opt(name).map(|v| split_list(&v)).unwrap_or_default()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn load() -> Result<Self> {
        let data_dir = env_opt("FOURMI_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));
        let downloads_dir = data_dir.join("downloads");
        let logs_dir = data_dir.join("logs");
        let reports_dir = data_dir.join("reports");
        for dir in [&data_dir, &downloads_dir, &logs_dir, &reports_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("cannot create {}", dir.display()))?;
        }

        let catalog_path = data_dir.join("catalog.json");
        let mut catalog = if catalog_path.is_file() {
            Catalog::from_file(&catalog_path)
                .with_context(|| format!("unreadable catalog {}", catalog_path.display()))?
        } else {
            tracing::warn!(
                "no catalog at {}, starting with an empty one",
                catalog_path.display()
            );
            Catalog::default()
        };

        if let Some(raw) = env_opt("BUDGET_VARIABLE") {
            let budget: Decimal = raw
                .parse()
                .with_context(|| format!("BUDGET_VARIABLE is not a number: {raw:?}"))?;
            catalog.totals.budget_variable_max = budget;
        }

        let smtp = match env_opt("SMTP_HOST") {
            Some(host) => {
                let recipients = env_list("NOTIFICATION_EMAIL");
                anyhow::ensure!(
                    !recipients.is_empty(),
                    "SMTP_HOST is set but NOTIFICATION_EMAIL is missing"
                );
                Some(SmtpSettings {
                    host,
                    port: match env_opt("SMTP_PORT") {
                        Some(p) => p.parse().context("SMTP_PORT is not a port number")?,
                        None => 465,
                    },
                    user: env_opt("SMTP_USER").unwrap_or_default(),
                    password: env_opt("SMTP_PASSWORD").unwrap_or_default(),
                    sender: env_opt("SMTP_SENDER")
                        .context("SMTP_HOST is set but SMTP_SENDER is missing")?,
                    recipients,
                })
            }
            None => None,
        };

        let sms = match env_opt("SMS_GATEWAY_URL") {
            Some(gateway_url) => {
                let recipients = env_list("SMS_RECIPIENT");
                anyhow::ensure!(
                    !recipients.is_empty(),
                    "SMS_GATEWAY_URL is set but SMS_RECIPIENT is missing"
                );
                Some(SmsSettings {
                    gateway_url,
                    account_id: env_opt("SMS_ACCOUNT_ID").unwrap_or_default(),
                    user_id: env_opt("SMS_USER_ID").unwrap_or_default(),
                    secret: env_opt("SMS_SECRET").unwrap_or_default(),
                    sender_id: env_opt("SMS_SENDER_ID").unwrap_or_default(),
                    recipients,
                })
            }
            None => None,
        };

        let reports_base_url = env_opt("REPORTS_BASE_URL")
            .unwrap_or_else(|| format!("file://{}", reports_dir.display()));

        Ok(Config {
            data_dir,
            downloads_dir,
            logs_dir,
            reports_dir,
            catalog,
            reports_base_url,
            signing_key: env_opt("REPORTS_SIGNING_KEY"),
            smtp,
            sms,
            im_webhook_url: env_opt("IM_WEBHOOK_URL"),
            im_cadence: Cadence::parse(&env_opt("NOTIFICATION_FREQUENCY").unwrap_or_default()),
            fetch_command: env_opt("EXPORT_FETCH_COMMAND"),
            fetch_timeout_secs: match env_opt("EXPORT_FETCH_TIMEOUT_SECS") {
                Some(raw) => raw
                    .parse()
                    .context("EXPORT_FETCH_TIMEOUT_SECS is not a number")?,
                None => DEFAULT_FETCH_TIMEOUT_SECS,
            },
        })
    }

    pub fn ml_dir(&self) -> PathBuf {
        self.data_dir.join("ml")
    }

    pub fn notified_marker_path(&self) -> PathBuf {
        self.data_dir.join(NOTIFIED_MARKER)
    }

    pub fn im_marker_path(&self) -> PathBuf {
        self.data_dir.join(IM_MARKER)
    }

    /// Newest CSV export by mtime across the data and downloads directories.
    /// With `check_already_sent`, an export whose marker line carries today's
    /// date is treated as absent.
    pub fn latest_export(&self, check_already_sent: bool, today: NaiveDate) -> Option<PathBuf> {
        let mut newest: Option<(PathBuf, i64)> = None;
        for dir in [&self.data_dir, &self.downloads_dir] {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let is_csv = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
                if !is_csv || !path.is_file() {
                    continue;
                }
                let mtime = mtime_epoch(&path);
                if newest.as_ref().is_none_or(|(_, best)| mtime > *best) {
                    newest = Some((path, mtime));
                }
            }
        }

        let (path, mtime) = newest?;
        if check_already_sent && self.already_notified(&path, mtime, today) {
            tracing::info!("export {} already notified today", path.display());
            return None;
        }
        Some(path)
    }

    fn already_notified(&self, path: &Path, mtime: i64, today: NaiveDate) -> bool {
        let Ok(raw) = fs::read_to_string(self.notified_marker_path()) else {
            return false;
        };
        raw.lines().any(|l| l == marker_line(path, mtime, today))
    }

    /// Record the export as notified; appending the same line twice in one
    /// day is a no-op.
    pub fn mark_export_notified(&self, path: &Path, today: NaiveDate) -> Result<()> {
        let mtime = mtime_epoch(path);
        if self.already_notified(path, mtime, today) {
            return Ok(());
        }
        let marker = self.notified_marker_path();
        let mut content = fs::read_to_string(&marker).unwrap_or_default();
        content.push_str(&marker_line(path, mtime, today));
        content.push('\n');
        fs::write(&marker, content)
            .with_context(|| format!("cannot write {}", marker.display()))
    }
}

fn marker_line(path: &Path, mtime: i64, date: NaiveDate) -> String {
    format!("{},{mtime},{date}", path.display())
}

/// Modification time as Unix seconds; zero when unavailable.
pub fn mtime_epoch(path: &Path) -> i64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Age of the export in whole days relative to `today`.
pub fn export_age_days(path: &Path, today: NaiveDate) -> i64 {
    let mtime = mtime_epoch(path);
    let date = chrono::DateTime::from_timestamp(mtime, 0)
        .map(|dt| dt.date_naive())
        .unwrap_or(today);
    (today - date).num_days()
}
