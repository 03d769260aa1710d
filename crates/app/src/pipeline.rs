use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;

use fourmi_core::MonthWindow;
use fourmi_engine::{analyze, AnalysisResult, CategoryModel, ExclusionEngine};
use fourmi_import::read_export;
use fourmi_notify::{
    build_payload, EmailSink, ImMarker, ImSink, Notification, NotificationSink, SmsSink,
};
use fourmi_report::{ReportWriter, UrlSigner};

use crate::config::{export_age_days, Config};
use crate::lock::PidLock;
use crate::scrape;

/// Exports older than this raise a staleness alert; analysis continues.
const STALE_EXPORT_DAYS: i64 = 2;

#[derive(Debug, Default)]
pub struct RunOptions {
    pub skip_download: bool,
    pub csv_file: Option<PathBuf>,
    pub skip_notifications: bool,
}

/// The whole monthly pass. Returns the process exit code: analysis failures
/// are fatal, notification failures only when every primary sink failed.
pub async fn run(config: &Config, options: RunOptions) -> Result<i32> {
    let _lock = PidLock::acquire(config.data_dir.join(".fourmi.lock"))?;

    let now = Local::now();
    let today = now.date_naive();
    let window = MonthWindow::for_date(today);

    if !options.skip_download && options.csv_file.is_none() {
        if let Some(command) = &config.fetch_command {
            // A fetch failure is not fatal as long as a usable export exists.
            if let Err(err) =
                scrape::fetch_export(command, config.fetch_timeout_secs, &config.downloads_dir)
                    .await
            {
                tracing::warn!("export fetch failed: {err:#}");
            }
        }
    }

    let export = match &options.csv_file {
        Some(path) => Some(path.clone()),
        None => config.latest_export(!options.skip_notifications, today),
    };
    let Some(export) = export else {
        technical_alert(
            config,
            "Aucun export",
            "Aucun export CSV à traiter dans le répertoire de données.",
            &[
                "Le robot de récupération a-t-il tourné ?",
                "L'agrégateur a-t-il changé son format d'export ?",
                "Le marqueur .last_notified_csv masque-t-il l'export du jour ?",
            ],
        )
        .await;
        return Ok(1);
    };

    let age = export_age_days(&export, today);
    if age > STALE_EXPORT_DAYS {
        technical_alert(
            config,
            "Export obsolète",
            &format!(
                "L'export {} date de {age} jours. L'analyse continue sur ces données.",
                export.display()
            ),
            &["Le robot de récupération est-il en panne ?"],
        )
        .await;
    }

    let exclusion = ExclusionEngine::new(&config.catalog.exclusion);
    let partition = match read_export(&export, window, &|tx| exclusion.exclusion_reason(tx)) {
        Ok(partition) => partition,
        Err(err) => {
            technical_alert(
                config,
                "Export illisible",
                &format!("Impossible de lire {} : {err}", export.display()),
                &[
                    "L'encodage ou le délimiteur de l'export a-t-il changé ?",
                    "Les en-têtes de colonnes sont-ils toujours les mêmes ?",
                ],
            )
            .await;
            return Ok(1);
        }
    };

    let model = CategoryModel::load(&config.ml_dir());
    let analysis = analyze(&config.catalog, partition, window, export.clone(), model);

    let writer = ReportWriter::new(
        config.reports_dir.clone(),
        config.reports_base_url.clone(),
        UrlSigner::new(config.signing_key.clone()),
    );
    let index = writer
        .write(&config.catalog, &analysis, today, now.timestamp())
        .context("cannot write the report pages")?;

    print_summary(&analysis);

    if options.skip_notifications {
        tracing::info!("notifications skipped on request");
        return Ok(0);
    }

    let payload = build_payload(&analysis, &index);
    let notification = Notification {
        subject: &payload.subject,
        text: &payload.text,
        html: &payload.html,
        sms: &payload.sms,
        attachment: Some(&analysis.csv_path),
    };

    // Primary sinks. The export is marked notified as soon as one of them
    // succeeds; the IM webhook never counts.
    let mut configured = 0usize;
    let mut succeeded = 0usize;
    let mut failures: Vec<String> = Vec::new();

    if let Some(smtp) = &config.smtp {
        configured += 1;
        match send_email(smtp, &notification).await {
            Ok(()) => succeeded += 1,
            Err(err) => failures.push(format!("email: {err}")),
        }
    }
    if let Some(sms) = &config.sms {
        configured += 1;
        match send_sms(sms, &notification).await {
            Ok(()) => succeeded += 1,
            Err(err) => failures.push(format!("sms: {err}")),
        }
    }

    for failure in &failures {
        tracing::warn!("notification sink failed: {failure}");
    }

    if configured == 0 {
        tracing::warn!("no notification channel configured, nothing sent");
    } else if succeeded > 0 {
        config.mark_export_notified(&export, today)?;
    } else {
        technical_alert(
            config,
            "Échec des notifications",
            &format!("Aucun canal n'a accepté le résumé :\n{}", failures.join("\n")),
            &[
                "Le serveur SMTP répond-il ?",
                "Les identifiants de la passerelle SMS sont-ils valides ?",
            ],
        )
        .await;
        return Ok(1);
    }

    if let Some(webhook_url) = &config.im_webhook_url {
        let marker = ImMarker::new(config.im_marker_path());
        if config.im_cadence.due(marker.last_sent(), today) {
            match send_im(webhook_url, &notification).await {
                Ok(()) => {
                    if let Err(err) = marker.record(now.naive_local()) {
                        tracing::warn!("cannot record the im marker: {err}");
                    }
                }
                Err(err) => tracing::warn!("im webhook failed: {err}"),
            }
        } else {
            tracing::debug!("im cadence not due today");
        }
    }

    Ok(0)
}

async fn send_email(
    settings: &fourmi_notify::SmtpSettings,
    notification: &Notification<'_>,
) -> Result<()> {
    EmailSink::new(settings)?.send(notification).await?;
    Ok(())
}

async fn send_sms(
    settings: &fourmi_notify::SmsSettings,
    notification: &Notification<'_>,
) -> Result<()> {
    SmsSink::new(settings.clone())?.send(notification).await?;
    Ok(())
}

async fn send_im(webhook_url: &str, notification: &Notification<'_>) -> Result<()> {
    ImSink::new(webhook_url.to_string())?.send(notification).await?;
    Ok(())
}

fn print_summary(analysis: &AnalysisResult) {
    println!("Mois {} — {} opérations analysées", analysis.window, analysis.transactions_total);
    println!(
        "Fixes : {} ({}) · Variables : {} ({}) · Exclues : {}",
        analysis.total_fixed,
        analysis.fixed.len(),
        analysis.total_variable,
        analysis.variable.len(),
        analysis.excluded.len()
    );
    for line in &analysis.budget.advice {
        println!("{line}");
    }
    for alert in &analysis.family_alerts {
        println!("⚠️ {alert}");
    }
}

/// Best-effort e-mail describing an operational failure. Logged when no
/// e-mail sink is configured or the send itself fails.
pub async fn technical_alert(config: &Config, kind: &str, detail: &str, checks: &[&str]) {
    tracing::error!(kind, "{detail}");

    let Some(smtp) = &config.smtp else {
        return;
    };

    let timestamp = Local::now().format("%d/%m/%Y %H:%M:%S");
    let mut text = format!("Alerte technique : {kind}\nDate : {timestamp}\n\n{detail}\n");
    if !checks.is_empty() {
        text.push_str("\nVérifications :\n");
        for check in checks {
            text.push_str(&format!("- {check}\n"));
        }
    }
    let html = format!(
        "<pre>{}</pre>",
        text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
    );

    let notification = Notification {
        subject: &format!("🔧 Fourmi — alerte technique : {kind}"),
        text: &text,
        html: &html,
        sms: "",
        attachment: None,
    };
    if let Err(err) = send_email(smtp, &notification).await {
        tracing::error!("cannot send the technical alert: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use fourmi_core::Catalog;
    use fourmi_notify::Cadence;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> Config {
        let config = Config {
            data_dir: dir.to_path_buf(),
            downloads_dir: dir.join("downloads"),
            logs_dir: dir.join("logs"),
            reports_dir: dir.join("reports"),
            catalog: Catalog::from_json(r#"{"totaux": {"budget_variable_max": 1000}}"#).unwrap(),
            reports_base_url: "https://r.example.org".to_string(),
            signing_key: Some("clef".to_string()),
            smtp: None,
            sms: None,
            im_webhook_url: None,
            im_cadence: Cadence::Daily,
            fetch_command: None,
            fetch_timeout_secs: 10,
        };
        for d in [&config.downloads_dir, &config.logs_dir, &config.reports_dir] {
            fs::create_dir_all(d).unwrap();
        }
        config
    }

    fn write_export(dir: &Path) -> PathBuf {
        let today = Local::now().date_naive();
        let date = format!("{:02}/{:02}/{}", today.day(), today.month(), today.year());
        let path = dir.join("export.csv");
        fs::write(
            &path,
            format!(
                "Date;Libellé;Notes;Montant;Catégorie;Nom du compte;Labels\n\
                 {date};PRLV EDF;;-117,14;Energie;Compte courant;\n\
                 {date};CARREFOUR MARKET;;-45,20;Alimentation;Compte courant;\n"
            ),
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn analysis_only_run_writes_reports() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let export = write_export(dir.path());

        let code = run(
            &config,
            RunOptions {
                skip_download: true,
                csv_file: Some(export),
                skip_notifications: true,
            },
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        let today = Local::now().date_naive();
        let report_dir = config.reports_dir.join(today.format("%Y-%m-%d").to_string());
        assert!(report_dir.join("index.html").is_file());
        // Nothing was sent, so nothing may be marked.
        assert!(!config.notified_marker_path().exists());
    }

    #[tokio::test]
    async fn missing_export_exits_one() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let code = run(
            &config,
            RunOptions {
                skip_download: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn unreadable_export_exits_one() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let path = dir.path().join("export.csv");
        fs::write(&path, "rien d'utilisable\n").unwrap();

        let code = run(
            &config,
            RunOptions {
                skip_download: true,
                csv_file: Some(path),
                skip_notifications: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn lock_blocks_concurrent_run() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let _lock = PidLock::acquire(config.data_dir.join(".fourmi.lock")).unwrap();
        let result = run(&config, RunOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fetch_command_runs_before_analysis() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        let today = Local::now().date_naive();
        let date = format!("{:02}/{:02}/{}", today.day(), today.month(), today.year());
        config.fetch_command = Some(format!(
            "printf 'Date;Libellé;Notes;Montant;Catégorie;Nom du compte;Labels\\n{date};ACHAT;;-10,00;;;\\n' > export.csv"
        ));

        let code = run(
            &config,
            RunOptions {
                skip_notifications: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(code, 0);
        assert!(config.downloads_dir.join("export.csv").is_file());
    }
}
