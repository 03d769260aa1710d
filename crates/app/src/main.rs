use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod lock;
mod pipeline;
mod scrape;

use config::Config;
use pipeline::RunOptions;

#[derive(Parser)]
#[command(name = "fourmi", about = "Agent de suivi du budget familial", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Full pass: fetch the export, analyse it, write the report, notify.
    Run {
        /// Skip the external export fetcher and use what is already there.
        #[arg(long)]
        skip_download: bool,
        /// Analyse this CSV instead of the newest export.
        #[arg(long, value_name = "PATH")]
        csv_file: Option<PathBuf>,
        /// Analyse and write the report, but send nothing and mark nothing.
        #[arg(long)]
        skip_notifications: bool,
    },
    /// Load the configuration and the catalog, print what was found.
    ConfigCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("configuration error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Run {
            skip_download,
            csv_file,
            skip_notifications,
        } => {
            let options = RunOptions {
                skip_download,
                csv_file,
                skip_notifications,
            };
            match pipeline::run(&config, options).await {
                Ok(0) => ExitCode::SUCCESS,
                Ok(_) => ExitCode::FAILURE,
                Err(err) => {
                    tracing::error!("run failed: {err:#}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::ConfigCheck => {
            config_check(&config);
            ExitCode::SUCCESS
        }
    }
}

fn config_check(config: &Config) {
    let catalog = &config.catalog;
    println!("Répertoire de données : {}", config.data_dir.display());
    println!("Dépenses fixes        : {}", catalog.recurring.len());
    println!("Familles budgétées    : {}", catalog.families.len());
    println!(
        "Familles de rapport   : {}",
        if catalog.presentation.is_empty() {
            "défauts compilés".to_string()
        } else {
            catalog.presentation.len().to_string()
        }
    );
    println!("Revenus déclarés      : {}", catalog.incomes.len());
    println!("Ajustements budget    : {}", catalog.adjustments.len());
    println!("Budget variable max   : {}", catalog.budget_max());
    println!(
        "Catégories exclues    : {}",
        catalog.exclusion.excluded_categories.join(", ")
    );
    println!(
        "Canaux configurés     : e-mail {}, sms {}, im {}",
        onoff(config.smtp.is_some()),
        onoff(config.sms.is_some()),
        onoff(config.im_webhook_url.is_some())
    );
    println!("Cadence IM            : {:?}", config.im_cadence);
    println!(
        "Signature des URLs    : {}",
        onoff(config.signing_key.is_some())
    );
    println!(
        "Récupération export   : {}",
        config.fetch_command.as_deref().unwrap_or("(manuelle)")
    );
}

fn onoff(on: bool) -> &'static str {
    if on {
        "oui"
    } else {
        "non"
    }
}
