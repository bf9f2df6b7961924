/*!
YC Radar command line
*/

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use yc_radar::radar::config::EnvOverrides;
use yc_radar::{DeliveryStatus, Radar, RadarConfig, RunOptions, RunReport};

fn cli() -> Command {
    Command::new("yc-radar")
        .version(clap::crate_version!())
        .about("Monitor the YC directory for new startups and send them to a webhook")
        .arg(
            Arg::new("webhook-url")
                .long("webhook-url")
                .help("Webhook URL (overrides WEBHOOK_URL)")
                .value_name("URL"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Detect but don't send webhooks")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .help("Force re-seed (fetch all, save state, no webhook)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("full-fetch")
                .long("full-fetch")
                .help("Force a full partitioned fetch instead of the timestamp shortcut")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .help("State directory (default: ./data or DATA_DIR)")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("TOML configuration file")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Debug logging")
                .action(ArgAction::SetTrue),
        )
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|level| EnvFilter::try_new(level.to_lowercase()).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(matches: &ArgMatches) -> Result<RadarConfig> {
    let explicit = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = match explicit.or_else(|| RadarConfig::default_path().filter(|p| p.exists())) {
        Some(path) => RadarConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RadarConfig::default(),
    };

    config.apply_env(EnvOverrides::from_env());
    apply_flags(&mut config, matches);
    Ok(config)
}

/// Command line flags win over file and environment
fn apply_flags(config: &mut RadarConfig, matches: &ArgMatches) {
    if let Some(url) = matches.get_one::<String>("webhook-url") {
        config.delivery.webhook_url = Some(url.clone());
    }
    if let Some(dir) = matches.get_one::<String>("data-dir") {
        config.state.data_dir = PathBuf::from(dir);
    }
}

fn print_summary(report: &RunReport, webhook_url: Option<&str>) {
    if report.new_entities.is_empty() {
        println!("No new companies detected. Total tracked: {}", report.known_total);
        return;
    }

    println!("\nDetected {} new companies:", report.new_entities.len());
    for entity in &report.new_entities {
        let name = match entity.name() {
            "" => "Unknown",
            name => name,
        };
        let batch = match entity.batch() {
            "" => "?",
            batch => batch,
        };
        println!("  - {} ({}): {}", name, batch, entity.one_liner());
    }

    match &report.delivery {
        DeliveryStatus::DryRun(payloads) => {
            println!("\n[DRY RUN] {} webhook payloads not sent.", payloads.len())
        }
        DeliveryStatus::NoSink => {
            println!("Set WEBHOOK_URL in .env or pass --webhook-url to send results.")
        }
        DeliveryStatus::Delivered(delivery) if delivery.all_sent() => println!(
            "Webhook delivered: {} companies sent to {}",
            delivery.sent,
            webhook_url.unwrap_or_default()
        ),
        DeliveryStatus::Delivered(delivery) => println!(
            "Webhook: {} sent, {} failed (saved for retry).",
            delivery.sent,
            delivery.failed.len()
        ),
        DeliveryStatus::NothingToSend => {}
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();

    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let options = RunOptions {
        dry_run: matches.get_flag("dry-run"),
        force_seed: matches.get_flag("seed"),
        force_full: matches.get_flag("full-fetch"),
    };

    info!(
        "🚀 YC Radar starting - data_dir={}, dry_run={}",
        config.state.data_dir.display(),
        options.dry_run
    );

    let radar = match Radar::from_config(&config) {
        Ok(radar) => radar,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = match radar.run(options).await {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if options.force_seed {
        println!("Seed complete. Total tracked: {}", report.known_total);
    } else {
        print_summary(&report, config.webhook_url());
    }

    if report.still_failing() > 0 {
        error!(
            "{} deliveries still failing, queued for the next run",
            report.still_failing()
        );
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
