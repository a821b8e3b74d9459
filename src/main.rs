//! `rainwatch` binary: one evaluation per invocation.
//!
//! The external scheduler runs `rainwatch` (or `rainwatch run`) periodically
//! and reads the JSON report from stdout. Exit status is non-zero only for
//! a hard failure.

use clap::{Parser, Subcommand};
use rainwatch::analysis::classify::Classifier;
use rainwatch::calibration::{Calibration, CalibrationError};
use rainwatch::config::{Config, ConfigError};
use rainwatch::db::{self, PgBackend};
use rainwatch::ingest::radar::{build_http_client, HttpFrameSource};
use rainwatch::logging::{self, LogLevel};
use rainwatch::model::RunError;
use rainwatch::notify::TelegramNotifier;
use rainwatch::pipeline::{Monitor, MonitorSettings, RunReport};
use rainwatch::retry::RetryPolicy;
use rainwatch::store::{StateStore, StoreError};
use rainwatch::verify;
use serde::Serialize;
use std::process::ExitCode;
use thiserror::Error;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "rainwatch")]
#[command(about = "Radar rain alerts for one pinned location", long_about = None)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the radar once and notify on an upward transition (default)
    Run,

    /// Sample the live feed at a coordinate without touching the store
    Probe {
        /// Latitude in decimal degrees
        #[arg(allow_negative_numbers = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(allow_negative_numbers = true)]
        lng: f64,
    },

    /// Create the records table if it does not exist
    InitDb,
}

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

impl StartupError {
    fn report(&self) -> RunReport {
        match self {
            StartupError::Store(e) => RunReport::aborted("store_unavailable", e.to_string()),
            other => RunReport::aborted("configuration", other.to_string()),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            print_json(&StartupError::from(e).report());
            return ExitCode::FAILURE;
        }
    };

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Info };
    if let Err(e) = logging::init_logger(level, config.log_file.as_deref()) {
        eprintln!("logging disabled: {}", e);
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config),
        Commands::Probe { lat, lng } => probe(&config, lat, lng),
        Commands::InitDb => init_db(&config),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("cannot encode report: {}", e),
    }
}

fn load_calibration(config: &Config) -> Result<Calibration, StartupError> {
    let calibration = Calibration::load(&config.calibration_file)?;
    info!(
        version = %calibration.version,
        file = %config.calibration_file.display(),
        legend_entries = calibration.legend.len(),
        "calibration loaded"
    );
    Ok(calibration)
}

fn frame_source(config: &Config, calibration: &Calibration) -> Result<HttpFrameSource, StartupError> {
    let client = build_http_client(config.http_timeout)?;
    Ok(HttpFrameSource::new(
        client,
        calibration.source.clone(),
        calibration.bounds,
        RetryPolicy::radar_default(),
    ))
}

fn build_monitor(
    config: &Config,
) -> Result<Monitor<HttpFrameSource, PgBackend, TelegramNotifier>, StartupError> {
    let calibration = load_calibration(config)?;
    let source = frame_source(config, &calibration)?;
    let notifier = TelegramNotifier::new(
        build_http_client(config.http_timeout)?,
        &config.notify_api_base,
        config.notify_bot_token()?.to_string(),
        RetryPolicy::notify_default(),
    );
    let client = db::connect_and_verify(config.database_url()?, config.http_timeout)?;

    let settings = MonitorSettings {
        owner_id: config.owner_id.clone(),
        max_age: config.frame_max_age,
        frame_count: config.aggregate_frame_count,
        cold_start: config.cold_start,
        target_override: config.notify_target_override.clone(),
    };
    Ok(Monitor::new(
        source,
        StateStore::new(PgBackend::new(client)),
        notifier,
        Classifier::from_calibration(&calibration),
        settings,
    ))
}

fn run(config: &Config) -> ExitCode {
    let report = match build_monitor(config) {
        Ok(mut monitor) => monitor.run_once(),
        Err(e) => {
            error!(error = %e, "run could not start");
            e.report()
        }
    };
    print_json(&report);
    if report.is_hard_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn probe(config: &Config, lat: f64, lng: f64) -> ExitCode {
    let setup = load_calibration(config).and_then(|calibration| {
        let source = frame_source(config, &calibration)?;
        Ok((source, Classifier::from_calibration(&calibration)))
    });
    let (source, classifier) = match setup {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("probe could not start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = verify::probe_location(
        &source,
        &classifier,
        lat,
        lng,
        config.frame_max_age,
        config.aggregate_frame_count,
        chrono::Utc::now(),
    );
    match result {
        Ok(report) => {
            verify::print_summary(&report);
            print_json(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("probe failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_db(config: &Config) -> ExitCode {
    let result = config
        .database_url()
        .map_err(StartupError::from)
        .and_then(|url| Ok(db::connect(url, config.http_timeout)?))
        .and_then(|client| Ok(PgBackend::new(client).ensure_schema()?));
    match result {
        Ok(()) => {
            info!("records table ready");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let err = match e {
                StartupError::Store(store) => RunError::from(store).to_string(),
                other => other.to_string(),
            };
            eprintln!("init-db failed: {}", err);
            ExitCode::FAILURE
        }
    }
}
