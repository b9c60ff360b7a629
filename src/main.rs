//! CLI entry point for the Vélib' feed harvester.
//!
//! `serve` runs the ingestion scheduler until interrupted; `run` executes a
//! single dataset task once; the remaining subcommands are the read-side
//! queries, printed as JSON (or written as CSV where supported).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use velib_feeds::app::App;
use velib_feeds::config::Config;
use velib_feeds::domain::{BoundaryKind, DatasetKind};
use velib_feeds::output::{print_json, write_records};
use velib_feeds::query::{Served, parse_resolution, parse_station_ids, parse_timestamp};

#[derive(Parser)]
#[command(name = "velib_feeds")]
#[command(
    about = "Harvests Paris bike-sharing open data and answers spatial queries",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Dataset {
    Stations,
    Statuses,
    Districts,
    Boroughs,
    Bikeways,
    Bikelanes,
    FreeFloatingBikes,
}

impl From<Dataset> for DatasetKind {
    fn from(d: Dataset) -> Self {
        match d {
            Dataset::Stations => DatasetKind::Stations,
            Dataset::Statuses => DatasetKind::Statuses,
            Dataset::Districts => DatasetKind::Districts,
            Dataset::Boroughs => DatasetKind::Boroughs,
            Dataset::Bikeways => DatasetKind::Bikeways,
            Dataset::Bikelanes => DatasetKind::BikeLanes,
            Dataset::FreeFloatingBikes => DatasetKind::FreeFloatingBikes,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run startup tasks, then every periodic task until Ctrl+C
    Serve,
    /// Run a single dataset task once
    Run {
        #[arg(value_enum)]
        dataset: Dataset,
    },
    /// Replace the bikeway table with a local GeoJSON snapshot
    ImportBikeways {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Oldest and newest occupancy timestamps
    Timestamps,
    /// Stations with occupancy and hex cell
    Stations {
        /// RFC 3339 timestamp; defaults to the latest snapshot
        #[arg(long)]
        at: Option<String>,

        /// H3 resolution (0-15); defaults to H3_RESOLUTION
        #[arg(short, long)]
        resolution: Option<String>,
    },
    /// Occupancy aggregated per district
    Districts {
        #[arg(long)]
        at: Option<String>,
    },
    /// Occupancy aggregated per borough
    Boroughs {
        #[arg(long)]
        at: Option<String>,
    },
    /// Free-floating bike positions
    FreeFloating {
        #[arg(long)]
        at: Option<String>,
    },
    /// Current bikeway network
    Bikeways,
    /// Current bike lane infrastructure
    Bikelanes,
    /// Occupancy time series of one or more stations
    Timeseries {
        /// Comma separated station ids
        #[arg(value_name = "IDS")]
        ids: String,

        /// Write CSV to this file instead of printing JSON
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Average occupancy by time of day of one or more stations
    Distribution {
        #[arg(value_name = "IDS")]
        ids: String,

        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/velib_feeds.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("velib_feeds.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let app = App::new(config).await?;

    match cli.command {
        Commands::Serve => serve(&app).await?,
        Commands::Run { dataset } => {
            let kind = DatasetKind::from(dataset);
            let task = app
                .task(kind)
                .with_context(|| format!("no task registered for {kind}"))?;
            task.run_once().await;
            print_json(&task.report())?;
        }
        Commands::ImportBikeways { file } => {
            let handle = app.import_bikeways_file(file).await?;
            // the write runs in the background; only wait so the process does not exit under it
            match handle.await? {
                Some(outcome) => info!(?outcome, "Bikeway import finished"),
                None => warn!("Bikeway import failed, see log for details"),
            }
        }
        Commands::Timestamps => emit(app.query.timestamp_range().await?)?,
        Commands::Stations { at, resolution } => {
            let at = at.as_deref().map(parse_timestamp).transpose()?;
            let resolution = resolution.as_deref().map(parse_resolution).transpose()?;
            emit(app.query.stations_as_of(at, resolution).await?)?;
        }
        Commands::Districts { at } => {
            let at = at.as_deref().map(parse_timestamp).transpose()?;
            emit(app.query.boundary_aggregate_as_of(BoundaryKind::District, at).await?)?;
        }
        Commands::Boroughs { at } => {
            let at = at.as_deref().map(parse_timestamp).transpose()?;
            emit(app.query.boundary_aggregate_as_of(BoundaryKind::Borough, at).await?)?;
        }
        Commands::FreeFloating { at } => {
            let at = at.as_deref().map(parse_timestamp).transpose()?;
            emit(app.query.free_floating_as_of(at).await?)?;
        }
        Commands::Bikeways => emit(app.query.bikeways().await?)?,
        Commands::Bikelanes => emit(app.query.bike_lanes().await?)?,
        Commands::Timeseries { ids, csv } => {
            let ids = parse_station_ids(&ids)?;
            let served = app.query.time_series(&ids).await?;
            match csv {
                Some(path) => write_records(&path, &served.body)?,
                None => emit(served)?,
            }
        }
        Commands::Distribution { ids, csv } => {
            let ids = parse_station_ids(&ids)?;
            let served = app.query.distribution(&ids).await?;
            match csv {
                Some(path) => write_records(&path, &served.body)?,
                None => emit(served)?,
            }
        }
    }

    Ok(())
}

fn emit<T: Serialize>(served: Served<T>) -> Result<()> {
    debug!(cache_control = ?served.cache_control, "Query served");
    print_json(&served.body)
}

/// Runs startup tasks, then the periodic loops until Ctrl+C.
async fn serve(app: &App) -> Result<()> {
    info!("Running startup tasks");
    app.scheduler.run_startup().await;

    let handles = app.scheduler.start();
    info!(loops = handles.len(), "Scheduler started. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    info!("Shutting down");
    for handle in &handles {
        handle.abort();
    }

    for report in app.scheduler.reports() {
        info!(
            dataset = report.dataset,
            runs = report.runs,
            failures = report.failures,
            last_error = report.last_error.as_deref().unwrap_or(""),
            "Task summary"
        );
    }
    Ok(())
}
