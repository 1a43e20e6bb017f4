#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the DMF works reconciliation tool.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dmf_works_ingest::progress::{IndicatifProgress, init_logger};
use dmf_works_ingest::{IngestError, Pipeline, config};
use dmf_works_ingest_models::ReconcileReport;

const SHEET_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "dmf_works_ingest", about = "DMF public-works reconciliation tool")]
struct Cli {
    /// Config file (overrides `DMF_WORKS_CONFIG`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Resolve coordinates from the cache and block centroids only
    #[arg(long, global = true)]
    no_geocode: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a CSV or spreadsheet file into the works store
    Upload {
        /// `.csv`, `.xlsx`, `.xls`, `.xlsm` or `.ods` file
        file: PathBuf,
    },
    /// Fetch the published Google Sheet and reconcile it
    Sync {
        /// Sheet URL (overrides `sheet.url`)
        #[arg(long)]
        url: Option<String>,
        /// Tab name (overrides `sheet.name`)
        #[arg(long)]
        sheet: Option<String>,
    },
    /// Show record count, coordinate coverage and last sync time
    Status,
    /// Merge manually researched village coordinates into the cache
    ImportCoordinates {
        /// File with `Gram Panchayat`, `Block/Tehsil`, `Latitude` and
        /// `Longitude` columns
        file: PathBuf,
    },
    /// List villages whose works still lack coordinates
    Missing {
        /// Show at most this many locations
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn print_report(report: &ReconcileReport) {
    let s = &report.summary;
    println!(
        "Processed {} rows: {} inserted, {} updated, {} errors, {} duplicates",
        s.total_processed, s.inserted, s.updated, s.errors, s.duplicates
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();

    let config = config::load(cli.config.as_deref())?;
    let mut pipeline = Pipeline::open(&config, !cli.no_geocode)?;

    match cli.command {
        Commands::Upload { file } => {
            let progress = IndicatifProgress::rows_bar(&multi, "Reconciling upload");
            let report = pipeline.upload_file(&file, progress).await?;
            print_report(&report);
        }
        Commands::Sync { url, sheet } => {
            let url = url
                .or_else(|| config.sheet.url.clone())
                .ok_or(IngestError::MissingSheetUrl)?;
            let sheet = sheet.unwrap_or_else(|| config.sheet.name.clone());

            let client = reqwest::Client::builder()
                .user_agent(config.geocoding.user_agent.as_str())
                .timeout(SHEET_TIMEOUT)
                .build()?;

            let progress = IndicatifProgress::rows_bar(&multi, "Syncing sheet");
            let report = pipeline.sync_sheet(&client, &url, &sheet, progress).await?;
            print_report(&report);
        }
        Commands::Status => {
            let status = pipeline.status()?;
            let last_sync = status
                .last_sync
                .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
            println!(
                "{} works, {} without coordinates, {} cached locations, last sync {last_sync}",
                status.records, status.without_coordinates, status.cached_locations
            );
        }
        Commands::ImportCoordinates { file } => {
            let summary = pipeline.import_coordinates(&file)?;
            println!(
                "Imported {} of {} rows ({} skipped)",
                summary.imported, summary.rows, summary.skipped
            );
        }
        Commands::Missing { limit } => {
            let missing = pipeline.missing_report()?;
            let total: u64 = missing.iter().map(|m| m.works).sum();

            println!("{:<30} {:<20} WORKS", "VILLAGE", "BLOCK");
            println!("{}", "-".repeat(60));
            for location in missing.iter().take(limit.unwrap_or(usize::MAX)) {
                println!(
                    "{:<30} {:<20} {}",
                    location.village.as_deref().unwrap_or("-"),
                    location.block.as_deref().unwrap_or("-"),
                    location.works
                );
            }
            println!("{} locations, {total} works without coordinates", missing.len());
        }
    }

    Ok(())
}
