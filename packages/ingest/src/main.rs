#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the Charlottesville crime geocoding pipeline.
//!
//! Uses `indicatif-log-bridge` (via [`cville_crime_cli_utils::init_logger`])
//! so that log output does not tear the geocoding progress bar.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use clap::{Parser, Subcommand};
use cville_crime_cli_utils::IndicatifProgress;
use cville_crime_database::geocode_cache::GeocodeCache;
use cville_crime_database::paths;
use cville_crime_geocoder::quota::QuotaLedger;
use cville_crime_geocoder::service_registry;
use cville_crime_ingest::config::UserConfig;
use cville_crime_ingest::{RunOptions, dedupe, resolve_data_dir};
use cville_crime_source::{FetchOptions, fetch, normalize, registry};

#[derive(Parser)]
#[command(
    name = "cville_crime_ingest",
    about = "Geocode Charlottesville crime records"
)]
struct Cli {
    /// Optional TOML file overriding quotas and the data directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory for the cache, quota ledgers, snapshots, and output
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, normalize, geocode, and join records, then write the output CSV
    Run {
        /// Source identifier (default: "charlottesville")
        #[arg(long)]
        source: Option<String>,
        /// Geocoding service identifier (default: highest-priority enabled)
        #[arg(long)]
        service: Option<String>,
        /// Read a previously downloaded `GeoJSON` file instead of downloading
        #[arg(long)]
        input: Option<PathBuf>,
        /// Maximum number of records to process (for testing)
        #[arg(long)]
        limit: Option<u64>,
        /// Re-query addresses that already have a final cached result
        #[arg(long)]
        refresh: bool,
    },
    /// Download a source and report record and distinct address counts
    Fetch {
        /// Source identifier (default: "charlottesville")
        #[arg(long)]
        source: Option<String>,
        /// Maximum number of records to fetch
        #[arg(long)]
        limit: Option<u64>,
    },
    /// List configured data sources
    Sources,
    /// List configured geocoding services
    Services,
    /// Show today's request usage for a geocoding service
    Quota {
        /// Geocoding service identifier (default: highest-priority enabled)
        #[arg(long)]
        service: Option<String>,
    },
    /// Show the address cache size by outcome
    Cache,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = cville_crime_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = UserConfig::load_optional(cli.config.as_deref())?;
    let data_dir = resolve_data_dir(cli.data_dir, &config);

    match cli.command {
        Commands::Run {
            source,
            service,
            input,
            limit,
            refresh,
        } => {
            let start = Instant::now();
            let options = RunOptions {
                source,
                service,
                input,
                limit,
                refresh,
                data_dir,
                config,
            };
            let progress = IndicatifProgress::batch_bar(&multi, "Geocoding");
            let summary = cville_crime_ingest::run(&options, progress).await?;

            log::info!(
                "Done in {:.1}s: {} of {} records geocoded ({} queried, {} cached) -> {}",
                start.elapsed().as_secs_f64(),
                summary.report.kept_records,
                summary.records,
                summary.queried,
                summary.cached,
                summary.output_path.display(),
            );
        }
        Commands::Fetch { source, limit } => {
            let source = registry::find_source(source.as_deref())?;
            let client = reqwest::Client::builder().build()?;
            let options = FetchOptions {
                limit,
                snapshot_path: Some(paths::snapshot_path(&data_dir, source.id())),
                ..FetchOptions::default()
            };
            let raw = fetch::fetch_records(&client, &source, &options).await?;
            let records = normalize::normalize_records(&raw, &source);
            let distinct = dedupe::distinct_addresses(&records);

            println!("{:<20} {}", "Source", source.name());
            println!("{:<20} {}", "Records", records.len());
            println!("{:<20} {}", "Distinct addresses", distinct.len());
        }
        Commands::Sources => {
            println!("{:<20} {:<40} LOCALITY", "ID", "NAME");
            println!("{}", "-".repeat(80));
            for source in &registry::all_sources() {
                println!(
                    "{:<20} {:<40} {}",
                    source.id(),
                    source.name(),
                    source.locality
                );
            }
        }
        Commands::Services => {
            println!(
                "{:<12} {:<32} {:>8} {:>10} {:>8} POLICY",
                "ID", "NAME", "PRIORITY", "DAILY", "BATCH"
            );
            println!("{}", "-".repeat(90));
            for service in &service_registry::all_services() {
                let quota = config.quota_for(service);
                println!(
                    "{:<12} {:<32} {:>8} {:>10} {:>8} {}{}",
                    service.id,
                    service.name,
                    service.priority,
                    quota.daily_limit,
                    quota.batch_size,
                    quota.on_exhausted,
                    if service.enabled { "" } else { " (disabled)" },
                );
            }
        }
        Commands::Quota { service } => {
            let service = service_registry::find_service(service.as_deref())?;
            let quota = config.quota_for(&service);
            let path = paths::quota_ledger_path(&data_dir, &service.id);
            let ledger = QuotaLedger::load(&path, Utc::now().date_naive())?;

            println!("{:<12} {}", "Service", service.name);
            println!("{:<12} {} (UTC)", "Date", ledger.date);
            println!("{:<12} {}", "Used", ledger.used);
            println!("{:<12} {}", "Limit", quota.daily_limit);
            println!("{:<12} {}", "Remaining", ledger.remaining(quota.daily_limit));
        }
        Commands::Cache => {
            let path = paths::geocode_cache_path(&data_dir);
            let cache = GeocodeCache::load(&path)?;

            println!("{} ({} addresses)", path.display(), cache.len());
            for (outcome, count) in cache.outcome_counts() {
                println!("  {:<14} {count}", outcome.as_ref());
            }
        }
    }

    Ok(())
}
