//! Catalog-Probe main entry point
//!
//! This is the command-line interface for crawling and validating agency
//! data catalogs.

use anyhow::Context;
use catalog_probe::config::{load_config_with_hash, Config};
use catalog_probe::crawler::{with_storage, Coordinator, SharedStorage};
use catalog_probe::storage::{open_storage, sync_agencies, Storage};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Catalog-Probe: an open-data catalog crawler and validator
///
/// Catalog-Probe fetches each configured agency's `data.json`, validates it
/// against a JSON Schema, and checks every dataset URL it lists. Results are
/// stored as reports and inspections in a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "catalog-probe")]
#[command(version)]
#[command(about = "An open-data catalog crawler and validator", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl agency catalogs and check every dataset URL
    Crawl {
        /// Only crawl these agency ids (default: every agency)
        #[arg(long = "agency", value_name = "ID")]
        agencies: Vec<i64>,
    },

    /// Validate every agency catalog against the configured schema
    Validate,

    /// List the configured agencies with their ids
    Agencies,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let storage = open_shared_storage(&config)?;

    match cli.command {
        Command::Crawl { agencies } => handle_crawl(&config, storage, &agencies).await,
        Command::Validate => handle_validate(&config, storage).await,
        Command::Agencies => handle_agencies(&storage),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_probe=info,warn"),
            1 => EnvFilter::new("catalog_probe=debug,info"),
            2 => EnvFilter::new("catalog_probe=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Opens the database and brings the agency table in line with the config
fn open_shared_storage(config: &Config) -> anyhow::Result<SharedStorage> {
    let path = Path::new(&config.storage.database_path);
    let mut storage = open_storage(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    sync_agencies(&mut storage, &config.agencies)?;
    Ok(Arc::new(Mutex::new(storage)))
}

async fn handle_crawl(
    config: &Config,
    storage: SharedStorage,
    agencies: &[i64],
) -> anyhow::Result<()> {
    let coordinator = Coordinator::from_config(config, storage)?;

    if agencies.is_empty() {
        let queued = coordinator.crawl_all_agencies()?;
        tracing::info!("Crawling {} agencies", queued.len());
    } else {
        for &agency_id in agencies {
            coordinator
                .crawl_agency_datasets(agency_id)
                .with_context(|| format!("Cannot crawl agency {}", agency_id))?;
        }
    }

    finish(&coordinator).await
}

async fn handle_validate(config: &Config, storage: SharedStorage) -> anyhow::Result<()> {
    let coordinator = Coordinator::from_config(config, storage)?;
    coordinator.validate_data_catalogs()?;
    finish(&coordinator).await
}

/// Waits for every queued task and prints a summary
async fn finish(coordinator: &Coordinator) -> anyhow::Result<()> {
    coordinator.queue().drain().await;

    let stats = coordinator.queue().stats();
    let (reports, inspections) = with_storage(coordinator.storage(), |s| {
        Ok((s.count_reports()?, s.count_inspections()?))
    })?;

    tracing::info!(
        "Tasks: {} submitted, {} succeeded, {} failed, {} retried",
        stats.submitted,
        stats.succeeded,
        stats.failed,
        stats.retried
    );
    println!("✓ {} reports, {} inspections stored", reports, inspections);

    if stats.failed > 0 {
        anyhow::bail!("{} task(s) failed", stats.failed);
    }
    Ok(())
}

fn handle_agencies(storage: &SharedStorage) -> anyhow::Result<()> {
    let agencies = with_storage(storage, |s| s.list_agencies())?;

    println!("Agencies ({}):", agencies.len());
    for agency in &agencies {
        println!("  [{}] {}  {}", agency.id, agency.name, agency.data_json_url);
    }
    Ok(())
}
