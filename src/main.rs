//! # Baidu News Harvester
//!
//! Harvests a bounded set of news items for one target date from the
//! scroll-loaded Baidu News results page and merges them into a persistent,
//! deduplicated CSV dataset.
//!
//! ## Pipeline
//!
//! 1. **Session**: launch one headless Chrome instance with anti-automation
//!    flags and navigate it to the date-scoped query
//! 2. **Harvest**: scroll/extract/dedup until the target count, time budget,
//!    scroll ceiling, or a stalled page ends the loop
//! 3. **Retry**: transient session failures are retried with exponential
//!    backoff up to a fixed ceiling; anything else aborts immediately
//! 4. **Merge**: append only the net-new rows to the CSV dataset, atomically
//!
//! ## Usage
//!
//! ```sh
//! baidu-news harvest --date 2025-10-03
//! baidu-news query --date 2025-10-03
//! ```

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod dataset;
mod harvester;
mod models;
mod query;
mod retry;
mod session;

use cli::{Cli, Command};
use config::HarvestConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    let mut config = HarvestConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Harvest { date, count, output } => {
            if let Some(date) = date {
                config.target_date = Some(date);
            }
            if let Some(count) = count {
                config.target_count = count;
            }
            if let Some(output) = output {
                config.dataset_path = output;
            }
            run_harvest(&config).await
        }
        Command::Query { date } => {
            let date = date
                .or(config.target_date)
                .unwrap_or_else(|| Local::now().date_naive());
            if let Err(e) = query::print_report(&config.dataset_path, date) {
                error!(error = %e, "Query failed");
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Run harvest → merge and report the outcome.
///
/// Exits non-zero when nothing was harvested, when the dedup produced no new
/// content, or on any fatal error; the dataset is never left half-written.
async fn run_harvest(config: &HarvestConfig) -> Result<(), Box<dyn Error>> {
    let started = Instant::now();
    let date = config.target_date_or_today();
    info!(
        %date,
        target = config.target_count,
        retries = config.retry_attempts,
        "Harvest starting"
    );

    let items = match retry::run(config).await {
        Ok(items) => items,
        Err(e) => {
            error!(error = %e, "Harvest failed");
            std::process::exit(1);
        }
    };
    if items.is_empty() {
        error!(%date, "No news harvested; nothing to merge");
        std::process::exit(1);
    }
    info!(count = items.len(), %date, "Harvest complete");

    match dataset::merge(&config.dataset_path, &items, date) {
        Ok(true) => {
            let elapsed = started.elapsed();
            let path = std::fs::canonicalize(&config.dataset_path)
                .unwrap_or_else(|_| config.dataset_path.clone());
            info!(
                count = items.len(),
                elapsed_secs = elapsed.as_secs_f64(),
                path = %path.display(),
                "Run complete"
            );
            Ok(())
        }
        Ok(false) => {
            warn!("No new content after dedup; dataset unchanged");
            std::process::exit(1);
        }
        Err(e) => {
            // The merge writer never leaves a partial file behind, so this
            // degrades to a no-new-content outcome for the run.
            error!(error = %e, "Merge failed; dataset left as it was");
            std::process::exit(1);
        }
    }
}
