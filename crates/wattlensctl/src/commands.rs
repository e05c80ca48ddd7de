//! Command implementations

use crate::cli::GlobalOpts;
use crate::output;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use wattlens_common::config::AnalysisConfig;
use wattlens_common::ingest;
use wattlens_common::report;
use wattlens_common::store::{with_backoff, RetryPolicy, SqliteStore};
use wattlens_common::{run_analysis, run_prices};

/// Effective configuration: file or defaults, then command-line overrides.
pub fn load_config(opts: &GlobalOpts) -> Result<AnalysisConfig> {
    let mut config = AnalysisConfig::load(opts.config.as_deref())?;
    if let Some(db) = &opts.db {
        config.store.path = db.clone();
    }
    if let Some(out) = &opts.out {
        config.output.directory = out.clone();
    }
    Ok(config)
}

fn open_store(config: &AnalysisConfig) -> Result<SqliteStore> {
    SqliteStore::open_at(&config.store.path)
        .with_context(|| format!("Failed to open store {}", config.store.path.display()))
}

fn read_input(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn analyze(opts: &GlobalOpts, skip_prices: bool) -> Result<()> {
    let config = load_config(opts)?;
    let store = open_store(&config)?;

    let report = run_analysis(&store, &config, !skip_prices)?;
    let written = report::write_reports(&report, &config.output.directory)?;

    output::print_report(&report);
    output::print_written(&written);
    Ok(())
}

pub fn prices(opts: &GlobalOpts) -> Result<()> {
    let config = load_config(opts)?;
    let store = open_store(&config)?;

    let analysis = run_prices(&store, &config)?;
    let written = report::write_price_tables(&analysis, &config.clock(), &config.output.directory)?;

    let tariff = analysis
        .day
        .stats()
        .map(|d| d.tariff.clone())
        .or_else(|| config.analysis.tariff.clone())
        .unwrap_or_default();
    output::print_prices(&tariff, &analysis);
    output::print_written(&written);
    Ok(())
}

pub fn ingest_sample(
    opts: &GlobalOpts,
    topic: &str,
    received_at: Option<&str>,
    file: &Path,
) -> Result<()> {
    let config = load_config(opts)?;
    let payload = read_input(file)?;

    let record = ingest::sample_from_message(topic, &payload, received_at)
        .with_context(|| format!("Rejected message from {}", file.display()))?;

    let store = open_store(&config)?;
    with_backoff(&RetryPolicy::default(), || store.put_sample(&record))?;

    info!("Stored sample for {} at {}", record.device_id, record.timestamp);
    println!(
        "Stored sample for {} at {} ({} W)",
        record.device_id,
        record.timestamp,
        record.current_power.as_deref().unwrap_or("0")
    );
    Ok(())
}

pub fn ingest_prices(opts: &GlobalOpts, file: &Path) -> Result<()> {
    let config = load_config(opts)?;
    let feed = ingest::quotes_from_feed(&read_input(file)?)
        .with_context(|| format!("Rejected price feed {}", file.display()))?;

    let store = open_store(&config)?;
    let policy = RetryPolicy::default();
    let mut stored = 0;
    for quote in &feed.quotes {
        if with_backoff(&policy, || store.insert_quote_if_absent(quote))? {
            stored += 1;
        }
    }

    if feed.skipped > 0 {
        warn!("Skipped {} incomplete price entries", feed.skipped);
    }
    println!(
        "{}: stored {} new of {} quotes ({} already present, {} skipped)",
        feed.tariff,
        stored,
        feed.quotes.len(),
        feed.quotes.len() - stored,
        feed.skipped
    );
    Ok(())
}

pub fn ingest_meter(opts: &GlobalOpts, device: &str, file: &Path) -> Result<()> {
    let config = load_config(opts)?;
    let import = ingest::measurements_from_energylive(device, &read_input(file)?)
        .with_context(|| format!("Rejected meter response {}", file.display()))?;

    let store = open_store(&config)?;
    let policy = RetryPolicy::default();
    let mut stored = 0;
    for reading in &import.readings {
        if with_backoff(&policy, || store.insert_measurement_if_absent(reading))? {
            stored += 1;
        }
    }

    if import.skipped > 0 {
        warn!("Skipped {} incomplete measurements", import.skipped);
    }
    println!(
        "{}: stored {} new of {} readings ({} already present, {} skipped, {} unknown codes)",
        import.device_id,
        stored,
        import.readings.len(),
        import.readings.len() - stored,
        import.skipped,
        import.unknown_codes
    );
    Ok(())
}

pub fn cleanup_legacy(opts: &GlobalOpts, dry_run: bool) -> Result<()> {
    let config = load_config(opts)?;
    let store = open_store(&config)?;
    let policy = RetryPolicy::default();

    let keys = with_backoff(&policy, || store.legacy_sample_keys())?;
    if keys.is_empty() {
        println!("No legacy timestamps found");
        return Ok(());
    }

    if dry_run {
        println!("Would delete {} legacy samples:", keys.len());
        for key in keys.iter().take(10) {
            println!("  {} {}", key.device_id, key.timestamp);
        }
        if keys.len() > 10 {
            println!("  ... and {} more", keys.len() - 10);
        }
        return Ok(());
    }

    let deleted = with_backoff(&policy, || store.delete_samples(&keys))?;
    println!("Deleted {} legacy samples", deleted);
    Ok(())
}

pub fn show_config(opts: &GlobalOpts) -> Result<()> {
    let config = load_config(opts)?;
    print!("{}", config.to_toml()?);
    Ok(())
}
