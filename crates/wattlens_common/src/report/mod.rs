//! Report emitters. Pure functions of the analysis structures; only
//! [`write_reports`] touches the filesystem.

pub mod csv;
pub mod json;
pub mod summary;

use crate::analysis::AnalysisReport;
use crate::price::PriceAnalysis;
use crate::timestamp::LocalClock;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const RESULTS_JSON: &str = "energy_analysis_results.json";
pub const SUMMARY_CSV: &str = "energy_analysis_summary.csv";
pub const SUMMARY_TEXT: &str = "energy_analysis_summary.txt";
pub const PRICES_CSV: &str = "epex_prices_15min.csv";
pub const PRICE_WINDOWS_CSV: &str = "epex_prices_test_periods.csv";

/// Write every report file for a full run. Returns the paths written.
pub fn write_reports(report: &AnalysisReport, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let mut written = vec![
        write_file(dir, RESULTS_JSON, &json::render(report)?)?,
        write_file(dir, SUMMARY_CSV, &self::csv::workload_summary(&report.workload_results)?)?,
        write_file(dir, SUMMARY_TEXT, &summary::render(report))?,
    ];

    if let Some(prices) = &report.price_analysis {
        let clock = LocalClock::from_hours(report.utc_offset_hours);
        written.extend(write_price_tables(prices, &clock, dir)?);
    }
    Ok(written)
}

/// Write the two price CSV tables.
pub fn write_price_tables(
    prices: &PriceAnalysis,
    clock: &LocalClock,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let mut written = Vec::new();
    if let Some(day) = prices.day.stats() {
        written.push(write_file(dir, PRICES_CSV, &self::csv::price_table(day, clock)?)?);
    }
    written.push(write_file(dir, PRICE_WINDOWS_CSV, &self::csv::price_windows(&prices.windows)?)?);
    Ok(written)
}

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(path)
}
