//! Analysis run: discovery, per-window aggregation, comparison, prices.
//!
//! Only discovery can abort a run. Everything after it degrades per window.

use crate::compare::{Comparator, ComparisonResult};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::price::{PriceAggregator, PriceAnalysis};
use crate::store::TimeSeriesStore;
use crate::timestamp::LocalClock;
use crate::workload::{WindowResult, WorkloadAggregator};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Identifiers and clock shared by the aggregators of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisContext {
    pub device_id: String,
    pub tariff: String,
    pub clock: LocalClock,
    pub date: NaiveDate,
}

impl AnalysisContext {
    /// Resolve device and tariff, from the configuration or by sampling the
    /// store. Failure here is fatal.
    pub fn discover<S: TimeSeriesStore>(
        store: &S,
        config: &AnalysisConfig,
    ) -> Result<Self, AnalysisError> {
        let settings = &config.analysis;

        let device_id = match non_empty(settings.device_id.as_deref()) {
            Some(id) => id.to_string(),
            None => {
                let samples = store.scan_samples(settings.discovery_scan_limit)?;
                let first = samples.into_iter().next().ok_or_else(|| {
                    AnalysisError::FatalConfiguration(
                        "no device found in sensor_data; set analysis.device_id".to_string(),
                    )
                })?;
                info!("Discovered device {}", first.device_id);
                first.device_id
            }
        };

        Ok(Self {
            device_id,
            tariff: resolve_tariff(store, config)?,
            clock: config.clock(),
            date: settings.test_date,
        })
    }
}

fn resolve_tariff<S: TimeSeriesStore>(
    store: &S,
    config: &AnalysisConfig,
) -> Result<String, AnalysisError> {
    let settings = &config.analysis;
    if let Some(tariff) = non_empty(settings.tariff.as_deref()) {
        return Ok(tariff.to_string());
    }
    let quotes = store.scan_quotes(settings.discovery_scan_limit)?;
    let first = quotes.into_iter().next().ok_or_else(|| {
        AnalysisError::FatalConfiguration(
            "no tariff found in spot_prices; set analysis.tariff".to_string(),
        )
    })?;
    info!("Discovered tariff {}", first.tariff);
    Ok(first.tariff)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Everything one run produces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub analysis_date: DateTime<Utc>,
    pub device_id: String,
    pub tariff: String,
    pub test_date: NaiveDate,
    pub utc_offset_hours: i32,
    pub baseline_window: String,
    pub workload_results: Vec<WindowResult>,
    pub comparison: ComparisonResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_analysis: Option<PriceAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_error: Option<String>,
}

impl AnalysisReport {
    pub fn measured_count(&self) -> usize {
        self.workload_results
            .iter()
            .filter(|r| r.stats().is_some())
            .count()
    }
}

/// Full run over every configured window.
pub fn run_analysis<S: TimeSeriesStore>(
    store: &S,
    config: &AnalysisConfig,
    include_prices: bool,
) -> Result<AnalysisReport, AnalysisError> {
    let context = AnalysisContext::discover(store, config)?;
    info!(
        "Analyzing {} windows for {} on {}",
        config.windows.len(),
        context.device_id,
        context.date
    );

    let workload_results = WorkloadAggregator::new(store, &context).analyze_all(&config.windows);

    let (price_analysis, price_error) = if include_prices {
        match PriceAggregator::new(store, &context).run(&config.windows) {
            Ok(analysis) => (Some(analysis), None),
            Err(e) => {
                warn!("Price analysis failed: {}", e);
                (None, Some(e.to_string()))
            }
        }
    } else {
        (None, None)
    };

    let comparison = Comparator::new(config.analysis.baseline_window.clone()).compare(
        &workload_results,
        price_analysis.as_ref().map(|p| p.windows.as_slice()),
    );

    let report = AnalysisReport {
        analysis_date: Utc::now(),
        device_id: context.device_id,
        tariff: context.tariff,
        test_date: context.date,
        utc_offset_hours: config.analysis.utc_offset_hours,
        baseline_window: config.analysis.baseline_window.clone(),
        workload_results,
        comparison,
        price_analysis,
        price_error,
    };
    info!(
        "Analysis complete: {}/{} windows measured",
        report.measured_count(),
        report.workload_results.len()
    );
    Ok(report)
}

/// Price analysis on its own. Needs a tariff but no device.
pub fn run_prices<S: TimeSeriesStore>(
    store: &S,
    config: &AnalysisConfig,
) -> Result<PriceAnalysis, AnalysisError> {
    let settings = &config.analysis;
    let context = AnalysisContext {
        device_id: settings.device_id.clone().unwrap_or_default(),
        tariff: resolve_tariff(store, config)?,
        clock: config.clock(),
        date: settings.test_date,
    };
    Ok(PriceAggregator::new(store, &context).run(&config.windows)?)
}
