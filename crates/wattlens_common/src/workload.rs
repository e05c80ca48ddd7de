//! Workload aggregator
//!
//! Turns the power samples of one analysis window into power and energy
//! statistics. Cyclic windows are fetched one active sub-interval at a time so
//! the pauses between cycles never dilute the averages.
//!
//! The aggregator never retries and never aborts the run: a store failure
//! becomes a `Failed` outcome for that window only.

use crate::analysis::AnalysisContext;
use crate::error::{FieldError, StoreError};
use crate::stats::{round_to, SeriesSummary};
use crate::store::TimeSeriesStore;
use crate::timestamp;
use crate::window::{Interval, Pattern, WindowDefinition};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result for one configured window. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowResult {
    pub key: String,
    pub name: String,
    pub description: String,
    pub pattern: Pattern,
    pub time_range: String,
    pub duration_minutes: i64,
    #[serde(flatten)]
    pub outcome: WindowOutcome,
}

impl WindowResult {
    pub fn stats(&self) -> Option<&WorkloadStats> {
        match &self.outcome {
            WindowOutcome::Measured(stats) => Some(stats),
            WindowOutcome::NoData { .. } | WindowOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WindowOutcome {
    Measured(WorkloadStats),
    /// No usable sample in any queried interval
    NoData { skipped: SkippedRecords },
    /// A store query failed
    Failed { error: String },
}

/// Records dropped because their power field could not be used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkippedRecords {
    pub missing: usize,
    pub malformed: usize,
}

impl SkippedRecords {
    pub fn total(&self) -> usize {
        self.missing + self.malformed
    }

    fn record(&mut self, err: &FieldError) {
        match err {
            FieldError::Missing(_) => self.missing += 1,
            FieldError::Malformed { .. } => self.malformed += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadStats {
    pub data_points: usize,
    pub skipped_records: SkippedRecords,
    pub power_stats: PowerStats,
    pub energy_consumption: EnergyEstimate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycles: Option<CycleSummary>,
    pub raw_data: RawSeries,
}

impl WorkloadStats {
    /// Cycles counted in the energy split; 1 for non-cyclic windows.
    pub fn declared_cycles(&self) -> usize {
        self.cycles.as_ref().map_or(1, |c| c.declared_cycles)
    }
}

/// Power statistics in watts, rounded to 2 decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerStats {
    pub average_w: f64,
    pub peak_w: f64,
    pub minimum_w: f64,
    pub std_deviation_w: f64,
    pub stability_cv_percent: f64,
}

/// Energy estimate assuming the mean power held for the active duration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyEstimate {
    pub total_kwh: f64,
    pub active_duration_minutes: i64,
    pub active_duration_hours: f64,
    pub duration_hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_per_cycle_kwh: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub declared_cycles: usize,
    pub data_bearing_cycles: usize,
    pub cycle_minutes: i64,
    pub cycle_details: Vec<CycleDetail>,
}

/// One data-bearing active sub-interval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleDetail {
    /// 1-based position among the declared intervals
    pub cycle: usize,
    pub start: String,
    pub end: String,
    pub data_points: usize,
    pub average_w: f64,
    pub peak_w: f64,
}

/// Pooled samples in query order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawSeries {
    pub timestamps: Vec<String>,
    pub power_values: Vec<f64>,
}

impl RawSeries {
    fn push(&mut self, timestamp: String, power: f64) {
        self.timestamps.push(timestamp);
        self.power_values.push(power);
    }

    pub fn len(&self) -> usize {
        self.power_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.power_values.is_empty()
    }
}

/// Usable samples of one interval
struct IntervalSamples {
    series: RawSeries,
    skipped: SkippedRecords,
}

pub struct WorkloadAggregator<S> {
    store: S,
    device_id: String,
}

impl<S: TimeSeriesStore> WorkloadAggregator<S> {
    pub fn new(store: S, context: &AnalysisContext) -> Self {
        Self {
            store,
            device_id: context.device_id.clone(),
        }
    }

    /// Analyze every window in configuration order.
    pub fn analyze_all(&self, windows: &[WindowDefinition]) -> Vec<WindowResult> {
        windows.iter().map(|w| self.analyze(w)).collect()
    }

    pub fn analyze(&self, window: &WindowDefinition) -> WindowResult {
        info!("Analyzing {} ({}, {})", window.key(), window.display_name(), window.pattern());

        let outcome = match self.measure(window) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Window {} failed: {}", window.key(), e);
                WindowOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        if let WindowOutcome::NoData { skipped } = &outcome {
            warn!(
                "No usable data for {} ({} records skipped)",
                window.key(),
                skipped.total()
            );
        }

        WindowResult {
            key: window.key().to_string(),
            name: window.display_name().to_string(),
            description: window.description().to_string(),
            pattern: window.pattern(),
            time_range: format!("{} - {}", window.overall().start, window.overall().end),
            duration_minutes: window.duration_minutes(),
            outcome,
        }
    }

    fn measure(&self, window: &WindowDefinition) -> Result<WindowOutcome, StoreError> {
        let mut pooled = RawSeries::default();
        let mut skipped = SkippedRecords::default();
        let mut details = Vec::new();

        for (index, interval) in window.active_intervals().iter().enumerate() {
            let samples = self.fetch_interval(interval)?;
            skipped.missing += samples.skipped.missing;
            skipped.malformed += samples.skipped.malformed;

            if samples.series.is_empty() {
                debug!("{} cycle {} has no data", window.key(), index + 1);
                continue;
            }

            if window.pattern() == Pattern::Cyclic {
                details.push(cycle_detail(index + 1, interval, &samples.series));
            }
            pooled.timestamps.extend(samples.series.timestamps);
            pooled.power_values.extend(samples.series.power_values);
        }

        if skipped.total() > 0 {
            debug!(
                "{}: skipped {} records without power, {} with malformed power",
                window.key(),
                skipped.missing,
                skipped.malformed
            );
        }

        let Some(summary) = SeriesSummary::of(&pooled.power_values) else {
            return Ok(WindowOutcome::NoData { skipped });
        };

        let power_stats = PowerStats {
            average_w: round_to(summary.mean, 2),
            peak_w: round_to(summary.max, 2),
            minimum_w: round_to(summary.min, 2),
            std_deviation_w: round_to(summary.std_dev, 2),
            stability_cv_percent: round_to(summary.cv_percent(), 2),
        };

        let active_minutes = window.active_duration_minutes();
        let active_hours = active_minutes as f64 / 60.0;
        let total_kwh = summary.mean * active_hours / 1000.0;

        let cycles = match window.pattern() {
            Pattern::Cyclic => Some(CycleSummary {
                declared_cycles: window.declared_cycles(),
                data_bearing_cycles: details.len(),
                cycle_minutes: window
                    .active_intervals()
                    .first()
                    .and_then(Interval::minutes)
                    .unwrap_or_default(),
                cycle_details: details,
            }),
            Pattern::Single | Pattern::Continuous => None,
        };

        let energy_per_cycle_kwh = cycles
            .as_ref()
            .map(|c| round_to(total_kwh / c.declared_cycles as f64, 6));

        let energy_consumption = EnergyEstimate {
            total_kwh: round_to(total_kwh, 6),
            active_duration_minutes: active_minutes,
            active_duration_hours: round_to(active_hours, 2),
            duration_hours: round_to(window.duration_minutes() as f64 / 60.0, 2),
            energy_per_cycle_kwh,
        };

        info!(
            "{}: {} points, avg {:.2} W, {:.6} kWh",
            window.key(),
            pooled.len(),
            power_stats.average_w,
            energy_consumption.total_kwh
        );

        Ok(WindowOutcome::Measured(WorkloadStats {
            data_points: pooled.len(),
            skipped_records: skipped,
            power_stats,
            energy_consumption,
            cycles,
            raw_data: pooled,
        }))
    }

    fn fetch_interval(&self, interval: &Interval) -> Result<IntervalSamples, StoreError> {
        let lower = canonical_bound(&interval.start);
        let upper = canonical_bound(&interval.end);
        let records = self.store.query_samples(&self.device_id, &lower, &upper, None)?;

        let mut series = RawSeries::default();
        let mut skipped = SkippedRecords::default();
        for record in records {
            match record.power_watts() {
                Ok(power) => series.push(record.timestamp, power),
                Err(e) => skipped.record(&e),
            }
        }
        Ok(IntervalSamples { series, skipped })
    }
}

/// Window bounds carry seconds; stored keys carry microseconds. Widening the
/// bound to the same width keeps `BETWEEN` inclusive at both instants.
fn canonical_bound(bound: &str) -> String {
    timestamp::parse_bound(bound)
        .map(|dt| timestamp::format_sample(&dt))
        .unwrap_or_else(|| bound.to_string())
}

fn cycle_detail(cycle: usize, interval: &Interval, series: &RawSeries) -> CycleDetail {
    let values = &series.power_values;
    let average = values.iter().sum::<f64>() / values.len() as f64;
    let peak = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    CycleDetail {
        cycle,
        start: interval.start.clone(),
        end: interval.end.clone(),
        data_points: values.len(),
        average_w: round_to(average, 2),
        peak_w: round_to(peak, 2),
    }
}
