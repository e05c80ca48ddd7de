//! Workload aggregation against a real SQLite store and a failing mock.
//!
//! Scenarios covered:
//! 1. Single window, constant draw
//! 2. Cyclic window with an empty cycle and samples in the pauses
//! 3. Continuous window energy
//! 4. Skipped records and all-skipped windows
//! 5. Store failure isolated to one window
//! 6. Inclusive interval bounds
//! 7. Measured zero draw

use approx::assert_relative_eq;
use chrono::NaiveDate;
use std::cell::Cell;
use tempfile::NamedTempFile;
use wattlens_common::analysis::AnalysisContext;
use wattlens_common::error::StoreError;
use wattlens_common::record::{QuoteRecord, SampleRecord};
use wattlens_common::store::{SqliteStore, TimeSeriesStore};
use wattlens_common::timestamp::LocalClock;
use wattlens_common::window::{Pattern, WindowDefinition};
use wattlens_common::workload::{WindowOutcome, WorkloadAggregator};

const DEVICE: &str = "serverpowermeter";

// ============================================================================
// Fixtures
// ============================================================================

fn context() -> AnalysisContext {
    AnalysisContext {
        device_id: DEVICE.to_string(),
        tariff: "EPEXSPOTAT".to_string(),
        clock: LocalClock::from_hours(2),
        date: NaiveDate::from_ymd_opt(2025, 6, 29).unwrap(),
    }
}

fn ts(hms: &str) -> String {
    format!("2025-06-29T{}.000000", hms)
}

fn bound(hm: &str) -> String {
    format!("2025-06-29T{}:00", hm)
}

fn sample(hms: &str, power: Option<&str>) -> SampleRecord {
    SampleRecord {
        device_id: DEVICE.to_string(),
        timestamp: ts(hms),
        current_power: power.map(str::to_string),
        ..Default::default()
    }
}

fn store_with(samples: &[SampleRecord]) -> (NamedTempFile, SqliteStore) {
    let tmp = NamedTempFile::new().unwrap();
    let store = SqliteStore::open_at(tmp.path()).unwrap();
    store.put_samples(samples).unwrap();
    (tmp, store)
}

fn cpu_window() -> WindowDefinition {
    let active = [
        (bound("14:45"), bound("15:00")),
        (bound("15:15"), bound("15:30")),
        (bound("15:45"), bound("16:00")),
        (bound("16:15"), bound("16:30")),
    ];
    let refs: Vec<(&str, &str)> = active.iter().map(|(s, e)| (s.as_str(), e.as_str())).collect();
    WindowDefinition::cyclic(
        "WL1_CPU_Stress",
        "Maximum Computational Load",
        &bound("14:45"),
        &bound("16:45"),
        &refs,
    )
    .unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_single_window_constant_draw() {
    let samples: Vec<SampleRecord> = ["18:35:00", "18:36:00", "18:37:00", "18:38:00", "18:39:00"]
        .iter()
        .map(|t| sample(t, Some("100")))
        .collect();
    let (_tmp, store) = store_with(&samples);

    let window = WindowDefinition::spanning(
        "WL3_Reboot",
        "System Reboot Cycle",
        Pattern::Single,
        &bound("18:35"),
        &bound("18:40"),
    )
    .unwrap();
    let result = WorkloadAggregator::new(&store, &context()).analyze(&window);

    let stats = result.stats().expect("measured");
    assert_eq!(stats.data_points, 5);
    assert_eq!(stats.power_stats.average_w, 100.0);
    assert_eq!(stats.power_stats.std_deviation_w, 0.0);
    assert_eq!(stats.power_stats.stability_cv_percent, 0.0);
    assert_eq!(stats.energy_consumption.total_kwh, 0.008333);
    assert!(stats.cycles.is_none());
    assert_eq!(stats.declared_cycles(), 1);
}

#[test]
fn test_cyclic_window_skips_pauses_and_empty_cycles() {
    let mut samples = Vec::new();
    for t in ["14:46:00", "14:50:00", "14:55:00"] {
        samples.push(sample(t, Some("50")));
    }
    // pause between cycles 1 and 2, and inside the silent cycle 2 window
    samples.push(sample("15:05:00", Some("500")));
    samples.push(sample("15:35:00", Some("500")));
    for t in ["15:46:00", "15:50:00", "15:55:00"] {
        samples.push(sample(t, Some("60")));
    }
    for t in ["16:16:00", "16:20:00", "16:25:00"] {
        samples.push(sample(t, Some("70")));
    }
    samples.push(sample("16:40:00", Some("500")));
    let (_tmp, store) = store_with(&samples);

    let result = WorkloadAggregator::new(&store, &context()).analyze(&cpu_window());
    let stats = result.stats().expect("measured");

    assert_eq!(stats.data_points, 9);
    assert!(stats.raw_data.power_values.iter().all(|p| *p < 500.0));
    assert_eq!(stats.power_stats.average_w, 60.0);
    assert_eq!(stats.power_stats.peak_w, 70.0);
    assert_eq!(stats.power_stats.minimum_w, 50.0);
    assert_eq!(stats.power_stats.std_deviation_w, 8.66);

    let cycles = stats.cycles.as_ref().expect("cyclic summary");
    assert_eq!(cycles.declared_cycles, 4);
    assert_eq!(cycles.data_bearing_cycles, 3);
    assert_eq!(cycles.cycle_minutes, 15);
    let numbers: Vec<usize> = cycles.cycle_details.iter().map(|c| c.cycle).collect();
    assert_eq!(numbers, vec![1, 3, 4]);
    assert_eq!(cycles.cycle_details[1].average_w, 60.0);

    let energy = &stats.energy_consumption;
    assert_eq!(energy.active_duration_minutes, 60);
    assert_eq!(energy.active_duration_hours, 1.0);
    assert_eq!(energy.duration_hours, 2.0);
    assert_relative_eq!(energy.total_kwh, 0.06);
    let per_cycle = energy.energy_per_cycle_kwh.unwrap();
    assert_relative_eq!(per_cycle * 4.0, energy.total_kwh, epsilon = 1e-6);
}

#[test]
fn test_pooled_series_keeps_interval_order() {
    let samples = vec![
        sample("16:20:00", Some("4")),
        sample("14:50:00", Some("1")),
        sample("15:50:00", Some("3")),
        sample("15:20:00", Some("2")),
    ];
    let (_tmp, store) = store_with(&samples);

    let result = WorkloadAggregator::new(&store, &context()).analyze(&cpu_window());
    let stats = result.stats().unwrap();
    assert_eq!(stats.raw_data.power_values, vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(stats.raw_data.timestamps[0], ts("14:50:00"));
}

#[test]
fn test_continuous_energy_is_mean_times_duration() {
    let samples: Vec<SampleRecord> = (0..60)
        .map(|m| {
            let t = format!("{:02}:{:02}:30", 20 + (50 + m) / 60, (50 + m) % 60);
            let power = if m % 2 == 0 { "40" } else { "44" };
            sample(&t, Some(power))
        })
        .collect();
    let (_tmp, store) = store_with(&samples);

    let window = WindowDefinition::spanning(
        "WL5_Idle",
        "Idle State",
        Pattern::Continuous,
        &bound("20:50"),
        &bound("21:50"),
    )
    .unwrap();
    let result = WorkloadAggregator::new(&store, &context()).analyze(&window);
    let stats = result.stats().unwrap();

    assert_eq!(stats.data_points, 60);
    assert_eq!(stats.power_stats.average_w, 42.0);
    assert_relative_eq!(stats.energy_consumption.total_kwh, 42.0 * 1.0 / 1000.0, epsilon = 1e-6);
}

#[test]
fn test_unusable_records_are_counted_not_fatal() {
    let samples = vec![
        sample("18:35:00", Some("100")),
        sample("18:36:00", None),
        sample("18:37:00", Some("n/a")),
        sample("18:38:00", Some("200")),
    ];
    let (_tmp, store) = store_with(&samples);

    let window = WindowDefinition::spanning(
        "WL3_Reboot",
        "System Reboot Cycle",
        Pattern::Single,
        &bound("18:35"),
        &bound("18:40"),
    )
    .unwrap();
    let result = WorkloadAggregator::new(&store, &context()).analyze(&window);
    let stats = result.stats().unwrap();
    assert_eq!(stats.data_points, 2);
    assert_eq!(stats.skipped_records.missing, 1);
    assert_eq!(stats.skipped_records.malformed, 1);
    assert_eq!(stats.power_stats.average_w, 150.0);
}

#[test]
fn test_all_records_unusable_is_no_data() {
    let samples = vec![sample("18:35:00", None), sample("18:36:00", Some("?"))];
    let (_tmp, store) = store_with(&samples);

    let window = WindowDefinition::spanning(
        "WL3_Reboot",
        "System Reboot Cycle",
        Pattern::Single,
        &bound("18:35"),
        &bound("18:40"),
    )
    .unwrap();
    let result = WorkloadAggregator::new(&store, &context()).analyze(&window);
    match result.outcome {
        WindowOutcome::NoData { skipped } => assert_eq!(skipped.total(), 2),
        other => panic!("expected NoData, got {:?}", other),
    }
}

#[test]
fn test_empty_window_is_no_data_not_zero() {
    let (_tmp, store) = store_with(&[]);
    let result = WorkloadAggregator::new(&store, &context()).analyze(&cpu_window());
    assert!(matches!(result.outcome, WindowOutcome::NoData { .. }));
}

#[test]
fn test_measured_zero_draw_is_not_no_data() {
    let samples: Vec<SampleRecord> = ["20:50:00", "21:00:00", "21:10:00"]
        .iter()
        .map(|t| sample(t, Some("0")))
        .collect();
    let (_tmp, store) = store_with(&samples);

    let window = WindowDefinition::spanning(
        "WL5_Idle",
        "Idle Baseline",
        Pattern::Continuous,
        &bound("20:50"),
        &bound("21:50"),
    )
    .unwrap();
    let result = WorkloadAggregator::new(&store, &context()).analyze(&window);

    let stats = match &result.outcome {
        WindowOutcome::Measured(stats) => stats,
        other => panic!("expected Measured, got {:?}", other),
    };
    assert_eq!(stats.data_points, 3);
    assert_eq!(stats.power_stats.average_w, 0.0);
    assert_eq!(stats.power_stats.peak_w, 0.0);
    assert_eq!(stats.power_stats.stability_cv_percent, 0.0);
    assert_eq!(stats.energy_consumption.total_kwh, 0.0);
}

#[test]
fn test_interval_bounds_are_inclusive() {
    let samples = vec![
        sample("18:35:00", Some("10")),
        sample("18:40:00", Some("30")),
        sample("18:40:01", Some("1000")),
    ];
    let (_tmp, store) = store_with(&samples);

    let window = WindowDefinition::spanning(
        "WL3_Reboot",
        "System Reboot Cycle",
        Pattern::Single,
        &bound("18:35"),
        &bound("18:40"),
    )
    .unwrap();
    let stats_result = WorkloadAggregator::new(&store, &context()).analyze(&window);
    let stats = stats_result.stats().unwrap();
    assert_eq!(stats.data_points, 2);
    assert_eq!(stats.power_stats.average_w, 20.0);
}

// ============================================================================
// Failure isolation
// ============================================================================

/// Store that fails every sample query whose lower bound starts with a prefix.
struct FlakyStore {
    inner: SqliteStore,
    fail_prefix: String,
    calls: Cell<usize>,
}

impl TimeSeriesStore for FlakyStore {
    fn query_samples(
        &self,
        device_id: &str,
        lower: &str,
        upper: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SampleRecord>, StoreError> {
        self.calls.set(self.calls.get() + 1);
        if lower.starts_with(&self.fail_prefix) {
            return Err(StoreError::Transient("throttled".to_string()));
        }
        self.inner.query_samples(device_id, lower, upper, limit)
    }

    fn query_quotes(
        &self,
        tariff: &str,
        lower_ms: i64,
        upper_ms: i64,
        limit: Option<usize>,
    ) -> Result<Vec<QuoteRecord>, StoreError> {
        self.inner.query_quotes(tariff, lower_ms, upper_ms, limit)
    }

    fn scan_samples(&self, limit: usize) -> Result<Vec<SampleRecord>, StoreError> {
        self.inner.scan_samples(limit)
    }

    fn scan_quotes(&self, limit: usize) -> Result<Vec<QuoteRecord>, StoreError> {
        self.inner.scan_quotes(limit)
    }
}

#[test]
fn test_store_failure_fails_only_that_window() {
    let samples = vec![
        sample("14:50:00", Some("50")),
        sample("18:36:00", Some("100")),
    ];
    let tmp = NamedTempFile::new().unwrap();
    let inner = SqliteStore::open_at(tmp.path()).unwrap();
    inner.put_samples(&samples).unwrap();
    let store = FlakyStore {
        inner,
        fail_prefix: ts("15:45:00"),
        calls: Cell::new(0),
    };

    let reboot = WindowDefinition::spanning(
        "WL3_Reboot",
        "System Reboot Cycle",
        Pattern::Single,
        &bound("18:35"),
        &bound("18:40"),
    )
    .unwrap();
    let results = WorkloadAggregator::new(&store, &context()).analyze_all(&[cpu_window(), reboot]);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].key, "WL1_CPU_Stress");
    match &results[0].outcome {
        WindowOutcome::Failed { error } => assert!(error.contains("throttled")),
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(results[1].stats().unwrap().power_stats.average_w, 100.0);
    // no retries inside the aggregator: 3 cycle queries then 1 for the reboot
    assert_eq!(store.calls.get(), 4);
}

#[test]
fn test_result_serializes_with_status_tag() {
    let (_tmp, store) = store_with(&[sample("18:36:00", Some("100"))]);
    let window = WindowDefinition::spanning(
        "WL3_Reboot",
        "System Reboot Cycle",
        Pattern::Single,
        &bound("18:35"),
        &bound("18:40"),
    )
    .unwrap();
    let result = WorkloadAggregator::new(&store, &context()).analyze(&window);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "measured");
    assert_eq!(json["pattern"], "single");
    assert_eq!(json["power_stats"]["average_w"], 100.0);
    assert!(json.get("cycles").is_none());
}
