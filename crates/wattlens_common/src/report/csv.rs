//! CSV tables: workload summary, 15-minute prices, per-window prices.

use crate::price::{DayPriceStats, PriceUnit, PriceWindowResult};
use crate::timestamp::LocalClock;
use crate::workload::WindowResult;
use anyhow::{Context, Result};

const WORKLOAD_HEADER: [&str; 14] = [
    "Workload",
    "Period_Key",
    "Pattern",
    "Total_Duration_Minutes",
    "Active_Duration_Minutes",
    "Cycles",
    "Data_Points",
    "Average_Power_W",
    "Peak_Power_W",
    "Min_Power_W",
    "Std_Dev_W",
    "Total_Energy_kWh",
    "Energy_Per_Cycle_kWh",
    "Power_Stability_CV%",
];

const PRICE_HEADER: [&str; 6] = [
    "Timestamp_Local",
    "Price_Cent_kWh",
    "Price_EUR_kWh",
    "Price_EUR_MWh",
    "Hour",
    "Quarter_Hour",
];

const PRICE_WINDOW_HEADER: [&str; 9] = [
    "Test_Period",
    "Local_Time_Range",
    "Data_Points",
    "Avg_Price_Cent_kWh",
    "Min_Price_Cent_kWh",
    "Max_Price_Cent_kWh",
    "Avg_Price_EUR_MWh",
    "Min_Price_EUR_MWh",
    "Max_Price_EUR_MWh",
];

fn finish(writer: ::csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// One row per measured window. Non-cyclic windows count as one cycle.
pub fn workload_summary(results: &[WindowResult]) -> Result<String> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(WORKLOAD_HEADER)?;

    for result in results {
        let Some(stats) = result.stats() else {
            continue;
        };
        let energy = &stats.energy_consumption;
        let power = &stats.power_stats;
        writer.write_record([
            result.name.clone(),
            result.key.clone(),
            result.pattern.to_string(),
            result.duration_minutes.to_string(),
            energy.active_duration_minutes.to_string(),
            stats.declared_cycles().to_string(),
            stats.data_points.to_string(),
            power.average_w.to_string(),
            power.peak_w.to_string(),
            power.minimum_w.to_string(),
            power.std_deviation_w.to_string(),
            energy.total_kwh.to_string(),
            energy.energy_per_cycle_kwh.unwrap_or(energy.total_kwh).to_string(),
            power.stability_cv_percent.to_string(),
        ])?;
    }
    finish(writer)
}

/// Every quote of the day in local time, in three units.
pub fn price_table(day: &DayPriceStats, clock: &LocalClock) -> Result<String> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(PRICE_HEADER)?;

    for point in &day.raw_data {
        let (hour, quarter) = point
            .hour_quarter(clock)
            .map(|(h, m)| (format!("{:02}", h), format!("{:02}:{:02}", h, m)))
            .unwrap_or_default();
        writer.write_record([
            point.local_time.clone(),
            PriceUnit::CentPerKwh.report(point.cent_kwh).to_string(),
            PriceUnit::EurPerKwh.report(point.cent_kwh).to_string(),
            PriceUnit::EurPerMwh.report(point.cent_kwh).to_string(),
            hour,
            quarter,
        ])?;
    }
    finish(writer)
}

/// One row per priced window; windows without quotes are left out.
pub fn price_windows(windows: &[PriceWindowResult]) -> Result<String> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(PRICE_WINDOW_HEADER)?;

    for window in windows {
        let Some(stats) = window.stats() else {
            continue;
        };
        writer.write_record([
            window.name.clone(),
            window.local_time_range.clone(),
            stats.data_points.to_string(),
            stats.avg_price_cent_kwh.to_string(),
            stats.min_price_cent_kwh.to_string(),
            stats.max_price_cent_kwh.to_string(),
            stats.avg_price_eur_mwh.to_string(),
            stats.min_price_eur_mwh.to_string(),
            stats.max_price_eur_mwh.to_string(),
        ])?;
    }
    finish(writer)
}
