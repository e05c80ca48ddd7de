//! Console output - ASCII only, colored status tags

use owo_colors::OwoColorize;
use std::path::PathBuf;
use wattlens_common::compare::ComparisonResult;
use wattlens_common::price::PriceAnalysis;
use wattlens_common::workload::{WindowOutcome, WindowResult};
use wattlens_common::AnalysisReport;

pub const SEPARATOR: &str = "------------------------------------------------------------";

pub fn print_report(report: &AnalysisReport) {
    println!();
    println!("{}", "[ENERGY ANALYSIS]".bold());
    println!("  Device:    {}", report.device_id);
    println!("  Test date: {}", report.test_date);
    println!("  Windows:   {}/{} measured", report.measured_count(), report.workload_results.len());
    println!("{}", SEPARATOR);

    for result in &report.workload_results {
        print_window(result);
    }

    print_comparison(&report.comparison);

    if let Some(prices) = &report.price_analysis {
        print_prices(&report.tariff, prices);
    } else if let Some(error) = &report.price_error {
        println!();
        println!("{} price analysis: {}", "[ERROR]".bright_red(), error);
    }
}

fn print_window(result: &WindowResult) {
    match &result.outcome {
        WindowOutcome::Measured(stats) => {
            println!(
                "{} {} ({}, {})",
                "[OK]".bright_green(),
                result.name,
                result.key,
                result.pattern
            );
            println!(
                "     {:.2} W avg, {:.2} W peak, {:.6} kWh, {} points",
                stats.power_stats.average_w,
                stats.power_stats.peak_w,
                stats.energy_consumption.total_kwh,
                stats.data_points
            );
            if let Some(cycles) = &stats.cycles {
                println!(
                    "     {} of {} cycles with data",
                    cycles.data_bearing_cycles, cycles.declared_cycles
                );
            }
            if stats.skipped_records.total() > 0 {
                println!(
                    "     {} {} records skipped",
                    "[NOTE]".yellow(),
                    stats.skipped_records.total()
                );
            }
        }
        WindowOutcome::NoData { .. } => {
            println!("{} {} ({}): no data", "[NO DATA]".yellow(), result.name, result.key);
        }
        WindowOutcome::Failed { error } => {
            println!("{} {} ({}): {}", "[FAILED]".bright_red(), result.name, result.key, error);
        }
    }
}

fn print_comparison(comparison: &ComparisonResult) {
    println!();
    println!("{}", "[COMPARISON]".bold());
    match comparison.baseline_power_w {
        Some(baseline) => println!("  Baseline {}: {:.1} W", comparison.baseline_key, baseline),
        None => println!(
            "  Baseline {}: {}",
            comparison.baseline_key,
            "unavailable".yellow()
        ),
    }
    for entry in &comparison.workload_comparison {
        match (entry.power_increase_w, entry.power_increase_percent) {
            (Some(watts), Some(percent)) => println!(
                "  {:<18} {:>8.2} W  {:+.2} W ({:+.1}%)",
                entry.key, entry.average_power_w, watts, percent
            ),
            _ => println!("  {:<18} {:>8.2} W", entry.key, entry.average_power_w),
        }
    }
}

pub fn print_prices(tariff: &str, prices: &PriceAnalysis) {
    println!();
    println!("{}", format!("[PRICES {}]", tariff).bold());
    match prices.day.stats() {
        Some(day) => {
            let cent = &day.price_stats_cent_kwh;
            println!(
                "  {} quotes, avg {} ct/kWh, range {} - {} ct/kWh",
                day.data_points, cent.avg_price, cent.min_price, cent.max_price
            );
        }
        None => println!("  {}", "no quotes for the test day".yellow()),
    }
    for window in &prices.windows {
        match window.stats() {
            Some(stats) => println!(
                "  {:<28} {}  {} ct/kWh",
                window.name, window.local_time_range, stats.avg_price_cent_kwh
            ),
            None => println!(
                "  {:<28} {}  {}",
                window.name,
                window.local_time_range,
                "no quotes".yellow()
            ),
        }
    }
    if let Some(opt) = &prices.cost_optimization {
        println!(
            "  Cheapest: {}, dearest: {}, savings {} ct/kWh ({}%)",
            opt.lowest_price_period.name,
            opt.highest_price_period.name,
            opt.potential_savings_cent_kwh,
            opt.potential_savings_percent
        );
    }
}

pub fn print_written(paths: &[PathBuf]) {
    println!();
    println!("{}", "[FILES]".bold());
    for path in paths {
        println!("  * {}", path.display().cyan());
    }
}
