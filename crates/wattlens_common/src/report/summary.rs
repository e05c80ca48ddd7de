//! Plain-text summary. Every line is a `%` comment so the block can be pasted
//! straight into a LaTeX source.

use crate::analysis::AnalysisReport;
use crate::compare::ComparisonResult;
use crate::price::PriceAnalysis;
use crate::window::Pattern;
use crate::workload::{WindowOutcome, WindowResult};
use std::fmt::Write;

pub fn render(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "% Energy Consumption Analysis Results");
    let _ = writeln!(out, "% Generated: {}", report.analysis_date.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "% Test Date: {}", report.test_date);
    let _ = writeln!(out, "% Device: {}", report.device_id);
    let _ = writeln!(out, "%");

    for result in &report.workload_results {
        workload_section(&mut out, result);
    }

    comparison_section(&mut out, &report.comparison);

    if let Some(prices) = &report.price_analysis {
        price_section(&mut out, &report.tariff, prices);
    } else if let Some(error) = &report.price_error {
        let _ = writeln!(out, "% Price analysis: ERROR - {}", error);
    }
    out
}

fn workload_section(out: &mut String, result: &WindowResult) {
    let stats = match &result.outcome {
        WindowOutcome::Measured(stats) => stats,
        WindowOutcome::NoData { .. } => {
            let _ = writeln!(out, "% {}: NO DATA", result.key);
            let _ = writeln!(out, "%");
            return;
        }
        WindowOutcome::Failed { error } => {
            let _ = writeln!(out, "% {}: ERROR - {}", result.key, error);
            let _ = writeln!(out, "%");
            return;
        }
    };

    let power = &stats.power_stats;
    let energy = &stats.energy_consumption;

    let _ = writeln!(out, "% {} ({})", result.name, result.key);
    let _ = writeln!(out, "% Pattern: {}", result.pattern);
    let _ = writeln!(out, "% Average power consumption: {} W", power.average_w);
    let _ = writeln!(out, "% Peak power consumption: {} W", power.peak_w);

    match (result.pattern, &stats.cycles) {
        (Pattern::Cyclic, Some(cycles)) => {
            let _ = writeln!(
                out,
                "% Total energy consumption ({} cycles): {} kWh",
                cycles.declared_cycles, energy.total_kwh
            );
            if let Some(per_cycle) = energy.energy_per_cycle_kwh {
                let _ = writeln!(
                    out,
                    "% Energy consumption per {}-min cycle: {} kWh",
                    cycles.cycle_minutes, per_cycle
                );
            }
            let _ = writeln!(
                out,
                "% Active duration: {} minutes ({} x {}min cycles)",
                energy.active_duration_minutes, cycles.declared_cycles, cycles.cycle_minutes
            );
            let _ = writeln!(out, "% Total test duration: {} minutes", result.duration_minutes);
            if cycles.data_bearing_cycles < cycles.declared_cycles {
                let _ = writeln!(
                    out,
                    "% Cycles with data: {} of {}",
                    cycles.data_bearing_cycles, cycles.declared_cycles
                );
            }
            if !cycles.cycle_details.is_empty() {
                let _ = writeln!(out, "% Cycle breakdown:");
                for cycle in &cycles.cycle_details {
                    let _ = writeln!(
                        out,
                        "%   Cycle {}: {:.1}W avg, {:.1}W peak",
                        cycle.cycle, cycle.average_w, cycle.peak_w
                    );
                }
            }
        }
        _ => {
            let _ = writeln!(out, "% Total energy consumption: {} kWh", energy.total_kwh);
            let _ = writeln!(out, "% Duration: {} hours", energy.duration_hours);
        }
    }

    let _ = writeln!(out, "% Power stability: +/-{} W variation", power.std_deviation_w);
    let _ = writeln!(out, "% Data points: {}", stats.data_points);
    let _ = writeln!(out, "%");
}

fn comparison_section(out: &mut String, comparison: &ComparisonResult) {
    let Some(baseline) = comparison.baseline_power_w else {
        let _ = writeln!(out, "% Workload Comparison Analysis: baseline {} unavailable", comparison.baseline_key);
        let _ = writeln!(out, "%");
        return;
    };

    let _ = writeln!(out, "% Workload Comparison Analysis");
    let _ = writeln!(out, "% Baseline ({}): {:.1} W", comparison.baseline_key, baseline);
    for entry in &comparison.workload_comparison {
        if let (Some(percent), Some(watts)) = (entry.power_increase_percent, entry.power_increase_w) {
            let _ = writeln!(
                out,
                "% {}: {}% increase over baseline ({} W)",
                entry.key, percent, watts
            );
        }
        if let Some(cost) = entry.estimated_cost_cent {
            let _ = writeln!(out, "%   Estimated energy cost: {} cent", cost);
        }
    }
    let _ = writeln!(out, "%");
}

fn price_section(out: &mut String, tariff: &str, prices: &PriceAnalysis) {
    let _ = writeln!(out, "% EPEX Spot Price Analysis ({})", tariff);

    match prices.day.stats() {
        Some(day) => {
            let cent = &day.price_stats_cent_kwh;
            let mwh = &day.price_stats_eur_mwh;
            let _ = writeln!(out, "% Data points: {} (15-minute intervals)", day.data_points);
            let _ = writeln!(
                out,
                "% Average price: {} cent/kWh ({} EUR/MWh)",
                cent.avg_price, mwh.avg_price
            );
            let _ = writeln!(
                out,
                "% Minimum price: {} cent/kWh ({} EUR/MWh)",
                cent.min_price, mwh.min_price
            );
            let _ = writeln!(
                out,
                "% Maximum price: {} cent/kWh ({} EUR/MWh)",
                cent.max_price, mwh.max_price
            );
            let _ = writeln!(
                out,
                "% Price variation: {} cent/kWh ({} EUR/MWh)",
                day.price_range.variation_cent_kwh, day.price_range.variation_eur_mwh
            );
            let _ = writeln!(
                out,
                "% Price variation percentage: {}%",
                day.price_range.variation_percent
            );
        }
        None => {
            let _ = writeln!(out, "% No price data for the test day");
        }
    }
    let _ = writeln!(out, "%");

    let _ = writeln!(out, "% Test Period Price Analysis");
    for window in &prices.windows {
        match window.stats() {
            Some(stats) => {
                let _ = writeln!(out, "% {} ({} local time)", window.name, window.local_time_range);
                let _ = writeln!(
                    out,
                    "% Average electricity price: {} cent/kWh ({} EUR/MWh)",
                    stats.avg_price_cent_kwh, stats.avg_price_eur_mwh
                );
                let _ = writeln!(
                    out,
                    "% Price range: {} - {} cent/kWh ({} - {} EUR/MWh)",
                    stats.min_price_cent_kwh,
                    stats.max_price_cent_kwh,
                    stats.min_price_eur_mwh,
                    stats.max_price_eur_mwh
                );
                let _ = writeln!(out, "% Data points: {} (15-minute intervals)", stats.data_points);
            }
            None => {
                let _ = writeln!(out, "% {}: {}", window.name, crate::price::NO_PRICE_DATA);
            }
        }
    }
    let _ = writeln!(out, "%");

    if let Some(opt) = &prices.cost_optimization {
        let _ = writeln!(out, "% Cost Optimization Potential");
        let _ = writeln!(
            out,
            "% Lowest price period: {} at {} cent/kWh",
            opt.lowest_price_period.name, opt.lowest_price_period.avg_price_cent_kwh
        );
        let _ = writeln!(
            out,
            "% Highest price period: {} at {} cent/kWh",
            opt.highest_price_period.name, opt.highest_price_period.avg_price_cent_kwh
        );
        let _ = writeln!(
            out,
            "% Potential savings: {} cent/kWh ({} EUR/MWh)",
            opt.potential_savings_cent_kwh, opt.potential_savings_eur_mwh
        );
        let _ = writeln!(out, "% Savings percentage: {}%", opt.potential_savings_percent);
    }
}
