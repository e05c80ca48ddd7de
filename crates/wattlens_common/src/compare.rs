//! Baseline-relative comparison of measured windows.

use crate::price::PriceWindowResult;
use crate::stats::round_to;
use crate::workload::WindowResult;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub baseline_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_power_w: Option<f64>,
    /// One entry per measured non-baseline window, in input order
    pub workload_comparison: Vec<WindowComparison>,
}

impl ComparisonResult {
    pub fn get(&self, key: &str) -> Option<&WindowComparison> {
        self.workload_comparison.iter().find(|c| c.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowComparison {
    pub key: String,
    pub name: String,
    pub average_power_w: f64,
    pub peak_power_w: f64,
    pub energy_kwh: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_increase_w: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_increase_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_price_cent_kwh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost_cent: Option<f64>,
}

pub struct Comparator {
    baseline_key: String,
}

impl Comparator {
    pub fn new(baseline_key: impl Into<String>) -> Self {
        Self {
            baseline_key: baseline_key.into(),
        }
    }

    pub fn compare(
        &self,
        results: &[WindowResult],
        prices: Option<&[PriceWindowResult]>,
    ) -> ComparisonResult {
        let baseline = self.baseline_power(results);

        let window_prices: HashMap<&str, f64> = prices
            .unwrap_or_default()
            .iter()
            .filter_map(|p| p.stats().map(|s| (p.key.as_str(), s.avg_price_cent_kwh)))
            .collect();

        let workload_comparison = results
            .iter()
            .filter(|r| r.key != self.baseline_key)
            .filter_map(|r| {
                let stats = r.stats()?;
                let average = stats.power_stats.average_w;
                let energy = stats.energy_consumption.total_kwh;
                let price = window_prices.get(r.key.as_str()).copied();

                Some(WindowComparison {
                    key: r.key.clone(),
                    name: r.name.clone(),
                    average_power_w: average,
                    peak_power_w: stats.power_stats.peak_w,
                    energy_kwh: energy,
                    power_increase_w: baseline.map(|b| round_to(average - b, 2)),
                    power_increase_percent: baseline.map(|b| round_to((average - b) / b * 100.0, 1)),
                    average_price_cent_kwh: price,
                    estimated_cost_cent: price.map(|p| round_to(energy * p, 6)),
                })
            })
            .collect();

        ComparisonResult {
            baseline_key: self.baseline_key.clone(),
            baseline_power_w: baseline,
            workload_comparison,
        }
    }

    /// Mean power of the baseline window, if it was measured and is non-zero.
    fn baseline_power(&self, results: &[WindowResult]) -> Option<f64> {
        let Some(result) = results.iter().find(|r| r.key == self.baseline_key) else {
            warn!("Baseline window {} not among results", self.baseline_key);
            return None;
        };
        match result.stats().map(|s| s.power_stats.average_w) {
            Some(power) if power != 0.0 => {
                debug!("Baseline {} at {:.2} W", self.baseline_key, power);
                Some(power)
            }
            Some(_) => {
                warn!("Baseline {} averaged 0 W, relative deltas omitted", self.baseline_key);
                None
            }
            None => {
                warn!("Baseline {} has no measurement, relative deltas omitted", self.baseline_key);
                None
            }
        }
    }
}
