//! Spot-price aggregation
//!
//! Quotes of the test day are fetched once and then sliced in memory by each
//! window's local span. Spans are compared as local date and time, so a window
//! running past midnight only picks up the quotes of the test day it covers.
//! Prices are stored in cents/kWh and converted on the way out.

use crate::analysis::AnalysisContext;
use crate::error::StoreError;
use crate::record::QuoteRecord;
use crate::stats::{round_to, SeriesSummary};
use crate::store::TimeSeriesStore;
use crate::timestamp::{self, LocalClock};
use crate::window::WindowDefinition;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Message carried by a window slice without quotes
pub const NO_PRICE_DATA: &str = "No price data found for this period";

/// Price units. Cents/kWh is canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceUnit {
    CentPerKwh,
    EurPerKwh,
    EurPerMwh,
}

impl PriceUnit {
    /// Multiplier from cents/kWh
    pub fn factor(self) -> f64 {
        match self {
            Self::CentPerKwh => 1.0,
            Self::EurPerKwh => 0.01,
            Self::EurPerMwh => 10.0,
        }
    }

    /// Decimals kept when reporting in this unit
    pub fn decimals(self) -> i32 {
        match self {
            Self::CentPerKwh => 3,
            Self::EurPerKwh => 5,
            Self::EurPerMwh => 2,
        }
    }

    pub fn from_cents(self, cents: f64) -> f64 {
        cents * self.factor()
    }

    /// Convert and round in one step
    pub fn report(self, cents: f64) -> f64 {
        round_to(self.from_cents(cents), self.decimals())
    }
}

/// One usable quote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub timestamp_ms: i64,
    pub local_time: String,
    pub cent_kwh: f64,
}

impl PricePoint {
    /// Local hour and the first minute of the quarter-hour the quote falls in
    pub fn hour_quarter(&self, clock: &LocalClock) -> Option<(u32, u32)> {
        clock
            .local_from_millis(self.timestamp_ms)
            .map(|dt| (dt.hour(), dt.minute() / 15 * 15))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceStats {
    pub min_price: f64,
    pub max_price: f64,
    pub avg_price: f64,
    pub median_price: f64,
    pub std_dev: f64,
}

impl PriceStats {
    fn in_unit(summary: &SeriesSummary, unit: PriceUnit) -> Self {
        Self {
            min_price: unit.report(summary.min),
            max_price: unit.report(summary.max),
            avg_price: unit.report(summary.mean),
            median_price: unit.report(summary.median),
            std_dev: unit.report(summary.std_dev),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceRange {
    pub variation_cent_kwh: f64,
    pub variation_eur_mwh: f64,
    pub variation_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRange {
    pub first: String,
    pub last: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayPriceStats {
    pub tariff: String,
    pub date: NaiveDate,
    pub data_points: usize,
    pub skipped_quotes: usize,
    pub price_stats_cent_kwh: PriceStats,
    pub price_stats_eur_kwh: PriceStats,
    pub price_stats_eur_mwh: PriceStats,
    pub price_range: PriceRange,
    pub time_range: TimeRange,
    pub raw_data: Vec<PricePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DayPriceResult {
    Priced(DayPriceStats),
    NoData { tariff: String, date: NaiveDate },
}

impl DayPriceResult {
    pub fn stats(&self) -> Option<&DayPriceStats> {
        match self {
            Self::Priced(stats) => Some(stats),
            Self::NoData { .. } => None,
        }
    }
}

/// Price slice of one workload window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceWindowResult {
    pub key: String,
    pub name: String,
    pub local_time_range: String,
    #[serde(flatten)]
    pub outcome: PriceWindowOutcome,
}

impl PriceWindowResult {
    pub fn stats(&self) -> Option<&WindowPriceStats> {
        match &self.outcome {
            PriceWindowOutcome::Priced(stats) => Some(stats),
            PriceWindowOutcome::NoData { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PriceWindowOutcome {
    Priced(WindowPriceStats),
    NoData { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowPriceStats {
    pub data_points: usize,
    pub avg_price_cent_kwh: f64,
    pub min_price_cent_kwh: f64,
    pub max_price_cent_kwh: f64,
    pub avg_price_eur_mwh: f64,
    pub min_price_eur_mwh: f64,
    pub max_price_eur_mwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedWindow {
    pub key: String,
    pub name: String,
    pub avg_price_cent_kwh: f64,
}

/// Cheapest vs dearest priced window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostOptimization {
    pub lowest_price_period: PricedWindow,
    pub highest_price_period: PricedWindow,
    pub potential_savings_cent_kwh: f64,
    pub potential_savings_eur_mwh: f64,
    pub potential_savings_percent: f64,
}

impl CostOptimization {
    /// Needs at least two priced windows.
    pub fn from_windows(windows: &[PriceWindowResult]) -> Option<Self> {
        let priced: Vec<(&PriceWindowResult, f64)> = windows
            .iter()
            .filter_map(|w| w.stats().map(|s| (w, s.avg_price_cent_kwh)))
            .collect();
        if priced.len() < 2 {
            return None;
        }

        let lowest = priced.iter().min_by(|a, b| a.1.total_cmp(&b.1))?;
        let highest = priced.iter().max_by(|a, b| a.1.total_cmp(&b.1))?;
        let savings = highest.1 - lowest.1;
        let percent = if highest.1 > 0.0 {
            savings / highest.1 * 100.0
        } else {
            0.0
        };

        let period = |(w, avg): &(&PriceWindowResult, f64)| PricedWindow {
            key: w.key.clone(),
            name: w.name.clone(),
            avg_price_cent_kwh: *avg,
        };

        Some(Self {
            lowest_price_period: period(lowest),
            highest_price_period: period(highest),
            potential_savings_cent_kwh: PriceUnit::CentPerKwh.report(savings),
            potential_savings_eur_mwh: PriceUnit::EurPerMwh.report(savings),
            potential_savings_percent: round_to(percent, 1),
        })
    }
}

/// Whole-day price analysis plus the per-window slices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceAnalysis {
    pub day: DayPriceResult,
    pub windows: Vec<PriceWindowResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_optimization: Option<CostOptimization>,
}

pub struct PriceAggregator<S> {
    store: S,
    tariff: String,
    clock: LocalClock,
    date: NaiveDate,
}

impl<S: TimeSeriesStore> PriceAggregator<S> {
    pub fn new(store: S, context: &AnalysisContext) -> Self {
        Self {
            store,
            tariff: context.tariff.clone(),
            clock: context.clock,
            date: context.date,
        }
    }

    /// All quotes of the local test day, ascending.
    pub fn fetch_day(&self) -> Result<Vec<QuoteRecord>, StoreError> {
        let (lower, upper) = self.clock.day_bounds_millis(self.date);
        debug!("Fetching {} quotes between {} and {}", self.tariff, lower, upper);
        self.store.query_quotes(&self.tariff, lower, upper, None)
    }

    /// Fetch once, then produce the day result and window slices.
    pub fn run(&self, windows: &[WindowDefinition]) -> Result<PriceAnalysis, StoreError> {
        let quotes = self.fetch_day()?;
        let day = self.analyze_day(&quotes);
        let windows = self.analyze_windows(&quotes, windows);
        let cost_optimization = CostOptimization::from_windows(&windows);
        Ok(PriceAnalysis {
            day,
            windows,
            cost_optimization,
        })
    }

    pub fn analyze_day(&self, quotes: &[QuoteRecord]) -> DayPriceResult {
        let (points, skipped) = self.usable_points(quotes);
        let values: Vec<f64> = points.iter().map(|p| p.cent_kwh).collect();

        let Some(summary) = SeriesSummary::of(&values) else {
            warn!("No {} prices for {}", self.tariff, self.date);
            return DayPriceResult::NoData {
                tariff: self.tariff.clone(),
                date: self.date,
            };
        };

        let range = summary.max - summary.min;
        let variation_percent = if summary.mean > 0.0 {
            round_to(range / summary.mean * 100.0, 1)
        } else {
            0.0
        };

        let time_range = TimeRange {
            first: points.first().map(|p| p.local_time.clone()).unwrap_or_default(),
            last: points.last().map(|p| p.local_time.clone()).unwrap_or_default(),
        };

        info!(
            "{} on {}: {} quotes, {:.3}-{:.3} ct/kWh",
            self.tariff, self.date, summary.count, summary.min, summary.max
        );

        DayPriceResult::Priced(DayPriceStats {
            tariff: self.tariff.clone(),
            date: self.date,
            data_points: summary.count,
            skipped_quotes: skipped,
            price_stats_cent_kwh: PriceStats::in_unit(&summary, PriceUnit::CentPerKwh),
            price_stats_eur_kwh: PriceStats::in_unit(&summary, PriceUnit::EurPerKwh),
            price_stats_eur_mwh: PriceStats::in_unit(&summary, PriceUnit::EurPerMwh),
            price_range: PriceRange {
                variation_cent_kwh: PriceUnit::CentPerKwh.report(range),
                variation_eur_mwh: PriceUnit::EurPerMwh.report(range),
                variation_percent,
            },
            time_range,
            raw_data: points,
        })
    }

    pub fn analyze_windows(
        &self,
        quotes: &[QuoteRecord],
        windows: &[WindowDefinition],
    ) -> Vec<PriceWindowResult> {
        let (points, _) = self.usable_points(quotes);
        windows
            .iter()
            .map(|w| self.slice_window(&points, w))
            .collect()
    }

    fn slice_window(&self, points: &[PricePoint], window: &WindowDefinition) -> PriceWindowResult {
        let span = local_span(window, &self.clock);
        let local_time_range = span
            .map(|(s, e)| format!("{} - {}", s.format("%H:%M"), e.format("%H:%M")))
            .unwrap_or_else(|| "N/A".to_string());

        let values: Vec<f64> = match span {
            Some((start, end)) => points
                .iter()
                .filter(|p| {
                    self.clock
                        .local_minute(p.timestamp_ms)
                        .is_some_and(|t| start <= t && t <= end)
                })
                .map(|p| p.cent_kwh)
                .collect(),
            None => Vec::new(),
        };

        let outcome = match SeriesSummary::of(&values) {
            Some(s) => PriceWindowOutcome::Priced(WindowPriceStats {
                data_points: s.count,
                avg_price_cent_kwh: PriceUnit::CentPerKwh.report(s.mean),
                min_price_cent_kwh: PriceUnit::CentPerKwh.report(s.min),
                max_price_cent_kwh: PriceUnit::CentPerKwh.report(s.max),
                avg_price_eur_mwh: PriceUnit::EurPerMwh.report(s.mean),
                min_price_eur_mwh: PriceUnit::EurPerMwh.report(s.min),
                max_price_eur_mwh: PriceUnit::EurPerMwh.report(s.max),
            }),
            None => {
                debug!("{}: {}", window.key(), NO_PRICE_DATA);
                PriceWindowOutcome::NoData {
                    error: NO_PRICE_DATA.to_string(),
                }
            }
        };

        PriceWindowResult {
            key: window.key().to_string(),
            name: window.display_name().to_string(),
            local_time_range,
            outcome,
        }
    }

    fn usable_points(&self, quotes: &[QuoteRecord]) -> (Vec<PricePoint>, usize) {
        let mut points = Vec::with_capacity(quotes.len());
        let mut skipped = 0;
        for quote in quotes {
            match quote.price_cents() {
                Ok(cent_kwh) => points.push(PricePoint {
                    timestamp_ms: quote.timestamp_ms,
                    local_time: self.clock.format_local(quote.timestamp_ms),
                    cent_kwh,
                }),
                Err(e) => {
                    debug!("Skipping quote at {}: {}", quote.timestamp_ms, e);
                    skipped += 1;
                }
            }
        }
        (points, skipped)
    }
}

/// Local `[start, end]` of a window, truncated to the minute.
pub fn local_span(
    window: &WindowDefinition,
    clock: &LocalClock,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let to_local = |bound: &str| {
        timestamp::parse_bound(bound)
            .map(|utc| clock.local_from_utc(&utc))
            .and_then(timestamp::truncate_to_minute)
    };
    Some((to_local(&window.overall().start)?, to_local(&window.overall().end)?))
}
