//! Descriptive statistics over finite sequences of readings.

use serde::{Deserialize, Serialize};

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n-1 denominator). Zero for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Coefficient of variation in percent. Zero when the mean is zero.
pub fn coefficient_of_variation(std_dev: f64, mean: f64) -> f64 {
    if mean == 0.0 {
        0.0
    } else {
        std_dev / mean * 100.0
    }
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// min/max/mean/median/std-dev of a non-empty series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

impl SeriesSummary {
    pub fn of(values: &[f64]) -> Option<Self> {
        let mean = mean(values)?;
        let median = median(values)?;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            count: values.len(),
            min,
            max,
            mean,
            median,
            std_dev: sample_std_dev(values),
        })
    }

    /// Every statistic multiplied by `factor`, used for unit conversion.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            count: self.count,
            min: self.min * factor,
            max: self.max * factor,
            mean: self.mean * factor,
            median: self.median * factor,
            std_dev: self.std_dev * factor,
        }
    }

    pub fn cv_percent(&self) -> f64 {
        coefficient_of_variation(self.std_dev, self.mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_value_has_zero_spread() {
        let s = SeriesSummary::of(&[42.0]).unwrap();
        assert_eq!(s.std_dev, 0.0);
        assert_eq!(s.min, 42.0);
        assert_eq!(s.max, 42.0);
        assert_eq!(s.median, 42.0);
    }

    #[test]
    fn test_sample_std_dev_uses_n_minus_one() {
        assert_relative_eq!(sample_std_dev(&[10.0, 20.0, 30.0]), 10.0);
        assert_relative_eq!(sample_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.138089935, epsilon = 1e-9);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_cv_zero_mean() {
        assert_eq!(coefficient_of_variation(5.0, 0.0), 0.0);
        assert_relative_eq!(coefficient_of_variation(10.0, 20.0), 50.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(12.345678, 2), 12.35);
        assert_eq!(round_to(0.1234567, 6), 0.123457);
        assert_eq!(round_to(-1.25, 1), -1.3);
    }
}
