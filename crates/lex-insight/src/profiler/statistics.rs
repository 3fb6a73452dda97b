//! Statistical analysis functions for column profiling.
//!
//! All functions are total: an empty input yields `None` (or an empty table)
//! rather than NaN, and degenerate spreads yield 0.

use indexmap::IndexMap;

use crate::dataset::{Value, ValueKey};
use crate::utils::compare_f64;

/// Descriptive statistics of a non-empty numeric sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Describe {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

/// Compute descriptive statistics, or `None` for an empty sample.
pub fn describe(values: &[f64]) -> Option<Describe> {
    let mean = mean(values)?;
    let mut sorted = values.to_vec();
    sorted.sort_by(compare_f64);

    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    // Identical values have exactly zero spread, whatever rounding says.
    let std = if min == max {
        0.0
    } else {
        population_std(values, mean)
    };

    Some(Describe {
        count: values.len(),
        mean,
        std,
        min,
        max,
        q1: percentile(&sorted, 25.0)?,
        median: median(&sorted)?,
        q3: percentile(&sorted, 75.0)?,
        skewness: standardized_moment(values, mean, std, 3),
        kurtosis: if std == 0.0 {
            0.0
        } else {
            standardized_moment(values, mean, std, 4) - 3.0
        },
    })
}

/// Arithmetic mean, kept inside `[min, max]` of the sample.
///
/// When the plain sum overflows, the terms are divided by `n` before they
/// are added, so large finite inputs still have a finite mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let sum = values.iter().sum::<f64>();
    let mean = if sum.is_finite() {
        sum / n
    } else {
        values.iter().map(|v| v / n).sum()
    };

    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    // Rounding can push the quotient just past the extremes.
    Some(if min <= max { mean.clamp(min, max) } else { mean })
}

/// Standard deviation dividing by N.
///
/// Deviations too large to square in `f64` are rescaled by the largest one.
pub fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if variance.is_finite() {
        return variance.sqrt();
    }

    let scale = values
        .iter()
        .fold(mean.abs(), |acc, v| acc.max(v.abs()));
    if !scale.is_finite() {
        return variance.sqrt();
    }
    let scaled_mean = mean / scale;
    let scaled = values
        .iter()
        .map(|v| (v / scale - scaled_mean).powi(2))
        .sum::<f64>()
        / n;
    scale * scaled.sqrt()
}

/// Linear-interpolated percentile of an ascending slice.
///
/// The rank is `p / 100 * (n - 1)`, interpolated between its floor and ceiling.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    let (a, b) = (sorted[lower], sorted[upper]);
    if weight == 0.0 {
        return Some(a);
    }
    let spread = b - a;
    Some(if spread.is_finite() {
        a + spread * weight
    } else {
        a * (1.0 - weight) + b * weight
    })
}

/// Middle value of an ascending slice; the mean of the two middle values for even lengths.
pub fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => {
            let (a, b) = (sorted[n / 2 - 1], sorted[n / 2]);
            let sum = a + b;
            Some(if sum.is_finite() { sum / 2.0 } else { a / 2.0 + b / 2.0 })
        }
    }
}

/// Mean of `((x - mean) / std)^k`; 0 when `std` is 0.
fn standardized_moment(values: &[f64], mean: f64, std: f64, k: i32) -> f64 {
    if std == 0.0 || values.is_empty() {
        return 0.0;
    }
    values
        .iter()
        .map(|v| ((v - mean) / std).powi(k))
        .sum::<f64>()
        / values.len() as f64
}

/// Value frequencies in first-seen order.
#[derive(Debug, Default)]
pub struct FrequencyTable {
    entries: IndexMap<ValueKey, (Value, usize)>,
    total: usize,
}

impl FrequencyTable {
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut table = Self::default();
        for value in values {
            table.total += 1;
            table
                .entries
                .entry(value.hash_key())
                .or_insert_with(|| (value.clone(), 0))
                .1 += 1;
        }
        table
    }

    /// Number of distinct values.
    pub fn unique(&self) -> usize {
        self.entries.len()
    }

    /// Number of values counted.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Most frequent value. On a tie the value seen first wins.
    pub fn mode(&self) -> Option<&Value> {
        let mut best: Option<(&Value, usize)> = None;
        for (value, count) in self.entries.values() {
            if best.is_none_or(|(_, c)| *count > c) {
                best = Some((value, *count));
            }
        }
        best.map(|(value, _)| value)
    }

    /// The `n` most frequent values, count descending, ties in first-seen order.
    pub fn top(&self, n: usize) -> Vec<(&Value, usize)> {
        let mut entries: Vec<(&Value, usize)> =
            self.entries.values().map(|(v, c)| (v, *c)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(n);
        entries
    }
}
