//! Outlier detection module.
//!
//! Two strategies are available:
//! - **IQR**: bounds are `[q1 - k * IQR, q3 + k * IQR]` (default `k = 1.5`)
//! - **Z-score**: bounds are `[mean - k * std, mean + k * std]` (default `k = 3`)
//!
//! A value is an outlier when it lies strictly outside the bounds, so a
//! larger `k` can only shrink the outlier set.

use tracing::debug;

use crate::dataset::Dataset;
use crate::error::{InsightError, Result};
use crate::profiler::statistics::{mean, percentile, population_std};
use crate::types::{ColumnOutliers, OutlierBounds, OutlierMethod, OutlierPoint};
use crate::utils::compare_f64;

/// Detects outliers in numeric columns with a fixed method and multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierDetector {
    method: OutlierMethod,
    k: f64,
}

impl OutlierDetector {
    /// Create a detector; `k` defaults to the method's default multiplier.
    ///
    /// Returns `InvalidParameter` unless `k` is finite and positive.
    pub fn new(method: OutlierMethod, k: Option<f64>) -> Result<Self> {
        let k = k.unwrap_or_else(|| method.default_k());
        if !k.is_finite() || k <= 0.0 {
            return Err(InsightError::invalid_parameter(
                "k",
                format!("must be a finite number greater than 0, got {k}"),
            ));
        }
        Ok(Self { method, k })
    }

    /// IQR detector with the default multiplier.
    pub fn iqr() -> Self {
        Self {
            method: OutlierMethod::Iqr,
            k: OutlierMethod::Iqr.default_k(),
        }
    }

    pub fn method(&self) -> OutlierMethod {
        self.method
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Compute the bounds for a sample, or `None` when it is empty or the
    /// bounds are not finite.
    pub fn bounds(&self, values: &[f64]) -> Option<OutlierBounds> {
        let bounds = match self.method {
            OutlierMethod::Iqr => {
                let mut sorted = values.to_vec();
                sorted.sort_by(compare_f64);
                let q1 = percentile(&sorted, 25.0)?;
                let q3 = percentile(&sorted, 75.0)?;
                let iqr = q3 - q1;
                OutlierBounds {
                    lower: q1 - self.k * iqr,
                    upper: q3 + self.k * iqr,
                }
            }
            OutlierMethod::ZScore => {
                let mean = mean(values)?;
                let std = population_std(values, mean);
                OutlierBounds {
                    lower: mean - self.k * std,
                    upper: mean + self.k * std,
                }
            }
        };
        (bounds.lower.is_finite() && bounds.upper.is_finite()).then_some(bounds)
    }

    /// Flag values outside the bounds.
    ///
    /// `cells` pairs each value with the row it came from; the flagged points
    /// keep that row reference and the input order.
    pub fn detect_in_values(
        &self,
        cells: &[(usize, f64)],
    ) -> (Option<OutlierBounds>, Vec<OutlierPoint>) {
        let values: Vec<f64> = cells.iter().map(|(_, v)| *v).collect();
        let Some(bounds) = self.bounds(&values) else {
            return (None, Vec::new());
        };

        let outliers = cells
            .iter()
            .filter(|(_, value)| !bounds.contains(*value))
            .map(|&(row, value)| OutlierPoint { row, value })
            .collect();
        (Some(bounds), outliers)
    }

    /// Detect outliers in one dataset column.
    ///
    /// Numbers and numeric strings are checked; other cells are ignored.
    pub fn detect(&self, dataset: &Dataset, column: &str) -> Result<ColumnOutliers> {
        dataset.require_column(column)?;

        let cells = dataset.numeric_cells(column);
        let (bounds, outliers) = self.detect_in_values(&cells);

        debug!(
            "Column '{}': {} of {} values outside {} bounds (k = {})",
            column,
            outliers.len(),
            cells.len(),
            self.method,
            self.k
        );

        Ok(ColumnOutliers {
            column: column.to_string(),
            method: self.method,
            k: self.k,
            bounds,
            outliers,
            values_checked: cells.len(),
        })
    }
}

/// Detect outliers in several columns with one method.
///
/// Fails with `ColumnNotFound` on the first unknown column.
pub fn detect_outliers<S: AsRef<str>>(
    dataset: &Dataset,
    columns: &[S],
    method: OutlierMethod,
    k: Option<f64>,
) -> Result<Vec<ColumnOutliers>> {
    let detector = OutlierDetector::new(method, k)?;
    columns
        .iter()
        .map(|column| detector.detect(dataset, column.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Row, Value};

    fn ages() -> Vec<(usize, f64)> {
        [20.0, 21.0, 22.0, 23.0, 24.0, 25.0, 26.0, 27.0, 28.0, 1000.0]
            .into_iter()
            .enumerate()
            .collect()
    }

    #[test]
    fn test_iqr_flags_single_outlier() {
        let (bounds, outliers) = OutlierDetector::iqr().detect_in_values(&ages());
        let bounds = bounds.unwrap();
        assert!((bounds.lower - 15.5).abs() < 1e-9);
        assert!((bounds.upper - 33.5).abs() < 1e-9);
        assert_eq!(outliers, vec![OutlierPoint { row: 9, value: 1000.0 }]);
    }

    #[test]
    fn test_zscore_flags_extreme_value() {
        let detector = OutlierDetector::new(OutlierMethod::ZScore, Some(2.0)).unwrap();
        let (_, outliers) = detector.detect_in_values(&ages());
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].value, 1000.0);
    }

    #[test]
    fn test_zscore_constant_values() {
        let cells: Vec<(usize, f64)> = (0..5).map(|i| (i, 7.0)).collect();
        let detector = OutlierDetector::new(OutlierMethod::ZScore, None).unwrap();
        let (bounds, outliers) = detector.detect_in_values(&cells);
        assert_eq!(bounds.unwrap().lower, 7.0);
        assert!(outliers.is_empty());
    }

    #[test]
    fn test_zscore_near_float_limits() {
        let cells = vec![(0, 1e308), (1, 1e308), (2, -1e308)];
        let detector = OutlierDetector::new(OutlierMethod::ZScore, None).unwrap();
        let (bounds, outliers) = detector.detect_in_values(&cells);
        // mean +/- 3 std overflows, so there are no bounds to flag against
        assert!(bounds.is_none());
        assert!(outliers.is_empty());

        let detector = OutlierDetector::new(OutlierMethod::ZScore, Some(1.0)).unwrap();
        let (bounds, outliers) = detector.detect_in_values(&cells);
        let bounds = bounds.unwrap();
        assert!(bounds.lower.is_finite() && bounds.upper.is_finite());
        assert_eq!(outliers, vec![OutlierPoint { row: 2, value: -1e308 }]);
    }

    #[test]
    fn test_empty_values() {
        let (bounds, outliers) = OutlierDetector::iqr().detect_in_values(&[]);
        assert!(bounds.is_none());
        assert!(outliers.is_empty());
    }

    #[test]
    fn test_invalid_k() {
        for k in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = OutlierDetector::new(OutlierMethod::Iqr, Some(k)).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_PARAMETER");
        }
    }

    #[test]
    fn test_larger_k_never_adds_outliers() {
        let cells = ages();
        for method in [OutlierMethod::Iqr, OutlierMethod::ZScore] {
            let mut previous = usize::MAX;
            for k in [0.5, 1.0, 1.5, 2.0, 3.0, 5.0] {
                let detector = OutlierDetector::new(method, Some(k)).unwrap();
                let count = detector.detect_in_values(&cells).1.len();
                assert!(count <= previous, "{method} k={k}");
                previous = count;
            }
        }
    }

    #[test]
    fn test_detect_on_dataset() {
        let rows = vec![
            Row::from([("price".to_string(), Value::from(10.0))]),
            Row::from([("price".to_string(), Value::from("x"))]),
            Row::from([("price".to_string(), Value::from("12"))]),
        ];
        let dataset = Dataset::from_rows(rows);

        let result = detect_outliers(&dataset, &["price"], OutlierMethod::Iqr, None).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].values_checked, 2);
        assert_eq!(result[0].k, 1.5);

        let err = detect_outliers(&dataset, &["cost"], OutlierMethod::Iqr, None).unwrap_err();
        assert!(err.is_input_error());
    }
}
