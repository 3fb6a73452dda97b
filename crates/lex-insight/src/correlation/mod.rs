//! Pearson correlation over numeric columns.
//!
//! For each column pair only rows where both cells are numeric are used.
//! Fewer than two such rows, or zero variance on either side, gives 0.

use indexmap::IndexMap;
use tracing::debug;

use crate::dataset::Dataset;
use crate::error::Result;
use crate::types::CorrelationMatrix;

/// Computes correlation matrices, optionally over a leading row sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CorrelationEngine {
    sample_rows: Option<usize>,
}

impl CorrelationEngine {
    /// `sample_rows` bounds the pass to the first rows; `None` reads all rows.
    pub fn new(sample_rows: Option<usize>) -> Self {
        Self { sample_rows }
    }

    /// Correlate every pair of `columns`.
    ///
    /// Fails with `ColumnNotFound` for an unknown column. Duplicated names
    /// are correlated once.
    pub fn calculate<S: AsRef<str>>(
        &self,
        dataset: &Dataset,
        columns: &[S],
    ) -> Result<CorrelationMatrix> {
        let mut names: Vec<String> = Vec::with_capacity(columns.len());
        for column in columns {
            let column = column.as_ref();
            dataset.require_column(column)?;
            if !names.iter().any(|n| n == column) {
                names.push(column.to_string());
            }
        }

        let total_rows = dataset.len();
        let rows_used = self.sample_rows.map_or(total_rows, |n| n.min(total_rows));

        // Per column, the numeric reading of each sampled row.
        let series: Vec<Vec<Option<f64>>> = names
            .iter()
            .map(|name| {
                dataset
                    .column_values(name)
                    .take(rows_used)
                    .map(|cell| cell.and_then(|v| v.as_number()))
                    .collect()
            })
            .collect();

        let n = names.len();
        let mut coefficients = vec![vec![0.0; n]; n];
        for i in 0..n {
            coefficients[i][i] = 1.0;
            for j in (i + 1)..n {
                let r = pearson_pairs(&series[i], &series[j]);
                coefficients[i][j] = r;
                coefficients[j][i] = r;
            }
        }

        let matrix: IndexMap<String, IndexMap<String, f64>> = names
            .iter()
            .zip(&coefficients)
            .map(|(name, row)| {
                let row = names.iter().cloned().zip(row.iter().copied()).collect();
                (name.clone(), row)
            })
            .collect();

        debug!(
            "Computed {}x{} correlation matrix over {} of {} rows",
            n,
            n,
            rows_used,
            total_rows
        );

        Ok(CorrelationMatrix {
            columns: names,
            matrix,
            rows_used,
            total_rows,
            sampled: rows_used < total_rows,
        })
    }
}

/// Pearson coefficient over the rows where both sides are present.
fn pearson_pairs(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
    let (xs, ys): (Vec<f64>, Vec<f64>) = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip();
    pearson(&xs, &ys)
}

/// Pearson correlation of two equally long samples.
///
/// Returns 0 for fewer than two pairs, zero variance, or a non-finite result.
/// The result is clamped to [-1, 1].
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);

    // Constant sides have exactly zero variance, whatever rounding says.
    if xs.iter().all(|x| *x == xs[0]) || ys.iter().all(|y| *y == ys[0]) {
        return 0.0;
    }

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }

    let r = covariance / (var_x.sqrt() * var_y.sqrt());
    if r.is_finite() { r.clamp(-1.0, 1.0) } else { 0.0 }
}

/// Correlation matrix over the full dataset.
pub fn calculate_correlations<S: AsRef<str>>(
    dataset: &Dataset,
    columns: &[S],
) -> Result<CorrelationMatrix> {
    CorrelationEngine::new(None).calculate(dataset, columns)
}
