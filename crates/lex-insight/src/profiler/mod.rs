//! Data profiling module for dataset analysis.
//!
//! This module provides functionality for profiling datasets, including:
//! - Type inference for columns
//! - Descriptive statistics per column
//! - Pattern and length-anomaly detection for string columns
//! - Assembly of the full [`DataProfile`] (correlations and quality issues)

pub(crate) mod patterns;
pub(crate) mod statistics;
pub(crate) mod type_inference;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::config::ProfilerConfig;
use crate::correlation::CorrelationEngine;
use crate::dataset::{Dataset, Value};
use crate::error::{InsightError, Result};
use crate::outliers::OutlierDetector;
use crate::quality::DataQualityAnalyzer;
use crate::session::{
    ClosureProgressReporter, GenerationToken, ProfilingStage, ProgressReporter, ProgressUpdate,
};
use crate::types::{
    ColumnFailure, ColumnProfile, ColumnType, DataProfile, DatasetOverview, Metric,
    NumericSummary, OutlierMethod, TextSummary, TopValue,
};
use crate::utils::{percentage, round2};

pub use type_inference::{infer_column_type, infer_column_types, parse_date_string};

use statistics::{FrequencyTable, describe};
use type_inference::value_matches_type;

/// Data profiler for analyzing dataset structure and statistics.
///
/// A profile is always computed wholesale from one immutable snapshot.
pub struct DataProfiler {
    config: ProfilerConfig,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl DataProfiler {
    pub fn new(config: ProfilerConfig) -> Self {
        Self {
            config,
            reporter: None,
        }
    }

    /// Send progress updates to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Send progress updates to a closure.
    pub fn on_progress<F>(self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.with_reporter(Arc::new(ClosureProgressReporter::new(callback)))
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    fn report(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.reporter {
            reporter.report(update);
        }
    }

    /// Profile a dataset.
    ///
    /// Columns missing from `column_types` get an inferred type. A requested
    /// column that the dataset does not have is recorded in
    /// `failed_columns`; the remaining columns are still profiled.
    pub fn generate_profile(
        &self,
        dataset: &Dataset,
        column_types: &IndexMap<String, ColumnType>,
    ) -> Result<DataProfile> {
        self.generate_with(dataset, column_types, &GenerationToken::detached(0))
    }

    /// Profile a dataset snapshot, giving up with `Superseded` as soon as
    /// `token` goes stale.
    pub fn generate_with(
        &self,
        dataset: &Dataset,
        column_types: &IndexMap<String, ColumnType>,
        token: &GenerationToken,
    ) -> Result<DataProfile> {
        info!(
            "Profiling dataset with {} rows and {} columns (generation {})",
            dataset.len(),
            dataset.column_count(),
            token.generation()
        );

        self.report(ProgressUpdate::new(
            ProfilingStage::InferringTypes,
            0.0,
            "Resolving column types",
        ));
        let mut failed_columns = Vec::new();
        let mut resolved: Vec<(String, ColumnType)> = Vec::with_capacity(dataset.column_count());
        for name in &dataset.columns {
            let column_type = match column_types.get(name) {
                Some(ty) => *ty,
                None => infer_column_type(dataset.column_values(name), self.config.type_sample_rows),
            };
            resolved.push((name.clone(), column_type));
        }
        for name in column_types.keys().filter(|name| !dataset.has_column(name)) {
            let error = InsightError::ColumnNotFound(name.clone());
            warn!("Skipping column '{}': {}", name, error);
            failed_columns.push(ColumnFailure {
                column: name.clone(),
                reason: error.to_string(),
            });
        }
        self.checkpoint(token)?;

        let total = resolved.len();
        let mut columns = IndexMap::with_capacity(total);
        for (idx, (name, column_type)) in resolved.into_iter().enumerate() {
            self.report(ProgressUpdate::with_items(
                ProfilingStage::ProfilingColumns,
                name.clone(),
                idx,
                total,
                format!("Profiling column '{name}'"),
            ));

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                self.profile_column(dataset, &name, column_type)
            }))
            .unwrap_or_else(|_| {
                Err(InsightError::ProfilingFailed(format!(
                    "panic while profiling column '{name}'"
                )))
            });

            match outcome {
                Ok(profile) => {
                    columns.insert(name, profile);
                }
                Err(e) => {
                    warn!("Skipping column '{}': {}", name, e);
                    failed_columns.push(ColumnFailure {
                        column: name,
                        reason: e.to_string(),
                    });
                }
            }
            self.checkpoint(token)?;
        }

        self.report(ProgressUpdate::new(
            ProfilingStage::Correlations,
            0.0,
            "Computing correlations",
        ));
        let numeric_columns: Vec<&str> = columns
            .values()
            .filter(|p: &&ColumnProfile| p.column_type == ColumnType::Number)
            .map(|p| p.name.as_str())
            .collect();
        let correlations = CorrelationEngine::new(self.config.correlation_sample_rows)
            .calculate(dataset, &numeric_columns)?;
        self.checkpoint(token)?;

        self.report(ProgressUpdate::new(
            ProfilingStage::QualityAnalysis,
            0.0,
            "Analyzing data quality",
        ));
        let overview = self.overview(dataset);
        let issues =
            DataQualityAnalyzer::new(self.config.quality.clone()).identify_issues(&columns, &overview);
        self.checkpoint(token)?;

        info!(
            "Profile complete: {} columns, {} issues, {} failed columns",
            columns.len(),
            issues.len(),
            failed_columns.len()
        );
        self.report(ProgressUpdate::complete("Profile complete"));

        Ok(DataProfile {
            overview,
            columns,
            issues,
            correlations,
            failed_columns,
            generation: token.generation(),
            generated_at: Utc::now(),
        })
    }

    fn checkpoint(&self, token: &GenerationToken) -> Result<()> {
        token.check().inspect_err(|_| {
            debug!("Generation {} superseded, abandoning profile", token.generation());
            self.report(ProgressUpdate::superseded(token.generation()));
        })
    }

    /// Compute the profile of a single column.
    pub fn profile_column(
        &self,
        dataset: &Dataset,
        name: &str,
        column_type: ColumnType,
    ) -> Result<ColumnProfile> {
        dataset.require_column(name)?;

        let count = dataset.len();
        let present: Vec<&Value> = dataset
            .column_values(name)
            .flatten()
            .filter(|v| !v.is_missing())
            .collect();
        let non_missing = present.len();
        let missing = count - non_missing;

        let frequencies = FrequencyTable::from_values(present.iter().copied());
        let unique = frequencies.unique();
        let top_values = frequencies
            .top(self.config.top_values_limit)
            .into_iter()
            .map(|(value, n)| TopValue {
                value: value.clone(),
                count: n,
                pct: percentage(n, count),
            })
            .collect();

        let invalid_count = present
            .iter()
            .filter(|v| !value_matches_type(v, column_type))
            .count();

        let mut profile = ColumnProfile {
            name: name.to_string(),
            column_type,
            count,
            non_missing,
            missing,
            missing_pct: percentage(missing, count),
            unique,
            unique_pct: percentage(unique, count),
            duplicates: non_missing - unique,
            invalid_count,
            mode: frequencies.mode().cloned(),
            top_values,
            numeric: None,
            text: None,
            patterns: Vec::new(),
            anomalies: Vec::new(),
        };

        match column_type {
            ColumnType::Number => {
                profile.numeric = Some(self.numeric_summary(dataset, name)?);
            }
            ColumnType::String => {
                let texts: Vec<String> = present.iter().map(|v| v.key()).collect();
                let lengths: Vec<usize> = texts.iter().map(|t| t.chars().count()).collect();
                profile.text = Some(text_summary(&lengths));
                profile.patterns = patterns::detect_patterns(texts.iter().map(String::as_str));
                profile.anomalies =
                    patterns::detect_length_anomalies(&lengths, self.config.anomaly_length_factor);
            }
            ColumnType::Date | ColumnType::Boolean => {}
        }

        debug!(
            "Profiled column '{}' as {}: {} missing, {} unique",
            name, column_type, missing, unique
        );
        Ok(profile)
    }

    fn numeric_summary(&self, dataset: &Dataset, name: &str) -> Result<NumericSummary> {
        let cells = dataset.numeric_cells(name);
        let values: Vec<f64> = cells.iter().map(|(_, v)| *v).collect();
        let Some(stats) = describe(&values) else {
            return Ok(NumericSummary::not_computable());
        };

        let detector = OutlierDetector::new(OutlierMethod::Iqr, Some(self.config.iqr_multiplier))?;
        let (outlier_bounds, outliers) = detector.detect_in_values(&cells);

        Ok(NumericSummary {
            mean: Metric::new(stats.mean),
            median: Metric::new(stats.median),
            std: Metric::new(stats.std),
            min: Metric::new(stats.min),
            max: Metric::new(stats.max),
            q1: Metric::new(stats.q1),
            q3: Metric::new(stats.q3),
            skewness: Metric::new(stats.skewness),
            kurtosis: Metric::new(stats.kurtosis),
            outlier_bounds,
            outliers,
        })
    }

    /// Dataset-level summary.
    pub fn overview(&self, dataset: &Dataset) -> DatasetOverview {
        let total_rows = dataset.len();
        let total_columns = dataset.column_count();
        let duplicate_row_count = dataset.duplicate_row_count();
        let cells = total_rows * total_columns;
        let completeness_pct = if cells == 0 {
            100.0
        } else {
            percentage(cells - dataset.missing_cell_count(), cells)
        };

        DatasetOverview {
            total_rows,
            total_columns,
            memory_bytes: dataset.memory_estimate(),
            duplicate_row_count,
            duplicate_row_pct: percentage(duplicate_row_count, total_rows),
            completeness_pct,
        }
    }
}

impl Default for DataProfiler {
    fn default() -> Self {
        Self::new(ProfilerConfig::default())
    }
}

fn text_summary(lengths: &[usize]) -> TextSummary {
    if lengths.is_empty() {
        return TextSummary::not_computable();
    }
    let total: usize = lengths.iter().sum();
    TextSummary {
        avg_length: Metric::new(round2(total as f64 / lengths.len() as f64)),
        min_length: Metric::from_option(lengths.iter().min().map(|l| *l as f64)),
        max_length: Metric::from_option(lengths.iter().max().map(|l| *l as f64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Row;
    use crate::types::{IssueKind, PatternKind};
    use std::sync::Mutex;

    fn dataset(json: &str) -> Dataset {
        Dataset::from_json_str(json).unwrap()
    }

    #[test]
    fn test_numeric_column_profile() {
        let data = dataset(r#"[{"age": 20}, {"age": 30}, {"age": "40"}, {"age": null}, {"age": "n/a"}]"#);
        let profile = DataProfiler::default()
            .profile_column(&data, "age", ColumnType::Number)
            .unwrap();

        assert_eq!(profile.count, 5);
        assert_eq!(profile.missing, 1);
        assert_eq!(profile.missing_pct, 20.0);
        assert_eq!(profile.non_missing, 4);
        assert_eq!(profile.invalid_count, 1);
        let numeric = profile.numeric.unwrap();
        assert_eq!(numeric.mean, Metric::Value(30.0));
        assert_eq!(numeric.median, Metric::Value(30.0));
        assert_eq!(numeric.min, Metric::Value(20.0));
        assert_eq!(numeric.max, Metric::Value(40.0));
    }

    #[test]
    fn test_empty_column_is_not_computable() {
        let data = dataset(r#"[{"a": null, "b": ""}, {"a": null, "b": " "}]"#);
        let profiler = DataProfiler::default();

        let numeric = profiler.profile_column(&data, "a", ColumnType::Number).unwrap();
        assert_eq!(numeric.numeric, Some(NumericSummary::not_computable()));
        assert!(numeric.mode.is_none());
        assert!(numeric.top_values.is_empty());

        let text = profiler.profile_column(&data, "b", ColumnType::String).unwrap();
        assert_eq!(text.text, Some(TextSummary::not_computable()));
        assert_eq!(text.missing, 2);
    }

    #[test]
    fn test_constant_column() {
        let data = dataset(r#"[{"v": 5}, {"v": 5}, {"v": 5}, {"v": 5}]"#);
        let profile = DataProfiler::default()
            .profile_column(&data, "v", ColumnType::Number)
            .unwrap();
        let numeric = profile.numeric.unwrap();
        assert_eq!(numeric.std, Metric::Value(0.0));
        assert_eq!(numeric.skewness, Metric::Value(0.0));
        assert_eq!(numeric.kurtosis, Metric::Value(0.0));
        assert_eq!(profile.unique_pct, 25.0);
        assert_eq!(profile.duplicates, 3);
        assert!(numeric.outliers.is_empty());
    }

    #[test]
    fn test_string_column_profile() {
        let data = dataset(
            r#"[{"email": "a@b.co"}, {"email": "c@d.org"}, {"email": "a@b.co"}, {"email": "x"}]"#,
        );
        let profile = DataProfiler::default()
            .profile_column(&data, "email", ColumnType::String)
            .unwrap();

        assert_eq!(profile.mode, Some(Value::from("a@b.co")));
        assert_eq!(profile.top_values[0].count, 2);
        assert_eq!(profile.top_values[0].pct, 50.0);
        let text = profile.text.unwrap();
        assert_eq!(text.min_length, Metric::Value(1.0));
        assert_eq!(text.max_length, Metric::Value(7.0));
        assert_eq!(profile.patterns[0].kind, PatternKind::Email);
        assert_eq!(profile.patterns[0].count, 3);
    }

    #[test]
    fn test_generate_profile_infers_missing_types() {
        let data = dataset(
            r#"[
                {"id": 1, "name": "a", "joined": "2024-01-01", "active": true},
                {"id": 2, "name": "b", "joined": "2024-02-01", "active": false}
            ]"#,
        );
        let profile = DataProfiler::default()
            .generate_profile(&data, &IndexMap::new())
            .unwrap();

        let types: Vec<ColumnType> = profile.columns.values().map(|p| p.column_type).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Number,
                ColumnType::String,
                ColumnType::Date,
                ColumnType::Boolean
            ]
        );
        assert_eq!(profile.correlations.columns, vec!["id"]);
        assert_eq!(profile.overview.total_columns, 4);
        assert_eq!(profile.overview.completeness_pct, 100.0);
    }

    #[test]
    fn test_unknown_requested_column_is_skipped() {
        let data = dataset(r#"[{"a": 1}, {"a": 2}]"#);
        let mut types = IndexMap::new();
        types.insert("a".to_string(), ColumnType::Number);
        types.insert("ghost".to_string(), ColumnType::String);

        let profile = DataProfiler::default().generate_profile(&data, &types).unwrap();
        assert_eq!(profile.columns.len(), 1);
        assert_eq!(profile.failed_columns.len(), 1);
        assert_eq!(profile.failed_columns[0].column, "ghost");
    }

    #[test]
    fn test_superseded_generation_is_discarded() {
        let data = dataset(r#"[{"a": 1}, {"a": 2}]"#);
        let counter = crate::session::GenerationCounter::new();
        let token = counter.token();
        counter.advance();

        let err = DataProfiler::default()
            .generate_with(&data, &IndexMap::new(), &token)
            .unwrap_err();
        assert!(err.is_superseded());
    }

    #[test]
    fn test_progress_is_reported() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stages);
        let data = dataset(r#"[{"a": 1, "b": "x"}]"#);

        DataProfiler::default()
            .on_progress(move |update| sink.lock().unwrap().push(update.stage))
            .generate_profile(&data, &IndexMap::new())
            .unwrap();

        let stages = stages.lock().unwrap();
        assert_eq!(stages.first(), Some(&ProfilingStage::InferringTypes));
        assert_eq!(stages.last(), Some(&ProfilingStage::Complete));
        let per_column = stages
            .iter()
            .filter(|s| **s == ProfilingStage::ProfilingColumns)
            .count();
        assert_eq!(per_column, 2);
    }

    #[test]
    fn test_overview_duplicates() {
        let rows = vec![
            Row::from([("a".to_string(), Value::from(1.0))]),
            Row::from([("a".to_string(), Value::from(1.0))]),
            Row::from([("a".to_string(), Value::Null)]),
        ];
        let data = Dataset::from_rows(rows);
        let profile = DataProfiler::default()
            .generate_profile(&data, &IndexMap::new())
            .unwrap();
        assert_eq!(profile.overview.duplicate_row_count, 1);
        assert_eq!(profile.overview.duplicate_row_pct, 33.33);
        assert_eq!(profile.overview.completeness_pct, 66.67);
        assert!(profile.issues.iter().any(|i| i.kind == IssueKind::Duplicates));
    }
}
