use indexmap::IndexMap;
use tracing::debug;

use crate::config::QualityThresholds;
use crate::types::{
    ColumnProfile, ColumnType, DatasetOverview, IssueKind, QualityIssue, Severity,
};
use crate::utils::round2;

/// Turns column profiles and the dataset overview into a ranked issue list.
#[derive(Debug, Clone, Default)]
pub struct DataQualityAnalyzer {
    thresholds: QualityThresholds,
}

impl DataQualityAnalyzer {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    /// Evaluate every rule and return the issues sorted by severity.
    ///
    /// Column rules run per column in column order, then the dataset-level
    /// duplicate rule. The sort is stable, so issues of equal severity keep
    /// that discovery order.
    pub fn identify_issues(
        &self,
        columns: &IndexMap<String, ColumnProfile>,
        overview: &DatasetOverview,
    ) -> Vec<QualityIssue> {
        let mut issues = Vec::new();

        for profile in columns.values() {
            issues.extend(self.analyze_missing_values(profile));
            issues.extend(self.analyze_unusual_pattern(profile));
            issues.extend(self.analyze_outliers(profile));
            issues.extend(self.analyze_type_mismatch(profile));
            issues.extend(self.analyze_inconsistent_format(profile));
        }
        issues.extend(self.analyze_duplicates(overview));

        issues.sort_by_key(|issue| std::cmp::Reverse(issue.severity.rank()));

        debug!("Identified {} data quality issues", issues.len());
        issues
    }

    fn analyze_missing_values(&self, profile: &ColumnProfile) -> Option<QualityIssue> {
        let severity = if profile.missing_pct > self.thresholds.missing_high_pct {
            Severity::High
        } else if profile.missing_pct > self.thresholds.missing_medium_pct {
            Severity::Medium
        } else {
            return None;
        };

        let suggestion = match (severity, profile.column_type) {
            (Severity::High, _) => {
                "Consider dropping the column, or collect more complete data before relying on it"
            }
            (_, ColumnType::Number) => "Impute missing values with the median or mean",
            _ => "Impute missing values with the most frequent value or a placeholder category",
        };

        Some(QualityIssue {
            kind: IssueKind::MissingValues,
            severity,
            column: Some(profile.name.clone()),
            description: format!(
                "Column '{}' is missing {} of {} values ({}%)",
                profile.name, profile.missing, profile.count, profile.missing_pct
            ),
            affected_count: profile.missing,
            suggestion: suggestion.to_string(),
        })
    }

    fn analyze_unusual_pattern(&self, profile: &ColumnProfile) -> Option<QualityIssue> {
        if profile.column_type != ColumnType::Number
            || profile.non_missing == 0
            || profile.unique_pct >= self.thresholds.low_unique_pct
        {
            return None;
        }

        Some(QualityIssue {
            kind: IssueKind::UnusualPattern,
            severity: Severity::Medium,
            column: Some(profile.name.clone()),
            description: format!(
                "Numeric column '{}' has only {} distinct values ({}% unique)",
                profile.name, profile.unique, profile.unique_pct
            ),
            affected_count: profile.non_missing,
            suggestion: "Check whether the column is really categorical or a code, and treat it as such"
                .to_string(),
        })
    }

    fn analyze_outliers(&self, profile: &ColumnProfile) -> Option<QualityIssue> {
        let numeric = profile.numeric.as_ref()?;
        let checked = profile.non_missing.saturating_sub(profile.invalid_count);
        if checked == 0 || numeric.outliers.is_empty() {
            return None;
        }

        let outlier_pct = numeric.outliers.len() as f64 / checked as f64 * 100.0;
        let severity = if outlier_pct > self.thresholds.outlier_high_pct {
            Severity::High
        } else if outlier_pct > self.thresholds.outlier_medium_pct {
            Severity::Medium
        } else {
            return None;
        };

        let range = numeric
            .outlier_bounds
            .map(|b| format!(" outside {:.2} to {:.2}", b.lower, b.upper))
            .unwrap_or_default();

        Some(QualityIssue {
            kind: IssueKind::Outliers,
            severity,
            column: Some(profile.name.clone()),
            description: format!(
                "Column '{}' has {} outliers{} ({}% of numeric values)",
                profile.name,
                numeric.outliers.len(),
                range,
                round2(outlier_pct)
            ),
            affected_count: numeric.outliers.len(),
            suggestion: "Verify the extreme values; cap them at the bounds or remove them if they are errors"
                .to_string(),
        })
    }

    fn analyze_type_mismatch(&self, profile: &ColumnProfile) -> Option<QualityIssue> {
        if !profile.column_type.is_typed()
            || profile.invalid_count == 0
            || profile.non_missing == 0
        {
            return None;
        }

        let invalid_pct = profile.invalid_count as f64 / profile.non_missing as f64 * 100.0;
        let severity = if invalid_pct > self.thresholds.type_mismatch_medium_pct {
            Severity::Medium
        } else {
            Severity::Low
        };

        Some(QualityIssue {
            kind: IssueKind::TypeMismatch,
            severity,
            column: Some(profile.name.clone()),
            description: format!(
                "Column '{}' is typed {} but {} values ({}%) do not parse as {}",
                profile.name,
                profile.column_type,
                profile.invalid_count,
                round2(invalid_pct),
                profile.column_type
            ),
            affected_count: profile.invalid_count,
            suggestion: format!(
                "Convert or clear the values that are not valid {} entries",
                profile.column_type
            ),
        })
    }

    fn analyze_inconsistent_format(&self, profile: &ColumnProfile) -> Option<QualityIssue> {
        if profile.column_type != ColumnType::String || profile.anomalies.is_empty() {
            return None;
        }

        let affected: usize = profile.anomalies.iter().map(|a| a.count).sum();
        Some(QualityIssue {
            kind: IssueKind::InconsistentFormat,
            severity: Severity::Low,
            column: Some(profile.name.clone()),
            description: format!(
                "Column '{}' has {} values with unusual length",
                profile.name, affected
            ),
            affected_count: affected,
            suggestion: "Standardize the format, e.g. trim whitespace or split combined fields"
                .to_string(),
        })
    }

    fn analyze_duplicates(&self, overview: &DatasetOverview) -> Option<QualityIssue> {
        if overview.duplicate_row_count == 0 {
            return None;
        }

        let severity = if overview.duplicate_row_pct > self.thresholds.duplicate_high_pct {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(QualityIssue {
            kind: IssueKind::Duplicates,
            severity,
            column: None,
            description: format!(
                "{} of {} rows are exact duplicates ({}%)",
                overview.duplicate_row_count, overview.total_rows, overview.duplicate_row_pct
            ),
            affected_count: overview.duplicate_row_count,
            suggestion: "Remove duplicate rows unless repeated records are expected".to_string(),
        })
    }
}
