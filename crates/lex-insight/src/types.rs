//! Output types produced by the profiling engine.
//!
//! Every type here is serializable so a host UI can render it directly.
//! Numeric statistics use [`Metric`] so that "not enough data" is an explicit
//! value rather than a NaN or an error.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::dataset::Value;
use crate::error::InsightError;

// ============================================================================
// Column types
// ============================================================================

/// Semantic type of a column, resolved once by the type inferencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    String,
    Date,
    Boolean,
}

impl ColumnType {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Date => "date",
            Self::Boolean => "boolean",
        }
    }

    /// Whether values of this type are checked for conformance.
    pub fn is_typed(&self) -> bool {
        !matches!(self, Self::String)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "number" | "numeric" => Ok(Self::Number),
            "string" | "text" => Ok(Self::String),
            "date" | "datetime" => Ok(Self::Date),
            "boolean" | "bool" => Ok(Self::Boolean),
            other => Err(InsightError::UnsupportedOperation {
                operation: other.to_string(),
                expected: "number, string, date, boolean".to_string(),
            }),
        }
    }
}

// ============================================================================
// Metric sentinel
// ============================================================================

/// A statistic that may not be computable for the available data.
///
/// Serializes as a plain number, or as the string `"not computable"`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Metric {
    Value(f64),
    #[default]
    NotComputable,
}

impl Metric {
    /// Sentinel text used in serialized output.
    pub const NOT_COMPUTABLE: &'static str = "not computable";

    /// Wrap a value, mapping non-finite results to `NotComputable`.
    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Self::Value(value)
        } else {
            Self::NotComputable
        }
    }

    /// Wrap an optional value.
    pub fn from_option(value: Option<f64>) -> Self {
        value.map_or(Self::NotComputable, Self::new)
    }

    /// The inner value, if computable.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::NotComputable => None,
        }
    }
}

impl From<f64> for Metric {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v:.4}"),
            Self::NotComputable => f.write_str(Self::NOT_COMPUTABLE),
        }
    }
}

impl Serialize for Metric {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Value(v) => serializer.serialize_f64(*v),
            Self::NotComputable => serializer.serialize_str(Self::NOT_COMPUTABLE),
        }
    }
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MetricVisitor;

        impl Visitor<'_> for MetricVisitor {
            type Value = Metric;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a number or \"{}\"", Metric::NOT_COMPUTABLE)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Metric, E> {
                Ok(Metric::new(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Metric, E> {
                Ok(Metric::new(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Metric, E> {
                Ok(Metric::new(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Metric, E> {
                if v == Metric::NOT_COMPUTABLE {
                    Ok(Metric::NotComputable)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }

            fn visit_unit<E: de::Error>(self) -> Result<Metric, E> {
                Ok(Metric::NotComputable)
            }
        }

        deserializer.deserialize_any(MetricVisitor)
    }
}

// ============================================================================
// Column profile
// ============================================================================

/// Statistics computed for numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub mean: Metric,
    pub median: Metric,
    /// Population standard deviation (divides by N).
    pub std: Metric,
    pub min: Metric,
    pub max: Metric,
    pub q1: Metric,
    pub q3: Metric,
    pub skewness: Metric,
    /// Excess kurtosis (fourth standardized moment minus 3).
    pub kurtosis: Metric,
    /// IQR bounds used for `outliers`, absent when nothing was computable.
    pub outlier_bounds: Option<OutlierBounds>,
    pub outliers: Vec<OutlierPoint>,
}

impl NumericSummary {
    /// Summary for a column without a single numeric value.
    pub fn not_computable() -> Self {
        Self {
            mean: Metric::NotComputable,
            median: Metric::NotComputable,
            std: Metric::NotComputable,
            min: Metric::NotComputable,
            max: Metric::NotComputable,
            q1: Metric::NotComputable,
            q3: Metric::NotComputable,
            skewness: Metric::NotComputable,
            kurtosis: Metric::NotComputable,
            outlier_bounds: None,
            outliers: Vec::new(),
        }
    }
}

/// Length statistics for string columns, over the string form of each value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSummary {
    pub avg_length: Metric,
    pub min_length: Metric,
    pub max_length: Metric,
}

impl TextSummary {
    pub fn not_computable() -> Self {
        Self {
            avg_length: Metric::NotComputable,
            min_length: Metric::NotComputable,
            max_length: Metric::NotComputable,
        }
    }
}

/// One entry of a column's frequency table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopValue {
    pub value: Value,
    pub count: usize,
    /// Share of the total row count, rounded to 2 decimals.
    pub pct: f64,
}

/// Advisory string shape detected in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Email,
    Phone,
    Url,
    Date,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Url => "url",
            Self::Date => "date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    TooLong,
    TooShort,
}

/// Values whose length is far from the column average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthAnomaly {
    pub kind: AnomalyKind,
    pub count: usize,
    /// Length bound the flagged values crossed.
    pub threshold: f64,
}

/// Statistical summary of one dataset column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub column_type: ColumnType,
    /// Total number of rows.
    pub count: usize,
    pub non_missing: usize,
    pub missing: usize,
    pub missing_pct: f64,
    /// Distinct non-missing values.
    pub unique: usize,
    pub unique_pct: f64,
    /// Non-missing values that repeat an earlier value.
    pub duplicates: usize,
    /// Non-missing values that do not fit `column_type`.
    pub invalid_count: usize,
    pub mode: Option<Value>,
    pub top_values: Vec<TopValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextSummary>,
    pub patterns: Vec<PatternMatch>,
    pub anomalies: Vec<LengthAnomaly>,
}

impl ColumnProfile {
    /// Number of IQR outliers flagged by the profiler.
    pub fn outlier_count(&self) -> usize {
        self.numeric.as_ref().map_or(0, |n| n.outliers.len())
    }
}

// ============================================================================
// Dataset overview and correlations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetOverview {
    pub total_rows: usize,
    pub total_columns: usize,
    /// Rough in-memory size of the cell values.
    pub memory_bytes: usize,
    pub duplicate_row_count: usize,
    pub duplicate_row_pct: f64,
    /// Share of non-missing cells, rounded to 2 decimals.
    pub completeness_pct: f64,
}

/// Pearson correlation matrix over numeric columns.
///
/// `rows_used` reports how many leading rows were read; `sampled` is true
/// when that is fewer than `total_rows`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub matrix: IndexMap<String, IndexMap<String, f64>>,
    pub rows_used: usize,
    pub total_rows: usize,
    pub sampled: bool,
}

impl CorrelationMatrix {
    /// Coefficient for a column pair.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        self.matrix.get(a).and_then(|row| row.get(b)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ============================================================================
// Quality issues
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingValues,
    Duplicates,
    Outliers,
    InconsistentFormat,
    TypeMismatch,
    UnusualPattern,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingValues => "missing_values",
            Self::Duplicates => "duplicates",
            Self::Outliers => "outliers",
            Self::InconsistentFormat => "inconsistent_format",
            Self::TypeMismatch => "type_mismatch",
            Self::UnusualPattern => "unusual_pattern",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Sort rank: high = 3, medium = 2, low = 1.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A data defect with a suggested remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    /// `None` for dataset-level issues.
    pub column: Option<String>,
    pub description: String,
    pub affected_count: usize,
    pub suggestion: String,
}

// ============================================================================
// Profile report
// ============================================================================

/// A column that could not be profiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFailure {
    pub column: String,
    pub reason: String,
}

/// Aggregate profile of one dataset snapshot.
///
/// Always produced wholesale; a newer snapshot gets a new `DataProfile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProfile {
    pub overview: DatasetOverview,
    pub columns: IndexMap<String, ColumnProfile>,
    /// Sorted by severity, high first.
    pub issues: Vec<QualityIssue>,
    pub correlations: CorrelationMatrix,
    pub failed_columns: Vec<ColumnFailure>,
    /// Snapshot generation the profile was computed from.
    pub generation: u64,
    pub generated_at: DateTime<Utc>,
}

impl DataProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.get(name)
    }

    /// Issues reported for a single column.
    pub fn issues_for<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a QualityIssue> {
        self.issues
            .iter()
            .filter(move |issue| issue.column.as_deref() == Some(column))
    }
}

// ============================================================================
// Outliers
// ============================================================================

/// Outlier detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutlierMethod {
    #[serde(rename = "iqr")]
    Iqr,
    #[serde(rename = "zscore")]
    ZScore,
}

impl OutlierMethod {
    /// Default multiplier: 1.5 for IQR, 3 for z-score.
    pub fn default_k(&self) -> f64 {
        match self {
            Self::Iqr => 1.5,
            Self::ZScore => 3.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iqr => "iqr",
            Self::ZScore => "zscore",
        }
    }
}

impl fmt::Display for OutlierMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutlierMethod {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "iqr" => Ok(Self::Iqr),
            "zscore" | "z-score" | "z_score" => Ok(Self::ZScore),
            other => Err(InsightError::UnsupportedOperation {
                operation: other.to_string(),
                expected: "iqr, zscore".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierBounds {
    pub lower: f64,
    pub upper: f64,
}

impl OutlierBounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// A flagged value and the row it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierPoint {
    pub row: usize,
    pub value: f64,
}

/// Outlier detection result for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnOutliers {
    pub column: String,
    pub method: OutlierMethod,
    pub k: f64,
    /// `None` when the column has no numeric values.
    pub bounds: Option<OutlierBounds>,
    pub outliers: Vec<OutlierPoint>,
    pub values_checked: usize,
}

impl ColumnOutliers {
    pub fn count(&self) -> usize {
        self.outliers.len()
    }
}
