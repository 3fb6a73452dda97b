//! Statistical Profiling and Sandboxed Scripting Library
//!
//! An in-process engine that turns a tabular dataset into a statistical
//! profile and lets users run small scripts against it.
//!
//! # Overview
//!
//! - **Type Inference**: Classifies each column as number, date, boolean or string
//! - **Column Profiling**: Missing/unique counts, descriptive statistics, top values,
//!   pattern tags and length anomalies
//! - **Correlation**: Pearson matrix over numeric columns, optionally sampled
//! - **Outliers**: IQR and Z-score detection
//! - **Quality Issues**: Rule-based issues with severities
//! - **Sandbox**: A bounded, read-only script evaluator with dataset primitives
//! - **Session**: Snapshot ownership with generation-based cancellation
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lex_insight::{Dataset, generate_profile, run_sandbox_script};
//! use indexmap::IndexMap;
//!
//! let dataset = Dataset::from_json_str(r#"[{"price": 10}, {"price": 20}]"#)?;
//!
//! let profile = generate_profile(&dataset, &IndexMap::new())?;
//! println!("Completeness: {}%", profile.overview.completeness_pct);
//!
//! let outcome = run_sandbox_script(&dataset, &dataset.columns, "aggregate('price', 'mean')");
//! assert_eq!(outcome.result, Some(serde_json::json!(15)));
//! ```
//!
//! # Sessions and Cancellation
//!
//! A [`ProfileSession`] holds the current dataset snapshot. Replacing the
//! dataset advances its generation; a profile computed from an older
//! generation is abandoned with [`InsightError::Superseded`] instead of being
//! applied.
//!
//! ```rust,ignore
//! use lex_insight::ProfileSession;
//! use std::sync::Arc;
//!
//! let session = Arc::new(ProfileSession::default());
//! session.replace_dataset(dataset, None);
//!
//! let handle = session.profile_in_background()?;
//! session.replace_dataset(newer_dataset, None); // the background run is now stale
//!
//! match handle.join() {
//!     Ok(Err(e)) if e.is_superseded() => println!("Discarded stale profile"),
//!     Ok(result) => println!("Profile: {:?}", result.map(|p| p.generation)),
//!     Err(_) => println!("Profiling thread panicked"),
//! }
//! ```

pub mod config;
pub mod correlation;
pub mod dataset;
pub mod error;
pub mod outliers;
pub mod profiler;
pub mod quality;
pub mod sandbox;
pub mod session;
pub mod types;
pub mod utils;

use indexmap::IndexMap;

// Re-exports for convenient access
pub use config::{
    ConfigValidationError, ProfilerConfig, ProfilerConfigBuilder, QualityThresholds,
    SandboxConfig, SandboxConfigBuilder,
};
pub use correlation::{CorrelationEngine, calculate_correlations};
pub use dataset::{Dataset, Row, Value, read_csv};
pub use error::{InsightError, Result as InsightResult, ResultExt};
pub use outliers::{OutlierDetector, detect_outliers};
pub use profiler::{DataProfiler, infer_column_type, infer_column_types};
pub use quality::DataQualityAnalyzer;
pub use sandbox::{AggregateOp, Sandbox, SandboxError, ScriptOutcome, run_sandbox_script};
pub use session::{
    ClosureProgressReporter, DatasetSnapshot, GenerationCounter, GenerationToken,
    ProfileSession, ProfilingStage, ProgressReporter, ProgressUpdate,
};
pub use types::{
    ColumnOutliers, ColumnProfile, ColumnType, CorrelationMatrix, DataProfile, DatasetOverview,
    IssueKind, Metric, OutlierMethod, QualityIssue, Severity,
};

/// Profile a dataset with the default configuration.
///
/// Columns missing from `column_types` get an inferred type.
pub fn generate_profile(
    dataset: &Dataset,
    column_types: &IndexMap<String, ColumnType>,
) -> error::Result<DataProfile> {
    DataProfiler::default().generate_profile(dataset, column_types)
}
