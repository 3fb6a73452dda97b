//! Progress reporting for profile generation.
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_insight::{DataProfiler, ProfilerConfig};
//!
//! let profile = DataProfiler::new(ProfilerConfig::default())
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .generate_profile(&dataset, &column_types)?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of profile generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfilingStage {
    /// Inferring types of columns without a supplied type
    InferringTypes,
    /// Computing per-column statistics
    ProfilingColumns,
    /// Computing the correlation matrix
    Correlations,
    /// Synthesizing quality issues
    QualityAnalysis,
    /// Profile generated
    Complete,
    /// The snapshot changed before the profile finished
    Superseded,
    /// Profile generation failed
    Failed,
}

impl ProfilingStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::InferringTypes => "Inferring Types",
            Self::ProfilingColumns => "Profiling Columns",
            Self::Correlations => "Computing Correlations",
            Self::QualityAnalysis => "Analyzing Quality",
            Self::Complete => "Complete",
            Self::Superseded => "Superseded",
            Self::Failed => "Failed",
        }
    }

    /// Share of the overall work done in this stage (0.0 - 1.0).
    pub fn weight(&self) -> f32 {
        match self {
            Self::InferringTypes => 0.05,
            Self::ProfilingColumns => 0.65,
            Self::Correlations => 0.15,
            Self::QualityAnalysis => 0.15,
            Self::Complete | Self::Superseded | Self::Failed => 0.0,
        }
    }

    /// Cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::InferringTypes => 0.0,
            Self::ProfilingColumns => 0.05,
            Self::Correlations => 0.70,
            Self::QualityAnalysis => 0.85,
            Self::Complete => 1.0,
            Self::Superseded | Self::Failed => 0.0,
        }
    }
}

/// Progress of a running profile generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: ProfilingStage,

    /// Column currently being profiled, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    /// Creates a new progress update for a stage.
    pub fn new(stage: ProfilingStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let stage_progress = stage_progress.clamp(0.0, 1.0);
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            column: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress,
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a per-column progress update.
    pub fn with_items(
        stage: ProfilingStage,
        column: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            column: Some(column.into()),
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::new(stage, stage_progress, message)
        }
    }

    /// Creates a completion progress update.
    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(ProfilingStage::Complete, 1.0, message)
    }

    /// Creates an update for a run whose snapshot was replaced.
    pub fn superseded(generation: u64) -> Self {
        Self::new(
            ProfilingStage::Superseded,
            0.0,
            format!("Snapshot generation {generation} was superseded"),
        )
    }

    /// Creates a failed progress update.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ProfilingStage::Failed, 0.0, message)
    }
}

/// Trait for receiving progress updates during profiling.
///
/// Implementations must be `Send + Sync` so that profiling can run on a
/// background thread while updates go to the UI.
pub trait ProgressReporter: Send + Sync {
    /// Called once per stage and once per profiled column.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_progress_update_with_items() {
        let update = ProgressUpdate::with_items(
            ProfilingStage::ProfilingColumns,
            "age",
            5,
            10,
            "Profiling column age",
        );
        assert_eq!(update.column, Some("age".to_string()));
        assert_eq!(update.stage_progress, 0.5);
        assert!((update.progress - 0.375).abs() < 1e-6);
        assert_eq!(update.items_total, Some(10));
    }

    #[test]
    fn test_progress_update_complete() {
        let update = ProgressUpdate::complete("Done");
        assert_eq!(update.stage, ProfilingStage::Complete);
        assert_eq!(update.progress, 1.0);
    }

    #[test]
    fn test_stage_weights_sum() {
        let stages = [
            ProfilingStage::InferringTypes,
            ProfilingStage::ProfilingColumns,
            ProfilingStage::Correlations,
            ProfilingStage::QualityAnalysis,
        ];
        let total: f32 = stages.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 0.01, "Weights should sum to ~1.0");
    }

    #[test]
    fn test_stage_json_values() {
        let json = serde_json::to_string(&ProfilingStage::QualityAnalysis).unwrap();
        assert_eq!(json, "\"quality_analysis\"");
        let update = ProgressUpdate::superseded(4);
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"stage\":\"superseded\""));
        assert!(!json.contains("column"));
    }

    #[test]
    fn test_closure_progress_reporter_across_threads() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let reporter = Arc::new(ClosureProgressReporter::new(move |_update| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let reporter_clone = reporter.clone();
        std::thread::spawn(move || {
            reporter_clone.report(ProgressUpdate::failed("boom"));
        })
        .join()
        .expect("Thread should not panic");
        reporter.report(ProgressUpdate::complete("Done"));

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }
}
