//! Session state: the current dataset snapshot and its profile.
//!
//! A [`ProfileSession`] is the single owner of "what is loaded right now".
//! Readers take cheap `Arc` snapshots; every mutation installs a new snapshot
//! and advances the generation counter, which invalidates any profile still
//! being computed from the old one.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ ProfileSession                                               │
//! │   snapshot: RwLock<Option<DatasetSnapshot>>  (Arc<Dataset>)  │
//! │   profile:  RwLock<Option<Arc<DataProfile>>> (per generation)│
//! │   generations: GenerationCounter             (cancellation)  │
//! │   sandbox: Sandbox                           (one at a time) │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod generation;
mod progress;

use std::sync::Arc;
use std::thread::JoinHandle;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::{ProfilerConfig, SandboxConfig};
use crate::correlation::CorrelationEngine;
use crate::dataset::Dataset;
use crate::error::{InsightError, Result};
use crate::outliers::detect_outliers;
use crate::profiler::{DataProfiler, infer_column_types};
use crate::sandbox::{Sandbox, ScriptOutcome};
use crate::types::{ColumnOutliers, ColumnType, CorrelationMatrix, DataProfile, OutlierMethod};

pub use generation::{GenerationCounter, GenerationToken};
pub use progress::{ClosureProgressReporter, ProfilingStage, ProgressReporter, ProgressUpdate};

/// An immutable view of the loaded dataset at one generation.
#[derive(Debug, Clone)]
pub struct DatasetSnapshot {
    dataset: Arc<Dataset>,
    column_types: Arc<IndexMap<String, ColumnType>>,
    generation: u64,
}

impl DatasetSnapshot {
    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn column_types(&self) -> &IndexMap<String, ColumnType> {
        &self.column_types
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Thread-safe holder of the current dataset and its profile.
pub struct ProfileSession {
    snapshot: RwLock<Option<DatasetSnapshot>>,
    profile: RwLock<Option<Arc<DataProfile>>>,
    generations: GenerationCounter,
    config: ProfilerConfig,
    reporter: Option<Arc<dyn ProgressReporter>>,
    sandbox: Sandbox,
}

impl ProfileSession {
    pub fn new(config: ProfilerConfig, sandbox: SandboxConfig) -> Self {
        Self {
            snapshot: RwLock::new(None),
            profile: RwLock::new(None),
            generations: GenerationCounter::new(),
            config,
            reporter: None,
            sandbox: Sandbox::new(sandbox),
        }
    }

    /// Report progress of every profile this session computes.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Current generation. Starts at 0 and advances on every mutation.
    pub fn generation(&self) -> u64 {
        self.generations.current()
    }

    pub fn has_data(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// Install a new dataset, discarding the previous profile.
    ///
    /// Columns without an entry in `column_types` get an inferred type.
    /// Returns the new generation.
    pub fn replace_dataset(
        &self,
        dataset: Dataset,
        column_types: Option<IndexMap<String, ColumnType>>,
    ) -> u64 {
        let mut types = infer_column_types(&dataset, self.config.type_sample_rows);
        if let Some(given) = column_types {
            for (name, ty) in given {
                if let Some(slot) = types.get_mut(&name) {
                    *slot = ty;
                }
            }
        }

        let mut snapshot = self.snapshot.write();
        let generation = self.generations.advance();
        *self.profile.write() = None;
        info!(
            "Loaded dataset with {} rows and {} columns (generation {})",
            dataset.len(),
            dataset.column_count(),
            generation
        );
        *snapshot = Some(DatasetSnapshot {
            dataset: Arc::new(dataset),
            column_types: Arc::new(types),
            generation,
        });
        generation
    }

    /// Drop the dataset and its profile.
    pub fn reset(&self) {
        let mut snapshot = self.snapshot.write();
        let generation = self.generations.advance();
        *self.profile.write() = None;
        *snapshot = None;
        info!("Session reset (generation {})", generation);
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Result<DatasetSnapshot> {
        self.snapshot.read().clone().ok_or(InsightError::NoDataLoaded)
    }

    /// Snapshot plus a token for its generation, taken atomically.
    fn snapshot_with_token(&self) -> Result<(DatasetSnapshot, GenerationToken)> {
        let guard = self.snapshot.read();
        let snapshot = guard.clone().ok_or(InsightError::NoDataLoaded)?;
        Ok((snapshot, self.generations.token()))
    }

    /// The profile of the current generation, if one has been applied.
    pub fn cached_profile(&self) -> Option<Arc<DataProfile>> {
        self.profile
            .read()
            .as_ref()
            .filter(|profile| profile.generation == self.generations.current())
            .cloned()
    }

    /// The profile of the current snapshot, computing it on first use.
    ///
    /// Fails with [`InsightError::Superseded`] if the dataset was replaced
    /// while the profile was being computed; the stale result is dropped.
    pub fn profile(&self) -> Result<Arc<DataProfile>> {
        if let Some(profile) = self.cached_profile() {
            debug!("Using cached profile for generation {}", profile.generation);
            return Ok(profile);
        }

        let (snapshot, token) = self.snapshot_with_token()?;
        let mut profiler = DataProfiler::new(self.config.clone());
        if let Some(reporter) = &self.reporter {
            profiler = profiler.with_reporter(Arc::clone(reporter));
        }
        let profile = profiler.generate_with(&snapshot.dataset, &snapshot.column_types, &token)?;
        self.commit_profile(profile)
    }

    /// Apply a computed profile. Refuses profiles of an older generation.
    pub fn commit_profile(&self, profile: DataProfile) -> Result<Arc<DataProfile>> {
        let mut slot = self.profile.write();
        let current = self.generations.current();
        if profile.generation != current {
            debug!(
                "Discarding profile of generation {} (current {})",
                profile.generation, current
            );
            return Err(InsightError::Superseded {
                generation: profile.generation,
                current,
            });
        }
        let profile = Arc::new(profile);
        *slot = Some(Arc::clone(&profile));
        Ok(profile)
    }

    /// Compute the profile on a background thread.
    pub fn profile_in_background(self: &Arc<Self>) -> Result<JoinHandle<Result<Arc<DataProfile>>>> {
        let session = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("lex-insight-profile".to_string())
            .spawn(move || session.profile())?;
        Ok(handle)
    }

    /// Run a script against the current snapshot.
    pub fn run_script(&self, source: &str) -> Result<ScriptOutcome> {
        let snapshot = self.snapshot()?;
        let dataset = &snapshot.dataset;
        Ok(self.sandbox.run(dataset, &dataset.columns, source))
    }

    pub fn detect_outliers<S: AsRef<str>>(
        &self,
        columns: &[S],
        method: OutlierMethod,
        k: Option<f64>,
    ) -> Result<Vec<ColumnOutliers>> {
        let snapshot = self.snapshot()?;
        detect_outliers(&snapshot.dataset, columns, method, k)
    }

    pub fn calculate_correlations<S: AsRef<str>>(&self, columns: &[S]) -> Result<CorrelationMatrix> {
        let snapshot = self.snapshot()?;
        CorrelationEngine::new(self.config.correlation_sample_rows)
            .calculate(&snapshot.dataset, columns)
    }
}

impl Default for ProfileSession {
    fn default() -> Self {
        Self::new(ProfilerConfig::default(), SandboxConfig::default())
    }
}

static_assertions::assert_impl_all!(ProfileSession: Send, Sync);
static_assertions::assert_impl_all!(DatasetSnapshot: Send, Sync);
