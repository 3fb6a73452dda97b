//! Configuration types for the profiling engine and the script sandbox.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic setup.

use serde::{Deserialize, Serialize};

/// Thresholds used by the quality-issue synthesizer.
///
/// All values are percentages in the 0 - 100 range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Missing percentage above which a column gets a high-severity issue.
    /// Default: 50.0
    pub missing_high_pct: f64,

    /// Missing percentage above which a column gets a medium-severity issue.
    /// Default: 20.0
    pub missing_medium_pct: f64,

    /// Unique percentage below which a numeric column is flagged as unusual.
    /// Default: 10.0
    pub low_unique_pct: f64,

    /// Outlier percentage above which a column gets a high-severity issue.
    /// Default: 15.0
    pub outlier_high_pct: f64,

    /// Outlier percentage above which a column gets a medium-severity issue.
    /// Default: 5.0
    pub outlier_medium_pct: f64,

    /// Duplicate-row percentage above which the dataset gets a high-severity issue.
    /// Any duplicate at all yields a medium-severity issue.
    /// Default: 10.0
    pub duplicate_high_pct: f64,

    /// Invalid-value percentage above which a type mismatch is medium severity.
    /// Default: 10.0
    pub type_mismatch_medium_pct: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            missing_high_pct: 50.0,
            missing_medium_pct: 20.0,
            low_unique_pct: 10.0,
            outlier_high_pct: 15.0,
            outlier_medium_pct: 5.0,
            duplicate_high_pct: 10.0,
            type_mismatch_medium_pct: 10.0,
        }
    }
}

impl QualityThresholds {
    fn validate(&self) -> Result<(), ConfigValidationError> {
        let fields = [
            ("missing_high_pct", self.missing_high_pct),
            ("missing_medium_pct", self.missing_medium_pct),
            ("low_unique_pct", self.low_unique_pct),
            ("outlier_high_pct", self.outlier_high_pct),
            ("outlier_medium_pct", self.outlier_medium_pct),
            ("duplicate_high_pct", self.duplicate_high_pct),
            ("type_mismatch_medium_pct", self.type_mismatch_medium_pct),
        ];
        for (field, value) in fields {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigValidationError::InvalidPercentage {
                    field: field.to_string(),
                    value,
                });
            }
        }

        if self.missing_medium_pct > self.missing_high_pct {
            return Err(ConfigValidationError::InvertedThresholds {
                lower: "missing_medium_pct".to_string(),
                upper: "missing_high_pct".to_string(),
            });
        }
        if self.outlier_medium_pct > self.outlier_high_pct {
            return Err(ConfigValidationError::InvertedThresholds {
                lower: "outlier_medium_pct".to_string(),
                upper: "outlier_high_pct".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration for the profiling engine.
///
/// Use [`ProfilerConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use lex_insight::config::ProfilerConfig;
///
/// let config = ProfilerConfig::builder()
///     .type_sample_rows(500)
///     .correlation_sample_rows(None)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Number of leading rows sampled per column for type inference.
    /// Default: 100
    pub type_sample_rows: usize,

    /// Number of most frequent values kept per column.
    /// Default: 10
    pub top_values_limit: usize,

    /// IQR multiplier used when the profiler flags outliers.
    /// Default: 1.5
    pub iqr_multiplier: f64,

    /// A string is a length anomaly when it is longer than `factor` times
    /// the column's average length or shorter than average / `factor`.
    /// Default: 3.0
    pub anomaly_length_factor: f64,

    /// Prefix sample size for the correlation matrix.
    /// `None` computes over the full dataset.
    /// Default: Some(1000)
    pub correlation_sample_rows: Option<usize>,

    /// Thresholds for quality-issue synthesis.
    pub quality: QualityThresholds,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            type_sample_rows: 100,
            top_values_limit: 10,
            iqr_multiplier: 1.5,
            anomaly_length_factor: 3.0,
            correlation_sample_rows: Some(1000),
            quality: QualityThresholds::default(),
        }
    }
}

impl ProfilerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProfilerConfigBuilder {
        ProfilerConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.type_sample_rows == 0 {
            return Err(ConfigValidationError::ZeroLimit(
                "type_sample_rows".to_string(),
            ));
        }

        if self.top_values_limit == 0 {
            return Err(ConfigValidationError::ZeroLimit(
                "top_values_limit".to_string(),
            ));
        }

        if self.correlation_sample_rows == Some(0) {
            return Err(ConfigValidationError::ZeroLimit(
                "correlation_sample_rows".to_string(),
            ));
        }

        if !self.iqr_multiplier.is_finite() || self.iqr_multiplier <= 0.0 {
            return Err(ConfigValidationError::InvalidMultiplier {
                field: "iqr_multiplier".to_string(),
                value: self.iqr_multiplier,
            });
        }

        if !self.anomaly_length_factor.is_finite() || self.anomaly_length_factor <= 1.0 {
            return Err(ConfigValidationError::InvalidMultiplier {
                field: "anomaly_length_factor".to_string(),
                value: self.anomaly_length_factor,
            });
        }

        self.quality.validate()
    }
}

/// Builder for [`ProfilerConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct ProfilerConfigBuilder {
    type_sample_rows: Option<usize>,
    top_values_limit: Option<usize>,
    iqr_multiplier: Option<f64>,
    anomaly_length_factor: Option<f64>,
    correlation_sample_rows: Option<Option<usize>>,
    quality: Option<QualityThresholds>,
}

impl ProfilerConfigBuilder {
    /// Set how many leading rows are sampled for type inference.
    pub fn type_sample_rows(mut self, rows: usize) -> Self {
        self.type_sample_rows = Some(rows);
        self
    }

    /// Set how many top values are kept per column.
    pub fn top_values_limit(mut self, limit: usize) -> Self {
        self.top_values_limit = Some(limit);
        self
    }

    /// Set the IQR multiplier used for profile outliers.
    pub fn iqr_multiplier(mut self, k: f64) -> Self {
        self.iqr_multiplier = Some(k);
        self
    }

    /// Set the factor used for string length anomalies.
    pub fn anomaly_length_factor(mut self, factor: f64) -> Self {
        self.anomaly_length_factor = Some(factor);
        self
    }

    /// Bound the correlation pass to a prefix of the dataset.
    ///
    /// Pass `None` to always use every row.
    pub fn correlation_sample_rows(mut self, rows: Option<usize>) -> Self {
        self.correlation_sample_rows = Some(rows);
        self
    }

    /// Replace the quality thresholds.
    pub fn quality(mut self, thresholds: QualityThresholds) -> Self {
        self.quality = Some(thresholds);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `ProfilerConfig` or an error if validation fails.
    pub fn build(self) -> Result<ProfilerConfig, ConfigValidationError> {
        let defaults = ProfilerConfig::default();
        let config = ProfilerConfig {
            type_sample_rows: self.type_sample_rows.unwrap_or(defaults.type_sample_rows),
            top_values_limit: self.top_values_limit.unwrap_or(defaults.top_values_limit),
            iqr_multiplier: self.iqr_multiplier.unwrap_or(defaults.iqr_multiplier),
            anomaly_length_factor: self
                .anomaly_length_factor
                .unwrap_or(defaults.anomaly_length_factor),
            correlation_sample_rows: self
                .correlation_sample_rows
                .unwrap_or(defaults.correlation_sample_rows),
            quality: self.quality.unwrap_or(defaults.quality),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Resource limits for the script sandbox.
///
/// Every limit is enforced by the interpreter itself; crossing any of them
/// aborts the script with a resource-exhaustion failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Maximum number of evaluation steps (statements + expressions).
    /// Default: 5_000_000
    pub max_steps: u64,

    /// Wall-clock budget in milliseconds.
    /// Default: 2_000
    pub timeout_ms: u64,

    /// Maximum nesting of user function calls.
    /// Default: 64
    pub max_call_depth: usize,

    /// Maximum number of captured log lines; logging past it fails the run.
    /// Default: 1_000
    pub max_log_lines: usize,

    /// Maximum length (in bytes) of any string built by a script,
    /// including each log line.
    /// Default: 1_000_000
    pub max_string_length: usize,

    /// Maximum serialized size (in bytes) of the script result, and
    /// separately of all log output combined.
    /// Default: 16 MiB
    pub max_output_bytes: usize,

    /// Seed for `Math.random()`, so runs are reproducible.
    /// Default: 42
    pub random_seed: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_steps: 5_000_000,
            timeout_ms: 2_000,
            max_call_depth: 64,
            max_log_lines: 1_000,
            max_string_length: 1_000_000,
            max_output_bytes: 16 * 1024 * 1024,
            random_seed: 42,
        }
    }
}

impl SandboxConfig {
    /// Create a new configuration builder.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let limits = [
            ("max_steps", self.max_steps as usize),
            ("timeout_ms", self.timeout_ms as usize),
            ("max_call_depth", self.max_call_depth),
            ("max_string_length", self.max_string_length),
            ("max_output_bytes", self.max_output_bytes),
        ];
        for (field, value) in limits {
            if value == 0 {
                return Err(ConfigValidationError::ZeroLimit(field.to_string()));
            }
        }
        Ok(())
    }
}

/// Builder for [`SandboxConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct SandboxConfigBuilder {
    max_steps: Option<u64>,
    timeout_ms: Option<u64>,
    max_call_depth: Option<usize>,
    max_log_lines: Option<usize>,
    max_string_length: Option<usize>,
    max_output_bytes: Option<usize>,
    random_seed: Option<u64>,
}

impl SandboxConfigBuilder {
    /// Set the evaluation step budget.
    pub fn max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    /// Set the wall-clock budget in milliseconds.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the maximum call depth.
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = Some(depth);
        self
    }

    /// Set the maximum number of captured log lines.
    pub fn max_log_lines(mut self, lines: usize) -> Self {
        self.max_log_lines = Some(lines);
        self
    }

    /// Set the maximum string length a script may build.
    pub fn max_string_length(mut self, length: usize) -> Self {
        self.max_string_length = Some(length);
        self
    }

    /// Set the maximum serialized size of the result and of the log output.
    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    /// Set the seed used by `Math.random()`.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<SandboxConfig, ConfigValidationError> {
        let defaults = SandboxConfig::default();
        let config = SandboxConfig {
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
            timeout_ms: self.timeout_ms.unwrap_or(defaults.timeout_ms),
            max_call_depth: self.max_call_depth.unwrap_or(defaults.max_call_depth),
            max_log_lines: self.max_log_lines.unwrap_or(defaults.max_log_lines),
            max_string_length: self.max_string_length.unwrap_or(defaults.max_string_length),
            max_output_bytes: self.max_output_bytes.unwrap_or(defaults.max_output_bytes),
            random_seed: self.random_seed.unwrap_or(defaults.random_seed),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid percentage for '{field}': {value} (must be between 0 and 100)")]
    InvalidPercentage { field: String, value: f64 },

    #[error("Threshold '{lower}' must not exceed '{upper}'")]
    InvertedThresholds { lower: String, upper: String },

    #[error("Invalid multiplier for '{field}': {value}")]
    InvalidMultiplier { field: String, value: f64 },

    #[error("'{0}' must be at least 1")]
    ZeroLimit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProfilerConfig::default();
        assert_eq!(config.type_sample_rows, 100);
        assert_eq!(config.top_values_limit, 10);
        assert_eq!(config.iqr_multiplier, 1.5);
        assert_eq!(config.correlation_sample_rows, Some(1000));
        assert_eq!(config.quality.missing_high_pct, 50.0);
    }

    #[test]
    fn test_builder_defaults() {
        let config = ProfilerConfig::builder().build().unwrap();
        assert_eq!(config, ProfilerConfig::default());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = ProfilerConfig::builder()
            .type_sample_rows(250)
            .top_values_limit(5)
            .correlation_sample_rows(None)
            .build()
            .unwrap();

        assert_eq!(config.type_sample_rows, 250);
        assert_eq!(config.top_values_limit, 5);
        assert_eq!(config.correlation_sample_rows, None);
    }

    #[test]
    fn test_validation_zero_sample_rows() {
        let result = ProfilerConfig::builder().type_sample_rows(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::ZeroLimit(field) if field == "type_sample_rows"
        ));
    }

    #[test]
    fn test_validation_negative_multiplier() {
        let result = ProfilerConfig::builder().iqr_multiplier(-1.0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidMultiplier { .. }
        ));
    }

    #[test]
    fn test_validation_inverted_thresholds() {
        let thresholds = QualityThresholds {
            missing_medium_pct: 60.0,
            ..QualityThresholds::default()
        };
        let result = ProfilerConfig::builder().quality(thresholds).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvertedThresholds { .. }
        ));
    }

    #[test]
    fn test_validation_percentage_out_of_range() {
        let thresholds = QualityThresholds {
            duplicate_high_pct: 150.0,
            ..QualityThresholds::default()
        };
        assert!(matches!(
            thresholds.validate().unwrap_err(),
            ConfigValidationError::InvalidPercentage { .. }
        ));
    }

    #[test]
    fn test_sandbox_builder() {
        let config = SandboxConfig::builder()
            .max_steps(10)
            .timeout_ms(50)
            .random_seed(7)
            .build()
            .unwrap();
        assert_eq!(config.max_steps, 10);
        assert_eq!(config.timeout_ms, 50);
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.max_call_depth, 64);
    }

    #[test]
    fn test_sandbox_validation_zero_steps() {
        assert!(SandboxConfig::builder().max_steps(0).build().is_err());
    }

    #[test]
    fn test_config_from_json() {
        // Simulate JSON that might come from a frontend
        let json = r#"{
            "type_sample_rows": 50,
            "top_values_limit": 3,
            "iqr_multiplier": 2.0,
            "anomaly_length_factor": 4.0,
            "correlation_sample_rows": null,
            "quality": {
                "missing_high_pct": 40.0,
                "missing_medium_pct": 10.0,
                "low_unique_pct": 5.0,
                "outlier_high_pct": 20.0,
                "outlier_medium_pct": 10.0,
                "duplicate_high_pct": 5.0,
                "type_mismatch_medium_pct": 15.0
            }
        }"#;

        let config: ProfilerConfig =
            serde_json::from_str(json).expect("Should deserialize from frontend JSON");

        assert_eq!(config.type_sample_rows, 50);
        assert_eq!(config.correlation_sample_rows, None);
        assert_eq!(config.quality.missing_high_pct, 40.0);
        assert!(config.validate().is_ok());
    }
}
