//! Custom error types for the profiling engine.
//!
//! This module provides the error hierarchy using `thiserror`. Statistics
//! never fail for "insufficient data" (that case is encoded with
//! [`Metric::NotComputable`](crate::types::Metric) sentinels), so the variants
//! here cover bad input, stale snapshots and I/O at the ingestion edge.
//!
//! Errors are serializable so that a host UI can receive them as
//! `{ "code": ..., "message": ... }` payloads.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

use crate::config::ConfigValidationError;

/// The main error type for the profiling engine.
#[derive(Error, Debug)]
pub enum InsightError {
    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// An operation name that the engine does not know.
    #[error("Unsupported operation '{operation}' (expected one of: {expected})")]
    UnsupportedOperation { operation: String, expected: String },

    /// A caller-supplied parameter is out of range.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    /// No dataset is loaded in the session.
    #[error("No data loaded")]
    NoDataLoaded,

    /// The snapshot a computation started from was replaced before it finished.
    #[error("Snapshot generation {generation} was superseded by generation {current}")]
    Superseded { generation: u64, current: u64 },

    /// Data profiling failed.
    #[error("Failed to profile dataset: {0}")]
    ProfilingFailed(String),

    /// Input data could not be turned into a dataset.
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    /// Internal error (e.g., thread join failure).
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<InsightError>,
    },
}

impl InsightError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        InsightError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for [`InsightError::InvalidParameter`].
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        InsightError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Get error code for frontend handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::NoDataLoaded => "NO_DATA_LOADED",
            Self::Superseded { .. } => "SUPERSEDED",
            Self::ProfilingFailed(_) => "PROFILING_FAILED",
            Self::InvalidDataset(_) => "INVALID_DATASET",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error was caused by a bad column reference or operation name.
    pub fn is_input_error(&self) -> bool {
        match self {
            Self::ColumnNotFound(_)
            | Self::UnsupportedOperation { .. }
            | Self::InvalidParameter { .. } => true,
            Self::WithContext { source, .. } => source.is_input_error(),
            _ => false,
        }
    }

    /// Check if this error means the result belongs to a stale snapshot.
    pub fn is_superseded(&self) -> bool {
        match self {
            Self::Superseded { .. } => true,
            Self::WithContext { source, .. } => source.is_superseded(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields,
/// making them easy to handle in a frontend.
impl Serialize for InsightError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("InsightError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, InsightError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| InsightError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(InsightError::NoDataLoaded.error_code(), "NO_DATA_LOADED");
        assert_eq!(
            InsightError::ColumnNotFound("test".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
    }

    #[test]
    fn test_is_input_error() {
        assert!(InsightError::ColumnNotFound("age".to_string()).is_input_error());
        assert!(InsightError::invalid_parameter("k", "must be positive").is_input_error());
        assert!(!InsightError::NoDataLoaded.is_input_error());
    }

    #[test]
    fn test_is_superseded() {
        let error = InsightError::Superseded {
            generation: 1,
            current: 3,
        };
        assert!(error.is_superseded());
        assert!(error.to_string().contains("generation 3"));
        assert!(!InsightError::NoDataLoaded.is_superseded());
    }

    #[test]
    fn test_error_serialization() {
        let error = InsightError::ColumnNotFound("Age".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("Age"));
    }

    #[test]
    fn test_with_context() {
        let error =
            InsightError::ColumnNotFound("test".to_string()).with_context("During correlation");
        assert!(error.to_string().contains("During correlation"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND"); // Preserves original code
        assert!(error.is_input_error());
    }
}
