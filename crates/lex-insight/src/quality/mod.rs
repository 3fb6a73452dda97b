//! Data quality analysis module.
//!
//! This module turns computed column profiles into a severity-ranked list of
//! issues such as missing values, outliers, duplicates and type mismatches.

mod analyzer;

pub use analyzer::DataQualityAnalyzer;
