//! Shared utilities for the profiling engine.
//!
//! This module contains common helper functions used across multiple modules
//! to reduce code duplication and ensure consistency.

use std::cmp::Ordering;

// =============================================================================
// Rounding and Percentages
// =============================================================================

/// Round to 2 decimal places.
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / total * 100`, rounded to 2 decimals. Returns 0 for an empty total.
///
/// # Example
///
/// ```rust,ignore
/// use lex_insight::utils::percentage;
///
/// assert_eq!(percentage(1, 3), 33.33);
/// assert_eq!(percentage(5, 0), 0.0);
/// ```
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(part as f64 / total as f64 * 100.0)
    }
}

/// Total ordering for floats, NaN sorted last.
#[inline]
pub fn compare_f64(a: &f64, b: &f64) -> Ordering {
    a.total_cmp(b)
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Parse a string as a finite number.
///
/// Surrounding whitespace is ignored. Infinity and NaN spellings are rejected
/// so that words like "inf" or "nan" stay strings.
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Check if a string is a recognised boolean spelling.
pub fn is_boolean_string(s: &str) -> bool {
    parse_boolean_string(s).is_some()
}

/// Parse a boolean spelling such as "yes", "F" or "true".
pub fn parse_boolean_string(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "t" => Some(true),
        "false" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// Format a number the way scripts and reports display it.
///
/// Whole numbers print without a fractional part; non-finite values print as
/// `NaN`, `Infinity` or `-Infinity`.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if value == value.trunc() && value.abs() < 1e15 {
        // Avoid "-0"
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Format a byte count for human-readable output.
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
