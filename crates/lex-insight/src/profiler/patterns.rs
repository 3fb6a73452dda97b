//! Advisory pattern tags and length anomalies for string columns.

use once_cell::sync::Lazy;
use regex::Regex;

use super::type_inference::parse_date_string;
use crate::types::{AnomalyKind, LengthAnomaly, PatternKind, PatternMatch};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid regex: email")
});

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[\d\s().-]+$").expect("Invalid regex: phone"));

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(https?://|www\.)[^\s/$.?#][^\s]*$").expect("Invalid regex: url")
});

/// Minimum digit count before a string is treated as phone-like.
const MIN_PHONE_DIGITS: usize = 7;

fn is_phone_like(s: &str) -> bool {
    PHONE_PATTERN.is_match(s) && s.chars().filter(char::is_ascii_digit).count() >= MIN_PHONE_DIGITS
}

/// Classify one string against the known signatures.
pub fn classify(s: &str) -> Option<PatternKind> {
    let trimmed = s.trim();
    if EMAIL_PATTERN.is_match(trimmed) {
        Some(PatternKind::Email)
    } else if URL_PATTERN.is_match(trimmed) {
        Some(PatternKind::Url)
    } else if parse_date_string(trimmed).is_some() {
        // Dates are checked before phones: "2024-01-05" is also digits and dashes.
        Some(PatternKind::Date)
    } else if is_phone_like(trimmed) {
        Some(PatternKind::Phone)
    } else {
        None
    }
}

/// Count each pattern kind over the given strings; kinds with no match are omitted.
pub fn detect_patterns<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<PatternMatch> {
    let order = [
        PatternKind::Email,
        PatternKind::Phone,
        PatternKind::Url,
        PatternKind::Date,
    ];
    let mut counts = [0usize; 4];
    for value in values {
        if let Some(kind) = classify(value)
            && let Some(idx) = order.iter().position(|k| *k == kind)
        {
            counts[idx] += 1;
        }
    }

    order
        .into_iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .map(|(kind, count)| PatternMatch { kind, count })
        .collect()
}

/// Flag lengths above `factor` times the average or below average / `factor`.
///
/// Nothing is flagged when the average length is 0.
pub fn detect_length_anomalies(lengths: &[usize], factor: f64) -> Vec<LengthAnomaly> {
    if lengths.is_empty() {
        return Vec::new();
    }
    let avg = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
    if avg == 0.0 {
        return Vec::new();
    }

    let upper = avg * factor;
    let lower = avg / factor;
    let too_long = lengths.iter().filter(|&&l| l as f64 > upper).count();
    let too_short = lengths.iter().filter(|&&l| (l as f64) < lower).count();

    let mut anomalies = Vec::new();
    if too_long > 0 {
        anomalies.push(LengthAnomaly {
            kind: AnomalyKind::TooLong,
            count: too_long,
            threshold: upper,
        });
    }
    if too_short > 0 {
        anomalies.push(LengthAnomaly {
            kind: AnomalyKind::TooShort,
            count: too_short,
            threshold: lower,
        });
    }
    anomalies
}
