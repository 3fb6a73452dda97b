//! Type inference logic for column analysis.
//!
//! A column's type is the first of Number, Date, Boolean for which every
//! sampled non-missing value qualifies; anything else is String. Numbers are
//! checked first, so a column of years such as `"2024"` is a Number column.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dataset::{Dataset, Value};
use crate::types::ColumnType;
use crate::utils::is_boolean_string;

/// How a string that matched a date pattern is parsed.
#[derive(Debug, Clone, Copy)]
enum DateLayout {
    Date(&'static str),
    DateTime(&'static [&'static str]),
}

// Date pattern regexes - compiled once at startup
static DATE_PATTERNS: Lazy<Vec<(Regex, DateLayout)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").expect("Invalid regex: YYYY-MM-DD"),
            DateLayout::Date("%Y-%m-%d"),
        ),
        (
            Regex::new(r"^\d{4}/\d{1,2}/\d{1,2}$").expect("Invalid regex: YYYY/MM/DD"),
            DateLayout::Date("%Y/%m/%d"),
        ),
        (
            Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").expect("Invalid regex: MM/DD/YYYY"),
            DateLayout::Date("%m/%d/%Y"),
        ),
        (
            Regex::new(r"^\d{1,2}-\d{1,2}-\d{4}$").expect("Invalid regex: DD-MM-YYYY"),
            DateLayout::Date("%d-%m-%Y"),
        ),
        (
            Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$")
                .expect("Invalid regex: ISO datetime"),
            DateLayout::DateTime(&[
                "%Y-%m-%dT%H:%M:%S%.f",
                "%Y-%m-%d %H:%M:%S%.f",
                "%Y-%m-%dT%H:%M",
                "%Y-%m-%d %H:%M",
            ]),
        ),
    ]
});

/// Parse a string in one of the recognised date layouts.
///
/// Returns `None` when the shape matches but the date itself is invalid
/// (e.g. `2024-02-30`).
pub fn parse_date_string(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    let (_, layout) = DATE_PATTERNS.iter().find(|(re, _)| re.is_match(trimmed))?;

    match layout {
        DateLayout::Date(format) => NaiveDate::parse_from_str(trimmed, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
        DateLayout::DateTime(formats) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
                return Some(dt.naive_utc());
            }
            formats
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        }
    }
}

/// Check if a single value qualifies as the given type.
pub fn value_matches_type(value: &Value, column_type: ColumnType) -> bool {
    match column_type {
        ColumnType::Number => value.as_number().is_some(),
        ColumnType::Date => match value {
            Value::Date(_) => true,
            Value::String(s) => parse_date_string(s).is_some(),
            _ => false,
        },
        ColumnType::Boolean => match value {
            Value::Boolean(_) => true,
            Value::String(s) => is_boolean_string(s),
            _ => false,
        },
        ColumnType::String => true,
    }
}

/// Infer a column type from the first `sample_rows` cells.
///
/// Missing cells in the sample are ignored; an all-missing sample is String.
pub fn infer_column_type<'a, I>(cells: I, sample_rows: usize) -> ColumnType
where
    I: IntoIterator<Item = Option<&'a Value>>,
{
    let sample: Vec<&Value> = cells
        .into_iter()
        .take(sample_rows)
        .flatten()
        .filter(|v| !v.is_missing())
        .collect();

    if sample.is_empty() {
        return ColumnType::String;
    }

    [ColumnType::Number, ColumnType::Date, ColumnType::Boolean]
        .into_iter()
        .find(|ty| sample.iter().all(|v| value_matches_type(v, *ty)))
        .unwrap_or(ColumnType::String)
}

/// Infer the type of every dataset column.
pub fn infer_column_types(dataset: &Dataset, sample_rows: usize) -> IndexMap<String, ColumnType> {
    dataset
        .columns
        .iter()
        .map(|name| {
            let ty = infer_column_type(dataset.column_values(name), sample_rows);
            (name.clone(), ty)
        })
        .collect()
}
