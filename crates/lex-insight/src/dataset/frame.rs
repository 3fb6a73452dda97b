//! Conversion from polars `DataFrame`s, the loader's in-memory format.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use tracing::debug;

use super::{Dataset, Row, Value};
use crate::error::{Result, ResultExt};

/// Days from 0001-01-01 (CE) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

impl Dataset {
    /// Convert a `DataFrame` cell by cell.
    ///
    /// Integers and floats become numbers, polars dates and datetimes become
    /// dates, NaN floats become nulls and every other type is kept as its
    /// display string.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let columns: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        let mut rows: Vec<Row> = (0..df.height())
            .map(|_| Row::with_capacity(columns.len()))
            .collect();

        for (name, column) in columns.iter().zip(df.get_columns()) {
            let series = column.as_materialized_series();
            for (idx, row) in rows.iter_mut().enumerate() {
                let cell = series
                    .get(idx)
                    .context(format!("Failed to read column '{name}' at row {idx}"))?;
                row.insert(name.clone(), any_value_to_value(cell));
            }
        }

        debug!(
            "Converted DataFrame with {} rows and {} columns",
            rows.len(),
            columns.len()
        );

        Ok(Self { columns, rows })
    }
}

/// Load a CSV file with a header row.
pub fn read_csv(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .context(format!("Failed to open '{}'", path.display()))?
        .finish()
        .context(format!("Failed to parse '{}'", path.display()))
}

fn any_value_to_value(value: AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Boolean(b),

        AnyValue::Int8(i) => Value::Number(i as f64),
        AnyValue::Int16(i) => Value::Number(i as f64),
        AnyValue::Int32(i) => Value::Number(i as f64),
        AnyValue::Int64(i) => Value::Number(i as f64),
        AnyValue::UInt8(u) => Value::Number(u as f64),
        AnyValue::UInt16(u) => Value::Number(u as f64),
        AnyValue::UInt32(u) => Value::Number(u as f64),
        AnyValue::UInt64(u) => Value::Number(u as f64),

        AnyValue::Float32(f) if f.is_finite() => Value::Number(f as f64),
        AnyValue::Float64(f) if f.is_finite() => Value::Number(f),
        AnyValue::Float32(_) | AnyValue::Float64(_) => Value::Null,

        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),

        AnyValue::Date(days) => date_from_days(days).map_or(Value::Null, Value::Date),
        AnyValue::Datetime(ts, unit, _) => {
            datetime_from_timestamp(ts, unit).map_or(Value::Null, Value::Date)
        }

        other => Value::String(format!("{other}")),
    }
}

fn date_from_days(days: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn datetime_from_timestamp(ts: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let datetime = match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(ts)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(ts),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(ts),
    };
    datetime.map(|dt| dt.naive_utc())
}
