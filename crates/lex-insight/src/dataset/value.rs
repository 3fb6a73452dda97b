//! Tagged cell values.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::utils::{format_number, parse_numeric_string};

/// Format used when a date is rendered as text.
pub const DATE_DISPLAY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A single dataset cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
    Date(NaiveDateTime),
    #[default]
    Null,
}

/// Hashable identity of a value, used for uniqueness and duplicate-row checks.
///
/// Unlike [`Value::key`], a number and its string spelling stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Number(u64),
    String(String),
    Boolean(bool),
    Date(NaiveDateTime),
    Missing,
}

impl Value {
    /// Null, or a string that is empty after trimming.
    ///
    /// A cell that is absent from its row is missing too; see
    /// [`Dataset::cell`](super::Dataset::cell).
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric reading of the value: finite numbers and numeric strings.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::String(s) => parse_numeric_string(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical string form, as used for grouping and display.
    pub fn key(&self) -> String {
        match self {
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
            Self::Date(d) => d.format(DATE_DISPLAY_FORMAT).to_string(),
            Self::Null => "null".to_string(),
        }
    }

    pub fn hash_key(&self) -> ValueKey {
        if self.is_missing() {
            return ValueKey::Missing;
        }
        match self {
            // -0.0 and 0.0 are the same value
            Self::Number(n) => ValueKey::Number(if *n == 0.0 { 0 } else { n.to_bits() }),
            Self::String(s) => ValueKey::String(s.clone()),
            Self::Boolean(b) => ValueKey::Boolean(*b),
            Self::Date(d) => ValueKey::Date(*d),
            Self::Null => ValueKey::Missing,
        }
    }

    /// Rough memory footprint of the cell in bytes.
    pub fn estimated_size(&self) -> usize {
        match self {
            Self::Number(_) | Self::Date(_) => 8,
            Self::Boolean(_) => 4,
            Self::String(s) => s.len() + 24,
            Self::Null => 0,
        }
    }

    /// Convert a JSON value. Nested arrays and objects are kept as JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Date(_) => serde_json::Value::String(self.key()),
            Self::Null => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Self::Number(_) | Self::Null => serializer.serialize_unit(),
            Self::String(s) => serializer.serialize_str(s),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Date(d) => serializer.collect_str(&d.format(DATE_DISPLAY_FORMAT)),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_json(&json))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_is_missing() {
        assert!(Value::Null.is_missing());
        assert!(Value::from("   ").is_missing());
        assert!(!Value::from("x").is_missing());
        assert!(!Value::from(0.0).is_missing());
        assert!(!Value::from(false).is_missing());
    }

    #[test]
    fn test_as_number() {
        assert_eq!(Value::from(3.5).as_number(), Some(3.5));
        assert_eq!(Value::from(" 12 ").as_number(), Some(12.0));
        assert_eq!(Value::from("x").as_number(), None);
        assert_eq!(Value::from(true).as_number(), None);
        assert_eq!(Value::Number(f64::NAN).as_number(), None);
    }

    #[test]
    fn test_key() {
        assert_eq!(Value::from(30.0).key(), "30");
        assert_eq!(Value::from(true).key(), "true");
        assert_eq!(Value::Null.key(), "null");
        let date = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(Value::from(date).key(), "2024-01-05T00:00:00");
    }

    #[test]
    fn test_hash_key_distinguishes_types() {
        assert_ne!(Value::from(1.0).hash_key(), Value::from("1").hash_key());
        assert_eq!(Value::from(0.0).hash_key(), Value::from(-0.0).hash_key());
        assert_eq!(Value::Null.hash_key(), Value::from("").hash_key());
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"a": 1, "b": "x", "c": null, "d": [1, 2]});
        assert_eq!(Value::from_json(&json["a"]), Value::Number(1.0));
        assert_eq!(Value::from_json(&json["b"]), Value::from("x"));
        assert_eq!(Value::from_json(&json["c"]), Value::Null);
        assert_eq!(Value::from_json(&json["d"]), Value::from("[1,2]"));
    }

    #[test]
    fn test_serialization() {
        assert_eq!(serde_json::to_string(&Value::from(2.0)).unwrap(), "2.0");
        assert_eq!(serde_json::to_string(&Value::Null).unwrap(), "null");
        let value: Value = serde_json::from_str("\"hi\"").unwrap();
        assert_eq!(value, Value::from("hi"));
    }
}
