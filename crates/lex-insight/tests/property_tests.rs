//! Property-based tests for the profiling engine and the sandbox.
//!
//! These tests use proptest to generate random datasets and scripts and
//! verify that the invariants of the statistics and the evaluator hold for
//! all of them.
//!
//! # Running Property Tests
//!
//! ```bash
//! cargo test -p lex-insight --test property_tests
//!
//! # More cases (slower but more thorough)
//! PROPTEST_CASES=10000 cargo test -p lex-insight --test property_tests
//! ```

use indexmap::IndexMap;
use proptest::prelude::*;

use lex_insight::{
    ColumnType, CorrelationEngine, Dataset, OutlierDetector, OutlierMethod, Row, Sandbox,
    SandboxConfig, Value, generate_profile, run_sandbox_script,
};

// =============================================================================
// Test Strategies
// =============================================================================

/// Numeric cells with roughly one in five missing.
fn numeric_cells() -> impl Strategy<Value = Vec<Option<f64>>> {
    prop::collection::vec(prop::option::weighted(0.8, -1.0e6..1.0e6f64), 1..60)
}

/// Finite cells from anywhere in the `f64` range, including runs of one
/// repeated value.
fn wide_cells() -> impl Strategy<Value = Vec<Option<f64>>> {
    prop_oneof![
        prop::collection::vec(prop::option::weighted(0.9, prop::num::f64::NORMAL), 1..40),
        (prop::num::f64::NORMAL, 1..40usize).prop_map(|(v, n)| vec![Some(v); n]),
    ]
}

/// Group keys: absent, null, or one of a few strings.
fn group_cell() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        Just(Some(Value::Null)),
        "[abc]".prop_map(|s| Some(Value::String(s))),
    ]
}

fn column_dataset(name: &str, cells: &[Option<f64>]) -> Dataset {
    let rows = cells
        .iter()
        .map(|cell| {
            let mut row = Row::new();
            row.insert(name.to_string(), cell.map_or(Value::Null, Value::Number));
            row
        })
        .collect();
    Dataset::new(vec![name.to_string()], rows)
}

fn numeric_types() -> IndexMap<String, ColumnType> {
    let mut types = IndexMap::new();
    types.insert("v".to_string(), ColumnType::Number);
    types
}

fn canonical(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Number(n) => format!("{:?}", n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::Object(map) => {
            let mut entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k:?}:{}", canonical(v)))
                .collect();
            entries.sort();
            format!("{{{}}}", entries.join(","))
        }
        other => other.to_string(),
    }
}

// =============================================================================
// Column statistics
// =============================================================================

proptest! {
    #[test]
    fn mean_lies_within_min_and_max(cells in numeric_cells()) {
        let dataset = column_dataset("v", &cells);
        let profile = generate_profile(&dataset, &numeric_types()).unwrap();
        let column = profile.column("v").unwrap();

        let numeric = column.numeric.as_ref().unwrap();
        if let (Some(mean), Some(min), Some(max)) =
            (numeric.mean.value(), numeric.min.value(), numeric.max.value())
        {
            prop_assert!(mean >= min, "mean {} < min {}", mean, min);
            prop_assert!(mean <= max, "mean {} > max {}", mean, max);
        } else {
            prop_assert!(cells.iter().all(Option::is_none));
        }
    }

    #[test]
    fn mean_stays_within_range_at_float_limits(cells in wide_cells()) {
        let dataset = column_dataset("v", &cells);
        let profile = generate_profile(&dataset, &numeric_types()).unwrap();
        let numeric = profile.column("v").unwrap().numeric.as_ref().unwrap();

        if let (Some(mean), Some(min), Some(max)) =
            (numeric.mean.value(), numeric.min.value(), numeric.max.value())
        {
            prop_assert!(mean.is_finite());
            prop_assert!(min <= mean && mean <= max, "{} not in [{}, {}]", mean, min, max);
        } else {
            prop_assert!(cells.iter().all(Option::is_none));
        }
    }

    #[test]
    fn missing_counts_partition_rows(cells in numeric_cells()) {
        let dataset = column_dataset("v", &cells);
        let profile = generate_profile(&dataset, &numeric_types()).unwrap();
        let column = profile.column("v").unwrap();

        prop_assert_eq!(column.missing + column.non_missing, column.count);
        prop_assert_eq!(column.count, cells.len());
        let expected_pct = column.missing as f64 / column.count as f64 * 100.0;
        prop_assert!((column.missing_pct - expected_pct).abs() <= 0.005 + 1e-9);
    }
}

// =============================================================================
// Correlation
// =============================================================================

proptest! {
    #[test]
    fn correlation_matrix_is_square_with_unit_diagonal(
        xs in prop::collection::vec(-1.0e3..1.0e3f64, 2..40),
        noise in prop::collection::vec(-1.0e3..1.0e3f64, 40),
        constant in -1.0e3..1.0e3f64,
    ) {
        let rows = xs
            .iter()
            .zip(&noise)
            .map(|(x, n)| {
                let mut row = Row::new();
                row.insert("x".to_string(), Value::Number(*x));
                row.insert("y".to_string(), Value::Number(*n));
                row.insert("c".to_string(), Value::Number(constant));
                row
            })
            .collect();
        let dataset = Dataset::from_rows(rows);
        let names = ["x", "y", "c"];
        let matrix = CorrelationEngine::new(None).calculate(&dataset, &names).unwrap();

        prop_assert_eq!(matrix.matrix.len(), names.len());
        for a in names {
            prop_assert_eq!(matrix.matrix[a].len(), names.len());
            prop_assert_eq!(matrix.get(a, a), Some(1.0));
            for b in names {
                let r = matrix.get(a, b).unwrap();
                prop_assert!(r.is_finite() && (-1.0..=1.0).contains(&r));
                prop_assert_eq!(Some(r), matrix.get(b, a));
            }
        }
        prop_assert_eq!(matrix.get("c", "x"), Some(0.0));
        prop_assert_eq!(matrix.get("y", "c"), Some(0.0));
    }
}

// =============================================================================
// Outliers
// =============================================================================

fn method() -> impl Strategy<Value = OutlierMethod> {
    prop_oneof![Just(OutlierMethod::Iqr), Just(OutlierMethod::ZScore)]
}

proptest! {
    #[test]
    fn larger_k_never_flags_more(
        cells in numeric_cells(),
        method in method(),
        k in 0.1..5.0f64,
        extra in 0.0..5.0f64,
    ) {
        let dataset = column_dataset("v", &cells);
        let narrow = OutlierDetector::new(method, Some(k)).unwrap();
        let wide = OutlierDetector::new(method, Some(k + extra)).unwrap();

        let first = narrow.detect(&dataset, "v").unwrap();
        let again = narrow.detect(&dataset, "v").unwrap();
        let widened = wide.detect(&dataset, "v").unwrap();

        prop_assert_eq!(&first, &again);
        prop_assert!(widened.count() <= first.count());
        for point in &widened.outliers {
            prop_assert!(first.outliers.contains(point));
        }
    }
}

// =============================================================================
// Sandbox
// =============================================================================

proptest! {
    #[test]
    fn aggregate_mean_of_text_is_zero(words in prop::collection::vec("[a-z]{0,8}", 0..20)) {
        let rows = words
            .iter()
            .map(|w| {
                let mut row = Row::new();
                row.insert("w".to_string(), Value::String(w.clone()));
                row
            })
            .collect();
        let dataset = Dataset::new(vec!["w".to_string()], rows);

        let outcome = run_sandbox_script(&dataset, &dataset.columns, "aggregate('w', 'mean')");
        prop_assert!(outcome.success, "{:?}", outcome.error);
        prop_assert_eq!(outcome.result, Some(serde_json::json!(0)));
    }

    #[test]
    fn group_by_is_exhaustive_and_disjoint(
        cells in prop::collection::vec((group_cell(), 0..100i64), 0..30)
    ) {
        let rows: Vec<Row> = cells
            .iter()
            .map(|(group, n)| {
                let mut row = Row::new();
                if let Some(value) = group {
                    row.insert("g".to_string(), value.clone());
                }
                row.insert("n".to_string(), Value::Number(*n as f64));
                row
            })
            .collect();
        let dataset = Dataset::new(vec!["g".to_string(), "n".to_string()], rows);

        let outcome = run_sandbox_script(&dataset, &dataset.columns, "groupBy('g')");
        prop_assert!(outcome.success, "{:?}", outcome.error);

        let groups = outcome.result.unwrap_or_else(|| serde_json::json!({}));
        let mut regrouped: Vec<String> = groups
            .as_object()
            .unwrap()
            .values()
            .flat_map(|rows| rows.as_array().unwrap().iter().map(canonical))
            .collect();
        let mut original: Vec<String> = dataset
            .to_json_value()
            .as_array()
            .unwrap()
            .iter()
            .map(canonical)
            .collect();
        regrouped.sort();
        original.sort();
        prop_assert_eq!(regrouped, original);
    }

    #[test]
    fn arbitrary_source_never_escapes_the_sandbox(source in "[ -~\\n]{0,80}") {
        let dataset = Dataset::from_json_str(r#"[{"a": 1}, {"a": "x"}]"#).unwrap();
        let before = dataset.clone();
        let sandbox = Sandbox::new(SandboxConfig::builder().timeout_ms(500).build().unwrap());

        let outcome = sandbox.run(&dataset, &dataset.columns, &source);
        if !outcome.success {
            prop_assert!(!outcome.error.unwrap_or_default().is_empty());
            prop_assert!(outcome.error_code.is_some());
        }
        prop_assert_eq!(dataset, before);
        prop_assert!(!sandbox.is_busy());
    }
}
