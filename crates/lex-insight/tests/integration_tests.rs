//! Integration tests for the profiling engine and the script sandbox.
//!
//! These tests verify end-to-end behavior using the fixture datasets and
//! small in-memory datasets.

use indexmap::IndexMap;
use lex_insight::{
    ColumnType, Dataset, InsightError, IssueKind, OutlierMethod, ProfileSession, ProfilerConfig,
    SandboxConfig, Severity, Value, calculate_correlations, detect_outliers, generate_profile,
    read_csv, run_sandbox_script,
};
use lex_insight::types::PatternKind;
use pretty_assertions::assert_eq;
use serde_json::{Value as Json, json};
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_people() -> Dataset {
    let df = read_csv(fixtures_path().join("people.csv")).expect("Failed to read CSV file");
    Dataset::from_dataframe(&df).expect("Failed to convert DataFrame")
}

fn load_sales() -> Dataset {
    let content =
        std::fs::read_to_string(fixtures_path().join("sales.json")).expect("Failed to read JSON");
    Dataset::from_json_str(&content).expect("Failed to parse dataset")
}

/// One numeric column named `name`; `None` becomes a null cell.
fn numeric_column(name: &str, values: &[Option<f64>]) -> Dataset {
    let rows = values
        .iter()
        .map(|v| {
            let mut row = IndexMap::new();
            row.insert(name.to_string(), v.map_or(Value::Null, Value::Number));
            row
        })
        .collect();
    Dataset::new(vec![name.to_string()], rows)
}

/// Order-independent text form of a JSON value, with numbers compared as f64.
fn canonical(value: &Json) -> String {
    match value {
        Json::Number(n) => format!("{:?}", n.as_f64().unwrap_or(f64::NAN)),
        Json::Array(items) => format!(
            "[{}]",
            items.iter().map(canonical).collect::<Vec<_>>().join(",")
        ),
        Json::Object(map) => {
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

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_scenario_a_iqr_flags_single_outlier() {
    let ages: Vec<Option<f64>> = [20., 21., 22., 23., 24., 25., 26., 27., 28., 1000.]
        .into_iter()
        .map(Some)
        .collect();
    let dataset = numeric_column("age", &ages);

    let results = detect_outliers(&dataset, &["age"], OutlierMethod::Iqr, None).unwrap();
    assert_eq!(results.len(), 1);
    let flagged: Vec<f64> = results[0].outliers.iter().map(|p| p.value).collect();
    assert_eq!(flagged, vec![1000.0]);
    assert_eq!(results[0].outliers[0].row, 9);
    assert_eq!(results[0].values_checked, 10);
}

#[test]
fn test_scenario_b_perfect_linear_correlation() {
    let rows = (1..=20)
        .map(|i| {
            let x = i as f64 * 1.5;
            let mut row = IndexMap::new();
            row.insert("x".to_string(), Value::Number(x));
            row.insert("y".to_string(), Value::Number(2.0 * x));
            row
        })
        .collect();
    let dataset = Dataset::from_rows(rows);

    let matrix = calculate_correlations(&dataset, &["x", "y"]).unwrap();
    let r = matrix.get("x", "y").unwrap();
    assert!((r - 1.0).abs() < 1e-6, "expected 1.0, got {r}");
    assert_eq!(matrix.get("y", "x"), Some(r));
}

#[test]
fn test_scenario_c_constant_column() {
    let dataset = numeric_column("c", &[Some(7.0); 5]);
    let profile = generate_profile(&dataset, &IndexMap::new()).unwrap();

    let column = profile.column("c").unwrap();
    let numeric = column.numeric.as_ref().unwrap();
    assert_eq!(numeric.std.value(), Some(0.0));
    assert_eq!(numeric.skewness.value(), Some(0.0));
    assert_eq!(numeric.kurtosis.value(), Some(0.0));
    assert_eq!(column.unique, 1);
    assert!((column.unique_pct - 100.0 / 5.0).abs() < 0.01);
}

#[test]
fn test_scenario_d_aggregate_skips_non_numeric() {
    let dataset =
        Dataset::from_json_str(r#"[{"price": 10}, {"price": "x"}, {"price": 20}]"#).unwrap();
    let outcome = run_sandbox_script(&dataset, &dataset.columns, "aggregate('price','sum')");
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.result, Some(json!(30)));
}

// ============================================================================
// Profiling the fixture datasets
// ============================================================================

#[test]
fn test_profile_people_fixture() {
    let dataset = load_people();
    assert_eq!(dataset.len(), 10);

    let profile = generate_profile(&dataset, &IndexMap::new()).unwrap();
    assert!(profile.failed_columns.is_empty());
    assert_eq!(profile.overview.total_rows, 10);
    assert_eq!(profile.overview.total_columns, 8);
    assert_eq!(profile.overview.duplicate_row_count, 0);

    let types: Vec<(&str, ColumnType)> = profile
        .columns
        .values()
        .map(|c| (c.name.as_str(), c.column_type))
        .collect();
    assert_eq!(
        types,
        vec![
            ("id", ColumnType::Number),
            ("name", ColumnType::String),
            ("age", ColumnType::Number),
            ("income", ColumnType::Number),
            ("city", ColumnType::String),
            ("email", ColumnType::String),
            ("joined", ColumnType::Date),
            ("active", ColumnType::Boolean),
        ]
    );

    let age = profile.column("age").unwrap();
    assert_eq!(age.missing, 1);
    assert_eq!(age.missing_pct, 10.0);

    let city = profile.column("city").unwrap();
    assert_eq!(city.unique, 3);
    assert_eq!(city.mode, Some(Value::String("Lisbon".to_string())));
    assert_eq!(city.top_values[0].count, 4);
    assert_eq!(city.top_values[0].pct, 40.0);

    let email = profile.column("email").unwrap();
    let email_matches = email
        .patterns
        .iter()
        .find(|p| p.kind == PatternKind::Email)
        .map(|p| p.count);
    assert_eq!(email_matches, Some(10));

    let income = profile.column("income").unwrap();
    assert_eq!(income.outlier_count(), 1);
    let income_issues: Vec<IssueKind> = profile.issues_for("income").map(|i| i.kind).collect();
    assert_eq!(income_issues, vec![IssueKind::Outliers]);

    assert_eq!(profile.correlations.columns, vec!["id", "age", "income"]);
}

#[test]
fn test_detect_outliers_on_fixture() {
    let dataset = load_people();
    let results = detect_outliers(&dataset, &["income"], OutlierMethod::Iqr, None).unwrap();
    assert_eq!(results[0].count(), 1);
    assert_eq!(results[0].outliers[0].row, 8);
    assert_eq!(results[0].outliers[0].value, 990000.0);

    let err = detect_outliers(&dataset, &["salary"], OutlierMethod::Iqr, None).unwrap_err();
    assert!(matches!(err, InsightError::ColumnNotFound(ref c) if c == "salary"));
    assert!(err.is_input_error());
}

#[test]
fn test_profile_serializes_not_computable() {
    let dataset = Dataset::from_json_str(r#"[{"n": "a"}, {"n": "b"}]"#).unwrap();
    let mut types = IndexMap::new();
    types.insert("n".to_string(), ColumnType::Number);

    let profile = generate_profile(&dataset, &types).unwrap();
    let value = serde_json::to_value(&profile).unwrap();
    assert_eq!(value["columns"]["n"]["numeric"]["mean"], json!("not computable"));
    assert_eq!(value["columns"]["n"]["invalid_count"], json!(2));
}

// ============================================================================
// Quality rule table
// ============================================================================

#[test]
fn test_missing_value_severities() {
    let column = |missing: usize| -> Vec<Option<f64>> {
        (0..20)
            .map(|i| if i < missing { None } else { Some(i as f64) })
            .collect()
    };

    let cases = [(12, Some(Severity::High)), (5, Some(Severity::Medium)), (3, None)];
    for (missing, expected) in cases {
        let dataset = numeric_column("v", &column(missing));
        let profile = generate_profile(&dataset, &IndexMap::new()).unwrap();
        let severity = profile
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::MissingValues)
            .map(|i| i.severity);
        assert_eq!(severity, expected, "{missing} of 20 missing");
    }
}

#[test]
fn test_issues_sorted_high_first() {
    let rows = r#"[
        {"a": null, "b": 1}, {"a": null, "b": 1}, {"a": null, "b": 1},
        {"a": 1, "b": 1}, {"a": 2, "b": 1}
    ]"#;
    let dataset = Dataset::from_json_str(rows).unwrap();
    let profile = generate_profile(&dataset, &IndexMap::new()).unwrap();

    let ranks: Vec<u8> = profile.issues.iter().map(|i| i.severity.rank()).collect();
    let mut sorted = ranks.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(ranks, sorted);
    assert_eq!(profile.issues[0].severity, Severity::High);
}

// ============================================================================
// Sandbox
// ============================================================================

#[test]
fn test_group_by_partitions_rows() {
    let dataset = load_sales();
    let outcome = run_sandbox_script(&dataset, &dataset.columns, "groupBy('region')");
    assert!(outcome.success, "{:?}", outcome.error);

    let groups = outcome.result.unwrap();
    let groups = groups.as_object().unwrap();
    let keys: Vec<&str> = groups.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["north", "south", "east", "undefined", "null"]);

    let mut regrouped: Vec<String> = groups
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
    assert_eq!(regrouped, original);
}

#[test]
fn test_aggregate_operations() {
    let dataset = load_sales();
    let run = |source: &str| run_sandbox_script(&dataset, &dataset.columns, source);

    assert_eq!(run("aggregate('price', 'sum')").result, Some(json!(64.5)));
    assert_eq!(run("aggregate('units', 'mean')").result, Some(json!(3)));
    assert_eq!(run("aggregate('units', 'count')").result, Some(json!(5)));
    assert_eq!(run("aggregate('product', 'mean')").result, Some(json!(0)));

    let unknown_op = run("aggregate('price', 'median')");
    assert!(!unknown_op.success);
    assert_eq!(unknown_op.error_code.as_deref(), Some("INPUT_ERROR"));
    assert!(unknown_op.error.unwrap().contains("median"));

    let unknown_column = run("groupBy('colour')");
    assert!(!unknown_column.success);
    assert_eq!(unknown_column.error_code.as_deref(), Some("INPUT_ERROR"));
}

#[test]
fn test_script_pipeline_over_rows() {
    let dataset = load_sales();
    let source = r#"
        const widgets = filter(r => r.product === 'widget');
        const revenue = map(widgets, r => r.price * (r.units ?? 0));
        console.log(`widgets: ${widgets.length}`);
        return reduce(revenue, (acc, v) => acc + v, 0);
    "#;
    let outcome = run_sandbox_script(&dataset, &dataset.columns, source);
    // Template literals are not part of the language.
    assert!(!outcome.success);
    assert_eq!(outcome.error_code.as_deref(), Some("SYNTAX_ERROR"));

    let source = r#"
        const widgets = filter(r => r.product === 'widget');
        const revenue = map(widgets, r => r.price * (r.units ?? 0));
        console.log('widgets: ' + widgets.length);
        return reduce(revenue, (acc, v) => acc + v, 0);
    "#;
    let outcome = run_sandbox_script(&dataset, &dataset.columns, source);
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.log_output, vec!["widgets: 3".to_string()]);
    assert_eq!(outcome.result, Some(json!(58)));
}

#[test]
fn test_throwing_filter_leaves_dataset_untouched() {
    let dataset = load_sales();
    let before = dataset.clone();
    let outcome = run_sandbox_script(
        &dataset,
        &dataset.columns,
        "filter(r => { if (r.price === 'x') { throw new Error('bad price') } return true })",
    );
    assert!(!outcome.success);
    assert!(!outcome.error.unwrap_or_default().is_empty());
    assert_eq!(dataset, before);
}

#[test]
fn test_scripts_cannot_write_rows() {
    let dataset = load_sales();
    let outcome = run_sandbox_script(
        &dataset,
        &dataset.columns,
        "for (const r of data) { r.price = 0 }",
    );
    assert!(!outcome.success);
    assert_eq!(outcome.error_code.as_deref(), Some("SYNTAX_ERROR"));
}

#[test]
fn test_infinite_loop_is_stopped() {
    let dataset = load_sales();
    let sandbox = lex_insight::Sandbox::new(
        SandboxConfig::builder()
            .max_steps(u64::MAX)
            .timeout_ms(100)
            .build()
            .unwrap(),
    );
    // Twelve nested loops over six rows: about two billion iterations.
    let mut source = String::from("let n = 0\n");
    for depth in 0..12 {
        source.push_str(&format!("for (const r{depth} of data) {{ "));
    }
    source.push_str("n += 1");
    source.push_str(&" }".repeat(12));
    let outcome = sandbox.run(&dataset, &dataset.columns, &source);
    assert!(!outcome.success);
    assert_eq!(outcome.error_code.as_deref(), Some("TIMEOUT"));
    assert!(outcome.error.unwrap().contains("timed out after"));
}

#[test]
fn test_scripts_cannot_exhaust_host_memory() {
    let dataset = load_sales();
    let counter = |n: usize| (1..=n).map(|i| i.to_string()).collect::<Vec<_>>().join(",");
    // `a` shares one 512 KiB string 2^40 times; fully expanded it would need 512 PiB.
    let setup = format!(
        "console.log('start')\n\
         let s = 'x'\n\
         for (const i of [{}]) {{ s += s }}\n\
         let a = [s]\n\
         for (const i of [{}]) {{ a = [a, a] }}\n",
        counter(19),
        counter(40)
    );

    for expansion in [
        "a.join('')",
        "'' + a",
        "String(a)",
        "console.log(a)",
        "groupBy([{ k: a }], 'k')",
        "a",
    ] {
        let outcome = run_sandbox_script(&dataset, &dataset.columns, &format!("{setup}{expansion}"));
        assert!(!outcome.success, "{expansion} should fail");
        assert_eq!(outcome.error_code.as_deref(), Some("TIMEOUT"), "{expansion}");
        assert_eq!(outcome.log_output, vec!["start".to_string()], "{expansion}");
    }
}

// ============================================================================
// Session
// ============================================================================

#[test]
fn test_session_discards_superseded_profile() {
    let session = Arc::new(ProfileSession::new(
        ProfilerConfig::default(),
        SandboxConfig::default(),
    ));
    session.replace_dataset(load_people(), None);
    let first = session.profile().unwrap();
    assert_eq!(first.generation, 1);

    let generation = session.replace_dataset(load_sales(), None);
    assert_eq!(generation, 2);
    assert!(session.cached_profile().is_none());

    let stale = (*first).clone();
    assert!(session.commit_profile(stale).unwrap_err().is_superseded());

    let second = session.profile_in_background().unwrap().join().unwrap().unwrap();
    assert_eq!(second.generation, 2);
    assert_eq!(second.overview.total_rows, 6);

    let outcome = session.run_script("data.length").unwrap();
    assert_eq!(outcome.result, Some(json!(6)));
}
