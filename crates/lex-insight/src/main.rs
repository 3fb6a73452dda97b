//! CLI entry point for the profiling engine and script sandbox.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use indexmap::IndexMap;
use lex_insight::utils::{format_bytes, format_number};
use lex_insight::{
    ClosureProgressReporter, ColumnOutliers, ColumnType, CorrelationMatrix, DataProfile, Dataset,
    OutlierMethod, ProfileSession, ProfilerConfig, ProgressUpdate, SandboxConfig, ScriptOutcome,
    read_csv,
};
use tracing::{debug, info};

/// CLI-compatible outlier method enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOutlierMethod {
    /// Interquartile range fences
    Iqr,
    /// Distance from the mean in standard deviations
    Zscore,
}

impl From<CliOutlierMethod> for OutlierMethod {
    fn from(cli: CliOutlierMethod) -> Self {
        match cli {
            CliOutlierMethod::Iqr => OutlierMethod::Iqr,
            CliOutlierMethod::Zscore => OutlierMethod::ZScore,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author = "Lex Machina Team",
    version,
    about = "Statistical profiling and sandboxed scripting for tabular data",
    long_about = "Profile CSV or JSON datasets, detect outliers, compute correlations \
                  and run sandboxed scripts against the rows.\n\n\
                  EXAMPLES:\n  \
                  # Full profile\n  \
                  lex-insight profile data.csv\n\n  \
                  # Outliers with a custom multiplier\n  \
                  lex-insight outliers data.csv -c age -c income --method zscore -k 2.5\n\n  \
                  # Run a script\n  \
                  lex-insight script data.csv -e \"aggregate('price', 'sum')\"\n\n  \
                  # Machine-readable output\n  \
                  lex-insight --json profile data.csv | jq .overview"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and the result)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output JSON to stdout instead of a human-readable summary
    ///
    /// Disables all logs; only the result is written.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the full profile of a dataset
    Profile {
        /// CSV or JSON (array of objects) file
        input: PathBuf,

        /// Column type override, e.g. `--type zip=string`
        #[arg(short = 't', long = "type", value_name = "COLUMN=TYPE")]
        types: Vec<String>,

        /// Rows sampled per column for type inference
        #[arg(long, default_value = "100")]
        sample_rows: usize,

        /// Compute correlations over every row instead of a prefix sample
        #[arg(long)]
        full_correlations: bool,
    },

    /// Detect outliers in numeric columns
    Outliers {
        input: PathBuf,

        /// Column to check (repeatable)
        #[arg(short, long = "column", required = true)]
        columns: Vec<String>,

        #[arg(short, long, value_enum, default_value = "iqr")]
        method: CliOutlierMethod,

        /// Multiplier; defaults to 1.5 for IQR and 3 for z-score
        #[arg(short)]
        k: Option<f64>,
    },

    /// Compute the Pearson correlation matrix
    Correlate {
        input: PathBuf,

        /// Column to include (repeatable); defaults to every numeric column
        #[arg(short, long = "column")]
        columns: Vec<String>,
    },

    /// Run a sandboxed script against the dataset
    Script {
        input: PathBuf,

        /// Script source
        #[arg(short = 'e', long = "eval", conflicts_with = "file")]
        source: Option<String>,

        /// Read the script from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Evaluation step budget
        #[arg(long, default_value = "5000000")]
        max_steps: u64,

        /// Wall-clock limit in milliseconds
        #[arg(long, default_value = "2000")]
        timeout_ms: u64,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    // Load environment variables from .env file (RUST_LOG)
    dotenv().ok();

    match &args.command {
        Command::Profile {
            input,
            types,
            sample_rows,
            full_correlations,
        } => {
            let mut builder = ProfilerConfig::builder().type_sample_rows(*sample_rows);
            if *full_correlations {
                builder = builder.correlation_sample_rows(None);
            }
            let session = ProfileSession::new(builder.build()?, SandboxConfig::default())
                .with_reporter(Arc::new(ClosureProgressReporter::new(
                    |update: ProgressUpdate| {
                        info!(
                            "[{:>3.0}%] {}: {}",
                            update.progress * 100.0,
                            update.stage.display_name(),
                            update.message
                        );
                    },
                )));
            session.replace_dataset(load_dataset(input)?, Some(parse_type_overrides(types)?));

            let profile = session.profile()?;
            if args.json {
                print_json(&*profile)?;
            } else {
                print_profile(&profile, input);
            }
        }

        Command::Outliers {
            input,
            columns,
            method,
            k,
        } => {
            let session = ProfileSession::default();
            session.replace_dataset(load_dataset(input)?, None);

            let results = session.detect_outliers(columns.as_slice(), (*method).into(), *k)?;
            if args.json {
                print_json(&results)?;
            } else {
                print_outliers(&results);
            }
        }

        Command::Correlate { input, columns } => {
            let session = ProfileSession::default();
            session.replace_dataset(load_dataset(input)?, None);

            let columns: Vec<String> = if columns.is_empty() {
                let snapshot = session.snapshot()?;
                snapshot
                    .column_types()
                    .iter()
                    .filter(|(_, ty)| **ty == ColumnType::Number)
                    .map(|(name, _)| name.clone())
                    .collect()
            } else {
                columns.clone()
            };
            info!("Correlating {} columns", columns.len());

            let matrix = session.calculate_correlations(columns.as_slice())?;
            if args.json {
                print_json(&matrix)?;
            } else {
                print_correlations(&matrix);
            }
        }

        Command::Script {
            input,
            source,
            file,
            max_steps,
            timeout_ms,
        } => {
            let source = match (source, file) {
                (Some(source), _) => source.clone(),
                (None, Some(path)) => std::fs::read_to_string(path)
                    .with_context(|| format!("Could not read script '{}'", path.display()))?,
                (None, None) => return Err(anyhow!("Provide a script with --eval or --file")),
            };
            let sandbox = SandboxConfig::builder()
                .max_steps(*max_steps)
                .timeout_ms(*timeout_ms)
                .build()?;
            let session = ProfileSession::new(ProfilerConfig::default(), sandbox);
            session.replace_dataset(load_dataset(input)?, None);

            let outcome = session.run_script(&source)?;
            if args.json {
                print_json(&outcome)?;
            } else {
                print_outcome(&outcome);
            }
            if !outcome.success {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Load a dataset from a `.json` array of objects or a CSV file.
fn load_dataset(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(anyhow!("Input file not found: {}", path.display()));
    }

    info!("Loading dataset from: {}", path.display());
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let dataset = if is_json {
        let content = std::fs::read_to_string(path)?;
        Dataset::from_json_str(&content)?
    } else {
        let df = read_csv(path)?;
        debug!("CSV shape: {:?}", df.shape());
        Dataset::from_dataframe(&df)?
    };

    info!(
        "Dataset loaded successfully: {} rows x {} columns",
        dataset.len(),
        dataset.column_count()
    );
    Ok(dataset)
}

/// Parse `column=type` overrides.
fn parse_type_overrides(raw: &[String]) -> Result<IndexMap<String, ColumnType>> {
    raw.iter()
        .map(|entry| {
            let (column, ty) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected COLUMN=TYPE, got '{}'", entry))?;
            Ok((column.trim().to_string(), ty.parse::<ColumnType>()?))
        })
        .collect()
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// Human-readable output below uses `println!` intentionally: it is the
// command's result and must show regardless of log level.

fn print_profile(profile: &DataProfile, input: &Path) {
    let overview = &profile.overview;

    println!("\n{}", "=".repeat(80));
    println!("DATASET PROFILE");
    println!("{}\n", "=".repeat(80));

    println!("  File: {}", input.display());
    println!("  Rows: {}", overview.total_rows);
    println!("  Columns: {}", overview.total_columns);
    println!("  Memory: {}", format_bytes(overview.memory_bytes));
    println!(
        "  Duplicate rows: {} ({:.2}%)",
        overview.duplicate_row_count, overview.duplicate_row_pct
    );
    println!("  Completeness: {:.2}%", overview.completeness_pct);
    println!();

    println!("COLUMN PROFILES");
    println!("{}", "-".repeat(40));
    println!(
        "{:<20} {:<10} {:<10} {:<10} {:<14} {:<14}",
        "Column", "Type", "Missing %", "Unique", "Mean", "Std"
    );
    println!("{}", "-".repeat(80));
    for column in profile.columns.values() {
        let (mean, std) = column.numeric.as_ref().map_or_else(
            || ("-".to_string(), "-".to_string()),
            |n| (n.mean.to_string(), n.std.to_string()),
        );
        println!(
            "{:<20} {:<10} {:<10.2} {:<10} {:<14} {:<14}",
            truncate_str(&column.name, 19),
            column.column_type,
            column.missing_pct,
            column.unique,
            truncate_str(&mean, 13),
            truncate_str(&std, 13)
        );
    }
    println!();

    if !profile.issues.is_empty() {
        println!("QUALITY ISSUES");
        println!("{}", "-".repeat(40));
        for issue in &profile.issues {
            println!(
                "  [{}] {} ({})",
                issue.severity,
                issue.description,
                issue.column.as_deref().unwrap_or("dataset")
            );
            println!("      -> {}", issue.suggestion);
        }
        println!();
    }

    if !profile.failed_columns.is_empty() {
        println!("SKIPPED COLUMNS");
        println!("{}", "-".repeat(40));
        for failure in &profile.failed_columns {
            println!("  ! {}: {}", failure.column, failure.reason);
        }
        println!();
    }

    if !profile.correlations.is_empty() {
        print_correlations(&profile.correlations);
    }

    println!("Use --json for machine-readable output");
    println!("{}", "=".repeat(80));
}

fn print_outliers(results: &[ColumnOutliers]) {
    for result in results {
        println!(
            "{} ({}, k = {}): {} of {} values",
            result.column,
            result.method,
            format_number(result.k),
            result.count(),
            result.values_checked
        );
        if let Some(bounds) = result.bounds {
            println!(
                "  bounds: [{}, {}]",
                format_number(bounds.lower),
                format_number(bounds.upper)
            );
        }
        for point in result.outliers.iter().take(20) {
            println!("  row {:>6}: {}", point.row, format_number(point.value));
        }
        if result.count() > 20 {
            println!("  ... and {} more", result.count() - 20);
        }
    }
}

fn print_correlations(matrix: &CorrelationMatrix) {
    println!("CORRELATIONS");
    println!("{}", "-".repeat(40));
    if matrix.is_empty() {
        println!("  (no numeric columns)");
        return;
    }
    if matrix.sampled {
        println!(
            "  Sampled {} of {} rows",
            matrix.rows_used, matrix.total_rows
        );
    }

    print!("{:<16}", "");
    for column in &matrix.columns {
        print!(" {:>10}", truncate_str(column, 10));
    }
    println!();
    for a in &matrix.columns {
        print!("{:<16}", truncate_str(a, 15));
        for b in &matrix.columns {
            print!(" {:>10.4}", matrix.get(a, b).unwrap_or_default());
        }
        println!();
    }
    println!();
}

fn print_outcome(outcome: &ScriptOutcome) {
    for line in &outcome.log_output {
        println!("{line}");
    }
    if outcome.success {
        match &outcome.result {
            Some(result) => println!(
                "=> {}",
                serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
            ),
            None => println!("=> (no result)"),
        }
    } else {
        println!(
            "Error [{}]: {}",
            outcome.error_code.as_deref().unwrap_or("UNKNOWN"),
            outcome.error.as_deref().unwrap_or_default()
        );
    }
    println!("({} steps, {}ms)", outcome.steps, outcome.duration_ms);
}

/// Truncate a string to max length with ellipsis
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
