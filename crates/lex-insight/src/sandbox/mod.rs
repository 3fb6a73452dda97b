//! Sandboxed script evaluator.
//!
//! Scripts are written in a small JavaScript-flavoured language and run by
//! an explicit interpreter. The only bindings a script can reach are the
//! read-only `data` rows, the `columns` list, a restricted `Math` library,
//! `console.log` and the dataset primitives `filter`, `map`, `reduce`,
//! `groupBy` and `aggregate`. There is no filesystem, network or
//! environment access.
//!
//! Every run is bounded by a step budget, a wall-clock timeout, a call depth
//! limit and output caps (see [`SandboxConfig`]). Evaluation happens on a
//! dedicated thread behind `catch_unwind`, so no script can take the host
//! down. Every failure comes back as a [`ScriptOutcome`] with
//! `success == false`.
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_insight::run_sandbox_script;
//!
//! let outcome = run_sandbox_script(&dataset, &dataset.columns, "aggregate('price', 'sum')");
//! assert!(outcome.success);
//! ```

mod ast;
mod builtins;
mod error;
mod interpreter;
mod lexer;
mod parser;
mod value;

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SandboxConfig;
use crate::dataset::Dataset;

pub use builtins::AggregateOp;
pub use error::SandboxError;

use interpreter::Interpreter;

/// Stack reserved for the evaluator thread.
const EVALUATOR_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Sandbox behind [`run_sandbox_script`].
static SHARED_SANDBOX: Lazy<Sandbox> = Lazy::new(Sandbox::default);

/// Result of one script run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptOutcome {
    pub success: bool,

    /// Value of the script, if it produced one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Stable code of the failure (`SYNTAX_ERROR`, `TIMEOUT`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Lines written with `console.log`, kept even when the run fails
    pub log_output: Vec<String>,

    pub duration_ms: u64,

    /// Evaluation steps consumed
    pub steps: u64,
}

impl ScriptOutcome {
    fn from_evaluation(evaluation: Evaluation, duration_ms: u64) -> Self {
        let Evaluation {
            result,
            logs,
            steps,
        } = evaluation;
        match result {
            Ok(result) => Self {
                success: true,
                result,
                error: None,
                error_code: None,
                log_output: logs,
                duration_ms,
                steps,
            },
            Err(err) => Self {
                success: false,
                result: None,
                error: Some(err.to_string()),
                error_code: Some(err.error_code().to_string()),
                log_output: logs,
                duration_ms,
                steps,
            },
        }
    }
}

struct Evaluation {
    result: Result<Option<serde_json::Value>, SandboxError>,
    logs: Vec<String>,
    steps: u64,
}

impl Evaluation {
    fn failed(err: SandboxError) -> Self {
        Self {
            result: Err(err),
            logs: Vec::new(),
            steps: 0,
        }
    }
}

/// Runs scripts one at a time against dataset snapshots.
///
/// [`Sandbox::run`] rejects a request arriving while another script is
/// running with [`SandboxError::Busy`]; [`Sandbox::run_queued`] waits for it
/// to finish instead.
#[derive(Debug, Default)]
pub struct Sandbox {
    config: SandboxConfig,
    running: Mutex<()>,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            running: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Whether a script is currently running.
    pub fn is_busy(&self) -> bool {
        self.running.is_locked()
    }

    /// Run `source` against `dataset`. Never panics and never mutates the
    /// dataset; every failure is reported in the outcome.
    pub fn run(&self, dataset: &Dataset, columns: &[String], source: &str) -> ScriptOutcome {
        let Some(guard) = self.running.try_lock() else {
            warn!("Rejected script: sandbox is busy");
            return ScriptOutcome::from_evaluation(Evaluation::failed(SandboxError::Busy), 0);
        };
        self.run_locked(guard, dataset, columns, source)
    }

    /// Like [`Sandbox::run`], but waits for a running script to finish
    /// instead of rejecting the request.
    pub fn run_queued(&self, dataset: &Dataset, columns: &[String], source: &str) -> ScriptOutcome {
        let guard = self.running.lock();
        self.run_locked(guard, dataset, columns, source)
    }

    fn run_locked(
        &self,
        _guard: MutexGuard<'_, ()>,
        dataset: &Dataset,
        columns: &[String],
        source: &str,
    ) -> ScriptOutcome {
        let started = Instant::now();
        debug!(
            rows = dataset.len(),
            source_len = source.len(),
            "Running sandbox script"
        );

        let config = &self.config;
        let joined = std::thread::scope(|scope| {
            std::thread::Builder::new()
                .name("lex-insight-sandbox".to_string())
                .stack_size(EVALUATOR_STACK_SIZE)
                .spawn_scoped(scope, || {
                    catch_unwind(AssertUnwindSafe(|| evaluate(config, dataset, columns, source)))
                })
                .map(|handle| handle.join())
        });

        let evaluation = match joined {
            Ok(Ok(Ok(evaluation))) => evaluation,
            Ok(Ok(Err(panic))) | Ok(Err(panic)) => {
                Evaluation::failed(SandboxError::Panicked(panic_message(&*panic)))
            }
            Err(err) => Evaluation::failed(SandboxError::Panicked(format!(
                "could not start evaluator thread: {err}"
            ))),
        };

        let outcome =
            ScriptOutcome::from_evaluation(evaluation, started.elapsed().as_millis() as u64);
        match &outcome.error {
            None => debug!(
                steps = outcome.steps,
                duration_ms = outcome.duration_ms,
                "Script finished"
            ),
            Some(error) => warn!(
                code = outcome.error_code.as_deref().unwrap_or_default(),
                "Script failed: {}",
                error
            ),
        }
        outcome
    }
}

fn evaluate(
    config: &SandboxConfig,
    dataset: &Dataset,
    columns: &[String],
    source: &str,
) -> Evaluation {
    let program = match parser::parse(source) {
        Ok(program) => program,
        Err(err) => return Evaluation::failed(err),
    };
    let mut interpreter = Interpreter::new(config, dataset, columns);
    let result = interpreter.run(&program);
    Evaluation {
        result,
        logs: interpreter.take_logs(),
        steps: interpreter.steps(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "evaluator panicked".to_string())
}

/// Run a script with the default limits on the process-wide sandbox.
/// Concurrent callers are served one at a time.
pub fn run_sandbox_script(dataset: &Dataset, columns: &[String], source: &str) -> ScriptOutcome {
    SHARED_SANDBOX.run_queued(dataset, columns, source)
}

static_assertions::assert_impl_all!(Sandbox: Send, Sync);
