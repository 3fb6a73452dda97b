//! Failures a script run can end with.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    /// The script could not be parsed.
    #[error("SyntaxError: {message} (line {line}, column {column})")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    /// An error raised while evaluating user logic (bad types, unknown names).
    #[error("{}", format_runtime(.message, .line))]
    Runtime { message: String, line: Option<usize> },

    /// A value thrown by the script with `throw`.
    #[error("Uncaught {0}")]
    Thrown(String),

    /// Unknown column reference or unsupported operation name.
    #[error("InputError: {0}")]
    Input(String),

    /// Step budget, time budget, call depth or output limit exceeded.
    #[error("{0}")]
    ResourceExhausted(String),

    /// Another script is already running.
    #[error("Sandbox is busy running another script")]
    Busy,

    /// The evaluator itself failed; the host is unaffected.
    #[error("Internal sandbox error: {0}")]
    Panicked(String),
}

fn format_runtime(message: &str, line: &Option<usize>) -> String {
    match line {
        Some(line) => format!("{message} (line {line})"),
        None => message.to_string(),
    }
}

impl SandboxError {
    pub(crate) fn runtime(message: impl Into<String>, line: Option<usize>) -> Self {
        Self::Runtime {
            message: message.into(),
            line,
        }
    }

    pub(crate) fn type_error(message: impl AsRef<str>, line: Option<usize>) -> Self {
        Self::runtime(format!("TypeError: {}", message.as_ref()), line)
    }

    pub(crate) fn reference_error(name: &str, line: Option<usize>) -> Self {
        Self::runtime(format!("ReferenceError: {name} is not defined"), line)
    }

    /// Get error code for frontend handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "SYNTAX_ERROR",
            Self::Runtime { .. } => "RUNTIME_ERROR",
            Self::Thrown(_) => "SCRIPT_ERROR",
            Self::Input(_) => "INPUT_ERROR",
            Self::ResourceExhausted(_) => "TIMEOUT",
            Self::Busy => "SANDBOX_BUSY",
            Self::Panicked(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the failure came from exceeding a limit.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_))
    }
}
