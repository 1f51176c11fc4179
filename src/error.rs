//! Stage failures and the top-level reporting funnel
//!
//! Every pipeline stage returns a [`StageResult`]. A failure is an
//! [`ErrorRecord`] built where the problem was found and handed back to
//! the reporter untouched; the record alone decides the message prefix and
//! the process exit code.
//!
//! Conditions that escape the pipeline (internal invariant violations,
//! host I/O failures, panics) are caught once in [`funnel`] and all map to
//! exit code 1, each with its own prefix.

use crate::diagnostics::{CompileError, Reporter};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use thiserror::Error;

/// Which external tool role failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStage {
    /// Preprocessor, compiler or assembler
    Compile,
    Link,
}

/// Originating stage of a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Tokenizer,
    Parser,
    Semantic,
    CodeGen,
    Toolchain(ToolStage),
    Unsupported,
    Configuration,
    Io,
    Runtime,
    /// Broken compiler invariant; never expected on valid or invalid input
    Internal(String),
}

impl ErrorKind {
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Tokenizer => 1,
            ErrorKind::Parser | ErrorKind::Semantic => 2,
            ErrorKind::CodeGen => 5,
            ErrorKind::Toolchain(ToolStage::Link) => 10,
            ErrorKind::Toolchain(ToolStage::Compile) => 11,
            ErrorKind::Unsupported
            | ErrorKind::Configuration
            | ErrorKind::Io
            | ErrorKind::Runtime
            | ErrorKind::Internal(_) => 1,
        }
    }

    pub fn prefix(&self) -> &str {
        match self {
            ErrorKind::Tokenizer => "Tokenizing error",
            ErrorKind::Parser => "Parsing error",
            ErrorKind::Semantic => "Semantic error",
            ErrorKind::CodeGen => "Code generation error",
            ErrorKind::Toolchain(_) => "Toolchain error",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::Configuration => "Configuration error",
            ErrorKind::Io => "I/O error",
            ErrorKind::Runtime => "Runtime error",
            ErrorKind::Internal(name) => name,
        }
    }
}

/// A stage failure on its way to the reporter
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub diagnostic: Option<CompileError>,
    pub stacktrace: Option<String>,
}

pub type StageResult<T> = Result<T, ErrorRecord>;

fn capture_stacktrace() -> Option<String> {
    let bt = Backtrace::capture();
    match bt.status() {
        BacktraceStatus::Captured => Some(bt.to_string()),
        _ => None,
    }
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            diagnostic: None,
            stacktrace: capture_stacktrace(),
        }
    }

    fn from_diagnostic(kind: ErrorKind, diagnostic: CompileError) -> Self {
        let mut record = Self::new(kind, diagnostic.to_string());
        record.diagnostic = Some(diagnostic);
        record
    }

    pub fn tokenizer(diagnostic: CompileError) -> Self {
        Self::from_diagnostic(ErrorKind::Tokenizer, diagnostic)
    }

    pub fn parser(diagnostic: CompileError) -> Self {
        Self::from_diagnostic(ErrorKind::Parser, diagnostic)
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::from_diagnostic(
            ErrorKind::Semantic,
            CompileError::Semantic {
                message,
                help: None,
            },
        )
    }

    pub fn semantic_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::from_diagnostic(
            ErrorKind::Semantic,
            CompileError::Semantic {
                message: message.into(),
                help: Some(help.into()),
            },
        )
    }

    pub fn codegen(message: impl Into<String>) -> Self {
        Self::from_diagnostic(
            ErrorKind::CodeGen,
            CompileError::CodeGen {
                message: message.into(),
            },
        )
    }

    /// External tool exited unsuccessfully
    pub fn toolchain(stage: ToolStage, command_line: &str) -> Self {
        Self::new(
            ErrorKind::Toolchain(stage),
            format!("The command '{}' failed.", command_line),
        )
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::new(ErrorKind::Io, format!("{}: {}", path.display(), err))
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    pub fn internal(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(name.into()), message)
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    /// Format for the diagnostic stream
    pub fn render(&self, color: bool, show_stacktrace: bool) -> String {
        let mut out = String::new();
        if show_stacktrace {
            if let Some(trace) = &self.stacktrace {
                out.push_str("Traceback (most recent call last):\n");
                out.push_str(trace);
                if !trace.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
        match &self.kind {
            ErrorKind::Toolchain(_) => out.push_str(&self.message),
            kind => {
                out.push_str(kind.prefix());
                out.push_str(": ");
                out.push_str(&self.message);
            }
        }
        if let Some(diagnostic) = &self.diagnostic {
            if matches!(
                diagnostic,
                CompileError::Semantic { help: Some(_), .. }
                    | CompileError::InvalidToken { .. }
                    | CompileError::UnterminatedString { .. }
                    | CompileError::UnexpectedToken { .. }
                    | CompileError::UnexpectedEof { .. }
                    | CompileError::MismatchedEnd { .. }
            ) {
                out.push('\n');
                out.push_str(&Reporter::new(color).render(diagnostic));
            }
        }
        out
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.prefix(), self.message)
    }
}

impl std::error::Error for ErrorRecord {}

/// Internal compiler exception
#[derive(Debug, Clone)]
pub struct InternalError {
    pub name: String,
    pub message: String,
    pub stacktrace: Option<String>,
}

/// Everything the top-level handler recognizes
#[derive(Debug, Error)]
pub enum Failure {
    #[error("{}: {}", .0.name, .0.message)]
    Internal(InternalError),
    #[error("runtime_error: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("error: {0}")]
    Other(miette::Report),
}

impl From<miette::Report> for Failure {
    fn from(report: miette::Report) -> Self {
        Failure::Other(report)
    }
}

impl Failure {
    /// Lift an error record that must not be reported as an ordinary stage
    /// failure
    pub fn from_record(record: ErrorRecord) -> Self {
        let name = record.kind.prefix().to_string();
        Failure::Internal(InternalError {
            name,
            message: record.message,
            stacktrace: record.stacktrace,
        })
    }

    pub fn render(&self, show_stacktrace: bool) -> String {
        match self {
            Failure::Internal(err) => {
                let mut out = String::new();
                if show_stacktrace {
                    if let Some(trace) = &err.stacktrace {
                        out.push_str(trace);
                        out.push('\n');
                    }
                }
                out.push_str(&format!("{}: {}", err.name, err.message));
                out
            }
            Failure::Runtime(_) => self.to_string(),
            Failure::Other(report) => format!("error: {:?}", report),
        }
    }
}

/// Prefix used when a panic reaches the funnel
pub const UNKNOWN_EXCEPTION: &str = "Unknown Exception";

/// Run an entry point, converting every escaping condition into an exit code
///
/// Stage failures are expected to be reported by `body` itself and surface
/// here as `Ok(code)`.
pub fn funnel<F>(show_stacktrace: bool, body: F) -> i32
where
    F: FnOnce() -> Result<i32, Failure>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(code)) => code,
        Ok(Err(failure)) => {
            eprintln!("{}", failure.render(show_stacktrace));
            1
        }
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned());
            match detail {
                Some(detail) => tracing::debug!("panic payload: {}", detail),
                None => tracing::debug!("panic with non-string payload"),
            }
            eprintln!("{}", UNKNOWN_EXCEPTION);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ErrorKind::Tokenizer.exit_code(), 1);
        assert_eq!(ErrorKind::Parser.exit_code(), 2);
        assert_eq!(ErrorKind::Semantic.exit_code(), 2);
        assert_eq!(ErrorKind::CodeGen.exit_code(), 5);
        assert_eq!(ErrorKind::Toolchain(ToolStage::Link).exit_code(), 10);
        assert_eq!(ErrorKind::Toolchain(ToolStage::Compile).exit_code(), 11);
        assert_eq!(ErrorKind::Unsupported.exit_code(), 1);
    }

    #[test]
    fn test_toolchain_message() {
        let err = ErrorRecord::toolchain(ToolStage::Link, "gcc -o a.out a.o");
        assert_eq!(err.render(false, false), "The command 'gcc -o a.out a.o' failed.");
    }

    #[test]
    fn test_semantic_prefix() {
        let err = ErrorRecord::semantic("Variable 'y' not declared");
        assert!(err
            .render(false, false)
            .starts_with("Semantic error: Variable 'y' not declared"));
    }

    #[test]
    fn test_funnel_panic_is_exit_one() {
        let prev = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));
        let code = funnel(false, || panic!("boom"));
        panic::set_hook(prev);
        assert_eq!(code, 1);
    }

    #[test]
    fn test_funnel_passes_code_through() {
        assert_eq!(funnel(false, || Ok(2)), 2);
    }

    #[test]
    fn test_failure_prefixes() {
        let internal = Failure::Internal(InternalError {
            name: "AssertFailed".into(),
            message: "bad scope".into(),
            stacktrace: None,
        });
        assert_eq!(internal.render(false), "AssertFailed: bad scope");
        let io = Failure::from(std::io::Error::other("disk"));
        assert!(io.render(false).starts_with("runtime_error: "));
    }
}
