//! Error and diagnostic types for the Open-SAS interpreter.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity level for diagnostics, in SAS log vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Informational message (row counts, table creation).
    Note,
    /// Warning (execution continues).
    Warning,
    /// Error (the offending row, statement, or step is skipped).
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note => write!(f, "NOTE"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error kinds
// ---------------------------------------------------------------------------

/// Categories of errors, matching the interpreter's recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // -- Macro preprocessing (fatal, abort preprocessing) --
    /// Malformed macro construct (unterminated `%macro`, `%do`, …).
    MacroSyntax,
    /// Macro expansion exceeded the recursion depth limit.
    MacroRecursionLimit,

    // -- Parsing (per-statement recoverable) --
    /// Malformed statement.
    Parse,
    /// Unrecognized top-level keyword.
    UnknownStatement,

    // -- Evaluation (per-row recoverable via `_ERROR_`) --
    /// Type mismatch, unknown variable, division by zero.
    Eval,

    // -- Step resolution (fatal to the step only) --
    /// MERGE input not sorted by the BY keys.
    UnsortedMerge,
    /// Referenced table does not exist.
    TableNotFound,
    /// Table store I/O failure.
    Io,

    // -- Procedures (recoverable, step skipped) --
    /// No procedure registered under this name.
    UnknownProcedure,

    // -- Internal --
    /// Should not happen.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MacroSyntax => write!(f, "macro syntax error"),
            Self::MacroRecursionLimit => write!(f, "macro recursion limit"),
            Self::Parse => write!(f, "parse error"),
            Self::UnknownStatement => write!(f, "unknown statement"),
            Self::Eval => write!(f, "evaluation error"),
            Self::UnsortedMerge => write!(f, "merge input not sorted"),
            Self::TableNotFound => write!(f, "table not found"),
            Self::Io => write!(f, "I/O error"),
            Self::UnknownProcedure => write!(f, "unknown procedure"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// An error produced by the preprocessor, parser, or execution engine.
#[derive(Debug, Clone)]
pub struct InterpreterError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// 1-based source line, if known.
    pub line: Option<u32>,
}

impl InterpreterError {
    /// Create a new error.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    /// Attach a source line.
    #[must_use]
    pub const fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Whether this error aborts the whole preprocessing phase.
    #[must_use]
    pub const fn is_fatal_to_program(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::MacroSyntax | ErrorKind::MacroRecursionLimit
        )
    }
}

impl fmt::Display for InterpreterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = self.line {
            write!(f, "line {line}: ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for InterpreterError {}

/// Convenience result alias.
pub type InterpResult<T> = Result<T, InterpreterError>;

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// One entry in the log presented to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// NOTE, WARNING, or ERROR.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// 1-based source line, if known.
    pub line: Option<u32>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}

/// Ordered diagnostic list accumulated over one interpreter run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record a NOTE.
    pub fn note(&mut self, message: impl Into<String>) {
        self.push(Severity::Note, message, None);
    }

    /// Record a WARNING.
    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message, None);
    }

    /// Record an ERROR.
    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message, None);
    }

    /// Record an entry with an explicit severity and line.
    pub fn push(&mut self, severity: Severity, message: impl Into<String>, line: Option<u32>) {
        self.entries.push(Diagnostic {
            severity,
            message: message.into(),
            line,
        });
    }

    /// Record an [`InterpreterError`] as an ERROR entry.
    pub fn push_error(&mut self, err: &InterpreterError) {
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            message: err.message.clone(),
            line: err.line,
        });
    }

    /// All entries, in order.
    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Whether any ERROR-severity entry was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    /// Take all entries, leaving the list empty.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
