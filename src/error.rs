//! Error taxonomy shared by the compiler and the VM.
//!
//! Compilation errors accumulate in an [`ErrorReporter`]; any non-zero count
//! fails compilation. Runtime errors are returned from the
//! dispatch loop and also stashed on the interpreter as `last_error`.

use alloc::{
    string::String,
    sync::Arc,
    vec::Vec,
};
use core::fmt;

/// Coarse error taxonomy used across the compiler and the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Surface syntax error (reported by the external lexer/parser).
    Parse,
    /// Type-checking failure (reported by the external type oracle).
    Type,
    /// Bytecode compiler failure (bad jump target, unresolvable intrinsic, ...).
    Compile,
    /// Arithmetic overflow, bad cast, or other value-level failure.
    Value,
    /// Unresolved module or export name.
    Name,
    /// Module file I/O failure.
    Io,
    /// Defect in the VM itself; should never surface to well-formed programs.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Type => "type",
            ErrorKind::Compile => "compile",
            ErrorKind::Value => "value",
            ErrorKind::Name => "name",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A source location attached to a compiled chunk at emission time.
///
/// `file` is the tag recorded for the chunk being compiled; a runtime error
/// always carries the file of the chunk that was executing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: Arc<str>, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }

    pub const fn unknown(file: Arc<str>) -> Self {
        Self {
            file,
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A runtime error object, as populated into `last_error` by the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "{kind}: {message} ({location})")]
pub struct ErrorObject {
    pub kind: ErrorKind,
    pub message: String,
    pub location: SourceLocation,
}

impl ErrorObject {
    pub fn new(kind: ErrorKind, message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
        }
    }
}

/// A single compile-time diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "{kind}: {message}")]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

/// Accumulates compiler diagnostics; the presence of any error fails
/// compilation.
#[derive(Debug, Default, Clone)]
pub struct ErrorReporter {
    errors: Vec<CompileError>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: CompileError) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    /// Consumes the reporter, producing `Ok(())` iff no errors were recorded.
    pub fn into_result(self) -> Result<(), Vec<CompileError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Outcome of a single dispatch-loop run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ok,
    CompileError,
    RuntimeError,
}

/// Result type for operations that can only panic with an [`ErrorKind`]
/// without a location attached yet (the caller fills in the chunk's file tag).
pub type SimpleResult<T> = Result<T, (ErrorKind, String)>;

pub(crate) fn simple_err<T>(kind: ErrorKind, message: impl Into<String>) -> SimpleResult<T> {
    Err((kind, message.into()))
}
