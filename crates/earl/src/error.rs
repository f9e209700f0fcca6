//! Single error type shared by the lexer, parser, and evaluator: one struct
//! carrying a message, a source location, and a closed set of kinds, rather
//! than a tree of exception classes.

use std::fmt;
use std::rc::Rc;

/// Closed set of error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    Syntax,
    Type,
    Redeclared,
    Undeclared,
    Todo,
    Fatal,
    Internal,
}

impl ErrorKind {
    /// `Try` statements catch every kind except these two.
    #[must_use]
    pub fn is_catchable(self) -> bool {
        !matches!(self, Self::Internal | Self::Syntax)
    }
}

/// A position in a source file, used to anchor every error to the offending token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: Rc<str>,
    pub line: u32,
    pub col: u32,
}

impl SourceLoc {
    #[must_use]
    pub fn new(file: Rc<str>, line: u32, col: u32) -> Self {
        Self { file, line, col }
    }

    /// Used for errors synthesized away from any real token (e.g. library embedding).
    #[must_use]
    pub fn unknown() -> Self {
        Self { file: Rc::from("<unknown>"), line: 0, col: 0 }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// The one error type propagated out of every evaluator call.
#[derive(Debug, Clone)]
pub struct EarlError {
    pub kind: ErrorKind,
    pub message: String,
    pub loc: SourceLoc,
}

impl EarlError {
    #[must_use]
    pub fn new(kind: ErrorKind, loc: SourceLoc, message: impl Into<String>) -> Self {
        Self { kind, loc, message: message.into() }
    }

    #[must_use]
    pub fn ty(loc: SourceLoc, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, loc, message)
    }

    #[must_use]
    pub fn undeclared(loc: SourceLoc, name: &str) -> Self {
        Self::new(ErrorKind::Undeclared, loc, format!("undeclared identifier `{name}`"))
    }

    #[must_use]
    pub fn redeclared(loc: SourceLoc, name: &str) -> Self {
        Self::new(ErrorKind::Redeclared, loc, format!("`{name}` is already declared in this scope"))
    }

    #[must_use]
    pub fn fatal(loc: SourceLoc, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, loc, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, SourceLoc::unknown(), message)
    }

    #[must_use]
    pub fn syntax(loc: SourceLoc, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, loc, message)
    }
}

impl fmt::Display for EarlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} at {}", self.kind, self.message, self.loc)
    }
}

impl std::error::Error for EarlError {}

/// Result alias used throughout the evaluator and supporting stages.
pub type EarlResult<T> = Result<T, EarlError>;
