//! Error and warning types for linker script parsing and evaluation.

use membrowse_common::BoxedSource;
use std::fmt;

/// Where in a multi-file script a diagnostic occurred.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{loc}: {kind}")]
pub struct LinkerParseError {
    pub loc: SourceLoc,
    pub kind: LinkerParseErrorKind,
    #[source]
    pub source: Option<BoxedSource>,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkerParseErrorKind {
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("unexpected end of input, expected {0}")]
    UnexpectedEof(&'static str),
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },
    #[error("malformed numeric literal {0:?}")]
    MalformedNumber(String),
}

impl LinkerParseError {
    pub fn new(loc: SourceLoc, kind: LinkerParseErrorKind) -> Self {
        LinkerParseError {
            loc,
            kind,
            source: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{loc}: {kind}")]
pub struct LinkerEvalError {
    pub loc: SourceLoc,
    pub kind: LinkerEvalErrorKind,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkerEvalErrorKind {
    #[error("undefined symbol {0:?}")]
    UndefinedSymbol(String),
    #[error("unknown function {0:?}")]
    UnknownFunction(String),
    #[error("function {name} expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: &'static str,
        expected: &'static str,
        got: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow evaluating expression")]
    Overflow,
    #[error("reference to unknown memory region {0:?}")]
    UnknownRegion(String),
    #[error("unresolved value for {0:?} (forward reference not settled by second pass)")]
    Unresolved(String),
}

/// A non-fatal condition surfaced in the JSON contract's `meta.warnings`, per the error
/// taxonomy's "linker script issues that do not abort analysis" tier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkerWarning {
    pub kind: LinkerWarningKind,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkerWarningKind {
    DuplicateRegion,
    UnknownDirective,
    SuspiciousHierarchy,
}

impl LinkerWarningKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkerWarningKind::DuplicateRegion => "duplicate_region",
            LinkerWarningKind::UnknownDirective => "unknown_directive",
            LinkerWarningKind::SuspiciousHierarchy => "suspicious_hierarchy",
        }
    }
}

impl LinkerWarning {
    pub fn new(kind: LinkerWarningKind, message: impl Into<String>) -> Self {
        LinkerWarning {
            kind,
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
}
