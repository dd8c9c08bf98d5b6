//! Structured diagnostics for the compiler front end.
//!
//! Errors and warnings carry an optional 1-indexed source location and
//! format as
//! ```text
//! 3:14: use of undeclared variable `x`
//! ```

use std::fmt;

use simulator_core::ProgrammingLanguage;
use thiserror::Error;

/// A position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLocation {
    /// 1-indexed line number.
    pub line: usize,
    /// 1-indexed column number, counted in characters.
    pub column: usize,
}

impl SourceLocation {
    /// Creates a location.
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Classification of compile errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    /// A character no token starts with.
    #[error("unexpected character `{0}`")]
    UnexpectedCharacter(char),
    /// String literal missing its closing quote.
    #[error("unterminated string literal")]
    UnterminatedString,
    /// Block comment missing its closing `*/`.
    #[error("unterminated block comment")]
    UnterminatedComment,
    /// Numeric literal that does not fit or does not parse.
    #[error("invalid number literal `{0}`")]
    InvalidNumber(String),
    /// Token other than the one the grammar needs.
    #[error("expected {expected}, found `{found}`")]
    UnexpectedToken {
        /// What the parser wanted.
        expected: &'static str,
        /// Text of the token it got.
        found: String,
    },
    /// Input ended early.
    #[error("expected {0}, found end of input")]
    UnexpectedEof(&'static str),
    /// Valid C the front end does not handle.
    #[error("unsupported construct: {0}")]
    Unsupported(String),
    /// Read of a name with no declaration in scope.
    #[error("use of undeclared variable `{0}`")]
    UndeclaredVariable(String),
    /// Second declaration of a name in the same scope.
    #[error("redeclaration of `{0}` in the same scope")]
    Redeclaration(String),
    /// Assignment to a name with no declaration in scope.
    #[error("assignment to undeclared variable `{0}`")]
    AssignmentToUndeclared(String),
    /// String literal outside a call argument.
    #[error("string literal can only be passed to a function")]
    StringAsValue,
    /// More variables than the data region holds.
    #[error("program needs {0} memory slots, more than the data region holds")]
    OutOfDataMemory(usize),
    /// Parentheses, negations, blocks or operator chains nested past the limit.
    #[error("nested more than {0} levels deep")]
    NestingTooDeep(usize),
    /// Code generation produced an operand pair with no encoding.
    #[error("cannot encode `{0}`")]
    Unencodable(String),
}

/// A compile error with optional source context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// The kind of error.
    pub kind: CompileErrorKind,
    /// Source location if available.
    pub location: Option<SourceLocation>,
}

impl CompileError {
    /// Creates an error without a location.
    #[must_use]
    pub const fn new(kind: CompileErrorKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    /// Creates an error at `location`.
    #[must_use]
    pub const fn at(kind: CompileErrorKind, location: SourceLocation) -> Self {
        Self {
            kind,
            location: Some(location),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{loc}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<CompileErrorKind> for CompileError {
    fn from(kind: CompileErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Classification of non-fatal diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// Declared variable never read.
    UnusedVariable(String),
    /// Call to a function with no definition in the program.
    UndefinedFunction(String),
    /// Function body skipped by code generation.
    FunctionNotLowered(String),
    /// Source compiled with the C front end.
    ForeignLanguage(ProgrammingLanguage),
    /// Division by a constant zero left for the CPU to fault on.
    DivisionByZero,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnusedVariable(name) => write!(f, "variable `{name}` is never read"),
            Self::UndefinedFunction(name) => write!(
                f,
                "function `{name}` has no definition; the call is not executed"
            ),
            Self::FunctionNotLowered(name) => write!(
                f,
                "function `{name}` is not lowered; only `main` and top-level statements run"
            ),
            Self::ForeignLanguage(language) => write!(
                f,
                "{} source is compiled with the C front end",
                language.display_name()
            ),
            Self::DivisionByZero => write!(f, "division by zero will fault at run time"),
        }
    }
}

/// A warning with optional source context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileWarning {
    /// The kind of warning.
    pub kind: WarningKind,
    /// Source location if available.
    pub location: Option<SourceLocation>,
}

impl CompileWarning {
    /// Creates a warning without a location.
    #[must_use]
    pub const fn new(kind: WarningKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    /// Creates a warning at `location`.
    #[must_use]
    pub const fn at(kind: WarningKind, location: SourceLocation) -> Self {
        Self {
            kind,
            location: Some(location),
        }
    }
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{loc}: warning: {}", self.kind),
            None => write!(f, "warning: {}", self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use simulator_core::ProgrammingLanguage;

    use super::{
        CompileError, CompileErrorKind, CompileWarning, SourceLocation, WarningKind,
    };

    #[test]
    fn errors_format_with_location_prefix() {
        let err = CompileError::at(
            CompileErrorKind::UndeclaredVariable("x".into()),
            SourceLocation::new(3, 14),
        );
        assert_eq!(err.to_string(), "3:14: use of undeclared variable `x`");
        let bare = CompileError::new(CompileErrorKind::UnterminatedComment);
        assert_eq!(bare.to_string(), "unterminated block comment");
    }

    #[test]
    fn warnings_name_the_language() {
        let warning = CompileWarning {
            kind: WarningKind::ForeignLanguage(ProgrammingLanguage::Python),
            location: None,
        };
        assert_eq!(
            warning.to_string(),
            "warning: Python source is compiled with the C front end"
        );
    }
}
