//! Compiler error types.
//!
//! Two tiers: [`ParseError`] for anything the lexer, statement splitter or
//! parser rejects (always positioned at the offending token), and
//! [`CompileError`] for the whole `compile` pipeline, which adds the
//! semantic failures raised by validation, code generation and the linker.
//! Nothing is recovered internally; the first error halts the stage.

use crate::token::Token;
use std::fmt;

/// A syntax-level error with the source position it was detected at.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        ParseError {
            message: message.into(),
            line,
            column,
        }
    }

    /// An error positioned at `token`.
    pub fn at(message: impl Into<String>, token: &Token) -> Self {
        ParseError::new(message, token.line, token.column)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Any failure of the compile pipeline.
#[derive(Debug)]
pub enum CompileError {
    /// Malformed syntax, carrying the offending position.
    Parse(ParseError),
    /// A program that parses but is not well-formed: undefined or duplicate
    /// identifiers, type mismatches, a missing or ill-typed `main`,
    /// inconsistent returns, bad call sites, unresolved link references.
    Semantic(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Parse(e) => write!(f, "{}", e),
            CompileError::Semantic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}
