//! Syntax error reporting
//!
//! The parser reports raw [`Diagnostic`]s (a byte offset plus a machine-oriented
//! kind) to an [`ErrorListener`]. [`FormulaErrorListener`] keeps the first one and
//! normalizes it into a single user-facing [`FormulaSyntaxError`] with a line,
//! a column and a readable message.

use crate::error::FormulaSyntaxError;
use std::fmt;

/// Token text used when the error is at end of input
pub const EOF_TOKEN: &str = "<EOF>";

/// What went wrong while scanning or parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A token appeared where something else was required
    UnexpectedToken { expected: &'static str },
    /// Input ended where something else was required
    UnexpectedEnd { expected: &'static str },
    /// Complete expression followed by more input
    TrailingInput,
    /// Character that starts no token
    InvalidCharacter,
    /// Numeric literal that does not fit an f64
    InvalidNumber,
    /// String literal without its closing quote
    UnterminatedString,
    /// `{` without a matching `}`
    UnterminatedFieldReference,
    /// `{}`
    EmptyFieldReference,
    /// `/*` without a matching `*/`
    UnterminatedComment,
    /// Nesting deeper than the parser allows
    TooDeeplyNested { limit: usize },
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::UnexpectedToken { expected } => write!(f, "expected {}", expected),
            DiagnosticKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of formula, expected {}", expected)
            }
            DiagnosticKind::TrailingInput => f.write_str("unexpected input after expression"),
            DiagnosticKind::InvalidCharacter => f.write_str("invalid character"),
            DiagnosticKind::InvalidNumber => f.write_str("invalid number"),
            DiagnosticKind::UnterminatedString => f.write_str("unterminated string literal"),
            DiagnosticKind::UnterminatedFieldReference => {
                f.write_str("unterminated field reference, expected '}'")
            }
            DiagnosticKind::EmptyFieldReference => f.write_str("empty field reference"),
            DiagnosticKind::UnterminatedComment => f.write_str("unterminated block comment"),
            DiagnosticKind::TooDeeplyNested { limit } => {
                write!(f, "formula is nested more than {} levels deep", limit)
            }
        }
    }
}

/// A raw syntax error as produced by the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Byte offset of the offending token
    pub offset: usize,
    /// Offending token text, or [`EOF_TOKEN`]
    pub token: String,
}

/// Receives syntax errors from the parser
pub trait ErrorListener {
    fn syntax_error(&mut self, source: &str, diagnostic: Diagnostic);
}

/// Keeps the first reported error as a [`FormulaSyntaxError`]
#[derive(Debug, Default)]
pub struct FormulaErrorListener {
    error: Option<FormulaSyntaxError>,
}

impl FormulaErrorListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an error has been reported
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// The normalized error, if any
    pub fn into_error(self) -> Option<FormulaSyntaxError> {
        self.error
    }
}

impl ErrorListener for FormulaErrorListener {
    fn syntax_error(&mut self, source: &str, diagnostic: Diagnostic) {
        if self.error.is_some() {
            return;
        }

        let (line, column) = line_column(source, diagnostic.offset);
        let token = &diagnostic.token;
        let message = match &diagnostic.kind {
            DiagnosticKind::UnexpectedToken { expected } => {
                format!("Unexpected '{}', expected {}", token, expected)
            }
            DiagnosticKind::TrailingInput => format!("Unexpected '{}' after expression", token),
            DiagnosticKind::InvalidCharacter => format!("Invalid character '{}'", token),
            DiagnosticKind::InvalidNumber => format!("Invalid number '{}'", token),
            kind => capitalize(&kind.to_string()),
        };

        tracing::debug!(line, column, token = %diagnostic.token, "formula syntax error: {message}");

        self.error = Some(FormulaSyntaxError {
            token: diagnostic.token,
            line,
            column,
            message,
        });
    }
}

/// Convert a byte offset into a 1-based line and 0-based character column
pub fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count();
    (line, column)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
