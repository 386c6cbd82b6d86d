//! Formula error types

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Malformed formula source, positioned at the offending token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Syntax error at line {line}, column {column} near '{token}': {message}")]
pub struct FormulaSyntaxError {
    /// Text of the offending token (`<EOF>` at end of input)
    pub token: String,
    /// 1-based line
    pub line: usize,
    /// 0-based column, counted in characters
    pub column: usize,
    /// Human-readable description
    pub message: String,
}

/// Errors that can occur during formula parsing or evaluation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// Formula source does not match the grammar
    #[error(transparent)]
    Syntax(#[from] FormulaSyntaxError),

    /// Referenced field is missing from the field map
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Function name is not in the registry
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Wrong arity or argument types for a function
    #[error("Invalid params for {function}: {message}")]
    InvalidParams { function: String, message: String },

    /// Operand types incompatible with an operator, or a raw value that does
    /// not match its field's declared type
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
}

impl FormulaError {
    /// Build an [`FormulaError::InvalidParams`] error
    pub fn invalid_params(function: impl Into<String>, message: impl Into<String>) -> Self {
        FormulaError::InvalidParams {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Build a [`FormulaError::TypeMismatch`] error
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        FormulaError::TypeMismatch(message.into())
    }
}
