//! Error types for record calculation

use gridbase_formula::FormulaError;
use thiserror::Error;

/// Result type for gridbase operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while calculating formula fields
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Invalid field metadata
    #[error(transparent)]
    Field(#[from] gridbase_core::Error),

    /// Parse or evaluation failure of a formula field
    #[error("Formula field {field}: {source}")]
    Formula {
        field: String,
        #[source]
        source: FormulaError,
    },

    /// The formula field reads itself, directly or through other formulas
    #[error("Circular reference in formula field {0}")]
    CircularReference(String),
}

impl Error {
    /// Id of the field the error belongs to, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Field(_) => None,
            Error::Formula { field, .. } | Error::CircularReference(field) => Some(field),
        }
    }
}
