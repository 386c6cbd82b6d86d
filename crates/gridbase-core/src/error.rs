//! Error types for gridbase-core

use crate::field::{CellValueType, FieldType};
use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building field metadata
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Field id is empty
    #[error("Field id must not be empty")]
    EmptyFieldId,

    /// A field with this id is already registered
    #[error("Field id already exists: {0}")]
    DuplicateFieldId(String),

    /// A field with this name is already registered
    #[error("Field name already exists: {0}")]
    DuplicateFieldName(String),

    /// Field kind cannot hold the declared cell value type
    #[error("Field {field} of type {field_type} cannot hold {cell_value_type} values")]
    IncompatibleCellValueType {
        field: String,
        field_type: FieldType,
        cell_value_type: CellValueType,
    },

    /// Formula field declared without an expression
    #[error("Formula field {0} has no expression")]
    MissingExpression(String),
}
