//! Field metadata

use super::{CellValueType, FieldType};
use crate::error::{Error, Result};

/// Metadata for a single field, as supplied by the field-management layer
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct FieldMeta {
    /// Stable field identifier (e.g. "fldXXXX")
    pub id: String,
    /// Display name, unique within a table
    pub name: String,
    /// User-facing field kind
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub field_type: FieldType,
    /// Semantic type of the stored value (element type for multi-value fields)
    pub cell_value_type: CellValueType,
    /// Whether the field holds a collection of `cell_value_type`
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_multiple_cell_value: bool,
    /// Formula source for `Formula` fields
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub expression: Option<String>,
}

impl FieldMeta {
    /// Create field metadata with the default cell value type and multiplicity
    /// of `field_type`
    pub fn new(id: impl Into<String>, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            field_type,
            cell_value_type: field_type.default_cell_value_type(),
            is_multiple_cell_value: field_type.default_is_multiple(),
            expression: None,
        }
    }

    /// Create a formula field; its value type is refined once the expression is
    /// type-checked
    pub fn formula(
        id: impl Into<String>,
        name: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            expression: Some(expression.into()),
            ..Self::new(id, name, FieldType::Formula)
        }
    }

    /// Override the cell value type
    pub fn with_cell_value_type(mut self, cell_value_type: CellValueType) -> Self {
        self.cell_value_type = cell_value_type;
        self
    }

    /// Override the multiplicity
    pub fn with_multiple(mut self, is_multiple: bool) -> Self {
        self.is_multiple_cell_value = is_multiple;
        self
    }

    /// Check that the declared value type fits the field kind
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::EmptyFieldId);
        }

        if self.field_type == FieldType::Formula && self.expression.is_none() {
            return Err(Error::MissingExpression(self.id.clone()));
        }

        if !self.field_type.is_computed()
            && self.cell_value_type != self.field_type.default_cell_value_type()
        {
            return Err(Error::IncompatibleCellValueType {
                field: self.id.clone(),
                field_type: self.field_type,
                cell_value_type: self.cell_value_type,
            });
        }

        Ok(())
    }
}
