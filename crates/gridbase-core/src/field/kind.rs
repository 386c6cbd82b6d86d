//! Field kinds and cell value types

use std::fmt;

/// Semantic category of a cell value, independent of how it is stored.
///
/// This is always the *element* type: a multi-value field of strings is
/// `String` with its multiplicity tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum CellValueType {
    String,
    Number,
    Boolean,
    DateTime,
}

impl CellValueType {
    /// All cell value types
    pub const ALL: [CellValueType; 4] = [
        CellValueType::String,
        CellValueType::Number,
        CellValueType::Boolean,
        CellValueType::DateTime,
    ];

    /// Name used in serialized output and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            CellValueType::String => "string",
            CellValueType::Number => "number",
            CellValueType::Boolean => "boolean",
            CellValueType::DateTime => "dateTime",
        }
    }
}

impl fmt::Display for CellValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing field kind
///
/// Every kind collapses onto one [`CellValueType`] plus a multiplicity. Computed
/// kinds (`Formula`, `Rollup`) take whatever type their expression produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum FieldType {
    SingleLineText,
    LongText,
    Number,
    Rating,
    Checkbox,
    Date,
    Duration,
    SingleSelect,
    MultipleSelect,
    User,
    CreatedBy,
    LastModifiedBy,
    Attachment,
    Link,
    Formula,
    Rollup,
    CreatedTime,
    LastModifiedTime,
    AutoNumber,
    Button,
}

impl FieldType {
    /// The cell value type a field of this kind holds by default
    pub fn default_cell_value_type(&self) -> CellValueType {
        match self {
            FieldType::Number | FieldType::Rating | FieldType::Duration | FieldType::AutoNumber => {
                CellValueType::Number
            }
            FieldType::Checkbox => CellValueType::Boolean,
            FieldType::Date | FieldType::CreatedTime | FieldType::LastModifiedTime => {
                CellValueType::DateTime
            }
            _ => CellValueType::String,
        }
    }

    /// Whether a field of this kind holds multiple values by default
    pub fn default_is_multiple(&self) -> bool {
        matches!(
            self,
            FieldType::MultipleSelect | FieldType::Attachment | FieldType::Link
        )
    }

    /// Whether the cell value type is derived from an expression rather than fixed
    pub fn is_computed(&self) -> bool {
        matches!(self, FieldType::Formula | FieldType::Rollup)
    }

    /// Name used in serialized output and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::SingleLineText => "singleLineText",
            FieldType::LongText => "longText",
            FieldType::Number => "number",
            FieldType::Rating => "rating",
            FieldType::Checkbox => "checkbox",
            FieldType::Date => "date",
            FieldType::Duration => "duration",
            FieldType::SingleSelect => "singleSelect",
            FieldType::MultipleSelect => "multipleSelect",
            FieldType::User => "user",
            FieldType::CreatedBy => "createdBy",
            FieldType::LastModifiedBy => "lastModifiedBy",
            FieldType::Attachment => "attachment",
            FieldType::Link => "link",
            FieldType::Formula => "formula",
            FieldType::Rollup => "rollup",
            FieldType::CreatedTime => "createdTime",
            FieldType::LastModifiedTime => "lastModifiedTime",
            FieldType::AutoNumber => "autoNumber",
            FieldType::Button => "button",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_cell_value_types() {
        assert_eq!(
            FieldType::Checkbox.default_cell_value_type(),
            CellValueType::Boolean
        );
        assert_eq!(
            FieldType::CreatedTime.default_cell_value_type(),
            CellValueType::DateTime
        );
        assert_eq!(
            FieldType::Link.default_cell_value_type(),
            CellValueType::String
        );
        assert_eq!(
            FieldType::Rating.default_cell_value_type(),
            CellValueType::Number
        );
    }

    #[test]
    fn test_default_multiplicity() {
        assert!(FieldType::MultipleSelect.default_is_multiple());
        assert!(FieldType::Link.default_is_multiple());
        assert!(!FieldType::SingleSelect.default_is_multiple());
        assert!(!FieldType::Number.default_is_multiple());
    }

    #[test]
    fn test_display() {
        assert_eq!(CellValueType::DateTime.to_string(), "dateTime");
        assert_eq!(FieldType::SingleLineText.to_string(), "singleLineText");
    }
}
