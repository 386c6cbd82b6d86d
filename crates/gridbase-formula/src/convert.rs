//! Conversion of raw record values into typed values

use crate::error::{FormulaError, FormulaResult};
use crate::value::{format_number, parse_datetime, parse_number, FormulaValue, TypedValue};
use chrono::{DateTime, FixedOffset, Utc};
use gridbase_core::{CellValueType, FieldMeta};
use serde_json::Value;

/// Convert a field's raw JSON value using its declared cell-value type and multiplicity
///
/// A missing entry and JSON `null` both become a null value. Multiple fields
/// expect an array; a lone scalar is treated as a one-element array.
pub fn typed_from_raw(
    field: &FieldMeta,
    raw: Option<&Value>,
    offset: &FixedOffset,
) -> FormulaResult<TypedValue> {
    let value_type = field.cell_value_type;
    let is_multiple = field.is_multiple_cell_value;

    let value = match raw {
        None | Some(Value::Null) => FormulaValue::Null,
        Some(Value::Array(items)) if is_multiple => FormulaValue::Array(
            items
                .iter()
                .map(|item| convert_element(field, item, offset))
                .collect::<FormulaResult<_>>()?,
        ),
        Some(Value::Array(_)) => {
            return Err(mismatch(field, "a single value", raw.unwrap_or(&Value::Null)))
        }
        Some(scalar) if is_multiple => {
            FormulaValue::Array(vec![convert_scalar(field, scalar, offset)?])
        }
        Some(scalar) => convert_scalar(field, scalar, offset)?,
    };

    Ok(TypedValue::new(value, value_type, is_multiple))
}

fn convert_element(
    field: &FieldMeta,
    raw: &Value,
    offset: &FixedOffset,
) -> FormulaResult<FormulaValue> {
    match raw {
        Value::Array(items) => Ok(FormulaValue::Array(
            items
                .iter()
                .map(|item| convert_element(field, item, offset))
                .collect::<FormulaResult<_>>()?,
        )),
        scalar => convert_scalar(field, scalar, offset),
    }
}

fn convert_scalar(
    field: &FieldMeta,
    raw: &Value,
    offset: &FixedOffset,
) -> FormulaResult<FormulaValue> {
    if raw.is_null() {
        return Ok(FormulaValue::Null);
    }

    let converted = match field.cell_value_type {
        CellValueType::Number => match raw {
            Value::Number(n) => n.as_f64().map(FormulaValue::Number),
            Value::String(s) => parse_number(s).map(FormulaValue::Number),
            _ => None,
        },
        CellValueType::String => match raw {
            Value::String(s) => Some(FormulaValue::String(s.clone())),
            Value::Number(n) => n.as_f64().map(|n| FormulaValue::String(format_number(n))),
            Value::Bool(b) => Some(FormulaValue::String(b.to_string())),
            // Link, user and attachment cells carry a display title or file name
            Value::Object(map) => map
                .get("title")
                .or_else(|| map.get("name"))
                .and_then(Value::as_str)
                .map(|s| FormulaValue::String(s.to_string())),
            _ => None,
        },
        CellValueType::Boolean => raw.as_bool().map(FormulaValue::Boolean),
        CellValueType::DateTime => match raw {
            Value::String(s) => parse_datetime(s, offset).map(FormulaValue::DateTime),
            Value::Number(n) => n
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(FormulaValue::DateTime),
            _ => None,
        },
    };

    converted.ok_or_else(|| {
        let expected = match field.cell_value_type {
            CellValueType::Number => "a number",
            CellValueType::String => "a string",
            CellValueType::Boolean => "a boolean",
            CellValueType::DateTime => "a datetime",
        };
        mismatch(field, expected, raw)
    })
}

fn mismatch(field: &FieldMeta, expected: &str, raw: &Value) -> FormulaError {
    FormulaError::type_mismatch(format!(
        "field '{}' expects {}, got {}",
        field.name, expected, raw
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gridbase_core::FieldType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn convert(field: &FieldMeta, raw: Value) -> FormulaResult<TypedValue> {
        typed_from_raw(field, Some(&raw), &utc())
    }

    #[test]
    fn test_convert_number() {
        let field = FieldMeta::new("fldN", "Price", FieldType::Number);
        assert_eq!(convert(&field, json!(12.5)).unwrap(), TypedValue::number(12.5));
        assert_eq!(convert(&field, json!("7")).unwrap(), TypedValue::number(7.0));
        assert!(matches!(
            convert(&field, json!(true)),
            Err(FormulaError::TypeMismatch(msg)) if msg.contains("Price")
        ));
    }

    #[test]
    fn test_convert_missing_and_null() {
        let field = FieldMeta::new("fldT", "Name", FieldType::SingleLineText);
        assert_eq!(
            typed_from_raw(&field, None, &utc()).unwrap(),
            TypedValue::null(CellValueType::String, false)
        );
        assert_eq!(
            convert(&field, Value::Null).unwrap(),
            TypedValue::null(CellValueType::String, false)
        );
    }

    #[test]
    fn test_convert_multiple_links() {
        let field = FieldMeta::new("fldL", "Orders", FieldType::Link);
        let typed = convert(&field, json!([{"id": "rec1", "title": "A-1"}, {"id": "rec2", "title": "A-2"}]))
            .unwrap();
        assert_eq!(
            typed,
            TypedValue::array(vec!["A-1".into(), "A-2".into()], CellValueType::String)
        );

        let scalar = convert(&field, json!({"id": "rec3", "title": "A-3"})).unwrap();
        assert_eq!(scalar.value, FormulaValue::Array(vec!["A-3".into()]));
    }

    #[test]
    fn test_convert_nested_arrays() {
        let field = FieldMeta::new("fldR", "Tags", FieldType::Rollup)
            .with_cell_value_type(CellValueType::String)
            .with_multiple(true);
        let typed = convert(&field, json!([["a", "b"], "c"])).unwrap();
        assert_eq!(
            typed.value,
            FormulaValue::Array(vec![
                FormulaValue::Array(vec!["a".into(), "b".into()]),
                "c".into()
            ])
        );
    }

    #[test]
    fn test_convert_datetime() {
        let field = FieldMeta::new("fldD", "Due", FieldType::Date);
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        assert_eq!(
            convert(&field, json!("2024-05-01T09:00:00.000Z")).unwrap(),
            TypedValue::datetime(expected)
        );
        assert_eq!(
            convert(&field, json!(expected.timestamp_millis())).unwrap(),
            TypedValue::datetime(expected)
        );
        assert!(convert(&field, json!("soon")).is_err());
    }

    #[test]
    fn test_single_field_rejects_array() {
        let field = FieldMeta::new("fldC", "Done", FieldType::Checkbox);
        assert_eq!(convert(&field, json!(true)).unwrap(), TypedValue::boolean(true));
        assert!(matches!(
            convert(&field, json!([true])),
            Err(FormulaError::TypeMismatch(_))
        ));
    }
}
