//! Typed runtime values

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use gridbase_core::CellValueType;
use serde_json::{json, Value};

/// A value produced while evaluating a formula
///
/// `Array` holds the elements of a multiple value; elements may themselves be
/// arrays when a multiple field was derived from other multiple fields.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Null,
    Number(f64),
    String(String),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Array(Vec<FormulaValue>),
}

impl FormulaValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FormulaValue::Null)
    }

    /// Cell-value type of a scalar; `None` for null and arrays
    pub fn value_type(&self) -> Option<CellValueType> {
        match self {
            FormulaValue::Number(_) => Some(CellValueType::Number),
            FormulaValue::String(_) => Some(CellValueType::String),
            FormulaValue::Boolean(_) => Some(CellValueType::Boolean),
            FormulaValue::DateTime(_) => Some(CellValueType::DateTime),
            FormulaValue::Null | FormulaValue::Array(_) => None,
        }
    }

    /// Numeric view: numbers, booleans (1/0) and numeric strings
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            FormulaValue::String(s) => parse_number(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FormulaValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render as text: null is empty, arrays are joined with `", "`
    pub fn to_text(&self) -> String {
        match self {
            FormulaValue::Null => String::new(),
            FormulaValue::Number(n) => format_number(*n),
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Boolean(b) => b.to_string(),
            FormulaValue::DateTime(dt) => format_datetime(dt),
            FormulaValue::Array(items) => items
                .iter()
                .map(FormulaValue::to_text)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Truthiness used by logical operators and functions
    pub fn is_truthy(&self) -> bool {
        match self {
            FormulaValue::Null => false,
            FormulaValue::Number(n) => *n != 0.0 && !n.is_nan(),
            FormulaValue::String(s) => !s.is_empty(),
            FormulaValue::Boolean(b) => *b,
            FormulaValue::DateTime(_) => true,
            FormulaValue::Array(items) => !items.is_empty(),
        }
    }

    /// All scalar leaves, depth first
    pub fn flatten(&self) -> Vec<&FormulaValue> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }

    /// JSON form used for record values
    pub fn to_json(&self) -> Value {
        match self {
            FormulaValue::Null => Value::Null,
            FormulaValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    json!(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number)
                }
            }
            FormulaValue::String(s) => Value::String(s.clone()),
            FormulaValue::Boolean(b) => Value::Bool(*b),
            FormulaValue::DateTime(dt) => Value::String(format_datetime(dt)),
            FormulaValue::Array(items) => {
                Value::Array(items.iter().map(FormulaValue::to_json).collect())
            }
        }
    }
}

fn collect_leaves<'a>(value: &'a FormulaValue, out: &mut Vec<&'a FormulaValue>) {
    match value {
        FormulaValue::Array(items) => {
            for item in items {
                collect_leaves(item, out);
            }
        }
        other => out.push(other),
    }
}

impl From<f64> for FormulaValue {
    fn from(n: f64) -> Self {
        FormulaValue::Number(n)
    }
}

impl From<bool> for FormulaValue {
    fn from(b: bool) -> Self {
        FormulaValue::Boolean(b)
    }
}

impl From<&str> for FormulaValue {
    fn from(s: &str) -> Self {
        FormulaValue::String(s.to_string())
    }
}

impl From<String> for FormulaValue {
    fn from(s: String) -> Self {
        FormulaValue::String(s)
    }
}

impl From<DateTime<Utc>> for FormulaValue {
    fn from(dt: DateTime<Utc>) -> Self {
        FormulaValue::DateTime(dt)
    }
}

/// Static result type: element type plus multiplicity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnType {
    pub value_type: CellValueType,
    pub is_multiple: bool,
}

impl ReturnType {
    pub fn new(value_type: CellValueType, is_multiple: bool) -> Self {
        Self {
            value_type,
            is_multiple,
        }
    }

    pub fn scalar(value_type: CellValueType) -> Self {
        Self::new(value_type, false)
    }

    pub fn multiple(value_type: CellValueType) -> Self {
        Self::new(value_type, true)
    }
}

/// A value tagged with its element type and multiplicity
///
/// A null value is valid for any type and means "empty".
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub value: FormulaValue,
    pub value_type: CellValueType,
    pub is_multiple: bool,
}

impl TypedValue {
    pub fn new(value: FormulaValue, value_type: CellValueType, is_multiple: bool) -> Self {
        Self {
            value,
            value_type,
            is_multiple,
        }
    }

    /// Null value carrying only type information
    pub fn null(value_type: CellValueType, is_multiple: bool) -> Self {
        Self::new(FormulaValue::Null, value_type, is_multiple)
    }

    pub fn number(n: f64) -> Self {
        Self::new(FormulaValue::Number(n), CellValueType::Number, false)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::new(FormulaValue::String(s.into()), CellValueType::String, false)
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(FormulaValue::Boolean(b), CellValueType::Boolean, false)
    }

    pub fn datetime(dt: DateTime<Utc>) -> Self {
        Self::new(FormulaValue::DateTime(dt), CellValueType::DateTime, false)
    }

    /// Multiple value of the given element type
    pub fn array(items: Vec<FormulaValue>, value_type: CellValueType) -> Self {
        Self::new(FormulaValue::Array(items), value_type, true)
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn return_type(&self) -> ReturnType {
        ReturnType::new(self.value_type, self.is_multiple)
    }

    /// `{"value": ..., "type": ..., "isMultiple": ...}`
    pub fn to_json(&self) -> Value {
        json!({
            "value": self.value.to_json(),
            "type": self.value_type.as_str(),
            "isMultiple": self.is_multiple,
        })
    }
}

/// Format a number the way it reads in a cell: integers without a fraction
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// RFC 3339 UTC with millisecond precision
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a number as typed by a user; surrounding whitespace is ignored
pub fn parse_number(s: &str) -> Option<f64> {
    let n = s.trim().parse::<f64>().ok()?;
    n.is_finite().then_some(n)
}

/// Parse an ISO-8601 datetime or date
///
/// Strings without an offset are read as local time in `offset`.
pub fn parse_datetime(s: &str, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_to_text() {
        assert_eq!(FormulaValue::Number(3.0).to_text(), "3");
        assert_eq!(FormulaValue::Number(0.5).to_text(), "0.5");
        assert_eq!(FormulaValue::Boolean(true).to_text(), "true");
        assert_eq!(FormulaValue::Null.to_text(), "");
        let nested = FormulaValue::Array(vec![
            FormulaValue::from("a"),
            FormulaValue::Array(vec![FormulaValue::from("b"), FormulaValue::Number(1.0)]),
        ]);
        assert_eq!(nested.to_text(), "a, b, 1");
    }

    #[test]
    fn test_truthiness() {
        assert!(!FormulaValue::Null.is_truthy());
        assert!(!FormulaValue::Number(0.0).is_truthy());
        assert!(!FormulaValue::from("").is_truthy());
        assert!(!FormulaValue::Array(vec![]).is_truthy());
        assert!(FormulaValue::from("x").is_truthy());
        assert!(FormulaValue::Number(-1.0).is_truthy());
    }

    #[test]
    fn test_flatten() {
        let value = FormulaValue::Array(vec![
            FormulaValue::Number(1.0),
            FormulaValue::Array(vec![FormulaValue::Number(2.0), FormulaValue::Null]),
        ]);
        assert_eq!(
            value.flatten(),
            vec![
                &FormulaValue::Number(1.0),
                &FormulaValue::Number(2.0),
                &FormulaValue::Null
            ]
        );
    }

    #[test]
    fn test_typed_value_json() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            TypedValue::datetime(dt).to_json(),
            json!({"value": "2024-03-01T12:30:00.000Z", "type": "dateTime", "isMultiple": false})
        );
        assert_eq!(
            TypedValue::number(123.0).to_json(),
            json!({"value": 123, "type": "number", "isMultiple": false})
        );
        assert_eq!(
            TypedValue::array(vec!["a".into()], CellValueType::String).to_json(),
            json!({"value": ["a"], "type": "string", "isMultiple": true})
        );
    }

    #[test]
    fn test_parse_datetime() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(parse_datetime("2024-01-15", &utc), Some(expected));
        assert_eq!(
            parse_datetime("2024-01-15T00:00:00.000Z", &utc),
            Some(expected)
        );

        let plus8 = FixedOffset::east_opt(8 * 3600).unwrap();
        assert_eq!(
            parse_datetime("2024-01-15 08:00", &plus8),
            Some(expected)
        );
        assert_eq!(parse_datetime("not a date", &utc), None);
    }
}
