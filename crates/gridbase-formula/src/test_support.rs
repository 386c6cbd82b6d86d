//! Shared fixture for unit tests

use crate::error::FormulaResult;
use crate::evaluator::{evaluate_with_options, EvaluatorOptions};
use crate::value::{FormulaValue, TypedValue};
use chrono::{DateTime, TimeZone, Utc};
use gridbase_core::{CellValueType, FieldMap, FieldMeta, FieldType, Record};
use serde_json::json;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn fields() -> FieldMap {
    FieldMap::from_fields([
        FieldMeta::new("fldNum", "Amount", FieldType::Number),
        FieldMeta::new("fldEmpty", "Empty", FieldType::Number),
        FieldMeta::new("fldText", "Title", FieldType::SingleLineText),
        FieldMeta::new("fldNoText", "Notes", FieldType::LongText),
        FieldMeta::new("fldDone", "Done", FieldType::Checkbox),
        FieldMeta::new("fldDate", "Due", FieldType::Date),
        FieldMeta::new("fldNoDate", "Start", FieldType::Date),
        FieldMeta::new("fldTags", "Tags", FieldType::MultipleSelect),
        FieldMeta::new("fldNums", "Scores", FieldType::Rollup)
            .with_cell_value_type(CellValueType::Number)
            .with_multiple(true),
        FieldMeta::new("fldNested", "Groups", FieldType::Rollup)
            .with_cell_value_type(CellValueType::String)
            .with_multiple(true),
    ])
    .unwrap()
}

pub fn record() -> Record {
    let mut record = Record::new("recTest")
        .with_field("fldNum", 12)
        .with_field("fldText", "Hello World")
        .with_field("fldDone", true)
        .with_field("fldDate", "2024-03-15T10:30:45.000Z")
        .with_field("fldTags", json!(["red", "blue", "red"]))
        .with_field("fldNums", json!([1, 2, null, 3]))
        .with_field("fldNested", json!([["a", "b"], "c"]));
    record.auto_number = Some(7);
    record.created_time = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    record.last_modified_time = Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
    record
}

pub fn options() -> EvaluatorOptions {
    EvaluatorOptions::default().with_now(now())
}

/// Evaluate against the fixture record
pub fn eval(formula: &str) -> FormulaResult<TypedValue> {
    evaluate_with_options(formula, &fields(), Some(&record()), &options())
}

/// Evaluate against the fixture record, expecting success
pub fn value(formula: &str) -> FormulaValue {
    match eval(formula) {
        Ok(typed) => typed.value,
        Err(e) => panic!("{} failed: {}", formula, e),
    }
}

/// Evaluate without a record
pub fn infer(formula: &str) -> FormulaResult<TypedValue> {
    evaluate_with_options(formula, &fields(), None, &options())
}

pub fn strings(items: &[&str]) -> FormulaValue {
    FormulaValue::Array(items.iter().map(|s| FormulaValue::from(*s)).collect())
}

pub fn numbers(items: &[f64]) -> FormulaValue {
    FormulaValue::Array(items.iter().map(|n| FormulaValue::Number(*n)).collect())
}
