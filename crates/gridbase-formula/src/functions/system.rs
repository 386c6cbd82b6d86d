//! Record metadata functions

use super::{FunctionDef, FunctionImpl, FunctionName, FunctionType, ReturnRule};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::{FormulaValue, TypedValue};
use gridbase_core::CellValueType;

pub(super) fn definitions() -> Vec<FunctionDef> {
    vec![
        metadata(FunctionName::RecordId, CellValueType::String, fn_record_id),
        metadata(FunctionName::AutoNumber, CellValueType::Number, fn_auto_number),
        metadata(FunctionName::CreatedTime, CellValueType::DateTime, fn_created_time),
        metadata(
            FunctionName::LastModifiedTime,
            CellValueType::DateTime,
            fn_last_modified_time,
        ),
    ]
}

fn metadata(name: FunctionName, value_type: CellValueType, implementation: FunctionImpl) -> FunctionDef {
    FunctionDef::new(name, FunctionType::System, implementation)
        .args(0, Some(0))
        .returns(ReturnRule::Scalar(value_type))
}

/// RECORD_ID()
pub fn fn_record_id(_params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(ctx
        .record
        .map_or(FormulaValue::Null, |r| FormulaValue::String(r.id.clone())))
}

/// AUTO_NUMBER()
pub fn fn_auto_number(_params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(ctx
        .record
        .and_then(|r| r.auto_number)
        .map_or(FormulaValue::Null, |n| FormulaValue::Number(n as f64)))
}

/// CREATED_TIME()
pub fn fn_created_time(_params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(ctx
        .record
        .and_then(|r| r.created_time)
        .map_or(FormulaValue::Null, FormulaValue::DateTime))
}

/// LAST_MODIFIED_TIME()
pub fn fn_last_modified_time(
    _params: &[TypedValue],
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    Ok(ctx
        .record
        .and_then(|r| r.last_modified_time)
        .map_or(FormulaValue::Null, FormulaValue::DateTime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{eval, infer, value};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_metadata() {
        assert_eq!(value("RECORD_ID()"), FormulaValue::from("recTest"));
        assert_eq!(value("AUTO_NUMBER()"), FormulaValue::Number(7.0));
        assert_eq!(
            value("CREATED_TIME()"),
            FormulaValue::DateTime(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            value("YEAR(LAST_MODIFIED_TIME()) & '-' & MONTH(LAST_MODIFIED_TIME())"),
            FormulaValue::from("2024-2")
        );
    }

    #[test]
    fn test_metadata_types_without_record() {
        assert_eq!(
            infer("AUTO_NUMBER()").unwrap(),
            TypedValue::null(CellValueType::Number, false)
        );
        assert_eq!(
            infer("RECORD_ID()").unwrap(),
            TypedValue::null(CellValueType::String, false)
        );
    }

    #[test]
    fn test_metadata_takes_no_arguments() {
        assert!(eval("RECORD_ID('x')").is_err());
    }
}
