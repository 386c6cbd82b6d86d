//! Functions over multiple values
//!
//! Arguments are flattened, so nested lookups and rollups count element by element.
//! Functions that build a collection return null rather than an empty one.

use super::{
    arg, FunctionDef, FunctionImpl, FunctionName, FunctionType, MultipleArgs, ReturnRule,
};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::{FormulaValue, ReturnType, TypedValue};
use gridbase_core::CellValueType;

/// Separator used by ARRAY_JOIN when none is given
pub const DEFAULT_SEPARATOR: &str = ", ";

pub(super) fn definitions() -> Vec<FunctionDef> {
    vec![
        counter(FunctionName::CountAll, fn_countall),
        counter(FunctionName::CountA, fn_counta),
        counter(FunctionName::Count, fn_count),
        FunctionDef::new(FunctionName::ArrayJoin, FunctionType::Array, fn_array_join)
            .args(1, Some(2))
            .multiple(MultipleArgs::FirstOnly)
            .returns(ReturnRule::Scalar(CellValueType::String)),
        collection(FunctionName::ArrayUnique, fn_array_unique).args(1, Some(1)),
        collection(FunctionName::ArrayFlatten, fn_array_flatten),
        collection(FunctionName::ArrayCompact, fn_array_compact),
    ]
}

fn counter(name: FunctionName, implementation: FunctionImpl) -> FunctionDef {
    FunctionDef::new(name, FunctionType::Array, implementation)
        .args(1, None)
        .multiple(MultipleArgs::Any)
        .returns(ReturnRule::Scalar(CellValueType::Number))
}

fn collection(name: FunctionName, implementation: FunctionImpl) -> FunctionDef {
    FunctionDef::new(name, FunctionType::Array, implementation)
        .args(1, None)
        .multiple(MultipleArgs::Any)
        .returns(ReturnRule::Custom(collection_type))
}

/// Element type shared by every argument, text when they disagree; always multiple
fn collection_type(params: &[TypedValue]) -> ReturnType {
    let value_type = match params.split_first() {
        Some((first, rest)) if rest.iter().all(|p| p.value_type == first.value_type) => {
            first.value_type
        }
        _ => CellValueType::String,
    };
    ReturnType::multiple(value_type)
}

/// Elements of every argument, in order, with nested arrays expanded
fn elements(params: &[TypedValue]) -> impl Iterator<Item = &FormulaValue> {
    params.iter().flat_map(|p| match &p.value {
        FormulaValue::Null if p.is_multiple => Vec::new(),
        value => value.flatten(),
    })
}

fn is_blank(value: &FormulaValue) -> bool {
    match value {
        FormulaValue::Null => true,
        FormulaValue::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Shape collected elements to the declared element type
fn collected(items: Vec<FormulaValue>, params: &[TypedValue]) -> FormulaValue {
    if items.is_empty() {
        return FormulaValue::Null;
    }
    let as_text = collection_type(params).value_type == CellValueType::String;
    FormulaValue::Array(
        items
            .into_iter()
            .map(|item| match item {
                FormulaValue::Null => FormulaValue::Null,
                FormulaValue::String(_) => item,
                other if as_text => FormulaValue::String(other.to_text()),
                other => other,
            })
            .collect(),
    )
}

/// COUNTALL(value, ...): every element, blanks included
pub fn fn_countall(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(elements(params).count() as f64))
}

/// COUNTA(value, ...): non-blank elements
pub fn fn_counta(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count = elements(params).filter(|v| !is_blank(v)).count();
    Ok(FormulaValue::Number(count as f64))
}

/// COUNT(value, ...): numeric elements
pub fn fn_count(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count = elements(params)
        .filter(|v| matches!(v, FormulaValue::Number(_)))
        .count();
    Ok(FormulaValue::Number(count as f64))
}

/// ARRAY_JOIN(array, [separator])
pub fn fn_array_join(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if arg(params, 0).is_null() {
        return Ok(FormulaValue::Null);
    }
    let separator = match arg(params, 1) {
        FormulaValue::Null if params.len() < 2 => DEFAULT_SEPARATOR.to_string(),
        value => value.to_text(),
    };
    let joined = elements(&params[..1])
        .filter(|v| !v.is_null())
        .map(FormulaValue::to_text)
        .collect::<Vec<_>>()
        .join(&separator);
    Ok(FormulaValue::String(joined))
}

/// ARRAY_UNIQUE(array): first occurrence of each distinct element
pub fn fn_array_unique(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut unique: Vec<FormulaValue> = Vec::new();
    for value in elements(params) {
        if !unique.contains(value) {
            unique.push(value.clone());
        }
    }
    Ok(collected(unique, params))
}

/// ARRAY_FLATTEN(array, ...)
pub fn fn_array_flatten(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let items = elements(params).cloned().collect();
    Ok(collected(items, params))
}

/// ARRAY_COMPACT(array, ...): drops nulls and empty strings
pub fn fn_array_compact(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let items = elements(params).filter(|v| !is_blank(v)).cloned().collect();
    Ok(collected(items, params))
}
