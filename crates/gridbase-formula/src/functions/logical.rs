//! Logical functions

use super::{arg, FunctionDef, FunctionImpl, FunctionName, FunctionType, MultipleArgs, ReturnRule};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::{FormulaValue, ReturnType, TypedValue};
use gridbase_core::CellValueType;

pub(super) fn definitions() -> Vec<FunctionDef> {
    vec![
        FunctionDef::new(FunctionName::If, FunctionType::Logical, fn_if)
            .args(2, Some(3))
            .multiple(MultipleArgs::Any)
            .returns(ReturnRule::Custom(if_return_type)),
        FunctionDef::new(FunctionName::Switch, FunctionType::Logical, fn_switch)
            .args(3, None)
            .multiple(MultipleArgs::Any)
            .returns(ReturnRule::Custom(switch_return_type)),
        variadic(FunctionName::And, fn_and),
        variadic(FunctionName::Or, fn_or),
        variadic(FunctionName::Xor, fn_xor),
        FunctionDef::new(FunctionName::Not, FunctionType::Logical, fn_not)
            .multiple(MultipleArgs::FirstOnly)
            .returns(ReturnRule::Inherit(CellValueType::Boolean)),
        FunctionDef::new(FunctionName::Blank, FunctionType::Logical, fn_blank)
            .args(0, Some(0))
            .returns(ReturnRule::Scalar(CellValueType::String)),
    ]
}

/// Boolean reduction over every value of every argument
fn variadic(name: FunctionName, implementation: FunctionImpl) -> FunctionDef {
    FunctionDef::new(name, FunctionType::Logical, implementation)
        .args(1, None)
        .multiple(MultipleArgs::Any)
        .returns(ReturnRule::Scalar(CellValueType::Boolean))
}

/// Common type of the candidate results; text when they disagree
fn unify<'a, I>(candidates: I) -> ReturnType
where
    I: IntoIterator<Item = &'a TypedValue>,
{
    let mut value_type = None;
    let mut mixed = false;
    let mut is_multiple = false;
    for candidate in candidates {
        is_multiple |= candidate.is_multiple;
        match value_type {
            None => value_type = Some(candidate.value_type),
            Some(t) if t != candidate.value_type => mixed = true,
            Some(_) => {}
        }
    }
    let value_type = match value_type {
        Some(t) if !mixed => t,
        _ => CellValueType::String,
    };
    ReturnType::new(value_type, is_multiple)
}

/// Shape a chosen branch to the declared result type
fn coerce_result(value: &FormulaValue, return_type: ReturnType) -> FormulaValue {
    let value = match value {
        FormulaValue::Null => return FormulaValue::Null,
        v if return_type.value_type == CellValueType::String
            && v.value_type() != Some(CellValueType::String) =>
        {
            match v {
                FormulaValue::Array(items) => FormulaValue::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            FormulaValue::Null => FormulaValue::Null,
                            other => FormulaValue::String(other.to_text()),
                        })
                        .collect(),
                ),
                other => FormulaValue::String(other.to_text()),
            }
        }
        v => v.clone(),
    };

    match value {
        FormulaValue::Array(_) => value,
        scalar if return_type.is_multiple => FormulaValue::Array(vec![scalar]),
        scalar => scalar,
    }
}

fn if_return_type(params: &[TypedValue]) -> ReturnType {
    unify(params.iter().skip(1))
}

/// IF(condition, value_if_true, [value_if_false])
pub fn fn_if(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let chosen = if arg(params, 0).is_truthy() {
        arg(params, 1)
    } else {
        arg(params, 2)
    };
    Ok(coerce_result(chosen, if_return_type(params)))
}

/// Result arguments of SWITCH: every second one after the expression, plus a default
fn switch_results(params: &[TypedValue]) -> impl Iterator<Item = &TypedValue> {
    let has_default = params.len() % 2 == 0;
    params.iter().enumerate().filter_map(move |(i, p)| {
        let is_result = i >= 2 && i % 2 == 0;
        let is_default = has_default && i == params.len() - 1;
        (is_result || is_default).then_some(p)
    })
}

fn switch_return_type(params: &[TypedValue]) -> ReturnType {
    unify(switch_results(params))
}

fn switch_matches(value: &FormulaValue, pattern: &FormulaValue) -> bool {
    match (value, pattern) {
        (FormulaValue::Null, FormulaValue::Null) => true,
        (FormulaValue::Null, _) | (_, FormulaValue::Null) => false,
        (FormulaValue::Number(a), FormulaValue::Number(b)) => a == b,
        (a, b) => a.to_text() == b.to_text(),
    }
}

/// SWITCH(expression, pattern, result, [pattern, result]..., [default])
pub fn fn_switch(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let return_type = switch_return_type(params);
    let value = arg(params, 0);

    let mut i = 1;
    while i + 1 < params.len() {
        if switch_matches(value, &params[i].value) {
            return Ok(coerce_result(&params[i + 1].value, return_type));
        }
        i += 2;
    }

    // Even length means a trailing default; otherwise the index is past the end and reads as null
    let default_index = if params.len() % 2 == 0 {
        params.len() - 1
    } else {
        params.len()
    };
    Ok(coerce_result(arg(params, default_index), return_type))
}

fn truthy_values(params: &[TypedValue]) -> impl Iterator<Item = bool> + '_ {
    params
        .iter()
        .flat_map(|p| p.value.flatten())
        .map(FormulaValue::is_truthy)
}

/// AND(value, ...)
pub fn fn_and(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(truthy_values(params).all(|b| b)))
}

/// OR(value, ...)
pub fn fn_or(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(truthy_values(params).any(|b| b)))
}

/// XOR(value, ...): true when an odd number of values are truthy
pub fn fn_xor(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count = truthy_values(params).filter(|b| *b).count();
    Ok(FormulaValue::Boolean(count % 2 == 1))
}

/// NOT(value): an empty value is falsy, so NOT of it is true
///
/// Applies element-wise to a multiple value, empty elements included. An empty
/// multiple value yields a one-element array so the result keeps its shape.
pub fn fn_not(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let negate = |v: &FormulaValue| FormulaValue::Boolean(!v.is_truthy());
    Ok(match params.first() {
        Some(TypedValue {
            value: array @ FormulaValue::Array(_),
            ..
        }) => FormulaValue::Array(array.flatten().into_iter().map(negate).collect()),
        Some(p) if p.is_multiple => FormulaValue::Array(vec![negate(&p.value)]),
        Some(p) => negate(&p.value),
        None => FormulaValue::Boolean(true),
    })
}

/// BLANK(): an empty value
pub fn fn_blank(_params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Null)
}
