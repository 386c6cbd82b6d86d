//! Numeric functions

use super::{
    arg, map_first, FunctionDef, FunctionImpl, FunctionName, FunctionType, MultipleArgs,
    ReturnRule, NUMBER, NUMBER_OR_STRING,
};
use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use crate::value::{parse_number, FormulaValue, TypedValue};
use gridbase_core::CellValueType;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

pub(super) fn definitions() -> Vec<FunctionDef> {
    vec![
        aggregate(FunctionName::Sum, fn_sum),
        aggregate(FunctionName::Average, fn_average),
        aggregate(FunctionName::Max, fn_max),
        aggregate(FunctionName::Min, fn_min),
        unary(FunctionName::Round, fn_round).args(1, Some(2)),
        unary(FunctionName::RoundUp, fn_roundup).args(1, Some(2)),
        unary(FunctionName::RoundDown, fn_rounddown).args(1, Some(2)),
        unary(FunctionName::Ceiling, fn_ceiling).args(1, Some(2)),
        unary(FunctionName::Floor, fn_floor).args(1, Some(2)),
        unary(FunctionName::Even, fn_even),
        unary(FunctionName::Odd, fn_odd),
        unary(FunctionName::Int, fn_int),
        unary(FunctionName::Abs, fn_abs),
        unary(FunctionName::Sqrt, fn_sqrt),
        unary(FunctionName::Exp, fn_exp),
        unary(FunctionName::Power, fn_power).args(2, Some(2)),
        unary(FunctionName::Log, fn_log).args(1, Some(2)),
        unary(FunctionName::Mod, fn_mod).args(2, Some(2)),
        unary(FunctionName::Value, fn_value).accepts(NUMBER_OR_STRING),
    ]
}

/// Variadic numeric aggregate returning a single number
fn aggregate(name: FunctionName, implementation: FunctionImpl) -> FunctionDef {
    FunctionDef::new(name, FunctionType::Numeric, implementation)
        .args(1, None)
        .accepts(NUMBER)
        .multiple(MultipleArgs::Any)
        .returns(ReturnRule::Scalar(CellValueType::Number))
}

/// Number transform, mapped over a multiple first argument
fn unary(name: FunctionName, implementation: FunctionImpl) -> FunctionDef {
    FunctionDef::new(name, FunctionType::Numeric, implementation)
        .accepts(NUMBER)
        .multiple(MultipleArgs::FirstOnly)
        .returns(ReturnRule::Inherit(CellValueType::Number))
}

/// Non-null numbers across all arguments, flattened
fn collect_numbers(params: &[TypedValue]) -> Vec<f64> {
    params
        .iter()
        .flat_map(|p| p.value.flatten())
        .filter_map(FormulaValue::as_number)
        .collect()
}

/// Numeric parameter at `index`; `default` when omitted or null
fn number_arg(params: &[TypedValue], index: usize, default: f64) -> f64 {
    arg(params, index).as_number().unwrap_or(default)
}

/// Map the first argument through `f`; `None` and non-finite results become null
fn map_number<F>(params: &[TypedValue], f: F) -> FormulaResult<FormulaValue>
where
    F: Fn(f64) -> Option<f64>,
{
    map_first(params, |v| {
        Ok(v.as_number()
            .and_then(&f)
            .filter(|n| n.is_finite())
            .map_or(FormulaValue::Null, FormulaValue::Number))
    })
}

/// SUM(number, ...)
pub fn fn_sum(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(collect_numbers(params).iter().sum()))
}

/// AVERAGE(number, ...)
pub fn fn_average(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let numbers = collect_numbers(params);
    if numbers.is_empty() {
        return Ok(FormulaValue::Null);
    }
    let sum: f64 = numbers.iter().sum();
    Ok(FormulaValue::Number(sum / numbers.len() as f64))
}

/// MAX(number, ...)
pub fn fn_max(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(collect_numbers(params)
        .into_iter()
        .reduce(f64::max)
        .map_or(FormulaValue::Null, FormulaValue::Number))
}

/// MIN(number, ...)
pub fn fn_min(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(collect_numbers(params)
        .into_iter()
        .reduce(f64::min)
        .map_or(FormulaValue::Null, FormulaValue::Number))
}

/// Round `n` to `precision` decimal places (negative rounds left of the point)
fn round_with(n: f64, precision: i64, strategy: RoundingStrategy) -> Option<f64> {
    let precision = precision.clamp(-15, 15);

    // Shortest round-trip text keeps 2.675 as 2.675 rather than 2.67499...
    if let Ok(d) = Decimal::from_str(&n.to_string()) {
        let rounded = if precision >= 0 {
            Some(d.round_dp_with_strategy(precision as u32, strategy))
        } else {
            let factor = Decimal::from(10i64.pow((-precision) as u32));
            d.checked_div(factor)
                .map(|q| q.round_dp_with_strategy(0, strategy))
                .and_then(|q| q.checked_mul(factor))
        };
        if let Some(value) = rounded.and_then(|r| r.to_f64()) {
            return Some(value);
        }
    }

    // Outside the decimal range: plain float rounding
    let factor = 10f64.powi(precision as i32);
    let scaled = n * factor;
    let rounded = match strategy {
        RoundingStrategy::AwayFromZero => scaled.abs().ceil().copysign(scaled),
        RoundingStrategy::ToZero => scaled.trunc(),
        _ => scaled.round(),
    };
    Some(rounded / factor)
}

fn round_fn(params: &[TypedValue], strategy: RoundingStrategy) -> FormulaResult<FormulaValue> {
    let precision = number_arg(params, 1, 0.0).trunc() as i64;
    map_number(params, |n| round_with(n, precision, strategy))
}

/// ROUND(value, [precision])
pub fn fn_round(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    round_fn(params, RoundingStrategy::MidpointAwayFromZero)
}

/// ROUNDUP(value, [precision])
pub fn fn_roundup(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    round_fn(params, RoundingStrategy::AwayFromZero)
}

/// ROUNDDOWN(value, [precision])
pub fn fn_rounddown(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    round_fn(params, RoundingStrategy::ToZero)
}

/// CEILING(value, [significance])
pub fn fn_ceiling(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let significance = number_arg(params, 1, 1.0);
    map_number(params, |n| {
        if significance == 0.0 {
            Some(0.0)
        } else {
            Some((n / significance).ceil() * significance)
        }
    })
}

/// FLOOR(value, [significance])
pub fn fn_floor(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let significance = number_arg(params, 1, 1.0);
    map_number(params, |n| {
        if significance == 0.0 {
            Some(0.0)
        } else {
            Some((n / significance).floor() * significance)
        }
    })
}

/// EVEN(value): away from zero to the nearest even integer
pub fn fn_even(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_number(params, |n| {
        let even = (n.abs() / 2.0).ceil() * 2.0;
        Some(if n < 0.0 { -even } else { even })
    })
}

/// ODD(value): away from zero to the nearest odd integer
pub fn fn_odd(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_number(params, |n| {
        let odd = ((n.abs() + 1.0) / 2.0).ceil() * 2.0 - 1.0;
        Some(if n < 0.0 { -odd } else { odd })
    })
}

/// INT(value): round down to an integer
pub fn fn_int(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_number(params, |n| Some(n.floor()))
}

/// ABS(value)
pub fn fn_abs(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_number(params, |n| Some(n.abs()))
}

/// SQRT(value)
pub fn fn_sqrt(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_number(params, |n| (n >= 0.0).then(|| n.sqrt()))
}

/// EXP(power)
pub fn fn_exp(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_number(params, |n| Some(n.exp()))
}

/// POWER(base, exponent)
pub fn fn_power(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if arg(params, 1).is_null() {
        return Ok(FormulaValue::Null);
    }
    let exponent = number_arg(params, 1, 1.0);
    map_number(params, |base| Some(base.powf(exponent)))
}

/// LOG(value, [base])
pub fn fn_log(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let base = number_arg(params, 1, 10.0);
    map_number(params, |n| {
        if n <= 0.0 || base <= 0.0 || base == 1.0 {
            None
        } else if base == 10.0 {
            Some(n.log10())
        } else if base == 2.0 {
            Some(n.log2())
        } else {
            Some(n.ln() / base.ln())
        }
    })
}

/// MOD(dividend, divisor): the result has the divisor's sign
pub fn fn_mod(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if arg(params, 1).is_null() {
        return Ok(FormulaValue::Null);
    }
    let divisor = number_arg(params, 1, 0.0);
    map_number(params, |n| {
        if divisor == 0.0 {
            None
        } else {
            Some(n - divisor * (n / divisor).floor())
        }
    })
}

/// VALUE(text): parse text such as "$1,234.50" or "15%"
pub fn fn_value(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_first(params, |v| {
        let parsed = match v {
            FormulaValue::Number(n) => Some(*n),
            other => parse_numeric_text(&other.to_text()),
        };
        Ok(parsed.map_or(FormulaValue::Null, FormulaValue::Number))
    })
}

fn parse_numeric_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '$') && !c.is_whitespace())
        .collect();
    match cleaned.strip_suffix('%') {
        Some(percent) => parse_number(percent).map(|n| n / 100.0),
        None => parse_number(&cleaned),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::FormulaError;
    use crate::test_support::{eval, infer, value};
    use crate::value::{FormulaValue, TypedValue};
    use gridbase_core::CellValueType;
    use pretty_assertions::assert_eq;

    fn num(n: f64) -> FormulaValue {
        FormulaValue::Number(n)
    }

    #[test]
    fn test_sum_average_flatten_and_skip_nulls() {
        assert_eq!(value("SUM(1, 2, 3)"), num(6.0));
        assert_eq!(value("SUM({fldNums}, {fldNum})"), num(18.0));
        assert_eq!(value("AVERAGE({fldNums})"), num(2.0));
        assert_eq!(value("SUM({fldEmpty})"), num(0.0));
        assert_eq!(value("AVERAGE({fldEmpty})"), FormulaValue::Null);
        assert_eq!(
            eval("SUM({fldNums})").unwrap(),
            TypedValue::number(6.0)
        );
    }

    #[test]
    fn test_max_min() {
        assert_eq!(value("MAX(3, {fldNums}, -1)"), num(3.0));
        assert_eq!(value("MIN(3, {fldNums}, -1)"), num(-1.0));
        assert_eq!(value("MAX({fldEmpty})"), FormulaValue::Null);
    }

    #[test]
    fn test_round_family() {
        assert_eq!(value("ROUND(2.5)"), num(3.0));
        assert_eq!(value("ROUND(-2.5)"), num(-3.0));
        assert_eq!(value("ROUND(2.675, 2)"), num(2.68));
        assert_eq!(value("ROUND(1234.5, -2)"), num(1200.0));
        assert_eq!(value("ROUNDUP(1.21, 1)"), num(1.3));
        assert_eq!(value("ROUNDUP(-1.21, 1)"), num(-1.3));
        assert_eq!(value("ROUNDDOWN(1.29, 1)"), num(1.2));
        assert_eq!(value("ROUND({fldEmpty})"), FormulaValue::Null);
    }

    #[test]
    fn test_ceiling_floor_even_odd_int() {
        assert_eq!(value("CEILING(4.2)"), num(5.0));
        assert_eq!(value("CEILING(12, 5)"), num(15.0));
        assert_eq!(value("FLOOR(12, 5)"), num(10.0));
        assert_eq!(value("EVEN(3)"), num(4.0));
        assert_eq!(value("EVEN(-1.5)"), num(-2.0));
        assert_eq!(value("ODD(2)"), num(3.0));
        assert_eq!(value("ODD(0)"), num(1.0));
        assert_eq!(value("INT(-1.5)"), num(-2.0));
    }

    #[test]
    fn test_math() {
        assert_eq!(value("ABS(-4)"), num(4.0));
        assert_eq!(value("SQRT(16)"), num(4.0));
        assert_eq!(value("SQRT(-1)"), FormulaValue::Null);
        assert_eq!(value("EXP(0)"), num(1.0));
        assert_eq!(value("POWER(2, 10)"), num(1024.0));
        assert_eq!(value("LOG(1000)"), num(3.0));
        assert_eq!(value("LOG(8, 2)"), num(3.0));
        assert_eq!(value("LOG(0)"), FormulaValue::Null);
        assert_eq!(value("MOD(10, 3)"), num(1.0));
        assert_eq!(value("MOD(-3, 2)"), num(1.0));
        assert_eq!(value("MOD(1, 0)"), FormulaValue::Null);
    }

    #[test]
    fn test_value_parses_text() {
        assert_eq!(value("VALUE('$1,234.50')"), num(1234.5));
        assert_eq!(value("VALUE('15%')"), num(0.15));
        assert_eq!(value("VALUE('abc')"), FormulaValue::Null);
        assert_eq!(value("VALUE(7)"), num(7.0));
    }

    #[test]
    fn test_element_wise_over_multiple() {
        let typed = eval("ABS({fldNums})").unwrap();
        assert!(typed.is_multiple);
        assert_eq!(
            typed.value,
            FormulaValue::Array(vec![num(1.0), num(2.0), FormulaValue::Null, num(3.0)])
        );
        assert_eq!(value("ROUND({fldNums}, 0)"), value("ABS({fldNums})"));
    }

    #[test]
    fn test_numeric_type_checks() {
        assert!(matches!(
            eval("ABS('x')"),
            Err(FormulaError::InvalidParams { function, .. }) if function == "ABS"
        ));
        assert!(matches!(
            eval("POWER(2)"),
            Err(FormulaError::InvalidParams { .. })
        ));
        assert!(matches!(
            eval("MOD(10, {fldNums})"),
            Err(FormulaError::InvalidParams { .. })
        ));
        assert_eq!(
            infer("SUM({fldNums})").unwrap(),
            TypedValue::null(CellValueType::Number, false)
        );
        assert_eq!(
            infer("SQRT({fldNums})").unwrap(),
            TypedValue::null(CellValueType::Number, true)
        );
    }
}
