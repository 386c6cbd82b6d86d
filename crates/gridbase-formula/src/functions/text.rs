//! Text functions

use super::{
    arg, int_arg, map_first, numeric_at, FunctionDef, FunctionImpl, FunctionName, FunctionType,
    MultipleArgs, ReturnRule,
};
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::EvaluationContext;
use crate::value::{FormulaValue, TypedValue};
use gridbase_core::CellValueType;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

/// Longest text REPT may produce, in characters
pub const MAX_TEXT_LENGTH: usize = 100_000;

/// Characters `encodeURIComponent` leaves alone
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub(super) fn definitions() -> Vec<FunctionDef> {
    vec![
        FunctionDef::new(FunctionName::Concatenate, FunctionType::Text, fn_concatenate)
            .args(1, None)
            .multiple(MultipleArgs::Any)
            .returns(ReturnRule::Scalar(CellValueType::String)),
        FunctionDef::new(FunctionName::Find, FunctionType::Text, fn_find)
            .args(2, Some(3))
            .returns(ReturnRule::Inherit(CellValueType::Number))
            .validate_with(|p| numeric_at(p, &[2])),
        FunctionDef::new(FunctionName::Search, FunctionType::Text, fn_search)
            .args(2, Some(3))
            .returns(ReturnRule::Inherit(CellValueType::Number))
            .validate_with(|p| numeric_at(p, &[2])),
        transform(FunctionName::Mid, fn_mid)
            .args(3, Some(3))
            .validate_with(|p| numeric_at(p, &[1, 2])),
        transform(FunctionName::Left, fn_left)
            .args(1, Some(2))
            .validate_with(|p| numeric_at(p, &[1])),
        transform(FunctionName::Right, fn_right)
            .args(1, Some(2))
            .validate_with(|p| numeric_at(p, &[1])),
        transform(FunctionName::Replace, fn_replace)
            .args(4, Some(4))
            .validate_with(|p| numeric_at(p, &[1, 2])),
        transform(FunctionName::RegexpReplace, fn_regexp_replace).args(3, Some(3)),
        transform(FunctionName::Substitute, fn_substitute)
            .args(3, Some(4))
            .validate_with(|p| numeric_at(p, &[3])),
        transform(FunctionName::Lower, fn_lower),
        transform(FunctionName::Upper, fn_upper),
        transform(FunctionName::Trim, fn_trim),
        transform(FunctionName::Len, fn_len).returns(ReturnRule::Inherit(CellValueType::Number)),
        transform(FunctionName::Rept, fn_rept)
            .args(2, Some(2))
            .validate_with(|p| numeric_at(p, &[1])),
        transform(FunctionName::T, fn_t),
        transform(FunctionName::EncodeUrlComponent, fn_encode_url_component),
        FunctionDef::new(FunctionName::TextAll, FunctionType::Text, fn_text_all)
            .multiple(MultipleArgs::Any)
            .returns(ReturnRule::Inherit(CellValueType::String)),
    ]
}

/// Text transform, mapped over a multiple first argument
fn transform(name: FunctionName, implementation: FunctionImpl) -> FunctionDef {
    FunctionDef::new(name, FunctionType::Text, implementation)
        .multiple(MultipleArgs::FirstOnly)
        .returns(ReturnRule::Inherit(CellValueType::String))
}

fn take_left(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn take_right(s: &str, n: usize) -> String {
    let len = s.chars().count();
    if n >= len {
        return s.to_string();
    }
    s.chars().skip(len - n).collect()
}

fn take_mid(s: &str, start_1based: usize, n: usize) -> String {
    if start_1based == 0 {
        return String::new();
    }
    s.chars().skip(start_1based - 1).take(n).collect()
}

/// 1-based character position of `needle` in `haystack`, starting at `start`
fn position(haystack: &str, needle: &str, start: usize) -> Option<usize> {
    let skip = start.saturating_sub(1);
    let byte_start = haystack
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .or_else(|| (skip == haystack.chars().count()).then(|| haystack.len()))?;
    let found = haystack[byte_start..].find(needle)?;
    Some(haystack[..byte_start + found].chars().count() + 1)
}

fn text(v: &FormulaValue) -> FormulaValue {
    FormulaValue::String(v.to_text())
}

/// CONCATENATE(text, ...)
pub fn fn_concatenate(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if params.iter().all(TypedValue::is_null) {
        return Ok(FormulaValue::Null);
    }
    Ok(FormulaValue::String(
        params.iter().map(|p| p.value.to_text()).collect(),
    ))
}

fn find_impl(params: &[TypedValue], case_sensitive: bool) -> Option<Option<usize>> {
    let needle = arg(params, 0);
    let haystack = arg(params, 1);
    if needle.is_null() || haystack.is_null() {
        return None;
    }
    let start = int_arg(params, 2, 1)?.max(1) as usize;
    let (needle, haystack) = if case_sensitive {
        (needle.to_text(), haystack.to_text())
    } else {
        (needle.to_text().to_lowercase(), haystack.to_text().to_lowercase())
    };
    Some(position(&haystack, &needle, start))
}

/// FIND(needle, haystack, [start]): 0 when absent
pub fn fn_find(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match find_impl(params, true) {
        Some(found) => FormulaValue::Number(found.unwrap_or(0) as f64),
        None => FormulaValue::Null,
    })
}

/// SEARCH(needle, haystack, [start]): case-insensitive, null when absent
pub fn fn_search(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match find_impl(params, false) {
        Some(Some(pos)) => FormulaValue::Number(pos as f64),
        _ => FormulaValue::Null,
    })
}

/// MID(text, start, count)
pub fn fn_mid(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let (start, count) = match (int_arg(params, 1, 1), int_arg(params, 2, 0)) {
        (Some(start), Some(count)) if start >= 1 && count >= 0 => (start as usize, count as usize),
        _ => return Ok(FormulaValue::Null),
    };
    map_first(params, |v| {
        Ok(FormulaValue::String(take_mid(&v.to_text(), start, count)))
    })
}

/// LEFT(text, [count])
pub fn fn_left(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match int_arg(params, 1, 1) {
        Some(n) if n >= 0 => map_first(params, |v| {
            Ok(FormulaValue::String(take_left(&v.to_text(), n as usize)))
        }),
        _ => Ok(FormulaValue::Null),
    }
}

/// RIGHT(text, [count])
pub fn fn_right(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match int_arg(params, 1, 1) {
        Some(n) if n >= 0 => map_first(params, |v| {
            Ok(FormulaValue::String(take_right(&v.to_text(), n as usize)))
        }),
        _ => Ok(FormulaValue::Null),
    }
}

/// REPLACE(text, start, count, replacement)
pub fn fn_replace(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let (start, count) = match (int_arg(params, 1, 1), int_arg(params, 2, 0)) {
        (Some(start), Some(count)) if start >= 1 && count >= 0 => (start as usize, count as usize),
        _ => return Ok(FormulaValue::Null),
    };
    let replacement = arg(params, 3).to_text();
    map_first(params, |v| {
        let s = v.to_text();
        let mut out: String = s.chars().take(start - 1).collect();
        out.push_str(&replacement);
        out.extend(s.chars().skip(start - 1 + count));
        Ok(FormulaValue::String(out))
    })
}

/// REGEXP_REPLACE(text, pattern, replacement)
pub fn fn_regexp_replace(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let pattern = arg(params, 1).to_text();
    let regex = Regex::new(&pattern).map_err(|e| {
        FormulaError::invalid_params(
            FunctionName::RegexpReplace.as_str(),
            format!("invalid pattern '{}': {}", pattern, e),
        )
    })?;
    let replacement = arg(params, 2).to_text();
    map_first(params, |v| {
        Ok(FormulaValue::String(
            regex
                .replace_all(&v.to_text(), replacement.as_str())
                .into_owned(),
        ))
    })
}

/// SUBSTITUTE(text, old, new, [occurrence])
pub fn fn_substitute(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let old = arg(params, 1).to_text();
    let new = arg(params, 2).to_text();
    let occurrence = match params.get(3) {
        Some(p) => match p.value.as_number() {
            Some(n) if n >= 1.0 => Some(n.trunc() as usize),
            _ => return Ok(FormulaValue::Null),
        },
        None => None,
    };

    map_first(params, |v| {
        let s = v.to_text();
        if old.is_empty() {
            return Ok(FormulaValue::String(s));
        }
        let result = match occurrence {
            None => s.replace(&old, &new),
            Some(n) => match s.match_indices(&old).nth(n - 1) {
                Some((i, _)) => format!("{}{}{}", &s[..i], new, &s[i + old.len()..]),
                None => s,
            },
        };
        Ok(FormulaValue::String(result))
    })
}

/// LOWER(text)
pub fn fn_lower(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_first(params, |v| Ok(FormulaValue::String(v.to_text().to_lowercase())))
}

/// UPPER(text)
pub fn fn_upper(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_first(params, |v| Ok(FormulaValue::String(v.to_text().to_uppercase())))
}

/// TRIM(text)
pub fn fn_trim(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_first(params, |v| Ok(FormulaValue::String(v.to_text().trim().to_string())))
}

/// LEN(text)
pub fn fn_len(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    map_first(params, |v| {
        Ok(FormulaValue::Number(v.to_text().chars().count() as f64))
    })
}

/// REPT(text, count)
pub fn fn_rept(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count = match int_arg(params, 1, 0) {
        Some(n) if n >= 0 => n as usize,
        _ => return Ok(FormulaValue::Null),
    };
    map_first(params, |v| {
        let s = v.to_text();
        if s.chars().count().saturating_mul(count) > MAX_TEXT_LENGTH {
            return Err(FormulaError::invalid_params(
                FunctionName::Rept.as_str(),
                format!("result would exceed {} characters", MAX_TEXT_LENGTH),
            ));
        }
        Ok(FormulaValue::String(s.repeat(count)))
    })
}

/// T(value): the value if it is text, else null
pub fn fn_t(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let is_text = params
        .first()
        .map_or(false, |p| p.value_type == CellValueType::String);
    if !is_text {
        return Ok(FormulaValue::Null);
    }
    map_first(params, |v| Ok(text(v)))
}

/// ENCODE_URL_COMPONENT(text)
pub fn fn_encode_url_component(
    params: &[TypedValue],
    _ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    map_first(params, |v| {
        Ok(FormulaValue::String(
            utf8_percent_encode(&v.to_text(), URI_COMPONENT).to_string(),
        ))
    })
}

/// TEXT_ALL(value): every element as text, nested arrays joined with ", "
///
/// A scalar is rendered as text too rather than passed through unchanged, so the
/// result always matches the declared String type.
pub fn fn_text_all(params: &[TypedValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match arg(params, 0) {
        FormulaValue::Null => FormulaValue::Null,
        FormulaValue::Array(items) => FormulaValue::Array(items.iter().map(text).collect()),
        scalar => text(scalar),
    })
}
