//! Formula evaluator
//!
//! Walks a formula AST bottom-up and produces a [`TypedValue`]. With a record,
//! field references read concrete values; without one, they produce typed
//! placeholders and the walk doubles as static type inference.

use crate::ast::{BinaryOperator, FormulaExpr, Literal, UnaryOperator};
use crate::convert::typed_from_raw;
use crate::error::{FormulaError, FormulaResult};
use crate::functions::FunctionRegistry;
use crate::parser::parse_formula;
use crate::value::{parse_datetime, FormulaValue, ReturnType, TypedValue};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use gridbase_core::{CellValueType, FieldLookup, FieldMap, Record};
use std::cmp::Ordering;

/// Settings for one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorOptions {
    /// How `{...}` references and record keys are resolved
    pub field_lookup: FieldLookup,
    /// Zone used for calendar components and offset-less datetime strings
    pub utc_offset: FixedOffset,
    /// Pinned clock for `NOW`, `TODAY`, `FROMNOW` and `TONOW`
    pub now: Option<DateTime<Utc>>,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            field_lookup: FieldLookup::Id,
            utc_offset: Utc.fix(),
            now: None,
        }
    }
}

impl EvaluatorOptions {
    pub fn with_field_lookup(mut self, field_lookup: FieldLookup) -> Self {
        self.field_lookup = field_lookup;
        self
    }

    pub fn with_utc_offset(mut self, utc_offset: FixedOffset) -> Self {
        self.utc_offset = utc_offset;
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

/// Evaluation context
pub struct EvaluationContext<'a> {
    /// Metadata of every field the formula may reference
    pub fields: &'a FieldMap,
    /// The record being evaluated; `None` in type-inference mode
    pub record: Option<&'a Record>,
    /// Evaluation settings
    pub options: &'a EvaluatorOptions,
    /// Clock reading shared by every function in this evaluation
    pub now: DateTime<Utc>,
    registry: &'a FunctionRegistry,
}

impl<'a> EvaluationContext<'a> {
    /// Create a context using the built-in function registry
    pub fn new(
        fields: &'a FieldMap,
        record: Option<&'a Record>,
        options: &'a EvaluatorOptions,
    ) -> Self {
        Self {
            fields,
            record,
            options,
            now: options.now.unwrap_or_else(Utc::now),
            registry: FunctionRegistry::global(),
        }
    }

    /// Use a caller-owned function registry
    pub fn with_registry(mut self, registry: &'a FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Whether this is a type-inference pass
    pub fn is_type_check(&self) -> bool {
        self.record.is_none()
    }

    pub fn utc_offset(&self) -> &FixedOffset {
        &self.options.utc_offset
    }

    /// A datetime in the configured zone
    pub fn local(&self, dt: &DateTime<Utc>) -> DateTime<FixedOffset> {
        dt.with_timezone(&self.options.utc_offset)
    }

    /// Datetime view of a value: datetimes, ISO strings and epoch milliseconds
    pub fn as_datetime(&self, value: &FormulaValue) -> Option<DateTime<Utc>> {
        match value {
            FormulaValue::DateTime(dt) => Some(*dt),
            FormulaValue::String(s) => parse_datetime(s, &self.options.utc_offset),
            FormulaValue::Number(n) if n.is_finite() => {
                DateTime::<Utc>::from_timestamp_millis(*n as i64)
            }
            _ => None,
        }
    }
}

/// Evaluate formula source against a field map and an optional record
///
/// # Example
/// ```rust
/// use gridbase_core::{CellValueType, FieldMap, FieldMeta, FieldType, Record};
/// use gridbase_formula::{evaluate, FormulaValue};
///
/// let fields = FieldMap::from_fields([FieldMeta::new("fldQty", "Qty", FieldType::Number)]).unwrap();
/// let record = Record::new("rec1").with_field("fldQty", 4);
///
/// let result = evaluate("{fldQty} * 2.5", &fields, Some(&record)).unwrap();
/// assert_eq!(result.value, FormulaValue::Number(10.0));
/// assert_eq!(result.value_type, CellValueType::Number);
/// ```
pub fn evaluate(
    source: &str,
    fields: &FieldMap,
    record: Option<&Record>,
) -> FormulaResult<TypedValue> {
    evaluate_with_options(source, fields, record, &EvaluatorOptions::default())
}

/// Evaluate with explicit options
pub fn evaluate_with_options(
    source: &str,
    fields: &FieldMap,
    record: Option<&Record>,
    options: &EvaluatorOptions,
) -> FormulaResult<TypedValue> {
    let ctx = EvaluationContext::new(fields, record, options);
    evaluate_source(source, &ctx)
}

/// Evaluate with a caller-owned function registry
pub fn evaluate_with_registry(
    source: &str,
    fields: &FieldMap,
    record: Option<&Record>,
    options: &EvaluatorOptions,
    registry: &FunctionRegistry,
) -> FormulaResult<TypedValue> {
    let ctx = EvaluationContext::new(fields, record, options).with_registry(registry);
    evaluate_source(source, &ctx)
}

fn evaluate_source(source: &str, ctx: &EvaluationContext) -> FormulaResult<TypedValue> {
    tracing::debug!(
        formula = source,
        record = ctx.record.map(|r| r.id.as_str()),
        "evaluating formula"
    );
    let expr = parse_formula(source)?;
    let result = evaluate_expr(&expr, ctx);
    if let Err(e) = &result {
        tracing::debug!(formula = source, error = %e, "formula evaluation failed");
    }
    result
}

/// Static result type of a formula, computed without a record
pub fn infer_type(
    source: &str,
    fields: &FieldMap,
    options: &EvaluatorOptions,
) -> FormulaResult<ReturnType> {
    evaluate_with_options(source, fields, None, options).map(|typed| typed.return_type())
}

/// Cell-value type and multiplicity a formula field with this expression should declare
pub fn infer_field_type(expression: &str, fields: &FieldMap) -> FormulaResult<ReturnType> {
    infer_type(expression, fields, &EvaluatorOptions::default())
}

/// Evaluate a parsed formula expression
pub fn evaluate_expr(expr: &FormulaExpr, ctx: &EvaluationContext) -> FormulaResult<TypedValue> {
    match expr {
        // === Literals ===
        FormulaExpr::Literal(Literal::Number(n)) => Ok(TypedValue::number(*n)),
        FormulaExpr::Literal(Literal::String(s)) => Ok(TypedValue::string(s.clone())),
        FormulaExpr::Literal(Literal::Boolean(b)) => Ok(TypedValue::boolean(*b)),

        // === References ===
        FormulaExpr::FieldRef(key) => evaluate_field_ref(key, ctx),

        // === Operators ===
        FormulaExpr::Unary { op, operand } => {
            let operand = evaluate_expr(operand, ctx)?;
            evaluate_unary_op(*op, operand, ctx)
        }

        FormulaExpr::Binary { op, left, right } => {
            let left = evaluate_expr(left, ctx)?;
            let right = evaluate_expr(right, ctx)?;
            evaluate_binary_op(*op, left, right, ctx)
        }

        // === Functions ===
        FormulaExpr::Call { name, args } => evaluate_function(name, args, ctx),
    }
}

fn evaluate_field_ref(key: &str, ctx: &EvaluationContext) -> FormulaResult<TypedValue> {
    let lookup = ctx.options.field_lookup;
    let field = ctx
        .fields
        .resolve(key, lookup)
        .ok_or_else(|| FormulaError::FieldNotFound(key.to_string()))?;

    match ctx.record {
        Some(record) => {
            let record_key = match lookup {
                FieldLookup::Id => &field.id,
                FieldLookup::Name => &field.name,
            };
            typed_from_raw(field, record.get(record_key), ctx.utc_offset())
        }
        None => Ok(TypedValue::null(
            field.cell_value_type,
            field.is_multiple_cell_value,
        )),
    }
}

/// Evaluate a function call
fn evaluate_function(
    name: &str,
    args: &[FormulaExpr],
    ctx: &EvaluationContext,
) -> FormulaResult<TypedValue> {
    let func = ctx.registry.lookup(name)?;

    // Evaluate arguments
    let params = args
        .iter()
        .map(|arg| evaluate_expr(arg, ctx))
        .collect::<FormulaResult<Vec<_>>>()?;

    func.validate_params(&params)?;
    let return_type = func.return_type(&params);

    if ctx.is_type_check() {
        return Ok(TypedValue::null(
            return_type.value_type,
            return_type.is_multiple,
        ));
    }

    tracing::trace!(function = name, args = params.len(), "calling function");
    let value = func.eval(&params, ctx)?;
    Ok(TypedValue::new(
        value,
        return_type.value_type,
        return_type.is_multiple,
    ))
}

/// Evaluate a unary operation
fn evaluate_unary_op(
    op: UnaryOperator,
    operand: TypedValue,
    ctx: &EvaluationContext,
) -> FormulaResult<TypedValue> {
    match op {
        UnaryOperator::Negate => {
            if operand.is_multiple || operand.value_type != CellValueType::Number {
                return Err(FormulaError::type_mismatch(format!(
                    "unary '-' expects a number, got {}",
                    describe(&operand)
                )));
            }
            if ctx.is_type_check() {
                return Ok(TypedValue::null(CellValueType::Number, false));
            }
            let value = match operand.value.as_number() {
                Some(n) => FormulaValue::Number(-n),
                None => FormulaValue::Null,
            };
            Ok(TypedValue::new(value, CellValueType::Number, false))
        }
    }
}

/// Evaluate a binary operation
fn evaluate_binary_op(
    op: BinaryOperator,
    left: TypedValue,
    right: TypedValue,
    ctx: &EvaluationContext,
) -> FormulaResult<TypedValue> {
    match op {
        BinaryOperator::Concat => {
            if ctx.is_type_check() {
                return Ok(TypedValue::null(CellValueType::String, false));
            }
            if left.is_null() && right.is_null() {
                return Ok(TypedValue::null(CellValueType::String, false));
            }
            Ok(TypedValue::string(
                left.value.to_text() + &right.value.to_text(),
            ))
        }

        BinaryOperator::And | BinaryOperator::Or => {
            if ctx.is_type_check() {
                return Ok(TypedValue::null(CellValueType::Boolean, false));
            }
            let result = if op == BinaryOperator::And {
                left.value.is_truthy() && right.value.is_truthy()
            } else {
                left.value.is_truthy() || right.value.is_truthy()
            };
            Ok(TypedValue::boolean(result))
        }

        _ => {
            if left.is_multiple || right.is_multiple {
                return Err(FormulaError::type_mismatch(format!(
                    "operator '{}' does not accept multiple values ({} {} {})",
                    op.symbol(),
                    describe(&left),
                    op.symbol(),
                    describe(&right)
                )));
            }

            if op.is_arithmetic() {
                evaluate_arithmetic(op, &left, &right, ctx)
            } else {
                evaluate_comparison(op, &left, &right, ctx)
            }
        }
    }
}

fn evaluate_arithmetic(
    op: BinaryOperator,
    left: &TypedValue,
    right: &TypedValue,
    ctx: &EvaluationContext,
) -> FormulaResult<TypedValue> {
    if left.value_type != CellValueType::Number || right.value_type != CellValueType::Number {
        return Err(FormulaError::type_mismatch(format!(
            "operator '{}' expects numbers, got {} and {}",
            op.symbol(),
            describe(left),
            describe(right)
        )));
    }

    if ctx.is_type_check() || (left.is_null() && right.is_null()) {
        return Ok(TypedValue::null(CellValueType::Number, false));
    }

    // A single null operand counts as zero
    let l = left.value.as_number().unwrap_or(0.0);
    let r = right.value.as_number().unwrap_or(0.0);

    let result = match op {
        BinaryOperator::Add => Some(l + r),
        BinaryOperator::Subtract => Some(l - r),
        BinaryOperator::Multiply => Some(l * r),
        BinaryOperator::Divide if r == 0.0 => None,
        BinaryOperator::Divide => Some(l / r),
        BinaryOperator::Modulo if r == 0.0 => None,
        BinaryOperator::Modulo => Some(l % r),
        _ => None,
    };

    let value = match result {
        Some(n) if n.is_finite() => FormulaValue::Number(n),
        _ => FormulaValue::Null,
    };
    Ok(TypedValue::new(value, CellValueType::Number, false))
}

/// Whether two element types can be compared, after coercion
fn comparable(a: CellValueType, b: CellValueType) -> bool {
    use CellValueType::*;
    a == b
        || matches!(
            (a, b),
            (Number, Boolean) | (Boolean, Number) | (DateTime, String) | (String, DateTime)
        )
}

fn evaluate_comparison(
    op: BinaryOperator,
    left: &TypedValue,
    right: &TypedValue,
    ctx: &EvaluationContext,
) -> FormulaResult<TypedValue> {
    if !comparable(left.value_type, right.value_type) {
        return Err(FormulaError::type_mismatch(format!(
            "cannot compare {} with {} using '{}'",
            describe(left),
            describe(right),
            op.symbol()
        )));
    }

    if ctx.is_type_check() {
        return Ok(TypedValue::null(CellValueType::Boolean, false));
    }

    let result = match (&left.value, &right.value) {
        (FormulaValue::Null, FormulaValue::Null) => match op {
            BinaryOperator::Equal => true,
            BinaryOperator::NotEqual => false,
            _ => false,
        },
        (FormulaValue::Null, _) | (_, FormulaValue::Null) => op == BinaryOperator::NotEqual,
        (l, r) => match compare_values(left.value_type, right.value_type, l, r, ctx) {
            Some(ordering) => match op {
                BinaryOperator::Equal => ordering == Ordering::Equal,
                BinaryOperator::NotEqual => ordering != Ordering::Equal,
                BinaryOperator::LessThan => ordering == Ordering::Less,
                BinaryOperator::LessEqual => ordering != Ordering::Greater,
                BinaryOperator::GreaterThan => ordering == Ordering::Greater,
                BinaryOperator::GreaterEqual => ordering != Ordering::Less,
                _ => false,
            },
            // Incomparable concrete values (e.g. an unparsable date string)
            None => op == BinaryOperator::NotEqual,
        },
    };

    Ok(TypedValue::boolean(result))
}

fn compare_values(
    left_type: CellValueType,
    right_type: CellValueType,
    l: &FormulaValue,
    r: &FormulaValue,
    ctx: &EvaluationContext,
) -> Option<Ordering> {
    use CellValueType::*;
    match (left_type, right_type) {
        (String, String) => Some(l.to_text().cmp(&r.to_text())),
        (DateTime, _) | (_, DateTime) => {
            let l = ctx.as_datetime(l)?;
            let r = ctx.as_datetime(r)?;
            Some(l.cmp(&r))
        }
        _ => {
            let l = l.as_number()?;
            let r = r.as_number()?;
            l.partial_cmp(&r)
        }
    }
}

fn describe(value: &TypedValue) -> String {
    if value.is_multiple {
        format!("multiple {}", value.value_type)
    } else {
        value.value_type.to_string()
    }
}
