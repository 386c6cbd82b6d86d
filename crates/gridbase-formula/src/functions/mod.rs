//! Built-in formula functions
//!
//! Every function is a [`FunctionContract`]: a parameter validator, a return type
//! rule that looks only at argument types, and an evaluation rule over concrete
//! values. Type inference (no record) uses the first two; evaluation uses all three.

pub mod array;
pub mod date;
pub mod logical;
pub mod numeric;
pub mod system;
pub mod text;

use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::EvaluationContext;
use crate::value::{FormulaValue, ReturnType, TypedValue};
use ahash::AHashMap;
use gridbase_core::CellValueType;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

macro_rules! function_names {
    ($($variant:ident => $name:literal,)*) => {
        /// Names of the built-in functions
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum FunctionName {
            $($variant,)*
        }

        impl FunctionName {
            /// Every built-in function name
            pub const ALL: &'static [FunctionName] = &[$(FunctionName::$variant,)*];

            /// Upper-case name as written in formulas
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(FunctionName::$variant => $name,)*
                }
            }
        }
    };
}

function_names! {
    // Numeric
    Sum => "SUM",
    Average => "AVERAGE",
    Max => "MAX",
    Min => "MIN",
    Round => "ROUND",
    RoundUp => "ROUNDUP",
    RoundDown => "ROUNDDOWN",
    Ceiling => "CEILING",
    Floor => "FLOOR",
    Even => "EVEN",
    Odd => "ODD",
    Int => "INT",
    Abs => "ABS",
    Sqrt => "SQRT",
    Exp => "EXP",
    Power => "POWER",
    Log => "LOG",
    Mod => "MOD",
    Value => "VALUE",

    // Text
    Concatenate => "CONCATENATE",
    Find => "FIND",
    Search => "SEARCH",
    Mid => "MID",
    Left => "LEFT",
    Right => "RIGHT",
    Replace => "REPLACE",
    RegexpReplace => "REGEXP_REPLACE",
    Substitute => "SUBSTITUTE",
    Lower => "LOWER",
    Upper => "UPPER",
    Trim => "TRIM",
    Len => "LEN",
    Rept => "REPT",
    T => "T",
    EncodeUrlComponent => "ENCODE_URL_COMPONENT",
    TextAll => "TEXT_ALL",

    // Logical
    If => "IF",
    Switch => "SWITCH",
    And => "AND",
    Or => "OR",
    Xor => "XOR",
    Not => "NOT",
    Blank => "BLANK",

    // Date
    Today => "TODAY",
    Now => "NOW",
    Year => "YEAR",
    Month => "MONTH",
    Day => "DAY",
    Hour => "HOUR",
    Minute => "MINUTE",
    Second => "SECOND",
    Weekday => "WEEKDAY",
    WeekNum => "WEEKNUM",
    DateAdd => "DATE_ADD",
    DatetimeDiff => "DATETIME_DIFF",
    IsSame => "IS_SAME",
    IsAfter => "IS_AFTER",
    IsBefore => "IS_BEFORE",
    DateStr => "DATESTR",
    TimeStr => "TIMESTR",
    DatetimeFormat => "DATETIME_FORMAT",
    DatetimeParse => "DATETIME_PARSE",
    FromNow => "FROMNOW",
    ToNow => "TONOW",
    Workday => "WORKDAY",
    WorkdayDiff => "WORKDAY_DIFF",

    // Array
    CountAll => "COUNTALL",
    CountA => "COUNTA",
    Count => "COUNT",
    ArrayJoin => "ARRAY_JOIN",
    ArrayUnique => "ARRAY_UNIQUE",
    ArrayFlatten => "ARRAY_FLATTEN",
    ArrayCompact => "ARRAY_COMPACT",

    // System
    RecordId => "RECORD_ID",
    AutoNumber => "AUTO_NUMBER",
    CreatedTime => "CREATED_TIME",
    LastModifiedTime => "LAST_MODIFIED_TIME",
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionName {
    type Err = FormulaError;

    fn from_str(s: &str) -> FormulaResult<Self> {
        let upper = s.to_uppercase();
        FunctionName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == upper)
            .ok_or(FormulaError::UnknownFunction(upper))
    }
}

/// Function category, for grouping in listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FunctionType {
    Numeric,
    Text,
    Logical,
    Date,
    Array,
    System,
}

impl FunctionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionType::Numeric => "numeric",
            FunctionType::Text => "text",
            FunctionType::Logical => "logical",
            FunctionType::Date => "date",
            FunctionType::Array => "array",
            FunctionType::System => "system",
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The contract the evaluator calls for every function invocation
pub trait FunctionContract: Send + Sync {
    /// Upper-case name the function is looked up by
    fn name(&self) -> &str;

    fn func_type(&self) -> FunctionType;

    /// Element types accepted for arguments
    fn accept_value_types(&self) -> &[CellValueType];

    /// Whether a multiple (array) argument is accepted
    fn accept_multiple_value(&self) -> bool;

    /// Check arity and argument types; runs before `return_type` and `eval`
    fn validate_params(&self, params: &[TypedValue]) -> FormulaResult<()>;

    /// Result type from argument types alone
    fn return_type(&self, params: &[TypedValue]) -> ReturnType;

    /// Compute the result over concrete values
    fn eval(&self, params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue>;
}

/// Function implementation signature
pub type FunctionImpl = fn(&[TypedValue], &EvaluationContext) -> FormulaResult<FormulaValue>;

/// Function-specific parameter check, run after the generic arity and type checks
pub type ParamValidator = fn(&[TypedValue]) -> Result<(), String>;

/// Which arguments may be multiple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipleArgs {
    /// No argument may be multiple
    Rejected,
    /// Only the first argument; the function maps over its elements
    FirstOnly,
    /// Any argument
    Any,
}

/// How the result type follows from argument types
#[derive(Clone, Copy)]
pub enum ReturnRule {
    /// Always a single value of this type
    Scalar(CellValueType),
    /// This type, multiple when any argument is multiple
    Inherit(CellValueType),
    /// Same type and multiplicity as the first argument
    SameAsFirst,
    /// Function-specific rule
    Custom(fn(&[TypedValue]) -> ReturnType),
}

impl ReturnRule {
    fn apply(&self, params: &[TypedValue]) -> ReturnType {
        match self {
            ReturnRule::Scalar(t) => ReturnType::scalar(*t),
            ReturnRule::Inherit(t) => ReturnType::new(*t, any_multiple(params)),
            ReturnRule::SameAsFirst => params
                .first()
                .map(TypedValue::return_type)
                .unwrap_or_else(|| ReturnType::scalar(CellValueType::String)),
            ReturnRule::Custom(rule) => rule(params),
        }
    }
}

impl fmt::Debug for ReturnRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnRule::Scalar(t) => write!(f, "Scalar({})", t),
            ReturnRule::Inherit(t) => write!(f, "Inherit({})", t),
            ReturnRule::SameAsFirst => f.write_str("SameAsFirst"),
            ReturnRule::Custom(_) => f.write_str("Custom"),
        }
    }
}

pub(crate) const ALL_TYPES: &[CellValueType] = &CellValueType::ALL;
pub(crate) const NUMBER: &[CellValueType] = &[CellValueType::Number];
pub(crate) const NUMBER_OR_STRING: &[CellValueType] = &[CellValueType::Number, CellValueType::String];
pub(crate) const DATE_TYPES: &[CellValueType] = &[
    CellValueType::DateTime,
    CellValueType::String,
    CellValueType::Number,
];

/// Function definition
#[derive(Clone)]
pub struct FunctionDef {
    /// Function name
    pub name: FunctionName,
    /// Category
    pub func_type: FunctionType,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Accepted element types for every argument
    pub accept_value_types: &'static [CellValueType],
    /// Multiple-argument policy
    pub multiple: MultipleArgs,
    /// Return type rule
    pub return_rule: ReturnRule,
    /// Extra validation
    pub validator: Option<ParamValidator>,
    /// Implementation
    pub implementation: FunctionImpl,
}

impl FunctionDef {
    /// A single-argument function accepting any scalar and returning text
    pub fn new(name: FunctionName, func_type: FunctionType, implementation: FunctionImpl) -> Self {
        Self {
            name,
            func_type,
            min_args: 1,
            max_args: Some(1),
            accept_value_types: ALL_TYPES,
            multiple: MultipleArgs::Rejected,
            return_rule: ReturnRule::Inherit(CellValueType::String),
            validator: None,
            implementation,
        }
    }

    pub fn args(mut self, min_args: usize, max_args: Option<usize>) -> Self {
        self.min_args = min_args;
        self.max_args = max_args;
        self
    }

    pub fn accepts(mut self, types: &'static [CellValueType]) -> Self {
        self.accept_value_types = types;
        self
    }

    pub fn multiple(mut self, multiple: MultipleArgs) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn returns(mut self, rule: ReturnRule) -> Self {
        self.return_rule = rule;
        self
    }

    pub fn validate_with(mut self, validator: ParamValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    fn arity_message(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => {
                let plural = if max == 1 { "" } else { "s" };
                format!("expects exactly {} parameter{}", max, plural)
            }
            Some(max) => format!("expects {} to {} parameters", self.min_args, max),
            None => format!("expects at least {} parameter(s)", self.min_args),
        }
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("func_type", &self.func_type)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("multiple", &self.multiple)
            .field("return_rule", &self.return_rule)
            .finish_non_exhaustive()
    }
}

impl FunctionContract for FunctionDef {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn func_type(&self) -> FunctionType {
        self.func_type
    }

    fn accept_value_types(&self) -> &[CellValueType] {
        self.accept_value_types
    }

    fn accept_multiple_value(&self) -> bool {
        self.multiple != MultipleArgs::Rejected
    }

    fn validate_params(&self, params: &[TypedValue]) -> FormulaResult<()> {
        let name = self.name.as_str();

        // Arity comes first, regardless of parameter types
        let too_many = self.max_args.map_or(false, |max| params.len() > max);
        if params.len() < self.min_args || too_many {
            return Err(FormulaError::invalid_params(
                name,
                format!("{}, got {}", self.arity_message(), params.len()),
            ));
        }

        for (i, param) in params.iter().enumerate() {
            let multiple_ok = match self.multiple {
                MultipleArgs::Rejected => false,
                MultipleArgs::FirstOnly => i == 0,
                MultipleArgs::Any => true,
            };
            if param.is_multiple && !multiple_ok {
                return Err(FormulaError::invalid_params(
                    name,
                    format!("parameter {} must be a single value", i + 1),
                ));
            }
            if !self.accept_value_types.contains(&param.value_type) {
                return Err(FormulaError::invalid_params(
                    name,
                    format!(
                        "parameter {} does not accept {} values",
                        i + 1,
                        param.value_type
                    ),
                ));
            }
        }

        if let Some(validator) = self.validator {
            validator(params).map_err(|message| FormulaError::invalid_params(name, message))?;
        }

        Ok(())
    }

    fn return_type(&self, params: &[TypedValue]) -> ReturnType {
        self.return_rule.apply(params)
    }

    fn eval(&self, params: &[TypedValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
        (self.implementation)(params, ctx)
    }
}

/// Global function registry (lazily initialized)
static FUNCTION_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

/// Function registry
pub struct FunctionRegistry {
    functions: AHashMap<String, Box<dyn FunctionContract>>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register_numeric_functions();
        registry.register_text_functions();
        registry.register_logical_functions();
        registry.register_date_functions();
        registry.register_array_functions();
        registry.register_system_functions();

        registry
    }

    /// Create a registry without any functions
    pub fn empty() -> Self {
        Self {
            functions: AHashMap::new(),
        }
    }

    /// The shared registry of built-in functions
    pub fn global() -> &'static FunctionRegistry {
        FUNCTION_REGISTRY.get_or_init(FunctionRegistry::new)
    }

    /// Look up a function by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&dyn FunctionContract> {
        self.functions.get(&name.to_uppercase()).map(|f| f.as_ref())
    }

    /// Look up a function by name, failing with [`FormulaError::UnknownFunction`]
    pub fn lookup(&self, name: &str) -> FormulaResult<&dyn FunctionContract> {
        self.get(name)
            .ok_or_else(|| FormulaError::UnknownFunction(name.to_uppercase()))
    }

    /// Register a function, replacing any function of the same name
    pub fn register<F: FunctionContract + 'static>(&mut self, contract: F) {
        self.functions
            .insert(contract.name().to_uppercase(), Box::new(contract));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// All functions ordered by category, then name
    pub fn functions(&self) -> Vec<&dyn FunctionContract> {
        let mut all: Vec<&dyn FunctionContract> =
            self.functions.values().map(|f| f.as_ref()).collect();
        all.sort_by(|a, b| {
            a.func_type()
                .cmp(&b.func_type())
                .then_with(|| a.name().cmp(b.name()))
        });
        all
    }

    fn register_all(&mut self, defs: Vec<FunctionDef>) {
        for def in defs {
            self.register(def);
        }
    }

    fn register_numeric_functions(&mut self) {
        self.register_all(numeric::definitions());
    }

    fn register_text_functions(&mut self) {
        self.register_all(text::definitions());
    }

    fn register_logical_functions(&mut self) {
        self.register_all(logical::definitions());
    }

    fn register_date_functions(&mut self) {
        self.register_all(date::definitions());
    }

    fn register_array_functions(&mut self) {
        self.register_all(array::definitions());
    }

    fn register_system_functions(&mut self) {
        self.register_all(system::definitions());
    }
}

// === Helpers shared by the function modules ===

pub(crate) fn any_multiple(params: &[TypedValue]) -> bool {
    params.iter().any(|p| p.is_multiple)
}

/// Value of the parameter at `index`, null when omitted
pub(crate) fn arg(params: &[TypedValue], index: usize) -> &FormulaValue {
    static NULL: FormulaValue = FormulaValue::Null;
    params.get(index).map_or(&NULL, |p| &p.value)
}

/// Apply `f` to the first argument, element-wise when it is an array
///
/// Null propagates: a null argument or element maps to null without calling `f`.
pub(crate) fn map_first<F>(params: &[TypedValue], mut f: F) -> FormulaResult<FormulaValue>
where
    F: FnMut(&FormulaValue) -> FormulaResult<FormulaValue>,
{
    match arg(params, 0) {
        FormulaValue::Null => Ok(FormulaValue::Null),
        array @ FormulaValue::Array(_) => {
            let mapped = array
                .flatten()
                .into_iter()
                .map(|v| if v.is_null() { Ok(FormulaValue::Null) } else { f(v) })
                .collect::<FormulaResult<Vec<_>>>()?;
            Ok(FormulaValue::Array(mapped))
        }
        value => f(value),
    }
}

/// Integer view of an optional numeric parameter
pub(crate) fn int_arg(params: &[TypedValue], index: usize, default: i64) -> Option<i64> {
    match arg(params, index) {
        FormulaValue::Null if index >= params.len() => Some(default),
        value => value.as_number().map(|n| n.trunc() as i64),
    }
}

/// Require the parameters at `indices` (when present) to be numbers
pub(crate) fn numeric_at(params: &[TypedValue], indices: &[usize]) -> Result<(), String> {
    for &i in indices {
        if let Some(param) = params.get(i) {
            if param.value_type != CellValueType::Number {
                return Err(format!(
                    "parameter {} must be a number, got {}",
                    i + 1,
                    param.value_type
                ));
            }
        }
    }
    Ok(())
}
