//! # gridbase-formula
//!
//! Formula parser and typed evaluator for gridbase fields.
//!
//! This crate provides:
//! - Formula parsing (text → AST) with positioned syntax errors
//! - Typed evaluation against a record, or type inference without one
//! - Built-in functions (numeric, text, logical, date, array, system)
//! - Field reference extraction, conversion and dependency tracking
//!
//! ## Example
//!
//! ```rust
//! use gridbase_core::{FieldMap, FieldMeta, FieldType, Record};
//! use gridbase_formula::{evaluate, FormulaValue};
//!
//! let fields = FieldMap::from_fields([
//!     FieldMeta::new("fldPrice", "Price", FieldType::Number),
//! ]).unwrap();
//! let record = Record::new("rec1").with_field("fldPrice", 8);
//!
//! let result = evaluate("ROUND({fldPrice} / 3, 2)", &fields, Some(&record)).unwrap();
//! assert_eq!(result.value, FormulaValue::Number(2.67));
//! ```

pub mod ast;
pub mod convert;
pub mod dependency;
pub mod error;
pub mod error_listener;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod references;
pub mod value;

#[cfg(test)]
mod test_support;

pub use ast::{BinaryOperator, FormulaExpr, Literal, UnaryOperator};
pub use dependency::{referenced_fields, FieldDependencyGraph};
pub use error::{FormulaError, FormulaResult, FormulaSyntaxError};
pub use error_listener::{Diagnostic, ErrorListener, FormulaErrorListener};
pub use evaluator::{
    evaluate, evaluate_expr, evaluate_with_options, evaluate_with_registry, infer_field_type,
    infer_type, EvaluationContext, EvaluatorOptions,
};
pub use functions::{FunctionContract, FunctionDef, FunctionName, FunctionRegistry, FunctionType};
pub use parser::{parse_formula, parse_with_listener, MAX_NESTING_DEPTH};
pub use references::convert_field_references;
pub use value::{FormulaValue, ReturnType, TypedValue};
