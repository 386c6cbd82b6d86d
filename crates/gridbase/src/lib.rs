//! # gridbase
//!
//! Typed formula fields for tables whose columns carry semantic types.
//!
//! Formula fields compute a value from other fields of the same record. This crate
//! ties the field model and the formula engine together:
//!
//! - Parse and type-check formulas against the table's fields
//! - Evaluate a formula for one record, or every formula field in dependency order
//! - Detect circular formulas before any record is touched
//! - Rewrite field references between ids and display names
//!
//! ## Example
//!
//! ```rust
//! use gridbase::prelude::*;
//!
//! let fields = FieldMap::from_fields([
//!     FieldMeta::new("fldFirst", "First", FieldType::SingleLineText),
//!     FieldMeta::new("fldLast", "Last", FieldType::SingleLineText),
//!     FieldMeta::formula("fldFull", "Full Name", "{fldFirst} & ' ' & UPPER({fldLast})"),
//! ]).unwrap();
//!
//! // Type of a formula without any record
//! let typed = evaluate("{fldFirst} & '!'", &fields, None).unwrap();
//! assert_eq!(typed.value_type, CellValueType::String);
//!
//! // Every formula field of a record
//! let mut record = Record::new("rec1")
//!     .with_field("fldFirst", "Ada")
//!     .with_field("fldLast", "Lovelace");
//! record.calculate(&fields).into_result().unwrap();
//! assert_eq!(record.get("fldFull"), Some(&serde_json::json!("Ada LOVELACE")));
//! ```

pub mod calculation;
pub mod error;
pub mod prelude;

// Re-export calculation types
pub use calculation::{
    CalculationOptions, CalculationStats, RecordCalculationExt, RecordCalculator,
};
pub use error::{Error, Result};

// Re-export core types
pub use gridbase_core::{
    CellValueType, Error as FieldError, FieldLookup, FieldMap, FieldMeta, FieldType, Record,
};

// Re-export formula types
pub use gridbase_formula::{
    convert_field_references, evaluate, evaluate_expr, evaluate_with_options,
    evaluate_with_registry, infer_field_type, infer_type, parse_formula, parse_with_listener,
    referenced_fields, Diagnostic, ErrorListener, EvaluationContext, EvaluatorOptions,
    FieldDependencyGraph, FormulaError, FormulaErrorListener, FormulaExpr, FormulaResult,
    FormulaSyntaxError, FormulaValue, FunctionContract, FunctionName, FunctionRegistry,
    FunctionType, ReturnType, TypedValue,
};
