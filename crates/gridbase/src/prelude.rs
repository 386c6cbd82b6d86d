//! Prelude module - common imports for gridbase users
//!
//! ```rust
//! use gridbase::prelude::*;
//! ```

pub use crate::{
    // Calculation types
    CalculationOptions,
    CalculationStats,
    // Field model
    CellValueType,
    // Error types
    Error,
    EvaluatorOptions,
    FieldLookup,
    FieldMap,
    FieldMeta,
    FieldType,
    FormulaError,
    FormulaValue,
    Record,
    // Extension traits
    RecordCalculationExt,
    RecordCalculator,
    Result,
    TypedValue,
};

// Entry points
pub use crate::{evaluate, evaluate_with_options, infer_field_type, parse_formula};
