//! # gridbase-core
//!
//! Field and record data model consumed by the gridbase formula engine.
//!
//! This crate provides the types the surrounding application hands to the engine:
//! - [`CellValueType`] - The semantic value category of a cell (String/Number/Boolean/DateTime)
//! - [`FieldType`] - The user-facing field kind (SingleSelect, Link, User, ...)
//! - [`FieldMeta`] and [`FieldMap`] - Field metadata, keyed by field id
//! - [`Record`] - A single row's raw field values
//!
//! ## Example
//!
//! ```rust
//! use gridbase_core::{CellValueType, FieldMap, FieldMeta, FieldType, Record};
//!
//! let mut fields = FieldMap::new();
//! fields.insert(FieldMeta::new("fldPrice", "Price", FieldType::Number)).unwrap();
//!
//! let record = Record::new("rec1").with_field("fldPrice", 42.5);
//! let price = fields.get("fldPrice").unwrap();
//! assert_eq!(price.cell_value_type, CellValueType::Number);
//! assert_eq!(record.get("fldPrice"), Some(&serde_json::json!(42.5)));
//! ```

pub mod error;
pub mod field;
pub mod record;

// Re-exports for convenience
pub use error::{Error, Result};
pub use field::{CellValueType, FieldLookup, FieldMap, FieldMeta, FieldType};
pub use record::Record;
