//! Field-related types
//!
//! This module contains:
//! - [`CellValueType`] - The semantic value category of a cell
//! - [`FieldType`] - The user-facing field kind
//! - [`FieldMeta`] - Metadata for one field
//! - [`FieldMap`] - All fields visible to a formula, keyed by id

mod kind;
mod map;
mod meta;

pub use kind::{CellValueType, FieldType};
pub use map::{FieldLookup, FieldMap};
pub use meta::FieldMeta;
