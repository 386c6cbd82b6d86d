//! Records
//!
//! A record is one row of a table: raw field values already decoded from storage
//! into their application-level JSON shape, plus a little system metadata.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// A single row's raw field values
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Record {
    /// Record identifier
    pub id: String,
    /// Raw values keyed by field id (or field name, depending on lookup mode)
    #[cfg_attr(feature = "serde", serde(default))]
    pub fields: AHashMap<String, Value>,
    /// Sequential number assigned on creation
    #[cfg_attr(feature = "serde", serde(default))]
    pub auto_number: Option<i64>,
    /// Creation timestamp
    #[cfg_attr(feature = "serde", serde(default))]
    pub created_time: Option<DateTime<Utc>>,
    /// Last modification timestamp
    #[cfg_attr(feature = "serde", serde(default))]
    pub last_modified_time: Option<DateTime<Utc>>,
}

impl Record {
    /// Create an empty record
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Builder-style field assignment
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Get the raw value of a field; `None` when the record has no entry
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set the raw value of a field
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }
}
