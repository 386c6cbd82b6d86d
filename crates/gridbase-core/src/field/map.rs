//! Field lookup table

use super::{CellValueType, FieldMeta};
use crate::error::{Error, Result};
use ahash::AHashMap;

/// How a field key in a formula or a record is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldLookup {
    /// Keys are field ids (`{fldXXXX}`)
    #[default]
    Id,
    /// Keys are field display names (`{Price}`)
    Name,
}

/// The fields a formula may reference, keyed by id
///
/// Iteration follows insertion order. Field names are indexed as well so
/// formulas written against display names can be resolved.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    fields: Vec<FieldMeta>,
    by_id: AHashMap<String, usize>,
    by_name: AHashMap<String, usize>,
}

impl FieldMap {
    /// Create an empty field map
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a field map, validating every field
    pub fn from_fields<I>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = FieldMeta>,
    {
        let mut map = Self::new();
        for field in fields {
            map.insert(field)?;
        }
        Ok(map)
    }

    /// Add a field
    ///
    /// Fails if the field is invalid or its id or name is already taken.
    pub fn insert(&mut self, field: FieldMeta) -> Result<()> {
        field.validate()?;

        if self.by_id.contains_key(&field.id) {
            return Err(Error::DuplicateFieldId(field.id));
        }
        if self.by_name.contains_key(&field.name) {
            return Err(Error::DuplicateFieldName(field.name));
        }

        let idx = self.fields.len();
        self.by_id.insert(field.id.clone(), idx);
        self.by_name.insert(field.name.clone(), idx);
        self.fields.push(field);
        Ok(())
    }

    /// Look up a field by id
    pub fn get(&self, id: &str) -> Option<&FieldMeta> {
        self.by_id.get(id).map(|&idx| &self.fields[idx])
    }

    /// Look up a field by display name
    pub fn get_by_name(&self, name: &str) -> Option<&FieldMeta> {
        self.by_name.get(name).map(|&idx| &self.fields[idx])
    }

    /// Look up a field by id or name depending on `lookup`
    pub fn resolve(&self, key: &str, lookup: FieldLookup) -> Option<&FieldMeta> {
        match lookup {
            FieldLookup::Id => self.get(key),
            FieldLookup::Name => self.get_by_name(key),
        }
    }

    /// Record the value type inferred for a computed field
    ///
    /// Returns `false` if no field has this id.
    pub fn set_value_type(
        &mut self,
        id: &str,
        cell_value_type: CellValueType,
        is_multiple: bool,
    ) -> bool {
        match self.by_id.get(id) {
            Some(&idx) => {
                let field = &mut self.fields[idx];
                field.cell_value_type = cell_value_type;
                field.is_multiple_cell_value = is_multiple;
                true
            }
            None => false,
        }
    }

    /// Whether a field with this id exists
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Iterate fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &FieldMeta> + '_ {
        self.fields.iter()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the map has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::field::FieldType;

    fn sample() -> FieldMap {
        FieldMap::from_fields([
            FieldMeta::new("fldName", "Name", FieldType::SingleLineText),
            FieldMeta::new("fldAge", "Age", FieldType::Number),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_by_id_and_name() {
        let fields = sample();
        assert_eq!(fields.get("fldAge").unwrap().name, "Age");
        assert_eq!(fields.get_by_name("Name").unwrap().id, "fldName");
        assert_eq!(
            fields.resolve("Age", FieldLookup::Name).unwrap().id,
            "fldAge"
        );
        assert!(fields.resolve("Age", FieldLookup::Id).is_none());
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut fields = sample();
        assert!(matches!(
            fields.insert(FieldMeta::new("fldAge", "Other", FieldType::Number)),
            Err(Error::DuplicateFieldId(_))
        ));
        assert!(matches!(
            fields.insert(FieldMeta::new("fldOther", "Age", FieldType::Number)),
            Err(Error::DuplicateFieldName(_))
        ));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_iteration_order() {
        let ids: Vec<_> = sample().iter().map(|f| f.id.clone()).collect();
        assert_eq!(ids, vec!["fldName", "fldAge"]);
    }

    #[test]
    fn test_set_value_type() {
        let mut fields = sample();
        fields
            .insert(FieldMeta::formula("fldF", "F", "{fldAge} * 2"))
            .unwrap();
        assert!(fields.set_value_type("fldF", CellValueType::Number, false));
        assert_eq!(
            fields.get("fldF").unwrap().cell_value_type,
            CellValueType::Number
        );
        assert!(!fields.set_value_type("fldMissing", CellValueType::Number, false));
    }
}
