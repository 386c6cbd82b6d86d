//! Rewriting field references between ids and display names

use crate::dependency::referenced_fields;
use crate::error::{FormulaError, FormulaResult};
use crate::parser::parse_formula;
use gridbase_core::{FieldLookup, FieldMap};

/// Rewrite every `{...}` reference of `source` from `from` keys to `to` keys
///
/// The result is the canonical rendering of the parsed formula, so spacing and
/// comments are not preserved. Fails with [`FormulaError::FieldNotFound`] if a
/// reference does not resolve.
///
/// ```
/// use gridbase_core::{FieldLookup, FieldMap, FieldMeta, FieldType};
/// use gridbase_formula::convert_field_references;
///
/// let fields = FieldMap::from_fields([FieldMeta::new("fldQty", "Quantity", FieldType::Number)]).unwrap();
/// let by_name = convert_field_references("{fldQty}*2", &fields, FieldLookup::Id, FieldLookup::Name).unwrap();
/// assert_eq!(by_name, "{Quantity} * 2");
/// ```
pub fn convert_field_references(
    source: &str,
    fields: &FieldMap,
    from: FieldLookup,
    to: FieldLookup,
) -> FormulaResult<String> {
    let expr = parse_formula(source)?;

    if let Some(missing) = referenced_fields(&expr)
        .into_iter()
        .find(|key| fields.resolve(key, from).is_none())
    {
        return Err(FormulaError::FieldNotFound(missing));
    }

    let converted = expr.map_field_refs(&mut |key| match fields.resolve(key, from) {
        Some(field) => match to {
            FieldLookup::Id => field.id.clone(),
            FieldLookup::Name => field.name.clone(),
        },
        None => key.to_string(),
    });
    Ok(converted.to_string())
}
