//! Dependency tracking between formula fields

use crate::ast::FormulaExpr;
use crate::error::FormulaResult;
use crate::parser::parse_formula;
use ahash::{AHashMap, AHashSet};
use gridbase_core::{FieldLookup, FieldMap};
use std::collections::BTreeSet;

/// Field keys referenced by an expression, in first-appearance order
pub fn referenced_fields(expr: &FormulaExpr) -> Vec<String> {
    let mut keys = Vec::new();
    collect_references(expr, &mut keys);
    keys
}

fn collect_references(expr: &FormulaExpr, keys: &mut Vec<String>) {
    match expr {
        FormulaExpr::Literal(_) => {}
        FormulaExpr::FieldRef(key) => {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.clone());
            }
        }
        FormulaExpr::Unary { operand, .. } => collect_references(operand, keys),
        FormulaExpr::Binary { left, right, .. } => {
            collect_references(left, keys);
            collect_references(right, keys);
        }
        FormulaExpr::Call { args, .. } => {
            for arg in args {
                collect_references(arg, keys);
            }
        }
    }
}

/// Dependency graph for formula fields
///
/// Tracks which fields a formula field reads and, in reverse, which formula
/// fields must be recomputed when a field changes. Keys are field ids.
#[derive(Debug, Default, Clone)]
pub struct FieldDependencyGraph {
    /// Field → formula fields that read it
    dependents: AHashMap<String, BTreeSet<String>>,
    /// Formula field → fields it reads
    precedents: AHashMap<String, BTreeSet<String>>,
}

impl FieldDependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for every formula field of `fields`
    ///
    /// References are resolved with `lookup`; keys that match no field are kept
    /// as-is so they still show up as precedents.
    pub fn from_fields(fields: &FieldMap, lookup: FieldLookup) -> FormulaResult<Self> {
        let mut graph = Self::new();
        for field in fields.iter() {
            let Some(expression) = &field.expression else {
                continue;
            };
            let expr = parse_formula(expression)?;
            for key in referenced_fields(&expr) {
                let precedent = fields
                    .resolve(&key, lookup)
                    .map_or(key, |f| f.id.clone());
                graph.add_dependency(&precedent, &field.id);
            }
        }
        Ok(graph)
    }

    /// Add a dependency: `dependent` reads `precedent`
    pub fn add_dependency(&mut self, precedent: &str, dependent: &str) {
        self.dependents
            .entry(precedent.to_string())
            .or_default()
            .insert(dependent.to_string());
        self.precedents
            .entry(dependent.to_string())
            .or_default()
            .insert(precedent.to_string());
    }

    /// Replace the precedents of a formula field
    pub fn set_formula(&mut self, field: &str, expr: &FormulaExpr) {
        self.clear_precedents(field);
        for key in referenced_fields(expr) {
            self.add_dependency(&key, field);
        }
    }

    fn clear_precedents(&mut self, field: &str) {
        if let Some(precedents) = self.precedents.remove(field) {
            for precedent in precedents {
                if let Some(deps) = self.dependents.get_mut(&precedent) {
                    deps.remove(field);
                }
            }
        }
    }

    /// Remove all dependencies of a field, in both directions
    pub fn clear_dependencies(&mut self, field: &str) {
        self.clear_precedents(field);

        if let Some(dependents) = self.dependents.remove(field) {
            for dependent in dependents {
                if let Some(precs) = self.precedents.get_mut(&dependent) {
                    precs.remove(field);
                }
            }
        }
    }

    /// Formula fields that read the given field
    pub fn dependents(&self, field: &str) -> impl Iterator<Item = &str> + '_ {
        self.dependents
            .get(field)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Fields the given formula field reads
    pub fn precedents(&self, field: &str) -> impl Iterator<Item = &str> + '_ {
        self.precedents
            .get(field)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// The changed fields and everything that depends on them, ordered so every
    /// field comes after the fields it reads
    ///
    /// Fields on a cycle are still listed once; their relative order is arbitrary.
    pub fn recalc_order<S: AsRef<str>>(&self, changed: &[S]) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = AHashSet::new();
        let mut in_stack = AHashSet::new();

        for field in changed {
            self.topological_sort(field.as_ref(), &mut result, &mut visited, &mut in_stack);
        }

        result.reverse();
        result
    }

    /// Depth-first post-order over dependents
    fn topological_sort<'a>(
        &'a self,
        field: &'a str,
        result: &mut Vec<String>,
        visited: &mut AHashSet<&'a str>,
        in_stack: &mut AHashSet<&'a str>,
    ) {
        if visited.contains(field) || in_stack.contains(field) {
            return;
        }

        in_stack.insert(field);
        for dependent in self.dependents(field) {
            self.topological_sort(dependent, result, visited, in_stack);
        }
        in_stack.remove(field);

        visited.insert(field);
        result.push(field.to_string());
    }

    /// Whether the field reads itself, directly or through other formulas
    pub fn has_circular_reference(&self, field: &str) -> bool {
        let mut visited = AHashSet::new();
        let mut in_stack = AHashSet::new();
        self.detect_cycle(field, field, &mut visited, &mut in_stack)
    }

    fn detect_cycle<'a>(
        &'a self,
        start: &str,
        field: &'a str,
        visited: &mut AHashSet<&'a str>,
        in_stack: &mut AHashSet<&'a str>,
    ) -> bool {
        if in_stack.contains(field) {
            return field == start;
        }
        if !visited.insert(field) {
            return false;
        }

        in_stack.insert(field);
        let found = self
            .precedents(field)
            .any(|precedent| self.detect_cycle(start, precedent, visited, in_stack));
        in_stack.remove(field);
        found
    }

    /// Clear the entire graph
    pub fn clear(&mut self) {
        self.dependents.clear();
        self.precedents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridbase_core::{FieldMeta, FieldType};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_referenced_fields_in_order_without_duplicates() {
        let expr = parse_formula("IF({b} > 1, {a} & {b}, -{c})").unwrap();
        assert_eq!(referenced_fields(&expr), vec!["b", "a", "c"]);
        assert!(referenced_fields(&parse_formula("1 + 2").unwrap()).is_empty());
    }

    #[test]
    fn test_add_dependency() {
        let mut graph = FieldDependencyGraph::new();
        graph.add_dependency("fldA", "fldB");

        assert!(graph.dependents("fldA").any(|f| f == "fldB"));
        assert!(graph.precedents("fldB").any(|f| f == "fldA"));
    }

    #[test]
    fn test_recalc_order_puts_precedents_first() {
        let mut graph = FieldDependencyGraph::new();
        // total = subtotal + tax, tax = subtotal * rate, subtotal = price * qty
        graph.add_dependency("price", "subtotal");
        graph.add_dependency("qty", "subtotal");
        graph.add_dependency("subtotal", "tax");
        graph.add_dependency("subtotal", "total");
        graph.add_dependency("tax", "total");

        let order = graph.recalc_order(&["price"]);
        assert_eq!(order.first().map(String::as_str), Some("price"));
        let pos = |f: &str| order.iter().position(|x| x == f).unwrap();
        assert!(pos("subtotal") < pos("tax"));
        assert!(pos("tax") < pos("total"));
        assert!(!order.contains(&"qty".to_string()));
    }

    #[test]
    fn test_circular_reference() {
        let mut graph = FieldDependencyGraph::new();
        // a -> b -> c -> a
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "c");
        graph.add_dependency("c", "a");
        graph.add_dependency("a", "d");

        assert!(graph.has_circular_reference("a"));
        assert!(graph.has_circular_reference("b"));
        assert!(graph.has_circular_reference("c"));
        assert!(!graph.has_circular_reference("d"));
    }

    #[test]
    fn test_self_reference() {
        let mut graph = FieldDependencyGraph::new();
        graph.set_formula("a", &parse_formula("{a} + 1").unwrap());
        assert!(graph.has_circular_reference("a"));

        graph.set_formula("a", &parse_formula("{b} + 1").unwrap());
        assert!(!graph.has_circular_reference("a"));
        assert_eq!(graph.precedents("a").collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_from_fields_resolves_names() {
        let fields = FieldMap::from_fields([
            FieldMeta::new("fldPrice", "Price", FieldType::Number),
            FieldMeta::formula("fldDouble", "Double", "{Price} * 2"),
        ])
        .unwrap();

        let graph = FieldDependencyGraph::from_fields(&fields, FieldLookup::Name).unwrap();
        assert_eq!(graph.precedents("fldDouble").collect::<Vec<_>>(), vec!["fldPrice"]);
        assert_eq!(
            graph.recalc_order(&["fldPrice"]),
            vec!["fldPrice".to_string(), "fldDouble".to_string()]
        );
    }

    #[test]
    fn test_clear_dependencies() {
        let mut graph = FieldDependencyGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "c");
        graph.clear_dependencies("b");

        assert_eq!(graph.dependents("a").count(), 0);
        assert_eq!(graph.precedents("c").count(), 0);
    }
}
