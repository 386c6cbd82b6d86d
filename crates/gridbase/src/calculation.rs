//! Record calculation engine
//!
//! Evaluates every formula field of a table against a record, in dependency order,
//! writing each result back into the record so later formulas read fresh values.
//! Circular formulas are detected up front and never evaluated.
//!
//! # Example
//!
//! ```rust
//! use gridbase::prelude::*;
//!
//! let fields = FieldMap::from_fields([
//!     FieldMeta::new("fldPrice", "Price", FieldType::Number),
//!     FieldMeta::new("fldQty", "Qty", FieldType::Number),
//!     FieldMeta::formula("fldTotal", "Total", "{fldPrice} * {fldQty}"),
//! ]).unwrap();
//!
//! let calculator = RecordCalculator::new(fields);
//! let mut record = Record::new("rec1").with_field("fldPrice", 2.5).with_field("fldQty", 4);
//! let stats = calculator.calculate(&mut record);
//!
//! assert!(stats.is_success());
//! assert_eq!(record.get("fldTotal"), Some(&serde_json::json!(10)));
//! ```

use crate::error::{Error, Result};
use ahash::{AHashMap, AHashSet};
use chrono::Utc;
use gridbase_core::{FieldLookup, FieldMap, Record};
use gridbase_formula::{
    evaluate_expr, parse_formula, referenced_fields, EvaluationContext, EvaluatorOptions,
    FieldDependencyGraph, FormulaExpr,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Options for record calculation
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationOptions {
    /// Options passed to every formula evaluation
    pub evaluator: EvaluatorOptions,
    /// Refine each formula field's declared value type from its expression
    pub infer_field_types: bool,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            evaluator: EvaluatorOptions::default(),
            infer_field_types: true,
        }
    }
}

/// Statistics from a calculation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalculationStats {
    /// Number of formula fields, including ones that failed to parse
    pub formula_count: usize,
    /// Number of formula results written
    pub fields_calculated: usize,
    /// Number of formula fields skipped because they read themselves
    pub circular_references: usize,
    /// Number of failures
    pub errors: usize,
    /// One entry per failed field
    pub failures: Vec<Error>,
}

impl CalculationStats {
    /// Whether every formula field was calculated
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The stats, or the first failure
    pub fn into_result(self) -> Result<Self> {
        match self.failures.first() {
            Some(error) => Err(error.clone()),
            None => Ok(self),
        }
    }

    fn merge(&mut self, other: CalculationStats) {
        self.formula_count = self.formula_count.max(other.formula_count);
        self.fields_calculated += other.fields_calculated;
        self.circular_references += other.circular_references;
        self.errors += other.errors;
        self.failures.extend(other.failures);
    }
}

/// Extension trait for Record to add calculation methods
pub trait RecordCalculationExt {
    /// Calculate all formula fields with default options
    fn calculate(&mut self, fields: &FieldMap) -> CalculationStats;

    /// Calculate all formula fields with custom options
    fn calculate_with_options(
        &mut self,
        fields: &FieldMap,
        options: &CalculationOptions,
    ) -> CalculationStats;
}

impl RecordCalculationExt for Record {
    fn calculate(&mut self, fields: &FieldMap) -> CalculationStats {
        self.calculate_with_options(fields, &CalculationOptions::default())
    }

    fn calculate_with_options(
        &mut self,
        fields: &FieldMap,
        options: &CalculationOptions,
    ) -> CalculationStats {
        RecordCalculator::with_options(fields.clone(), options.clone()).calculate(self)
    }
}

/// Calculates the formula fields of one table
///
/// Formulas are parsed and ordered once; the calculator can then be applied to
/// any number of records.
#[derive(Debug, Clone)]
pub struct RecordCalculator {
    fields: FieldMap,
    options: CalculationOptions,
    /// Dependency graph built from formulas
    dependency_graph: FieldDependencyGraph,
    /// Parsed formula ASTs, keyed by field id
    parsed_formulas: AHashMap<String, FormulaExpr>,
    /// Formula fields whose expression does not parse
    parse_errors: Vec<Error>,
    /// Formula fields on a cycle
    circular_fields: AHashSet<String>,
    /// Formula fields, precedents first
    order: Vec<String>,
}

impl RecordCalculator {
    /// Create a calculator with default options
    pub fn new(fields: FieldMap) -> Self {
        Self::with_options(fields, CalculationOptions::default())
    }

    /// Create a calculator with custom options
    pub fn with_options(fields: FieldMap, options: CalculationOptions) -> Self {
        let mut calculator = Self {
            fields,
            options,
            dependency_graph: FieldDependencyGraph::new(),
            parsed_formulas: AHashMap::new(),
            parse_errors: Vec::new(),
            circular_fields: AHashSet::new(),
            order: Vec::new(),
        };

        // Phase 1: parse formulas and build the dependency graph
        calculator.collect_formulas();

        // Phase 2: detect circular references
        calculator.detect_circular_references();

        // Phase 3: calculation order (topological sort)
        calculator.order = calculator.calculation_order();

        // Phase 4: declared types of formula fields, in the same order
        if calculator.options.infer_field_types {
            calculator.infer_field_types();
        }

        calculator
    }

    /// Field metadata, with inferred formula types when enabled
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Formula field ids in calculation order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn dependency_graph(&self) -> &FieldDependencyGraph {
        &self.dependency_graph
    }

    /// Formula fields that read themselves, sorted
    pub fn circular_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.circular_fields.iter().map(String::as_str).collect();
        fields.sort_unstable();
        fields
    }

    fn collect_formulas(&mut self) {
        let lookup = self.options.evaluator.field_lookup;

        for field in self.fields.iter() {
            let Some(expression) = &field.expression else {
                continue;
            };

            let expr = match parse_formula(expression) {
                Ok(expr) => expr,
                Err(e) => {
                    warn!(field = %field.id, error = %e, "failed to parse formula field");
                    self.parse_errors.push(Error::Formula {
                        field: field.id.clone(),
                        source: e,
                    });
                    continue;
                }
            };

            // Unknown references stay in the graph under their raw key and fail at evaluation
            for key in referenced_fields(&expr) {
                let precedent = self
                    .fields
                    .resolve(&key, lookup)
                    .map_or(key, |f| f.id.clone());
                self.dependency_graph.add_dependency(&precedent, &field.id);
            }

            self.parsed_formulas.insert(field.id.clone(), expr);
        }
    }

    fn detect_circular_references(&mut self) {
        for field_id in self.parsed_formulas.keys() {
            if self.dependency_graph.has_circular_reference(field_id) {
                self.circular_fields.insert(field_id.clone());
            }
        }
    }

    fn calculation_order(&self) -> Vec<String> {
        // Field map order keeps the result stable between runs
        let formula_fields: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| self.parsed_formulas.contains_key(&f.id))
            .map(|f| f.id.as_str())
            .collect();

        let mut order = self.dependency_graph.recalc_order(&formula_fields);
        order.retain(|id| self.parsed_formulas.contains_key(id));
        order
    }

    fn infer_field_types(&mut self) {
        for field_id in &self.order {
            if self.circular_fields.contains(field_id) {
                continue;
            }
            let Some(expr) = self.parsed_formulas.get(field_id) else {
                continue;
            };

            let inferred = {
                let ctx = EvaluationContext::new(&self.fields, None, &self.options.evaluator);
                evaluate_expr(expr, &ctx)
            };
            match inferred {
                Ok(typed) => {
                    debug!(
                        field = %field_id,
                        value_type = %typed.value_type,
                        is_multiple = typed.is_multiple,
                        "inferred formula field type"
                    );
                    self.fields
                        .set_value_type(field_id, typed.value_type, typed.is_multiple);
                }
                // Reported again when a record is calculated
                Err(e) => debug!(field = %field_id, error = %e, "formula field type check failed"),
            }
        }
    }

    fn record_key(&self, field_id: &str) -> String {
        match (self.options.evaluator.field_lookup, self.fields.get(field_id)) {
            (FieldLookup::Name, Some(field)) => field.name.clone(),
            _ => field_id.to_string(),
        }
    }

    /// Calculate every formula field of `record`, in place
    ///
    /// Failed and circular fields are set to null and reported in the stats; the
    /// remaining fields are still calculated.
    pub fn calculate(&self, record: &mut Record) -> CalculationStats {
        let mut stats = CalculationStats {
            formula_count: self.parsed_formulas.len() + self.parse_errors.len(),
            ..Default::default()
        };
        stats.failures.extend(self.parse_errors.iter().cloned());

        // One clock for the whole record
        let mut evaluator = self.options.evaluator.clone();
        evaluator.now.get_or_insert_with(Utc::now);

        for field_id in &self.order {
            let Some(expr) = self.parsed_formulas.get(field_id) else {
                continue;
            };
            let key = self.record_key(field_id);

            if self.circular_fields.contains(field_id) {
                record.set(key, Value::Null);
                stats.circular_references += 1;
                stats.failures.push(Error::CircularReference(field_id.clone()));
                continue;
            }

            let result = {
                let ctx = EvaluationContext::new(&self.fields, Some(&*record), &evaluator);
                evaluate_expr(expr, &ctx)
            };
            match result {
                Ok(typed) => {
                    record.set(key, typed.value.to_json());
                    stats.fields_calculated += 1;
                }
                Err(e) => {
                    warn!(record = %record.id, field = %field_id, error = %e, "formula evaluation failed");
                    record.set(key, Value::Null);
                    stats.failures.push(Error::Formula {
                        field: field_id.clone(),
                        source: e,
                    });
                }
            }
        }

        stats.errors = stats.failures.len();
        stats
    }

    /// Calculate every record, accumulating stats
    pub fn calculate_all(&self, records: &mut [Record]) -> CalculationStats {
        let mut total = CalculationStats::default();
        for record in records.iter_mut() {
            total.merge(self.calculate(record));
        }
        total
    }
}
