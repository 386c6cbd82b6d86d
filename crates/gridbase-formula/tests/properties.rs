//! Property tests for the evaluator

use chrono::{TimeZone, Utc};
use gridbase_core::{CellValueType, FieldMap, FieldMeta, FieldType, Record};
use gridbase_formula::{
    evaluate, evaluate_with_options, parse_formula, EvaluationContext, EvaluatorOptions,
    FormulaValue, FunctionRegistry, TypedValue,
};
use proptest::prelude::*;
use serde_json::json;

fn fields() -> FieldMap {
    FieldMap::from_fields([
        FieldMeta::new("fldNum", "Amount", FieldType::Number),
        FieldMeta::new("fldText", "Title", FieldType::SingleLineText),
        FieldMeta::new("fldDone", "Done", FieldType::Checkbox),
        FieldMeta::new("fldDate", "Due", FieldType::Date),
        FieldMeta::new("fldTags", "Tags", FieldType::MultipleSelect),
        FieldMeta::new("fldNums", "Scores", FieldType::Rollup)
            .with_cell_value_type(CellValueType::Number)
            .with_multiple(true),
    ])
    .unwrap()
}

fn record() -> Record {
    Record::new("recProp")
        .with_field("fldNum", 7)
        .with_field("fldText", "a b&c")
        .with_field("fldDone", true)
        .with_field("fldDate", "2024-02-29T08:15:00.000Z")
        .with_field("fldTags", json!(["x", "y", "x"]))
        .with_field("fldNums", json!([4, null, 9]))
}

fn options() -> EvaluatorOptions {
    EvaluatorOptions::default().with_now(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
}

/// Element type of a concrete value, looking through arrays
fn element_type(value: &FormulaValue) -> Option<CellValueType> {
    match value {
        FormulaValue::Array(items) => items.iter().find_map(element_type),
        other => other.value_type(),
    }
}

/// Arithmetic formulas over literals and a number field
fn arithmetic() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0u32..1000).prop_map(|n| n.to_string()),
        Just("{fldNum}".to_string()),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (inner.clone(), prop::sample::select(vec!["+", "-", "*", "/", "%"]), inner.clone())
                .prop_map(|(l, op, r)| format!("({} {} {})", l, op, r)),
            inner.clone().prop_map(|e| format!("-{}", e)),
            inner.clone().prop_map(|e| format!("ROUND({}, 1)", e)),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| format!("IF({a} > {b}, {a}, {b})", a = a, b = b)),
        ]
    })
}

proptest! {
    #[test]
    fn prop_evaluation_is_deterministic(source in arithmetic()) {
        let fields = fields();
        let record = record();
        let first = evaluate_with_options(&source, &fields, Some(&record), &options()).unwrap();
        let second = evaluate_with_options(&source, &fields, Some(&record), &options()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_inferred_type_matches_evaluated_type(source in arithmetic()) {
        let fields = fields();
        let record = record();
        let inferred = evaluate(&source, &fields, None).unwrap();
        let evaluated = evaluate(&source, &fields, Some(&record)).unwrap();
        prop_assert_eq!(inferred.return_type(), evaluated.return_type());
        if let Some(t) = element_type(&evaluated.value) {
            prop_assert_eq!(t, evaluated.value_type);
        }
    }

    #[test]
    fn prop_display_reparses_to_same_tree(source in arithmetic()) {
        let expr = parse_formula(&source).unwrap();
        prop_assert_eq!(parse_formula(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn prop_number_literal_evaluates_to_itself(n in 0u32..u32::MAX) {
        let result = evaluate(&n.to_string(), &FieldMap::new(), None).unwrap();
        prop_assert_eq!(result, TypedValue::number(f64::from(n)));
    }

    #[test]
    fn prop_element_wise_functions_inherit_multiplicity(
        name in prop::sample::select(vec![
            "UPPER", "LOWER", "TRIM", "LEN", "LEFT", "ENCODE_URL_COMPONENT", "TEXT_ALL",
            "ABS", "INT", "SQRT", "ROUND", "EVEN", "VALUE", "NOT",
            "YEAR", "WEEKDAY", "DATESTR", "DATETIME_FORMAT",
        ]),
        len in 0usize..5,
    ) {
        let contract = FunctionRegistry::global().get(name).unwrap();
        let value_type = contract.accept_value_types()[0];
        let params = vec![TypedValue::array(vec![FormulaValue::Null; len], value_type)];
        prop_assert!(contract.validate_params(&params).is_ok());
        prop_assert!(contract.return_type(&params).is_multiple);
    }
}

#[test]
fn test_inferred_type_matches_evaluated_type_across_functions() {
    let fields = fields();
    let record = record();
    let formulas = [
        "{fldNum} * 2",
        "{fldText} & '!'",
        "{fldNum} > 3",
        "SUM({fldNums})",
        "AVERAGE({fldNums}, 1)",
        "UPPER({fldTags})",
        "LEN({fldTags})",
        "IF({fldDone}, {fldNum}, 0)",
        "IF({fldDone}, {fldNum}, 'x')",
        "IF({fldDone}, {fldTags}, 'none')",
        "SWITCH({fldNum}, 3, 'three', 'other')",
        "DATE_ADD({fldDate}, 1, 'day')",
        "YEAR({fldDate})",
        "DATETIME_DIFF({fldDate}, '2024-01-01')",
        "IS_AFTER({fldDate}, NOW())",
        "DATESTR({fldDate})",
        "WORKDAY({fldDate}, 3)",
        "ARRAY_UNIQUE({fldTags})",
        "ARRAY_JOIN({fldTags}, '-')",
        "ARRAY_COMPACT({fldNums})",
        "COUNTA({fldTags})",
        "TEXT_ALL({fldNums})",
        "ROUND({fldNum} / 7, 2)",
        "NOT({fldDone})",
        "AND({fldDone}, {fldNum})",
        "VALUE('12')",
        "T({fldText})",
        "ENCODE_URL_COMPONENT({fldText})",
        "RECORD_ID()",
        "CREATED_TIME()",
    ];

    for source in formulas {
        let inferred = evaluate_with_options(source, &fields, None, &options()).unwrap();
        let evaluated = evaluate_with_options(source, &fields, Some(&record), &options()).unwrap();
        assert_eq!(inferred.return_type(), evaluated.return_type(), "{}", source);
        if let Some(t) = element_type(&evaluated.value) {
            assert_eq!(t, evaluated.value_type, "{}", source);
        }
        if evaluated.is_multiple && !evaluated.is_null() {
            assert!(matches!(evaluated.value, FormulaValue::Array(_)), "{}", source);
        }
    }
}

#[test]
fn test_single_argument_functions_propagate_null() {
    let fields = fields();
    let record = record();
    let options = options();
    let ctx = EvaluationContext::new(&fields, Some(&record), &options);

    for name in [
        "UPPER", "LOWER", "TRIM", "LEN", "T", "ENCODE_URL_COMPONENT", "TEXT_ALL", "ABS", "INT",
        "SQRT", "EXP", "EVEN", "ODD", "VALUE", "YEAR", "MONTH", "DAY", "HOUR", "WEEKNUM",
        "DATESTR", "TIMESTR", "DATETIME_FORMAT", "DATETIME_PARSE",
    ] {
        let contract = FunctionRegistry::global().get(name).unwrap();
        let params = [TypedValue::null(contract.accept_value_types()[0], false)];
        contract.validate_params(&params).unwrap();
        assert_eq!(contract.eval(&params, &ctx).unwrap(), FormulaValue::Null, "{}", name);
    }
}
