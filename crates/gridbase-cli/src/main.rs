//! gridbase CLI - check, evaluate and calculate formula fields

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gridbase::prelude::*;
use gridbase::{
    convert_field_references, parse_with_listener, referenced_fields, FormulaErrorListener,
    FunctionRegistry,
};
use serde::Deserialize;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gridbase")]
#[command(author, version, about = "Formula field checking and evaluation tool")]
struct Cli {
    /// Log debug output to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct EvalArgs {
    /// Field definitions (JSON array)
    #[arg(short, long)]
    fields: Option<PathBuf>,

    /// How `{...}` references and record keys are read
    #[arg(short, long, value_enum, default_value_t = Lookup::Id)]
    lookup: Lookup,

    /// Zone for calendar functions, e.g. +08:00
    #[arg(long, default_value = "+00:00", allow_hyphen_values = true)]
    utc_offset: FixedOffset,

    /// Pinned clock for NOW/TODAY (RFC 3339)
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

impl EvalArgs {
    fn options(&self) -> EvaluatorOptions {
        let mut options = EvaluatorOptions::default()
            .with_field_lookup(self.lookup.into())
            .with_utc_offset(self.utc_offset);
        if let Some(now) = self.now {
            options = options.with_now(now);
        }
        options
    }

    fn load_fields(&self) -> Result<FieldMap> {
        match &self.fields {
            Some(path) => load_fields(path),
            None => Ok(FieldMap::new()),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a formula and print the typed result as JSON
    Eval {
        /// Formula source
        formula: String,

        /// Record to evaluate against (JSON object); type-check only when absent
        #[arg(short, long)]
        record: Option<PathBuf>,

        #[command(flatten)]
        args: EvalArgs,
    },

    /// Parse and type-check a formula, printing its result type
    Check {
        /// Formula source
        formula: String,

        #[command(flatten)]
        args: EvalArgs,
    },

    /// List the fields a formula references
    Refs {
        /// Formula source
        formula: String,
    },

    /// Rewrite field references between ids and names
    Convert {
        /// Formula source
        formula: String,

        /// Field definitions (JSON array)
        #[arg(short, long)]
        fields: PathBuf,

        /// Reference style to produce
        #[arg(long, value_enum, default_value_t = Lookup::Name)]
        to: Lookup,
    },

    /// List the built-in functions
    Functions,

    /// Calculate every formula field of a set of records
    #[command(alias = "calculate")]
    Calc {
        /// Records (JSON array)
        records: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        args: EvalArgs,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Lookup {
    Id,
    Name,
}

impl From<Lookup> for FieldLookup {
    fn from(lookup: Lookup) -> Self {
        match lookup {
            Lookup::Id => FieldLookup::Id,
            Lookup::Name => FieldLookup::Name,
        }
    }
}

/// Field definition as written in a fields file
///
/// Value type and multiplicity default to the field kind's.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldSpec {
    id: String,
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default)]
    cell_value_type: Option<CellValueType>,
    #[serde(default)]
    is_multiple_cell_value: Option<bool>,
    #[serde(default)]
    expression: Option<String>,
}

impl From<FieldSpec> for FieldMeta {
    fn from(spec: FieldSpec) -> Self {
        let mut field = FieldMeta::new(spec.id, spec.name, spec.field_type);
        field.expression = spec.expression;
        if let Some(cell_value_type) = spec.cell_value_type {
            field = field.with_cell_value_type(cell_value_type);
        }
        if let Some(is_multiple) = spec.is_multiple_cell_value {
            field = field.with_multiple(is_multiple);
        }
        field
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Eval {
            formula,
            record,
            args,
        } => eval(&formula, record.as_deref(), &args),
        Commands::Check { formula, args } => check(&formula, &args),
        Commands::Refs { formula } => refs(&formula),
        Commands::Convert {
            formula,
            fields,
            to,
        } => convert(&formula, &fields, to),
        Commands::Functions => list_functions(),
        Commands::Calc {
            records,
            output,
            args,
        } => calc(&records, output.as_deref(), &args),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in '{}'", path.display()))
}

fn load_fields(path: &Path) -> Result<FieldMap> {
    let specs: Vec<FieldSpec> = read_json(path)?;
    debug!(count = specs.len(), path = %path.display(), "loaded field definitions");
    FieldMap::from_fields(specs.into_iter().map(FieldMeta::from))
        .with_context(|| format!("Invalid field definitions in '{}'", path.display()))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode JSON")?;
    writeln!(io::stdout(), "{}", text).context("Failed to write to stdout")
}

fn eval(formula: &str, record: Option<&Path>, args: &EvalArgs) -> Result<()> {
    let fields = args.load_fields()?;
    let record: Option<Record> = record.map(read_json::<Record>).transpose()?;

    let result = evaluate_with_options(formula, &fields, record.as_ref(), &args.options())
        .with_context(|| format!("Failed to evaluate '{}'", formula))?;
    print_json(&result.to_json())
}

fn check(formula: &str, args: &EvalArgs) -> Result<()> {
    let mut listener = FormulaErrorListener::new();
    if parse_with_listener(formula, &mut listener).is_none() {
        match listener.into_error() {
            Some(error) => {
                let line = formula.lines().nth(error.line.saturating_sub(1)).unwrap_or(formula);
                eprintln!("{}", line);
                eprintln!("{}^", " ".repeat(error.column));
                bail!("{}", error);
            }
            None => bail!("Failed to parse '{}'", formula),
        }
    }

    let fields = args.load_fields()?;
    let return_type = type_check(formula, &fields, &args.options())?;
    let multiple = if return_type.is_multiple {
        " (multiple)"
    } else {
        ""
    };
    writeln!(io::stdout(), "{}{}", return_type.value_type, multiple)
        .context("Failed to write to stdout")
}

fn type_check(
    formula: &str,
    fields: &FieldMap,
    options: &EvaluatorOptions,
) -> Result<gridbase::ReturnType> {
    gridbase::infer_type(formula, fields, options)
        .with_context(|| format!("Failed to type-check '{}'", formula))
}

fn refs(formula: &str) -> Result<()> {
    let expr = parse_formula(formula).with_context(|| format!("Failed to parse '{}'", formula))?;
    let mut stdout = io::stdout().lock();
    for key in referenced_fields(&expr) {
        writeln!(stdout, "{}", key).context("Failed to write to stdout")?;
    }
    Ok(())
}

fn convert(formula: &str, fields: &Path, to: Lookup) -> Result<()> {
    let fields = load_fields(fields)?;
    let from = match to {
        Lookup::Id => FieldLookup::Name,
        Lookup::Name => FieldLookup::Id,
    };
    let converted = convert_field_references(formula, &fields, from, to.into())
        .with_context(|| format!("Failed to convert '{}'", formula))?;
    writeln!(io::stdout(), "{}", converted).context("Failed to write to stdout")
}

fn list_functions() -> Result<()> {
    let mut stdout = io::stdout().lock();
    for function in FunctionRegistry::global().functions() {
        writeln!(stdout, "{}\t{}", function.func_type(), function.name())
            .context("Failed to write to stdout")?;
    }
    Ok(())
}

fn calc(records_path: &Path, output: Option<&Path>, args: &EvalArgs) -> Result<()> {
    let Some(fields_path) = &args.fields else {
        bail!("calc needs --fields");
    };
    let fields = load_fields(fields_path)?;
    let mut records: Vec<Record> = read_json(records_path)?;

    let calculator = RecordCalculator::with_options(
        fields,
        CalculationOptions {
            evaluator: args.options(),
            ..Default::default()
        },
    );
    let stats = calculator.calculate_all(&mut records);

    for failure in &stats.failures {
        eprintln!("Warning: {}", failure);
    }
    eprintln!(
        "Calculated {} formula fields over {} records ({} errors)",
        stats.fields_calculated,
        records.len(),
        stats.errors
    );

    let text = serde_json::to_string_pretty(&records).context("Failed to encode records")?;
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write '{}'", path.display())),
        None => writeln!(io::stdout(), "{}", text).context("Failed to write to stdout"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_fields_uses_kind_defaults() {
        let file = write_temp(
            r#"[
                {"id": "fldTags", "name": "Tags", "type": "multipleSelect"},
                {"id": "fldScores", "name": "Scores", "type": "rollup",
                 "cellValueType": "number", "isMultipleCellValue": true},
                {"id": "fldTop", "name": "Top", "type": "formula", "expression": "MAX({fldScores})"}
            ]"#,
        );

        let fields = load_fields(file.path()).unwrap();
        assert_eq!(fields.len(), 3);

        let tags = fields.get("fldTags").unwrap();
        assert_eq!(tags.cell_value_type, CellValueType::String);
        assert!(tags.is_multiple_cell_value);

        let scores = fields.get("fldScores").unwrap();
        assert_eq!(scores.cell_value_type, CellValueType::Number);
        assert!(scores.is_multiple_cell_value);

        let top = fields.get_by_name("Top").unwrap();
        assert_eq!(top.expression.as_deref(), Some("MAX({fldScores})"));
    }

    #[test]
    fn test_load_fields_rejects_invalid_definitions() {
        let file = write_temp(r#"[{"id": "fldF", "name": "F", "type": "formula"}]"#);
        assert!(load_fields(file.path()).is_err());

        let file = write_temp("not json");
        let err = load_fields(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("Invalid JSON"));
    }

    #[test]
    fn test_cli_options() {
        let cli = Cli::try_parse_from([
            "gridbase",
            "eval",
            "{Price} * 2",
            "--lookup",
            "name",
            "--utc-offset",
            "-05:00",
            "--now",
            "2024-05-01T12:00:00Z",
        ])
        .unwrap();

        let Commands::Eval { formula, args, .. } = cli.command else {
            panic!("expected eval");
        };
        assert_eq!(formula, "{Price} * 2");

        let options = args.options();
        assert_eq!(options.field_lookup, FieldLookup::Name);
        assert_eq!(options.utc_offset, FixedOffset::west_opt(5 * 3600).unwrap());
        assert_eq!(
            options.now,
            Some("2024-05-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap())
        );
    }

    #[test]
    fn test_calc_writes_records() {
        let fields = write_temp(
            r#"[
                {"id": "fldQty", "name": "Qty", "type": "number"},
                {"id": "fldDouble", "name": "Double", "type": "formula", "expression": "{fldQty} * 2"}
            ]"#,
        );
        let records = write_temp(r#"[{"id": "rec1", "fields": {"fldQty": 4}}, {"id": "rec2"}]"#);
        let output = tempfile::NamedTempFile::new().unwrap();

        let argv: Vec<OsString> = vec![
            "gridbase".into(),
            "calc".into(),
            records.path().into(),
            "--fields".into(),
            fields.path().into(),
            "--output".into(),
            output.path().into(),
        ];
        let cli = Cli::try_parse_from(argv).unwrap();
        let Commands::Calc {
            records,
            output: out,
            args,
        } = cli.command
        else {
            panic!("expected calc");
        };
        calc(&records, out.as_deref(), &args).unwrap();

        let written: Vec<Record> = read_json(output.path()).unwrap();
        assert_eq!(written[0].get("fldDouble"), Some(&serde_json::json!(8)));
        // A missing operand counts as zero
        assert_eq!(written[1].get("fldDouble"), Some(&serde_json::json!(0)));
    }
}
