//! Formula Abstract Syntax Tree types

use std::fmt;

/// Formula expression AST
///
/// Rendering with `Display` produces canonical source that parses back to the
/// same tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    /// Number, string or boolean literal
    Literal(Literal),
    /// `{key}` reference to a field by id or name
    FieldRef(String),
    /// Unary operation
    Unary {
        op: UnaryOperator,
        operand: Box<FormulaExpr>,
    },
    /// Binary operation
    Binary {
        op: BinaryOperator,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },
    /// Function call; `name` is upper case
    Call { name: String, args: Vec<FormulaExpr> },
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Text
    Concat,

    // Logical
    And,
    Or,
}

impl BinaryOperator {
    /// Source token for this operator
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Concat => "&",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }

    /// Binding strength; higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Equal | BinaryOperator::NotEqual => 3,
            BinaryOperator::LessThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterEqual => 4,
            BinaryOperator::Concat => 5,
            BinaryOperator::Add | BinaryOperator::Subtract => 6,
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 7,
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterEqual
        )
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
}

/// Unary operators bind tighter than every binary operator
const UNARY_PRECEDENCE: u8 = 8;
const ATOM_PRECEDENCE: u8 = 9;

impl FormulaExpr {
    /// Shorthand for a number literal
    pub fn number(n: f64) -> Self {
        FormulaExpr::Literal(Literal::Number(n))
    }

    /// Shorthand for a string literal
    pub fn string(s: impl Into<String>) -> Self {
        FormulaExpr::Literal(Literal::String(s.into()))
    }

    /// Shorthand for a boolean literal
    pub fn boolean(b: bool) -> Self {
        FormulaExpr::Literal(Literal::Boolean(b))
    }

    /// Shorthand for a field reference
    pub fn field(key: impl Into<String>) -> Self {
        FormulaExpr::FieldRef(key.into())
    }

    fn precedence(&self) -> u8 {
        match self {
            FormulaExpr::Binary { op, .. } => op.precedence(),
            FormulaExpr::Unary { .. } => UNARY_PRECEDENCE,
            _ => ATOM_PRECEDENCE,
        }
    }

    /// Rebuild the tree with every field reference key passed through `f`
    pub fn map_field_refs<F>(&self, f: &mut F) -> FormulaExpr
    where
        F: FnMut(&str) -> String,
    {
        match self {
            FormulaExpr::Literal(lit) => FormulaExpr::Literal(lit.clone()),
            FormulaExpr::FieldRef(key) => FormulaExpr::FieldRef(f(key)),
            FormulaExpr::Unary { op, operand } => FormulaExpr::Unary {
                op: *op,
                operand: Box::new(operand.map_field_refs(f)),
            },
            FormulaExpr::Binary { op, left, right } => FormulaExpr::Binary {
                op: *op,
                left: Box::new(left.map_field_refs(f)),
                right: Box::new(right.map_field_refs(f)),
            },
            FormulaExpr::Call { name, args } => FormulaExpr::Call {
                name: name.clone(),
                args: args.iter().map(|arg| arg.map_field_refs(f)).collect(),
            },
        }
    }
}

fn write_child(f: &mut fmt::Formatter<'_>, child: &FormulaExpr, min_precedence: u8) -> fmt::Result {
    if child.precedence() < min_precedence {
        write!(f, "({})", child)
    } else {
        write!(f, "{}", child)
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str, specials: &[char]) -> fmt::Result {
    for c in s.chars() {
        match c {
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c == '\\' || specials.contains(&c) => write!(f, "\\{}", c)?,
            c => write!(f, "{}", c)?,
        }
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Literal::String(s) => {
                f.write_str("\"")?;
                write_escaped(f, s, &['"'])?;
                f.write_str("\"")
            }
            Literal::Boolean(true) => f.write_str("TRUE"),
            Literal::Boolean(false) => f.write_str("FALSE"),
        }
    }
}

impl fmt::Display for FormulaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaExpr::Literal(lit) => write!(f, "{}", lit),
            FormulaExpr::FieldRef(key) => {
                f.write_str("{")?;
                write_escaped(f, key, &['}'])?;
                f.write_str("}")
            }
            FormulaExpr::Unary { op, operand } => {
                match op {
                    UnaryOperator::Negate => f.write_str("-")?,
                }
                write_child(f, operand, UNARY_PRECEDENCE)
            }
            FormulaExpr::Binary { op, left, right } => {
                // Left-associative: a right operand of equal precedence needs parentheses
                write_child(f, left, op.precedence())?;
                write!(f, " {} ", op.symbol())?;
                write_child(f, right, op.precedence() + 1)
            }
            FormulaExpr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}
