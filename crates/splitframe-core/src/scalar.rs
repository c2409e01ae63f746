//! Column-level expression AST.
//!
//! Supports arithmetic, comparisons, logical operations, and column
//! references. Filter predicates and assigned columns are expressed with this
//! AST. Evaluation against concrete data is the external engine's job; this
//! layer only analyzes and serializes expressions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::schema::{DataType, Schema};

/// Binary operators for expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    // Comparison operators
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical operators
    And,
    Or,
    // Arithmetic operators
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    /// Parse a binary operator from a string.
    pub fn parse(op: &str) -> Result<Self, String> {
        match op {
            "==" | "=" => Ok(BinOp::Eq),
            "!=" | "<>" => Ok(BinOp::Ne),
            "<" => Ok(BinOp::Lt),
            "<=" => Ok(BinOp::Le),
            ">" => Ok(BinOp::Gt),
            ">=" => Ok(BinOp::Ge),
            "AND" | "and" | "&&" => Ok(BinOp::And),
            "OR" | "or" | "||" => Ok(BinOp::Or),
            "+" => Ok(BinOp::Add),
            "-" => Ok(BinOp::Sub),
            "*" => Ok(BinOp::Mul),
            "/" => Ok(BinOp::Div),
            _ => Err(format!("unknown binary operator: {}", op)),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "AND",
            BinOp::Or => "OR",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

/// Unary operators for expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    IsNull,
    IsNotNull,
}

impl UnaryOp {
    /// Parse a unary operator from a string.
    pub fn parse(op: &str) -> Result<Self, String> {
        match op.to_uppercase().as_str() {
            "NOT" | "!" => Ok(UnaryOp::Not),
            "ISNULL" | "IS NULL" => Ok(UnaryOp::IsNull),
            "ISNOTNULL" | "IS NOT NULL" => Ok(UnaryOp::IsNotNull),
            _ => Err(format!("unknown unary operator: {}", op)),
        }
    }
}

/// Literal scalar values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
}

impl Scalar {
    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Null => DataType::Utf8,
            Scalar::Bool(_) => DataType::Boolean,
            Scalar::I64(_) => DataType::Int64,
            Scalar::F64(_) => DataType::Float64,
            Scalar::Str(_) => DataType::Utf8,
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::I64(i) => write!(f, "{}", i),
            Scalar::F64(x) => write!(f, "{}", x),
            Scalar::Str(s) => write!(f, "'{}'", s),
        }
    }
}

/// Expression AST for SQL-like column expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarExpr {
    /// Column reference: "column_name"
    Column(String),
    /// Literal value: 42, "hello", true, etc.
    Literal(Scalar),
    /// Binary operation: left OP right
    BinaryOp {
        op: BinOp,
        left: Box<ScalarExpr>,
        right: Box<ScalarExpr>,
    },
    /// Unary operation: OP arg
    UnaryOp { op: UnaryOp, arg: Box<ScalarExpr> },
}

impl ScalarExpr {
    pub fn column(name: impl Into<String>) -> Self {
        ScalarExpr::Column(name.into())
    }

    pub fn literal(value: Scalar) -> Self {
        ScalarExpr::Literal(value)
    }

    pub fn binary(op: BinOp, left: ScalarExpr, right: ScalarExpr) -> Self {
        ScalarExpr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Conjunction of two predicates.
    pub fn and(self, other: ScalarExpr) -> Self {
        ScalarExpr::binary(BinOp::And, self, other)
    }

    /// True when the expression is the literal `true` predicate.
    pub fn is_true_literal(&self) -> bool {
        matches!(self, ScalarExpr::Literal(Scalar::Bool(true)))
    }

    /// Parse a simple expression string into an AST.
    ///
    /// Splits at the lowest-precedence operator first (disjunctions, then
    /// conjunctions, then comparisons, then arithmetic), so a predicate like
    /// "amount > 10 and region == 'eu'" splits at the `and` and each side
    /// parses recursively. Within a tier, longer operators win ("<=" over
    /// "<").
    pub fn parse(expr_str: &str) -> Result<Self, String> {
        let expr_str = expr_str.trim();

        const TIERS: [&[&str]; 5] = [
            &[" OR ", " or ", "||"],
            &[" AND ", " and ", "&&"],
            &["==", "!=", "<=", ">=", "<", ">"],
            &["+", "-"],
            &["*", "/"],
        ];
        for tier in TIERS {
            for op_str in tier {
                if let Some(pos) = expr_str.find(op_str) {
                    let left_str = expr_str[..pos].trim();
                    let right_str = expr_str[pos + op_str.len()..].trim();
                    if !left_str.is_empty() && !right_str.is_empty() {
                        let op = BinOp::parse(op_str.trim())?;
                        let left = Self::parse(left_str)?;
                        let right = Self::parse(right_str)?;
                        return Ok(ScalarExpr::binary(op, left, right));
                    }
                }
            }
        }

        Self::parse_atom(expr_str)
    }

    /// Parse an atomic expression (column or literal).
    fn parse_atom(atom_str: &str) -> Result<Self, String> {
        let atom_str = atom_str.trim();
        if let Ok(scalar) = parse_literal(atom_str) {
            return Ok(ScalarExpr::Literal(scalar));
        }
        Ok(ScalarExpr::Column(atom_str.to_string()))
    }

    /// Collect every column the expression references, sorted and deduplicated.
    pub fn columns(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut BTreeSet<String>) {
        match self {
            ScalarExpr::Column(name) => {
                out.insert(name.clone());
            }
            ScalarExpr::Literal(_) => {}
            ScalarExpr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            ScalarExpr::UnaryOp { arg, .. } => arg.collect_columns(out),
        }
    }

    /// Infer the output type of the expression against a schema.
    ///
    /// Comparisons and logical operators produce Boolean; arithmetic takes
    /// the left operand's type. Unknown columns are an error.
    pub fn infer_type(&self, schema: &Schema) -> Result<DataType, String> {
        match self {
            ScalarExpr::Column(name) => schema
                .field_named(name)
                .map(|f| f.data_type)
                .ok_or_else(|| {
                    format!(
                        "unknown column '{}'; available: {:?}",
                        name,
                        schema.names()
                    )
                }),
            ScalarExpr::Literal(s) => Ok(s.data_type()),
            ScalarExpr::BinaryOp { op, left, right } => {
                let lt = left.infer_type(schema)?;
                right.infer_type(schema)?;
                if op.is_comparison() || matches!(op, BinOp::And | BinOp::Or) {
                    Ok(DataType::Boolean)
                } else {
                    Ok(lt)
                }
            }
            ScalarExpr::UnaryOp { arg, .. } => {
                arg.infer_type(schema)?;
                Ok(DataType::Boolean)
            }
        }
    }
}

impl std::fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarExpr::Column(name) => write!(f, "{}", name),
            ScalarExpr::Literal(s) => write!(f, "{}", s),
            ScalarExpr::BinaryOp { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            ScalarExpr::UnaryOp { op, arg } => match op {
                UnaryOp::Not => write!(f, "NOT {}", arg),
                UnaryOp::IsNull => write!(f, "{} IS NULL", arg),
                UnaryOp::IsNotNull => write!(f, "{} IS NOT NULL", arg),
            },
        }
    }
}

/// Parse a literal string into a Scalar value.
fn parse_literal(literal: &str) -> Result<Scalar, String> {
    let trimmed = literal.trim();

    if trimmed.eq_ignore_ascii_case("null") {
        return Ok(Scalar::Null);
    }
    if let Ok(b) = trimmed.parse::<bool>() {
        return Ok(Scalar::Bool(b));
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Ok(Scalar::I64(i));
    }
    if let Ok(x) = trimmed.parse::<f64>() {
        return Ok(Scalar::F64(x));
    }
    if (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
        || (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
    {
        let unquoted = &trimmed[1..trimmed.len() - 1];
        return Ok(Scalar::Str(unquoted.to_string()));
    }

    Err(format!("cannot parse '{}' as literal", literal))
}
