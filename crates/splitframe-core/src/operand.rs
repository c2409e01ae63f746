//! Operand values: literals or references to child nodes.

use serde::{Deserialize, Serialize};

use crate::arena::ExprId;
use crate::scalar::ScalarExpr;
use crate::schema::{DataType, Field, Schema};

/// One operand slot of an expression node.
///
/// `Node` and `NodeList` are child references; everything else is a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Reference to a child expression node.
    Node(ExprId),
    /// Ordered list of child references (only the `Fused` member list).
    NodeList(Vec<ExprId>),
    /// Column-name list.
    Columns(Vec<String>),
    /// Column-level expression (predicate or computed column).
    Expr(ScalarExpr),
    /// Aggregation list.
    Aggs(Vec<AggSpec>),
    /// Plain string (e.g. an assigned column name).
    Str(String),
    /// Non-negative integer (partition counts, branching factors).
    Num(u64),
    /// Abstract data-source descriptor carried by `Scan`.
    Source(ScanSource),
    /// Opaque partition-wise callable reference.
    Callable(CallableRef),
}

impl Operand {
    pub fn as_node(&self) -> Option<ExprId> {
        match self {
            Operand::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_columns(&self) -> Option<&[String]> {
        match self {
            Operand::Columns(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_expr(&self) -> Option<&ScalarExpr> {
        match self {
            Operand::Expr(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<u64> {
        match self {
            Operand::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Operand::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_source(&self) -> Option<&ScanSource> {
        match self {
            Operand::Source(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_aggs(&self) -> Option<&[AggSpec]> {
        match self {
            Operand::Aggs(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&CallableRef> {
        match self {
            Operand::Callable(c) => Some(c),
            _ => None,
        }
    }

    /// Short tag used in construction-error messages.
    pub fn tag(&self) -> &'static str {
        match self {
            Operand::Node(_) => "node",
            Operand::NodeList(_) => "node-list",
            Operand::Columns(_) => "columns",
            Operand::Expr(_) => "expr",
            Operand::Aggs(_) => "aggs",
            Operand::Str(_) => "str",
            Operand::Num(_) => "num",
            Operand::Source(_) => "source",
            Operand::Callable(_) => "callable",
        }
    }
}

/// Aggregation functions supported by reductions and groupby aggregations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Min,
    Max,
    Mean,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Mean => "mean",
        }
    }
}

/// One aggregation: function, optional input column, optional output alias.
///
/// `count` takes no input column; everything else requires one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggSpec {
    pub func: AggFunc,
    pub column: Option<String>,
    pub alias: Option<String>,
}

impl AggSpec {
    pub fn new(func: AggFunc, column: Option<impl Into<String>>) -> Self {
        Self {
            func,
            column: column.map(Into::into),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Parse "sum:amount", "count", or "min:ts:first_seen" (alias suffix).
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut parts = s.splitn(3, ':');
        let func = match parts.next().unwrap_or("") {
            "count" => AggFunc::Count,
            "sum" => AggFunc::Sum,
            "min" => AggFunc::Min,
            "max" => AggFunc::Max,
            "mean" | "avg" => AggFunc::Mean,
            other => return Err(format!("unknown aggregation '{}'", other)),
        };
        let column = parts.next().map(|c| c.to_string());
        let alias = parts.next().map(|a| a.to_string());
        if func != AggFunc::Count && column.is_none() {
            return Err(format!("aggregation '{}' requires a column", func.name()));
        }
        Ok(Self {
            func,
            column,
            alias,
        })
    }

    /// Output column name: the alias when present, else "func(col)" / "count".
    pub fn output_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.column {
            Some(col) => format!("{}({})", self.func.name(), col),
            None => self.func.name().to_string(),
        }
    }

    /// Output field against an input schema. Unknown input columns error.
    pub fn output_field(&self, input: &Schema) -> Result<Field, String> {
        let data_type = match self.func {
            AggFunc::Count => DataType::Int64,
            AggFunc::Mean => DataType::Float64,
            AggFunc::Sum | AggFunc::Min | AggFunc::Max => {
                let col = self.column.as_deref().unwrap_or("");
                input
                    .field_named(col)
                    .map(|f| f.data_type)
                    .ok_or_else(|| {
                        format!(
                            "aggregation '{}' references unknown column '{}'",
                            self.func.name(),
                            col
                        )
                    })?
            }
        };
        Ok(Field::new(self.output_name(), data_type, true))
    }
}

impl std::fmt::Display for AggSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(col) => write!(f, "{}:{}", self.func.name(), col)?,
            None => write!(f, "{}", self.func.name())?,
        }
        if let Some(alias) = &self.alias {
            write!(f, ":{}", alias)?;
        }
        Ok(())
    }
}

/// Abstract data-source descriptor carried by a `Scan` node.
///
/// The plan layer never inspects the underlying storage format; it only
/// tracks what the source can do (prune columns, accept predicates) and what
/// has been pushed into it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSource {
    /// Opaque location, e.g. "s3://bucket/events/*.parquet".
    pub location: String,
    /// Declared full schema of the source.
    pub schema: Schema,
    /// Partition count, when the source already knows it.
    pub npartitions: Option<usize>,
    /// Whether per-partition reads can be restricted to a column subset.
    pub supports_column_pruning: bool,
    /// Whether the reader can evaluate a pushed predicate.
    pub supports_predicate_pushdown: bool,
    /// Column subset selected by projection pushdown; `None` reads everything.
    pub columns: Option<Vec<String>>,
    /// Predicate attached by predicate pushdown.
    pub predicate: Option<ScalarExpr>,
}

impl ScanSource {
    pub fn new(location: impl Into<String>, schema: Schema, npartitions: Option<usize>) -> Self {
        Self {
            location: location.into(),
            schema,
            npartitions,
            supports_column_pruning: true,
            supports_predicate_pushdown: true,
            columns: None,
            predicate: None,
        }
    }

    /// Effective output schema after any pushed projection.
    pub fn output_schema(&self) -> crate::Result<Schema> {
        match &self.columns {
            Some(cols) => self.schema.project(cols),
            None => Ok(self.schema.clone()),
        }
    }

    /// Effective output column names after any pushed projection.
    pub fn output_columns(&self) -> Vec<String> {
        match &self.columns {
            Some(cols) => cols.clone(),
            None => self.schema.names(),
        }
    }
}

/// Reference to an opaque per-partition callable.
///
/// `key` selects the operator in the external engine's registry; `config` is
/// the literal argument payload handed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallableRef {
    pub key: String,
    pub config: serde_json::Value,
    /// Declared output schema; `None` means the callable preserves its
    /// input schema.
    pub schema: Option<Schema>,
}

impl CallableRef {
    pub fn new(key: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            config,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }
}
