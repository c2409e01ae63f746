//! YAML pipeline DSL for *linear* plans.
//!
//! ```yaml
//! steps:
//!   - op: scan
//!     location: "s3://bucket/events/*.parquet"
//!     npartitions: 8
//!     schema:
//!       - { name: ts,     type: i64,  nullable: false }
//!       - { name: region, type: utf8, nullable: false }
//!       - { name: amount, type: f64,  nullable: true }
//!   - op: filter
//!     predicate: "amount > 10"
//!   - op: select
//!     columns: [region, amount]
//!   - op: groupby
//!     keys: [region]
//!     aggs: ["sum:amount", "count"]
//! ```
//!
//! Each step consumes the previous step's output, so the first step must be
//! a scan. Branching plans are built through the [`Frame`] API directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use splitframe_core::{AggSpec, CallableRef, DataType, Field, ScanSource, Schema};

use crate::{Frame, DEFAULT_SPLIT_EVERY};

#[derive(Debug, Error)]
pub enum DslError {
    #[error("invalid pipeline YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("pipeline has no steps")]
    Empty,
    #[error("step 1 must be a scan, got `{0}`")]
    FirstStepNotScan(&'static str),
    #[error("step {index}: scans can only appear first")]
    ScanNotFirst { index: usize },
    #[error("step {index}: unknown column type `{name}`")]
    UnknownType { index: usize, name: String },
    #[error("step {index}: {source}")]
    Step {
        index: usize,
        source: splitframe_core::Error,
    },
    #[error("step {index}: {detail}")]
    Invalid { index: usize, detail: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Step {
    Scan {
        location: String,
        schema: Vec<FieldDef>,
        #[serde(default)]
        npartitions: Option<usize>,
        #[serde(default = "default_true")]
        column_pruning: bool,
        #[serde(default = "default_true")]
        predicate_pushdown: bool,
    },
    Select {
        columns: Vec<String>,
    },
    Filter {
        predicate: String,
    },
    Assign {
        name: String,
        expr: String,
    },
    MapPartitions {
        key: String,
        #[serde(default)]
        config: serde_json::Value,
        #[serde(default)]
        schema: Option<Vec<FieldDef>>,
    },
    Reduce {
        aggs: Vec<String>,
        #[serde(default = "default_split_every")]
        split_every: u64,
    },
    Groupby {
        keys: Vec<String>,
        aggs: Vec<String>,
        #[serde(default = "default_split_every")]
        split_every: u64,
    },
    Shuffle {
        on: Vec<String>,
        npartitions: u64,
    },
    Repartition {
        npartitions: u64,
    },
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Scan { .. } => "scan",
            Step::Select { .. } => "select",
            Step::Filter { .. } => "filter",
            Step::Assign { .. } => "assign",
            Step::MapPartitions { .. } => "map_partitions",
            Step::Reduce { .. } => "reduce",
            Step::Groupby { .. } => "groupby",
            Step::Shuffle { .. } => "shuffle",
            Step::Repartition { .. } => "repartition",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
}

fn default_true() -> bool {
    true
}

fn default_split_every() -> u64 {
    DEFAULT_SPLIT_EVERY
}

fn parse_dtype(s: &str) -> Option<DataType> {
    match s {
        "Boolean" | "bool" => Some(DataType::Boolean),
        "Int64" | "i64" | "int" => Some(DataType::Int64),
        "Float64" | "f64" | "float" => Some(DataType::Float64),
        "Utf8" | "utf8" | "str" => Some(DataType::Utf8),
        "Date64" | "date" => Some(DataType::Date64),
        _ => None,
    }
}

fn to_schema(fields: &[FieldDef], index: usize) -> Result<Schema, DslError> {
    let mut out = Vec::with_capacity(fields.len());
    for f in fields {
        let data_type = parse_dtype(&f.data_type).ok_or_else(|| DslError::UnknownType {
            index,
            name: f.data_type.clone(),
        })?;
        out.push(Field::new(&f.name, data_type, f.nullable));
    }
    Ok(Schema::new(out))
}

fn parse_aggs(specs: &[String], index: usize) -> Result<Vec<AggSpec>, DslError> {
    specs
        .iter()
        .map(|s| {
            AggSpec::parse(s).map_err(|detail| DslError::Invalid { index, detail })
        })
        .collect()
}

/// Parse a YAML pipeline into a [`Frame`].
pub fn parse_pipeline(yaml_src: &str) -> Result<Frame, DslError> {
    let doc: Pipeline = serde_yaml::from_str(yaml_src)?;
    let mut steps = doc.steps.into_iter().enumerate();

    // Step indices in errors are 1-based, matching the YAML as users read it.
    let frame = match steps.next() {
        None => return Err(DslError::Empty),
        Some((
            _,
            Step::Scan {
                location,
                schema,
                npartitions,
                column_pruning,
                predicate_pushdown,
            },
        )) => {
            let mut source = ScanSource::new(location, to_schema(&schema, 1)?, npartitions);
            source.supports_column_pruning = column_pruning;
            source.supports_predicate_pushdown = predicate_pushdown;
            Frame::scan(source).map_err(|source| DslError::Step { index: 1, source })?
        }
        Some((_, other)) => return Err(DslError::FirstStepNotScan(other.name())),
    };

    let mut frame = frame;
    for (i, step) in steps {
        let index = i + 1;
        let step_err = |source| DslError::Step { index, source };
        frame = match step {
            Step::Scan { .. } => return Err(DslError::ScanNotFirst { index }),
            Step::Select { columns } => frame.select(columns).map_err(step_err)?,
            Step::Filter { predicate } => frame.filter(&predicate).map_err(step_err)?,
            Step::Assign { name, expr } => frame.assign(&name, &expr).map_err(step_err)?,
            Step::MapPartitions {
                key,
                config,
                schema,
            } => {
                let mut callable = CallableRef::new(key, config);
                if let Some(fields) = schema {
                    callable = callable.with_schema(to_schema(&fields, index)?);
                }
                frame.map_partitions(callable).map_err(step_err)?
            }
            Step::Reduce { aggs, split_every } => frame
                .reduce(parse_aggs(&aggs, index)?, split_every)
                .map_err(step_err)?,
            Step::Groupby {
                keys,
                aggs,
                split_every,
            } => frame
                .groupby(keys)
                .agg(parse_aggs(&aggs, index)?, split_every)
                .map_err(step_err)?,
            Step::Shuffle { on, npartitions } => {
                frame.shuffle(on, npartitions).map_err(step_err)?
            }
            Step::Repartition { npartitions } => {
                frame.repartition(npartitions).map_err(step_err)?
            }
        };
    }
    Ok(frame)
}
