#![forbid(unsafe_code)]
//! splitframe: a logical-plan layer for partitioned dataframe computation.
//!
//! This facade re-exports the public surface of the workspace crates:
//! - [`core`]: expression nodes, arenas, schemas, and tokens.
//! - [`planner`]: rewrite rules, the optimizer pipeline, and lowering.
//! - [`frame`]: the fluent builder API and the YAML pipeline DSL.

pub use splitframe_core as core;
pub use splitframe_frame as frame;
pub use splitframe_planner as planner;

pub use splitframe_core::{
    AggFunc, AggSpec, CallableRef, DataType, Error, ExprArena, ExprId, Field, OpKind, Operand,
    ScalarExpr, ScanSource, Schema,
};
pub use splitframe_frame::{Frame, GroupBy};
pub use splitframe_planner::{
    lower, optimize, LowerError, OptimizeReport, TaskGraph, TaskKey,
};
