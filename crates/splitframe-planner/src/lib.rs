#![forbid(unsafe_code)]
//! splitframe-planner: rule-based optimization and task-graph lowering.
//!
//! The pipeline is `optimize` (simplification, projection pushdown,
//! predicate pushdown, fusion) followed by `lower`, which emits the keyed
//! per-partition task graph handed to the external execution engine.

pub mod fuse;
pub mod graph;
pub mod lower;
pub mod optimize;
pub mod rewrite;
pub mod rules;

pub use fuse::fuse;
pub use graph::{GraphError, OperatorBinding, Task, TaskGraph, TaskKey};
pub use lower::{lower, LowerError};
pub use optimize::{optimize, OptimizeReport, PassReport};
pub use rewrite::{rewrite_fixed_point, RewriteOutcome, RuleSet};
