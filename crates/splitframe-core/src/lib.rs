#![forbid(unsafe_code)]
//! splitframe-core: the expression node model for the splitframe plan layer.
//!
//! This crate contains only *pure* types and tree machinery. There is
//! **no I/O**, **no async**, and **no execution** here, by design.
//!
//! Crates that use this:
//! - splitframe-planner: rewrites expression trees and lowers them to task graphs.
//! - splitframe-frame: the user-facing collection shim that records operations
//!   as expression nodes.
//! - splitframe-cli: explains and lowers pipelines from the command line.

pub mod arena;
pub mod error;
pub mod hash;
pub mod kind;
pub mod node;
pub mod operand;
pub mod printer;
pub mod scalar;
pub mod schema;

pub use arena::{ExprArena, ExprId};
pub use error::{Error, Result};
pub use hash::Token;
pub use kind::OpKind;
pub use node::ExprNode;
pub use operand::{AggFunc, AggSpec, CallableRef, Operand, ScanSource};
pub use printer::tree_repr;
pub use scalar::{BinOp, Scalar, ScalarExpr, UnaryOp};
pub use schema::{DataType, Field, Schema};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
