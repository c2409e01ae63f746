//! The rewrite rule catalog.
//!
//! Rules are organized per operation kind and dispatched by tag, keeping the
//! rewriter's core loop kind-agnostic. Every rule is pure and total: it
//! returns `Some(replacement)` or `None` ("no change"), and never changes
//! the semantic output of the tree, only its shape.

mod pushdown;
mod simplify;

pub(crate) use pushdown::simplify_up;
pub(crate) use simplify::simplify_down;

/// Which pushdown family an up-rule application belongs to. The optimizer
/// runs the two families as separate passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushdownPass {
    /// Column-requirement propagation (projections toward sources).
    Projection,
    /// Filter propagation (predicates toward sources).
    Predicate,
}
