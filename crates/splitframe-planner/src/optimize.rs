//! The optimization pipeline: a fixed sequence of rewrite passes, each run
//! to its own fixed point. Pass order matters: simplification first so the
//! pushdown passes see a canonical tree, pushdown before fusion so pruned
//! scans can join fused chains, and a final simplification to clean up any
//! identities the earlier passes exposed.

use splitframe_core::{ExprArena, ExprId};
use tracing::debug;

use crate::fuse::fuse;
use crate::rewrite::{rewrite_fixed_point, RuleSet};

/// Outcome of one pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub name: &'static str,
    /// Rewrite rounds the pass ran (1 for fusion, which is single-shot).
    pub iterations: usize,
    pub changed: bool,
    pub stalled: bool,
}

/// Outcome of the full pipeline.
#[derive(Debug, Clone)]
pub struct OptimizeReport {
    pub root: ExprId,
    /// True when any pass hit its iteration budget. The resulting tree is
    /// still valid, just not guaranteed minimal.
    pub stalled: bool,
    pub passes: Vec<PassReport>,
}

/// Run every pass over the tree rooted at `root`. Each pass is idempotent,
/// so running the whole pipeline twice yields the same tree.
pub fn optimize(arena: &mut ExprArena, root: ExprId) -> OptimizeReport {
    let mut report = OptimizeReport {
        root,
        stalled: false,
        passes: Vec::with_capacity(6),
    };

    rule_pass(arena, &mut report, "simplify", RuleSet::down_only());
    rule_pass(
        arena,
        &mut report,
        "projection-pushdown",
        RuleSet::projection_pushdown(),
    );
    rule_pass(
        arena,
        &mut report,
        "predicate-pushdown",
        RuleSet::predicate_pushdown(),
    );
    // Pushdown can expose fresh identities (e.g. a projection absorbed into
    // a scan leaves a no-op behind elsewhere in the tree).
    rule_pass(arena, &mut report, "simplify", RuleSet::down_only());

    let before = report.root;
    let fused = fuse(arena, before);
    let changed = fused != before;
    debug!(pass = "fuse", changed, root = %arena.key_name(fused), "pass finished");
    report.passes.push(PassReport {
        name: "fuse",
        iterations: 1,
        changed,
        stalled: false,
    });
    report.root = fused;

    rule_pass(arena, &mut report, "simplify-final", RuleSet::down_only());
    report
}

fn rule_pass(
    arena: &mut ExprArena,
    report: &mut OptimizeReport,
    name: &'static str,
    rules: RuleSet,
) {
    let before = report.root;
    let outcome = rewrite_fixed_point(arena, before, rules);
    let changed = outcome.root != before;
    debug!(
        pass = name,
        iterations = outcome.iterations,
        changed,
        root = %arena.key_name(outcome.root),
        "pass finished"
    );
    report.passes.push(PassReport {
        name,
        iterations: outcome.iterations,
        changed,
        stalled: outcome.stalled,
    });
    report.stalled |= outcome.stalled;
    report.root = outcome.root;
}
