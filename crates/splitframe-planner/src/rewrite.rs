//! The rewriter engine: repeated rule application to a fixed point.
//!
//! One round applies down-rules on a node (bottom of the loop recurses into
//! children first conceptually: the node is rewritten, then its children are
//! rewritten and the node rebuilt), and lets children rewrite their parent
//! through up-rules. Rounds repeat until no rule fires anywhere or the
//! iteration budget is exhausted; exhaustion is a soft-degrade path that
//! keeps the best tree so far and surfaces a diagnostic, never an error.

use std::collections::HashMap;

use splitframe_core::{ExprArena, ExprId, Operand};
use tracing::{trace, warn};

use crate::rules::{self, PushdownPass};

/// Rule subset one pass is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSet {
    pub down: bool,
    pub pushdown: Option<PushdownPass>,
}

impl RuleSet {
    /// Algebraic simplifications only.
    pub fn down_only() -> Self {
        Self {
            down: true,
            pushdown: None,
        }
    }

    /// Column-requirement propagation toward sources.
    pub fn projection_pushdown() -> Self {
        Self {
            down: false,
            pushdown: Some(PushdownPass::Projection),
        }
    }

    /// Filter propagation toward sources.
    pub fn predicate_pushdown() -> Self {
        Self {
            down: false,
            pushdown: Some(PushdownPass::Predicate),
        }
    }
}

/// Result of a fixed-point application.
#[derive(Debug, Clone, Copy)]
pub struct RewriteOutcome {
    pub root: ExprId,
    /// Full rounds executed.
    pub iterations: usize,
    /// True when the iteration budget ran out before a fixed point.
    pub stalled: bool,
}

/// Apply `rules` over the tree rooted at `root` until nothing changes.
///
/// Determinism: children are visited in operand order and the dependents
/// map is rebuilt from the canonical (deduplicated) tree each round, so the
/// same input tree always produces the same output tree.
pub fn rewrite_fixed_point(arena: &mut ExprArena, root: ExprId, rules: RuleSet) -> RewriteOutcome {
    // Generous bound tied to tree depth; only a buggy or cyclic rule set
    // gets anywhere near it.
    let budget = 2 * arena.depth(root) + 8;
    let mut expr = root;
    for iteration in 0..budget {
        let dependents = arena.dependents(expr);
        let mut memo = HashMap::new();
        let new = rewrite_once(arena, expr, rules, &dependents, &mut memo);
        if new == expr {
            return RewriteOutcome {
                root: expr,
                iterations: iteration + 1,
                stalled: false,
            };
        }
        trace!(iteration, from = %arena.key_name(expr), to = %arena.key_name(new), "rewrite round changed tree");
        expr = new;
    }
    warn!(
        budget,
        root = %arena.key_name(expr),
        "optimizer stalled before reaching a fixed point; using best tree so far"
    );
    RewriteOutcome {
        root: expr,
        iterations: budget,
        stalled: true,
    }
}

/// One full round over the tree. Shared subexpressions are rewritten once
/// via the memo, which also keeps rule application order deterministic.
fn rewrite_once(
    arena: &mut ExprArena,
    id: ExprId,
    rules: RuleSet,
    dependents: &HashMap<ExprId, Vec<ExprId>>,
    memo: &mut HashMap<ExprId, ExprId>,
) -> ExprId {
    if let Some(done) = memo.get(&id) {
        return *done;
    }

    let mut expr = id;
    loop {
        // Rewrite this node using its children's shape.
        if rules.down {
            if let Some(new) = rules::simplify_down(arena, expr) {
                if new != expr {
                    expr = new;
                    continue;
                }
            }
        }

        // Allow children to rewrite their parent.
        if let Some(pass) = rules.pushdown {
            let mut rewritten = false;
            for child in arena.children(expr) {
                if let Some(new) = rules::simplify_up(arena, child, expr, dependents, pass) {
                    if new != expr {
                        expr = new;
                        rewritten = true;
                        break;
                    }
                }
            }
            if rewritten {
                continue;
            }
        }
        break;
    }

    // Rewrite all of the children and rebuild if any changed.
    let node = arena.node(expr).clone();
    let mut operands = node.operands.clone();
    let mut changed = false;
    for operand in operands.iter_mut() {
        match operand {
            Operand::Node(child) => {
                let new = rewrite_once(arena, *child, rules, dependents, memo);
                if new != *child {
                    *child = new;
                    changed = true;
                }
            }
            Operand::NodeList(children) => {
                for child in children.iter_mut() {
                    let new = rewrite_once(arena, *child, rules, dependents, memo);
                    if new != *child {
                        *child = new;
                        changed = true;
                    }
                }
            }
            _ => {}
        }
    }
    if changed {
        // Rules preserve schema validity; a rebuild failure would be a rule
        // bug, in which case the original node is kept.
        if let Ok(new) = arena.push(node.kind, operands) {
            expr = new;
        }
    }

    memo.insert(id, expr);
    expr
}
