//! Blockwise fusion: collapse maximal chains of per-partition operations
//! into one composite node, so lowering emits a single task per partition
//! instead of one task per chain member.

use std::collections::HashMap;

use splitframe_core::{ExprArena, ExprId};
use tracing::debug;

/// Fuse every eligible chain in the tree rooted at `root`. Returns the new
/// root; the tree is unchanged when nothing is eligible.
pub fn fuse(arena: &mut ExprArena, root: ExprId) -> ExprId {
    let dependents = arena.dependents(root);
    let mut memo = HashMap::new();
    fuse_rec(arena, root, &dependents, &mut memo)
}

fn fuse_rec(
    arena: &mut ExprArena,
    id: ExprId,
    dependents: &HashMap<ExprId, Vec<ExprId>>,
    memo: &mut HashMap<ExprId, ExprId>,
) -> ExprId {
    if let Some(done) = memo.get(&id) {
        return *done;
    }

    let chain = collect_chain(arena, id, dependents);
    let out = if chain.len() >= 2 {
        // `chain` is outermost-first; the fused subgraph hangs off whatever
        // feeds the innermost member. Fusable kinds always carry an input.
        let tail_input = match chain.last().and_then(|m| arena.input_of(*m)) {
            Some(input) => input,
            None => {
                memo.insert(id, id);
                return id;
            }
        };
        let fused_input = fuse_rec(arena, tail_input, dependents, memo);

        // Rebuild members innermost-first so each links to its rebuilt
        // predecessor, keeping the chain consistent inside the composite.
        let mut rebuilt = Vec::with_capacity(chain.len());
        let mut prev = fused_input;
        for member in chain.iter().rev() {
            match arena.with_input(*member, prev) {
                Ok(new) => {
                    prev = new;
                    rebuilt.push(new);
                }
                Err(_) => {
                    // Should be unreachable: blockwise rebuilds preserve
                    // schemas. Fall back to leaving this node unfused.
                    memo.insert(id, id);
                    return id;
                }
            }
        }
        rebuilt.reverse();
        debug!(
            members = rebuilt.len(),
            head = %arena.key_name(id),
            "fused blockwise chain"
        );
        arena.fused(fused_input, rebuilt).unwrap_or(id)
    } else {
        rebuild_children(arena, id, dependents, memo)
    };

    memo.insert(id, out);
    out
}

/// Maximal fusable chain starting at `id`, outermost-first. A chain needs a
/// fusable head with a known partition count; it extends downward while the
/// next node is fusable, keeps the same partition count, and feeds only the
/// member above it.
fn collect_chain(
    arena: &ExprArena,
    id: ExprId,
    dependents: &HashMap<ExprId, Vec<ExprId>>,
) -> Vec<ExprId> {
    if !arena.kind(id).is_fusable() {
        return vec![id];
    }
    let nparts = match arena.npartitions(id) {
        Some(n) => n,
        None => return vec![id],
    };
    let mut chain = vec![id];
    let mut cur = id;
    while let Some(input) = arena.input_of(cur) {
        if !arena.kind(input).is_fusable()
            || arena.npartitions(input) != Some(nparts)
            || dependents.get(&input).map_or(0, |d| d.len()) != 1
        {
            break;
        }
        chain.push(input);
        cur = input;
    }
    chain
}

fn rebuild_children(
    arena: &mut ExprArena,
    id: ExprId,
    dependents: &HashMap<ExprId, Vec<ExprId>>,
    memo: &mut HashMap<ExprId, ExprId>,
) -> ExprId {
    use splitframe_core::Operand;

    let node = arena.node(id).clone();
    let mut operands = node.operands.clone();
    let mut changed = false;
    for operand in operands.iter_mut() {
        match operand {
            Operand::Node(child) => {
                let new = fuse_rec(arena, *child, dependents, memo);
                if new != *child {
                    *child = new;
                    changed = true;
                }
            }
            Operand::NodeList(children) => {
                for child in children.iter_mut() {
                    let new = fuse_rec(arena, *child, dependents, memo);
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
        arena.push(node.kind, operands).unwrap_or(id)
    } else {
        id
    }
}
