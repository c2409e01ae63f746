//! `simplify_up` rules: a child rewrites its parent, pushing a projection
//! or predicate requirement closer to the data source.
//!
//! Every rule here guards on the dependents map: pushing through a child
//! that feeds more than one consumer would duplicate work (or change what a
//! sibling consumer sees), so the rewrite only fires when the parent is the
//! child's sole dependent.

use std::collections::{BTreeSet, HashMap};

use splitframe_core::{ExprArena, ExprId, OpKind, ScalarExpr};

use super::PushdownPass;

/// Offer `child` the chance to rewrite `parent`. Returns the replacement
/// for `parent`, or `None` when no rule fires.
pub(crate) fn simplify_up(
    arena: &mut ExprArena,
    child: ExprId,
    parent: ExprId,
    dependents: &HashMap<ExprId, Vec<ExprId>>,
    pass: PushdownPass,
) -> Option<ExprId> {
    if dependents.get(&child).map_or(0, |d| d.len()) > 1 {
        return None;
    }
    match pass {
        PushdownPass::Projection => projection_up(arena, child, parent),
        PushdownPass::Predicate => predicate_up(arena, child, parent),
    }
}

/// Projection pushdown: `parent` must be a projection over `child`.
fn projection_up(arena: &mut ExprArena, child: ExprId, parent: ExprId) -> Option<ExprId> {
    if arena.kind(parent) != OpKind::Project {
        return None;
    }
    let pcols = arena.operand(parent, "columns")?.as_columns()?.to_vec();

    match arena.kind(child) {
        OpKind::Scan => project_into_scan(arena, child, &pcols),
        OpKind::Filter => project_below_filter(arena, child, &pcols),
        OpKind::Assign => project_below_assign(arena, child, &pcols),
        OpKind::Shuffle => {
            let on = arena.operand(child, "on")?.as_columns()?.to_vec();
            let n = arena.operand(child, "npartitions")?.as_num()?;
            let input = arena.input_of(child)?;
            if !on.iter().all(|c| pcols.contains(c)) {
                return None;
            }
            if as_set(&pcols) == as_set(&arena.schema(input).names()) {
                return None;
            }
            let inner = arena.project(input, pcols).ok()?;
            arena.shuffle(inner, on, n).ok()
        }
        OpKind::Repartition => {
            let n = arena.operand(child, "npartitions")?.as_num()?;
            let input = arena.input_of(child)?;
            if as_set(&pcols) == as_set(&arena.schema(input).names()) {
                return None;
            }
            let inner = arena.project(input, pcols).ok()?;
            arena.repartition(inner, n).ok()
        }
        _ => None,
    }
}

/// A projection directly above a column-pruning scan is absorbed into the
/// scan descriptor; the reader then materializes exactly the requested
/// columns, in the requested order.
fn project_into_scan(arena: &mut ExprArena, scan: ExprId, pcols: &[String]) -> Option<ExprId> {
    let source = arena.operand(scan, "source")?.as_source()?.clone();
    if !source.supports_column_pruning {
        return None;
    }
    if source.output_columns() == pcols {
        return None;
    }
    let mut pruned = source;
    pruned.columns = Some(pcols.to_vec());
    arena.scan(pruned).ok()
}

/// `project(filter(x, p), cols)` narrows `x` to the columns required by
/// either the projection or the predicate, keeping the outer projection for
/// the final column set. Fires only when the inner set strictly narrows the
/// input, which guarantees termination.
fn project_below_filter(arena: &mut ExprArena, filter: ExprId, pcols: &[String]) -> Option<ExprId> {
    let input = arena.input_of(filter)?;
    let pred = arena.operand(filter, "predicate")?.as_expr()?.clone();

    let mut required: BTreeSet<String> = pcols.iter().cloned().collect();
    required.extend(pred.columns());

    let input_names = arena.schema(input).names();
    if as_set(&input_names) == required {
        return None;
    }
    // Schema order keeps the inner projection deterministic.
    let inner_cols: Vec<String> = input_names
        .into_iter()
        .filter(|n| required.contains(n))
        .collect();
    let inner = arena.project(input, inner_cols).ok()?;
    let filtered = arena.filter(inner, pred).ok()?;
    arena.project(filtered, pcols.to_vec()).ok()
}

/// Projection above an assignment: drop the assignment when its column is
/// not requested (and does not overwrite an input column), otherwise push a
/// narrowed projection below it.
fn project_below_assign(arena: &mut ExprArena, assign: ExprId, pcols: &[String]) -> Option<ExprId> {
    let input = arena.input_of(assign)?;
    let name = arena.operand(assign, "name")?.as_str()?.to_string();
    let expr = arena.operand(assign, "expr")?.as_expr()?.clone();

    if !pcols.contains(&name) {
        // Overwrites of an existing column must be kept: dropping them would
        // restore the original values.
        if arena.schema(input).contains(&name) {
            return None;
        }
        return arena.project(input, pcols.to_vec()).ok();
    }

    let mut required: BTreeSet<String> =
        pcols.iter().filter(|c| **c != name).cloned().collect();
    required.extend(expr.columns());

    let input_names = arena.schema(input).names();
    if as_set(&input_names) == required {
        return None;
    }
    let inner_cols: Vec<String> = input_names
        .into_iter()
        .filter(|n| required.contains(n))
        .collect();
    let inner = arena.project(input, inner_cols).ok()?;
    let assigned = arena.assign(inner, name, expr).ok()?;
    arena.project(assigned, pcols.to_vec()).ok()
}

/// Predicate pushdown: `parent` must be a filter over `child`.
fn predicate_up(arena: &mut ExprArena, child: ExprId, parent: ExprId) -> Option<ExprId> {
    if arena.kind(parent) != OpKind::Filter {
        return None;
    }
    let pred = arena.operand(parent, "predicate")?.as_expr()?.clone();

    match arena.kind(child) {
        OpKind::Scan => filter_into_scan(arena, child, pred),
        OpKind::Project => {
            // Filters are row-wise; sliding below a pure column selection is
            // always sound because the predicate was validated against the
            // projected schema.
            let cols = arena.operand(child, "columns")?.as_columns()?.to_vec();
            let input = arena.input_of(child)?;
            let filtered = arena.filter(input, pred).ok()?;
            arena.project(filtered, cols).ok()
        }
        OpKind::Assign => {
            let name = arena.operand(child, "name")?.as_str()?.to_string();
            if pred.columns().contains(&name) {
                return None;
            }
            let expr = arena.operand(child, "expr")?.as_expr()?.clone();
            let input = arena.input_of(child)?;
            let filtered = arena.filter(input, pred).ok()?;
            arena.assign(filtered, name, expr).ok()
        }
        OpKind::Shuffle => {
            // Filtering commutes with hash redistribution: both operate on
            // whole rows and shuffles carry no ordering contract.
            let on = arena.operand(child, "on")?.as_columns()?.to_vec();
            let n = arena.operand(child, "npartitions")?.as_num()?;
            let input = arena.input_of(child)?;
            let filtered = arena.filter(input, pred).ok()?;
            arena.shuffle(filtered, on, n).ok()
        }
        OpKind::Repartition => {
            let n = arena.operand(child, "npartitions")?.as_num()?;
            let input = arena.input_of(child)?;
            let filtered = arena.filter(input, pred).ok()?;
            arena.repartition(filtered, n).ok()
        }
        _ => None,
    }
}

/// A filter directly above a pushdown-capable scan folds its predicate into
/// the scan descriptor, conjoined with anything already pushed.
fn filter_into_scan(arena: &mut ExprArena, scan: ExprId, pred: ScalarExpr) -> Option<ExprId> {
    let source = arena.operand(scan, "source")?.as_source()?.clone();
    if !source.supports_predicate_pushdown {
        return None;
    }
    let mut pushed = source;
    pushed.predicate = Some(match pushed.predicate.take() {
        Some(existing) => existing.and(pred),
        None => pred,
    });
    arena.scan(pushed).ok()
}

fn as_set(names: &[String]) -> BTreeSet<String> {
    names.iter().cloned().collect()
}
