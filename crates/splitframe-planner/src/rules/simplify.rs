//! `simplify_down` rules: a node rewrites itself into a cheaper equivalent
//! by inspecting its children.

use splitframe_core::{ExprArena, ExprId, OpKind};

/// Apply the down-rule for `id`'s kind, if any. Returns the replacement id
/// or `None` when no rule fires. Rules preserve output schema and row
/// selection; a rebuild can therefore not fail, and any failure is treated
/// as "no change".
pub(crate) fn simplify_down(arena: &mut ExprArena, id: ExprId) -> Option<ExprId> {
    match arena.kind(id) {
        OpKind::Filter => filter_down(arena, id),
        OpKind::Project => project_down(arena, id),
        OpKind::Assign => assign_down(arena, id),
        OpKind::Shuffle => shuffle_down(arena, id),
        OpKind::Repartition => repartition_down(arena, id),
        _ => None,
    }
}

/// `filter(x, true) -> x` and `filter(filter(x, p1), p2) -> filter(x, p1 AND p2)`.
fn filter_down(arena: &mut ExprArena, id: ExprId) -> Option<ExprId> {
    let input = arena.input_of(id)?;
    let pred = arena.operand(id, "predicate")?.as_expr()?.clone();

    if pred.is_true_literal() {
        return Some(input);
    }
    if arena.kind(input) == OpKind::Filter {
        let inner_input = arena.input_of(input)?;
        let inner_pred = arena.operand(input, "predicate")?.as_expr()?.clone();
        return arena.filter(inner_input, inner_pred.and(pred)).ok();
    }
    None
}

/// `project(project(x, c1), c2) -> project(x, c2)` when `c2 ⊆ c1`, and
/// identity-projection elimination when the column list equals the input
/// schema in order.
fn project_down(arena: &mut ExprArena, id: ExprId) -> Option<ExprId> {
    let input = arena.input_of(id)?;
    let cols = arena.operand(id, "columns")?.as_columns()?.to_vec();

    if cols == arena.schema(input).names() {
        return Some(input);
    }
    if arena.kind(input) == OpKind::Project {
        let inner_input = arena.input_of(input)?;
        let inner_cols = arena.operand(input, "columns")?.as_columns()?;
        if cols.iter().all(|c| inner_cols.contains(c)) {
            return arena.project(inner_input, cols).ok();
        }
    }
    None
}

/// `assign(assign(x, n, e1), n, e2) -> assign(x, n, e2)` when `e2` does not
/// read the overwritten column.
fn assign_down(arena: &mut ExprArena, id: ExprId) -> Option<ExprId> {
    let input = arena.input_of(id)?;
    if arena.kind(input) != OpKind::Assign {
        return None;
    }
    let name = arena.operand(id, "name")?.as_str()?.to_string();
    let inner_name = arena.operand(input, "name")?.as_str()?;
    if name != inner_name {
        return None;
    }
    let expr = arena.operand(id, "expr")?.as_expr()?.clone();
    if expr.columns().contains(&name) {
        return None;
    }
    let inner_input = arena.input_of(input)?;
    arena.assign(inner_input, name, expr).ok()
}

/// `shuffle(shuffle(x, on, _), on, n) -> shuffle(x, on, n)`; the inner
/// redistribution is immediately redone by the outer one.
fn shuffle_down(arena: &mut ExprArena, id: ExprId) -> Option<ExprId> {
    let input = arena.input_of(id)?;
    if arena.kind(input) != OpKind::Shuffle {
        return None;
    }
    let on = arena.operand(id, "on")?.as_columns()?.to_vec();
    let inner_on = arena.operand(input, "on")?.as_columns()?;
    if on != inner_on {
        return None;
    }
    let n = arena.operand(id, "npartitions")?.as_num()?;
    let inner_input = arena.input_of(input)?;
    arena.shuffle(inner_input, on, n).ok()
}

/// Drop repartitions that keep the partition count unchanged, and collapse
/// stacked repartitions.
fn repartition_down(arena: &mut ExprArena, id: ExprId) -> Option<ExprId> {
    let input = arena.input_of(id)?;
    let n = arena.operand(id, "npartitions")?.as_num()?;

    if arena.npartitions(input) == Some(n as usize) {
        return Some(input);
    }
    if arena.kind(input) == OpKind::Repartition {
        let inner_input = arena.input_of(input)?;
        return arena.repartition(inner_input, n).ok();
    }
    None
}
