//! Projection and predicate pushdown: requirements travel toward the scan.

use splitframe::core::{DataType, ExprArena, Field, OpKind, ScalarExpr, ScanSource, Schema};
use splitframe::planner::{rewrite_fixed_point, RuleSet};

fn events(n: usize) -> ScanSource {
    ScanSource::new(
        "mem://events",
        Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("b", DataType::Float64, true),
            Field::new("c", DataType::Utf8, false),
        ]),
        Some(n),
    )
}

fn run(arena: &mut ExprArena, root: splitframe::ExprId, rules: RuleSet) -> splitframe::ExprId {
    let outcome = rewrite_fixed_point(arena, root, rules);
    assert!(!outcome.stalled);
    outcome.root
}

#[test]
fn projection_is_absorbed_into_the_scan() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(4)).unwrap();
    let p = arena.project(s, vec!["b".into(), "a".into()]).unwrap();

    let root = run(&mut arena, p, RuleSet::projection_pushdown());
    assert_eq!(arena.kind(root), OpKind::Scan);
    let source = arena.operand(root, "source").unwrap().as_source().unwrap();
    assert_eq!(source.columns, Some(vec!["b".to_string(), "a".to_string()]));
    // Column order requested by the projection survives in the scan output.
    assert_eq!(arena.schema(root).names(), vec!["b", "a"]);
}

#[test]
fn pruning_respects_scan_capability() {
    let mut arena = ExprArena::new();
    let mut source = events(4);
    source.supports_column_pruning = false;
    let s = arena.scan(source).unwrap();
    let p = arena.project(s, vec!["a".into()]).unwrap();

    let root = run(&mut arena, p, RuleSet::projection_pushdown());
    assert_eq!(arena.kind(root), OpKind::Project);
    assert_eq!(arena.input_of(root), Some(s));
}

#[test]
fn projection_slides_below_a_filter() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(4)).unwrap();
    let f = arena.filter(s, ScalarExpr::parse("b > 1").unwrap()).unwrap();
    let p = arena.project(f, vec!["a".into()]).unwrap();

    let root = run(&mut arena, p, RuleSet::projection_pushdown());
    // The outer projection keeps the final column set; the filter now reads
    // a scan pruned to the columns it and the projection need.
    assert_eq!(arena.kind(root), OpKind::Project);
    assert_eq!(arena.schema(root).names(), vec!["a"]);
    let filter = arena.input_of(root).unwrap();
    assert_eq!(arena.kind(filter), OpKind::Filter);
    let scan = arena.input_of(filter).unwrap();
    assert_eq!(arena.kind(scan), OpKind::Scan);
    assert_eq!(arena.schema(scan).names(), vec!["a", "b"]);
}

#[test]
fn unused_assign_is_dropped_by_projection() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(2)).unwrap();
    let a = arena
        .assign(s, "d", ScalarExpr::parse("a + 1").unwrap())
        .unwrap();
    let p = arena.project(a, vec!["b".into()]).unwrap();

    let root = run(&mut arena, p, RuleSet::projection_pushdown());
    assert_eq!(arena.schema(root).names(), vec!["b"]);
    // No assign survives anywhere on the path.
    for id in arena.walk(root) {
        assert_ne!(arena.kind(id), OpKind::Assign);
    }
}

#[test]
fn overwriting_assign_is_not_dropped() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(2)).unwrap();
    // Overwrites an input column; dropping it would restore old values.
    let a = arena
        .assign(s, "b", ScalarExpr::parse("b * 2").unwrap())
        .unwrap();
    let p = arena.project(a, vec!["a".into()]).unwrap();

    let root = run(&mut arena, p, RuleSet::projection_pushdown());
    let kinds: Vec<OpKind> = arena.walk(root).iter().map(|id| arena.kind(*id)).collect();
    assert!(kinds.contains(&OpKind::Assign));
}

#[test]
fn projection_stays_above_shuffle_missing_its_keys() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(4)).unwrap();
    let sh = arena.shuffle(s, vec!["c".into()], 8).unwrap();
    let p = arena.project(sh, vec!["a".into()]).unwrap();

    let root = run(&mut arena, p, RuleSet::projection_pushdown());
    assert_eq!(arena.kind(root), OpKind::Project);
    assert_eq!(arena.kind(arena.input_of(root).unwrap()), OpKind::Shuffle);
}

#[test]
fn pushdown_skips_children_with_other_consumers() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(4)).unwrap();
    let f = arena.filter(s, ScalarExpr::parse("b > 1").unwrap()).unwrap();
    let p = arena.project(f, vec!["a".into()]).unwrap();
    // `f` has two dependents, so the projection must not rewrite past it
    // even though the filter/scan pair below is otherwise eligible.
    let root = arena.fused(f, vec![p]).unwrap();
    assert_eq!(run(&mut arena, root, RuleSet::projection_pushdown()), root);
}

#[test]
fn predicate_folds_into_the_scan() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(4)).unwrap();
    let f = arena.filter(s, ScalarExpr::parse("a > 1").unwrap()).unwrap();

    let root = run(&mut arena, f, RuleSet::predicate_pushdown());
    assert_eq!(arena.kind(root), OpKind::Scan);
    let source = arena.operand(root, "source").unwrap().as_source().unwrap();
    assert_eq!(source.predicate.as_ref().unwrap().to_string(), "(a > 1)");
}

#[test]
fn pushed_predicates_conjoin_in_the_scan() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(4)).unwrap();
    let f1 = arena.filter(s, ScalarExpr::parse("a > 1").unwrap()).unwrap();
    let f2 = arena.filter(f1, ScalarExpr::parse("b < 2").unwrap()).unwrap();

    let root = run(&mut arena, f2, RuleSet::predicate_pushdown());
    assert_eq!(arena.kind(root), OpKind::Scan);
    let source = arena.operand(root, "source").unwrap().as_source().unwrap();
    let pred = source.predicate.as_ref().unwrap().to_string();
    assert!(pred.contains("(a > 1)") && pred.contains("(b < 2)"), "{}", pred);
}

#[test]
fn predicate_respects_scan_capability() {
    let mut arena = ExprArena::new();
    let mut source = events(4);
    source.supports_predicate_pushdown = false;
    let s = arena.scan(source).unwrap();
    let f = arena.filter(s, ScalarExpr::parse("a > 1").unwrap()).unwrap();

    let root = run(&mut arena, f, RuleSet::predicate_pushdown());
    assert_eq!(arena.kind(root), OpKind::Filter);
}

#[test]
fn predicate_slides_below_an_unrelated_assign() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(4)).unwrap();
    let a = arena
        .assign(s, "d", ScalarExpr::parse("a + 1").unwrap())
        .unwrap();
    let f = arena.filter(a, ScalarExpr::parse("b > 1").unwrap()).unwrap();

    let root = run(&mut arena, f, RuleSet::predicate_pushdown());
    assert_eq!(arena.kind(root), OpKind::Assign);
    let scan = arena.input_of(root).unwrap();
    assert_eq!(arena.kind(scan), OpKind::Scan);
    let source = arena.operand(scan, "source").unwrap().as_source().unwrap();
    assert!(source.predicate.is_some());
}

#[test]
fn predicate_on_a_computed_column_stays_above_its_assign() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(4)).unwrap();
    let a = arena
        .assign(s, "d", ScalarExpr::parse("a + 1").unwrap())
        .unwrap();
    let f = arena.filter(a, ScalarExpr::parse("d > 1").unwrap()).unwrap();

    let root = run(&mut arena, f, RuleSet::predicate_pushdown());
    assert_eq!(arena.kind(root), OpKind::Filter);
    assert_eq!(arena.kind(arena.input_of(root).unwrap()), OpKind::Assign);
}

#[test]
fn predicate_slides_below_a_shuffle() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(4)).unwrap();
    let sh = arena.shuffle(s, vec!["a".into()], 8).unwrap();
    let f = arena.filter(sh, ScalarExpr::parse("b > 1").unwrap()).unwrap();

    let root = run(&mut arena, f, RuleSet::predicate_pushdown());
    assert_eq!(arena.kind(root), OpKind::Shuffle);
    let scan = arena.input_of(root).unwrap();
    assert_eq!(arena.kind(scan), OpKind::Scan);
}
