//! Lowering: expression trees become keyed, dependency-ordered task graphs.

use splitframe::core::{DataType, ExprArena, Field, ScalarExpr, ScanSource, Schema};
use splitframe::planner::{fuse, lower, LowerError, TaskGraph};
use splitframe::AggSpec;

fn events(n: Option<usize>) -> ScanSource {
    ScanSource::new(
        "mem://events",
        Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("b", DataType::Float64, true),
        ]),
        n,
    )
}

fn by_key<'a>(graph: &'a TaskGraph, name_part: &str) -> Vec<&'a splitframe::planner::Task> {
    graph
        .tasks
        .iter()
        .filter(|t| t.binding.key == name_part)
        .collect()
}

#[test]
fn blockwise_lowers_one_task_per_partition() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(Some(3))).unwrap();
    let f = arena.filter(s, ScalarExpr::parse("a > 1").unwrap()).unwrap();

    let graph = lower(&arena, f).unwrap();
    graph.validate().unwrap();
    assert_eq!(graph.len(), 6);
    assert_eq!(graph.outputs.len(), 3);

    let filters = by_key(&graph, "filter");
    assert_eq!(filters.len(), 3);
    for (i, task) in filters.iter().enumerate() {
        assert_eq!(task.key.index, i as u32);
        assert_eq!(task.deps.len(), 1);
        assert_eq!(task.deps[0].index, i as u32);
        assert_eq!(task.binding.config["predicate"], "(a > 1)");
    }
}

#[test]
fn scan_tasks_carry_the_source_descriptor() {
    let mut arena = ExprArena::new();
    let mut source = events(Some(2));
    source.columns = Some(vec!["a".into()]);
    source.predicate = Some(ScalarExpr::parse("a > 5").unwrap());
    let s = arena.scan(source).unwrap();

    let graph = lower(&arena, s).unwrap();
    let scans = by_key(&graph, "scan");
    assert_eq!(scans.len(), 2);
    assert_eq!(scans[0].binding.config["location"], "mem://events");
    assert_eq!(scans[0].binding.config["columns"], serde_json::json!(["a"]));
    assert_eq!(scans[0].binding.config["predicate"], "(a > 5)");
    assert_eq!(scans[1].binding.config["partition"], 1);
}

#[test]
fn fused_chain_lowers_to_composite_tasks() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(Some(4))).unwrap();
    let f = arena.filter(s, ScalarExpr::parse("a > 1").unwrap()).unwrap();
    let a = arena
        .assign(f, "c", ScalarExpr::parse("b * 2").unwrap())
        .unwrap();
    let p = arena.project(a, vec!["c".into()]).unwrap();
    let root = fuse(&mut arena, p);

    let graph = lower(&arena, root).unwrap();
    graph.validate().unwrap();
    // 4 scan tasks + 4 composite tasks, nothing per member.
    assert_eq!(graph.len(), 8);

    let composites = by_key(&graph, "fused");
    assert_eq!(composites.len(), 4);
    let steps = composites[0].binding.config["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 3);
    // Steps run innermost-first.
    assert_eq!(steps[0]["key"], "filter");
    assert_eq!(steps[1]["key"], "assign");
    assert_eq!(steps[2]["key"], "project");
}

#[test]
fn reduction_builds_a_tree_with_bounded_fan_in() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(Some(8))).unwrap();
    let r = arena
        .reduction(s, vec![AggSpec::parse("sum:b").unwrap()], 2)
        .unwrap();

    let graph = lower(&arena, r).unwrap();
    graph.validate().unwrap();
    assert_eq!(graph.outputs.len(), 1);
    assert_eq!(graph.outputs[0].index, 0);

    assert_eq!(by_key(&graph, "reduce-chunk").len(), 8);
    // 8 -> 4 -> 2, then the finalize consumes the last two.
    assert_eq!(by_key(&graph, "reduce-combine").len(), 6);
    let finals = by_key(&graph, "reduce-finalize");
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].deps.len(), 2);
    for task in graph.tasks.iter().filter(|t| t.binding.key.starts_with("reduce")) {
        assert!(task.deps.len() <= 2);
        assert_eq!(task.binding.config["aggs"], serde_json::json!(["sum:b"]));
    }
}

#[test]
fn small_reduction_skips_the_combine_stage() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(Some(3))).unwrap();
    let r = arena
        .reduction(s, vec![AggSpec::parse("count").unwrap()], 8)
        .unwrap();

    let graph = lower(&arena, r).unwrap();
    graph.validate().unwrap();
    assert!(by_key(&graph, "reduce-combine").is_empty());
    assert_eq!(by_key(&graph, "reduce-finalize")[0].deps.len(), 3);
}

#[test]
fn groupby_carries_its_keys_in_the_config() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(Some(4))).unwrap();
    let g = arena
        .group_aggregate(
            s,
            vec!["a".into()],
            vec![AggSpec::parse("sum:b").unwrap()],
            8,
        )
        .unwrap();

    let graph = lower(&arena, g).unwrap();
    graph.validate().unwrap();
    let chunks = by_key(&graph, "groupby-chunk");
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[0].binding.config["keys"], serde_json::json!(["a"]));
    assert_eq!(graph.outputs.len(), 1);
}

#[test]
fn shuffle_lowers_to_split_and_combine_stages() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(Some(2))).unwrap();
    let sh = arena.shuffle(s, vec!["a".into()], 3).unwrap();

    let graph = lower(&arena, sh).unwrap();
    graph.validate().unwrap();
    assert_eq!(graph.outputs.len(), 3);

    let splits = by_key(&graph, "shuffle-split");
    assert_eq!(splits.len(), 2);
    let combines = by_key(&graph, "shuffle-combine");
    assert_eq!(combines.len(), 3);
    for (j, combine) in combines.iter().enumerate() {
        // All-to-all: every output partition reads every split.
        assert_eq!(combine.deps.len(), 2);
        assert_eq!(combine.binding.config["partition"], j);
    }
}

#[test]
fn repartition_merges_contiguous_ranges() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(Some(4))).unwrap();
    let r = arena.repartition(s, 2).unwrap();

    let graph = lower(&arena, r).unwrap();
    graph.validate().unwrap();
    let merges = by_key(&graph, "repartition-merge");
    assert_eq!(merges.len(), 2);
    assert_eq!(merges[0].deps.len(), 2);
    assert_eq!(merges[1].deps.len(), 2);
    let merged: Vec<u32> = merges[0].deps.iter().map(|d| d.index).collect();
    assert_eq!(merged, vec![0, 1]);
}

#[test]
fn repartition_splits_source_partitions() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(Some(2))).unwrap();
    let r = arena.repartition(s, 4).unwrap();

    let graph = lower(&arena, r).unwrap();
    graph.validate().unwrap();
    let splits = by_key(&graph, "repartition-split");
    assert_eq!(splits.len(), 4);
    let sources: Vec<u32> = splits.iter().map(|t| t.deps[0].index).collect();
    assert_eq!(sources, vec![0, 0, 1, 1]);
}

#[test]
fn unknown_partition_count_is_a_lowering_error() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(None)).unwrap();
    let f = arena.filter(s, ScalarExpr::parse("a > 1").unwrap()).unwrap();
    assert!(matches!(
        lower(&arena, f),
        Err(LowerError::UnknownPartitions { kind: "scan" })
    ));
}

#[test]
fn shared_subtrees_lower_once() {
    let mut arena = ExprArena::new();
    let s = arena.scan(events(Some(2))).unwrap();
    let f = arena.filter(s, ScalarExpr::parse("a > 1").unwrap()).unwrap();
    let r = arena
        .reduction(f, vec![AggSpec::parse("sum:b").unwrap()], 8)
        .unwrap();

    let graph = lower(&arena, r).unwrap();
    graph.validate().unwrap();
    // Scan appears exactly twice (once per partition), not once per consumer.
    assert_eq!(by_key(&graph, "scan").len(), 2);
}
