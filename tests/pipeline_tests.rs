//! End-to-end pipelines through the Frame API and the YAML DSL.

use splitframe::core::{DataType, Field, OpKind, ScanSource, Schema};
use splitframe::frame::dsl::parse_pipeline;
use splitframe::{AggSpec, Frame};

fn events(n: usize) -> ScanSource {
    ScanSource::new(
        "mem://events",
        Schema::new(vec![
            Field::new("ts", DataType::Int64, false),
            Field::new("region", DataType::Utf8, false),
            Field::new("amount", DataType::Float64, true),
        ]),
        Some(n),
    )
}

#[test]
fn optimize_prunes_and_pushes_into_the_scan() {
    let frame = Frame::scan(events(4)).unwrap();
    let out = frame
        .filter("amount > 10")
        .unwrap()
        .select(vec!["region", "amount"])
        .unwrap();

    let (optimized, report) = out.optimize();
    assert!(!report.stalled);
    // Projection and predicate both end up in the scan descriptor.
    let arena_view = optimized.explain();
    assert!(arena_view.contains("scan"), "{}", arena_view);
    assert_eq!(optimized.schema().names(), vec!["region", "amount"]);
    assert_eq!(optimized.npartitions(), Some(4));
}

#[test]
fn optimize_is_idempotent() {
    let frame = Frame::scan(events(4)).unwrap();
    let out = frame
        .filter("amount > 10")
        .unwrap()
        .assign("doubled", "amount * 2")
        .unwrap()
        .select(vec!["region", "doubled"])
        .unwrap();

    let (once, first) = out.optimize();
    let (twice, second) = once.optimize();
    assert!(!first.stalled && !second.stalled);
    assert_eq!(once.root(), twice.root());
    assert!(second.passes.iter().all(|p| !p.changed));
}

#[test]
fn optimized_groupby_lowers_to_a_valid_graph() {
    let frame = Frame::scan(events(8)).unwrap();
    let out = frame
        .filter("amount > 10")
        .unwrap()
        .groupby(vec!["region"])
        .agg(vec![AggSpec::parse("sum:amount").unwrap()], 4)
        .unwrap();

    let (optimized, _) = out.optimize();
    let graph = optimized.lower().unwrap();
    graph.validate().unwrap();
    assert_eq!(graph.outputs.len(), 1);
    // Filtering was folded into the scan, so no standalone filter task runs.
    assert!(graph.tasks.iter().all(|t| t.binding.key != "filter"));
}

#[test]
fn explain_is_deterministic() {
    let frame = Frame::scan(events(4)).unwrap();
    let out = frame
        .filter("amount > 10")
        .unwrap()
        .select(vec!["region"])
        .unwrap();
    let repr = out.explain();
    assert_eq!(out.explain(), repr);

    let heads: Vec<&str> = repr
        .lines()
        .map(|l| l.trim_start().split(':').next().unwrap_or(""))
        .collect();
    assert_eq!(heads, vec!["project", "filter", "scan"]);
}

#[test]
fn yaml_pipeline_runs_the_whole_stack() {
    let yaml = r#"
steps:
  - op: scan
    location: "mem://events"
    npartitions: 4
    schema:
      - { name: ts,     type: i64,  nullable: false }
      - { name: region, type: utf8, nullable: false }
      - { name: amount, type: f64,  nullable: true }
  - op: filter
    predicate: "amount > 10"
  - op: select
    columns: [region, amount]
  - op: groupby
    keys: [region]
    aggs: ["sum:amount", "count"]
"#;
    let frame = parse_pipeline(yaml).unwrap();
    let (optimized, report) = frame.optimize();
    assert!(!report.stalled);

    let graph = optimized.lower().unwrap();
    graph.validate().unwrap();
    assert_eq!(graph.outputs.len(), 1);
    assert_eq!(
        optimized.schema().names(),
        vec!["region", "sum(amount)", "count"]
    );
}

#[test]
fn deduplicated_subplans_share_nodes_across_frames() {
    let frame = Frame::scan(events(4)).unwrap();
    let left = frame.filter("amount > 10").unwrap();
    let right = frame.filter("amount > 10").unwrap();
    assert_eq!(left.root(), right.root());
}

#[test]
fn blockwise_pipeline_fuses_down_to_composite_tasks() {
    let frame = Frame::scan(events(4)).unwrap();
    let out = frame
        .assign("doubled", "amount * 2")
        .unwrap()
        .filter("doubled > 20")
        .unwrap();

    let (optimized, _) = out.optimize();
    let graph = optimized.lower().unwrap();
    graph.validate().unwrap();
    assert_eq!(graph.outputs.len(), 4);
    // The assign/filter pair runs as one composite per partition.
    let kinds: std::collections::BTreeSet<&str> = graph
        .tasks
        .iter()
        .map(|t| t.binding.key.as_str())
        .collect();
    assert!(kinds.contains("fused"), "{:?}", kinds);
}

#[test]
fn unknown_partition_count_surfaces_at_lowering_not_before() {
    let frame = Frame::scan(ScanSource::new(
        "mem://events",
        Schema::new(vec![Field::new("a", DataType::Int64, false)]),
        None,
    ))
    .unwrap();
    let out = frame.filter("a > 1").unwrap();
    // Planning and optimization tolerate the unknown count.
    assert_eq!(out.npartitions(), None);
    let (optimized, _) = out.optimize();
    assert!(optimized.lower().is_err());
}

#[test]
fn plan_tree_shows_operation_kinds() {
    let frame = Frame::scan(events(2)).unwrap();
    let out = frame.repartition(8).unwrap();
    let repr = out.explain();
    assert!(repr.contains(OpKind::Repartition.name()), "{}", repr);
    assert!(repr.contains(OpKind::Scan.name()), "{}", repr);
}
