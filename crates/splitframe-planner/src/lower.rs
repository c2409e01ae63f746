//! Lowering: turn an (optimized) expression tree into the keyed task graph.
//!
//! Emission is memoized per node and children-first, so shared subtrees
//! produce their tasks exactly once and every dependency precedes its
//! consumers in the task list.

use std::collections::HashMap;

use serde_json::json;
use splitframe_core::{ExprArena, ExprId, OpKind};
use thiserror::Error;

use crate::graph::{OperatorBinding, Task, TaskGraph, TaskKey};

#[derive(Debug, Error)]
pub enum LowerError {
    /// The partition count is unknown somewhere in the tree; per-partition
    /// tasks cannot be enumerated.
    #[error("cannot lower `{kind}`: partition count is unknown")]
    UnknownPartitions { kind: &'static str },
    #[error("lowering failed: {0}")]
    Plan(String),
}

/// Lower the tree rooted at `root`. The graph's outputs list the keys of
/// the result partitions, in partition order.
pub fn lower(arena: &ExprArena, root: ExprId) -> Result<TaskGraph, LowerError> {
    let mut graph = TaskGraph::default();
    let mut memo = HashMap::new();
    let outputs = lower_rec(arena, root, &mut graph, &mut memo)?;
    graph.outputs = outputs;
    Ok(graph)
}

/// Emit tasks for `id` (and, recursively, its children), returning the keys
/// of its output partitions.
fn lower_rec(
    arena: &ExprArena,
    id: ExprId,
    graph: &mut TaskGraph,
    memo: &mut HashMap<ExprId, Vec<TaskKey>>,
) -> Result<Vec<TaskKey>, LowerError> {
    if let Some(done) = memo.get(&id) {
        return Ok(done.clone());
    }
    let name = arena.key_name(id);
    let keys = match arena.kind(id) {
        OpKind::Scan => lower_scan(arena, id, &name, graph)?,
        OpKind::Project | OpKind::Filter | OpKind::Assign | OpKind::MapPartitions => {
            let input = expect_input(arena, id)?;
            let deps = lower_rec(arena, input, graph, memo)?;
            let binding = blockwise_binding(arena, id)?;
            emit_per_partition(graph, &name, &deps, binding)
        }
        OpKind::Fused => lower_fused(arena, id, &name, graph, memo)?,
        OpKind::Reduction => {
            let input = expect_input(arena, id)?;
            let deps = lower_rec(arena, input, graph, memo)?;
            lower_tree_reduce(arena, id, &name, graph, deps, "reduce")?
        }
        OpKind::GroupAggregate => {
            let input = expect_input(arena, id)?;
            let deps = lower_rec(arena, input, graph, memo)?;
            lower_tree_reduce(arena, id, &name, graph, deps, "groupby")?
        }
        OpKind::Shuffle => lower_shuffle(arena, id, &name, graph, memo)?,
        OpKind::Repartition => lower_repartition(arena, id, &name, graph, memo)?,
    };
    memo.insert(id, keys.clone());
    Ok(keys)
}

fn lower_scan(
    arena: &ExprArena,
    id: ExprId,
    name: &str,
    graph: &mut TaskGraph,
) -> Result<Vec<TaskKey>, LowerError> {
    let source = arena
        .operand(id, "source")
        .and_then(|op| op.as_source())
        .ok_or_else(|| LowerError::Plan("scan without source".into()))?;
    let nparts = source
        .npartitions
        .ok_or(LowerError::UnknownPartitions { kind: "scan" })?;

    let mut keys = Vec::with_capacity(nparts);
    for i in 0..nparts {
        let key = TaskKey::new(name, i as u32);
        graph.tasks.push(Task {
            key: key.clone(),
            binding: OperatorBinding::new(
                "scan",
                json!({
                    "location": source.location,
                    "columns": source.output_columns(),
                    "predicate": source.predicate.as_ref().map(|p| p.to_string()),
                    "partition": i,
                    "npartitions": nparts,
                }),
            ),
            deps: vec![],
        });
        keys.push(key);
    }
    Ok(keys)
}

/// Operator binding for one blockwise node, used both for standalone
/// per-partition tasks and for the step list inside a fused composite.
fn blockwise_binding(arena: &ExprArena, id: ExprId) -> Result<OperatorBinding, LowerError> {
    let op = |param: &str| {
        arena
            .operand(id, param)
            .ok_or_else(|| LowerError::Plan(format!("missing `{}` operand", param)))
    };
    match arena.kind(id) {
        OpKind::Project => {
            let columns = op("columns")?
                .as_columns()
                .ok_or_else(|| LowerError::Plan("project columns malformed".into()))?;
            Ok(OperatorBinding::new("project", json!({ "columns": columns })))
        }
        OpKind::Filter => {
            let pred = op("predicate")?
                .as_expr()
                .ok_or_else(|| LowerError::Plan("filter predicate malformed".into()))?;
            Ok(OperatorBinding::new(
                "filter",
                json!({ "predicate": pred.to_string() }),
            ))
        }
        OpKind::Assign => {
            let column = op("name")?
                .as_str()
                .ok_or_else(|| LowerError::Plan("assign name malformed".into()))?;
            let expr = op("expr")?
                .as_expr()
                .ok_or_else(|| LowerError::Plan("assign expr malformed".into()))?;
            Ok(OperatorBinding::new(
                "assign",
                json!({ "name": column, "expr": expr.to_string() }),
            ))
        }
        OpKind::MapPartitions => {
            let callable = op("callable")?
                .as_callable()
                .ok_or_else(|| LowerError::Plan("callable malformed".into()))?;
            Ok(OperatorBinding::new(
                callable.key.clone(),
                callable.config.clone(),
            ))
        }
        other => Err(LowerError::Plan(format!(
            "`{}` is not a blockwise operation",
            other.name()
        ))),
    }
}

/// One task per input partition, all sharing one binding.
fn emit_per_partition(
    graph: &mut TaskGraph,
    name: &str,
    deps: &[TaskKey],
    binding: OperatorBinding,
) -> Vec<TaskKey> {
    let mut keys = Vec::with_capacity(deps.len());
    for (i, dep) in deps.iter().enumerate() {
        let key = TaskKey::new(name, i as u32);
        graph.tasks.push(Task {
            key: key.clone(),
            binding: binding.clone(),
            deps: vec![dep.clone()],
        });
        keys.push(key);
    }
    keys
}

/// A fused chain lowers to one composite task per partition whose config
/// lists the member bindings in execution (innermost-first) order.
fn lower_fused(
    arena: &ExprArena,
    id: ExprId,
    name: &str,
    graph: &mut TaskGraph,
    memo: &mut HashMap<ExprId, Vec<TaskKey>>,
) -> Result<Vec<TaskKey>, LowerError> {
    let input = expect_input(arena, id)?;
    let deps = lower_rec(arena, input, graph, memo)?;

    let members = match arena.operand(id, "members") {
        Some(splitframe_core::Operand::NodeList(ids)) => ids.clone(),
        _ => return Err(LowerError::Plan("fused without members".into())),
    };
    let mut steps = Vec::with_capacity(members.len());
    for member in members.iter().rev() {
        steps.push(blockwise_binding(arena, *member)?);
    }
    let steps = serde_json::to_value(&steps).map_err(|e| LowerError::Plan(e.to_string()))?;
    let binding = OperatorBinding::new("fused", json!({ "steps": steps }));
    Ok(emit_per_partition(graph, name, &deps, binding))
}

/// Chunk per input partition, combine in a tree with `split_every` fan-in,
/// finalize into the single output partition.
fn lower_tree_reduce(
    arena: &ExprArena,
    id: ExprId,
    name: &str,
    graph: &mut TaskGraph,
    deps: Vec<TaskKey>,
    family: &str,
) -> Result<Vec<TaskKey>, LowerError> {
    let aggs: Vec<String> = arena
        .operand(id, "aggs")
        .and_then(|op| op.as_aggs())
        .ok_or_else(|| LowerError::Plan("aggregation without aggs".into()))?
        .iter()
        .map(|a| a.to_string())
        .collect();
    let split_every = arena
        .operand(id, "split_every")
        .and_then(|op| op.as_num())
        .ok_or_else(|| LowerError::Plan("aggregation without split_every".into()))?
        as usize;
    let config = match arena.operand(id, "keys") {
        Some(op) => {
            let keys = op
                .as_columns()
                .ok_or_else(|| LowerError::Plan("groupby keys malformed".into()))?;
            json!({ "keys": keys, "aggs": aggs })
        }
        None => json!({ "aggs": aggs }),
    };

    let chunk_name = format!("{}-chunk", name);
    let mut level_keys = emit_per_partition(
        graph,
        &chunk_name,
        &deps,
        OperatorBinding::new(format!("{}-chunk", family), config.clone()),
    );

    // Combine levels until one round of finalization can consume the rest.
    let mut level = 0u32;
    while level_keys.len() > split_every {
        level += 1;
        let level_name = format!("{}-combine{}", name, level);
        let mut next = Vec::new();
        for (j, group) in level_keys.chunks(split_every).enumerate() {
            let key = TaskKey::new(&level_name, j as u32);
            graph.tasks.push(Task {
                key: key.clone(),
                binding: OperatorBinding::new(format!("{}-combine", family), config.clone()),
                deps: group.to_vec(),
            });
            next.push(key);
        }
        level_keys = next;
    }

    let out = TaskKey::new(name, 0);
    graph.tasks.push(Task {
        key: out.clone(),
        binding: OperatorBinding::new(format!("{}-finalize", family), config),
        deps: level_keys,
    });
    Ok(vec![out])
}

/// Two-stage shuffle: per input partition, split rows by key hash into
/// output buckets; per output partition, combine its bucket from every
/// split. The combine stage is all-to-all by construction.
fn lower_shuffle(
    arena: &ExprArena,
    id: ExprId,
    name: &str,
    graph: &mut TaskGraph,
    memo: &mut HashMap<ExprId, Vec<TaskKey>>,
) -> Result<Vec<TaskKey>, LowerError> {
    let input = expect_input(arena, id)?;
    let deps = lower_rec(arena, input, graph, memo)?;
    let on = arena
        .operand(id, "on")
        .and_then(|op| op.as_columns())
        .ok_or_else(|| LowerError::Plan("shuffle without keys".into()))?
        .to_vec();
    let n_out = arena
        .operand(id, "npartitions")
        .and_then(|op| op.as_num())
        .ok_or_else(|| LowerError::Plan("shuffle without npartitions".into()))? as usize;

    let split_name = format!("{}-split", name);
    let split_binding = OperatorBinding::new(
        "shuffle-split",
        json!({ "on": on, "npartitions": n_out }),
    );
    let splits = emit_per_partition(graph, &split_name, &deps, split_binding);

    let mut keys = Vec::with_capacity(n_out);
    for j in 0..n_out {
        let key = TaskKey::new(name, j as u32);
        graph.tasks.push(Task {
            key: key.clone(),
            binding: OperatorBinding::new(
                "shuffle-combine",
                json!({ "on": on, "partition": j }),
            ),
            deps: splits.clone(),
        });
        keys.push(key);
    }
    Ok(keys)
}

/// Count-only repartition over contiguous ranges: merging consumes input
/// range `[j*m/n, (j+1)*m/n)` per output, splitting slices output `j` out
/// of input `floor(j*m/n)`.
fn lower_repartition(
    arena: &ExprArena,
    id: ExprId,
    name: &str,
    graph: &mut TaskGraph,
    memo: &mut HashMap<ExprId, Vec<TaskKey>>,
) -> Result<Vec<TaskKey>, LowerError> {
    let input = expect_input(arena, id)?;
    let deps = lower_rec(arena, input, graph, memo)?;
    let m = deps.len();
    let n = arena
        .operand(id, "npartitions")
        .and_then(|op| op.as_num())
        .ok_or_else(|| LowerError::Plan("repartition without npartitions".into()))?
        as usize;

    let mut keys = Vec::with_capacity(n);
    if n <= m {
        for j in 0..n {
            let lo = j * m / n;
            let hi = (j + 1) * m / n;
            let key = TaskKey::new(name, j as u32);
            graph.tasks.push(Task {
                key: key.clone(),
                binding: OperatorBinding::new("repartition-merge", json!({ "partition": j })),
                deps: deps[lo..hi].to_vec(),
            });
            keys.push(key);
        }
    } else {
        for j in 0..n {
            let src = j * m / n;
            let key = TaskKey::new(name, j as u32);
            graph.tasks.push(Task {
                key: key.clone(),
                binding: OperatorBinding::new(
                    "repartition-split",
                    json!({
                        "partition": j,
                        "npartitions_in": m,
                        "npartitions_out": n,
                    }),
                ),
                deps: vec![deps[src].clone()],
            });
            keys.push(key);
        }
    }
    Ok(keys)
}

fn expect_input(arena: &ExprArena, id: ExprId) -> Result<ExprId, LowerError> {
    arena
        .input_of(id)
        .ok_or_else(|| LowerError::Plan(format!("`{}` is missing its input", arena.kind(id).name())))
}
