//! Operation kinds and their parameter contracts.
//!
//! Every node carries one `OpKind` tag plus an operand list aligned with the
//! kind's fixed parameter names. Rewrite rules dispatch on the tag; the tree
//! machinery itself is kind-agnostic.

use serde::{Deserialize, Serialize};

/// Tag identifying one logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Leaf read from an abstract data source.
    Scan,
    /// Column selection / reordering.
    Project,
    /// Row selection by predicate.
    Filter,
    /// Append (or overwrite) one computed column.
    Assign,
    /// Opaque partition-wise callable.
    MapPartitions,
    /// Global tree reduction down to one partition.
    Reduction,
    /// Groupby aggregation via chunk/combine/finalize stages.
    GroupAggregate,
    /// Hash repartition of rows across a new partition count.
    Shuffle,
    /// Change partition count by merging/splitting contiguous partitions.
    Repartition,
    /// Chain of blockwise operations merged into one composite task.
    Fused,
}

impl OpKind {
    /// Stable lowercase name used in task keys and the printer.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Scan => "scan",
            OpKind::Project => "project",
            OpKind::Filter => "filter",
            OpKind::Assign => "assign",
            OpKind::MapPartitions => "map_partitions",
            OpKind::Reduction => "reduction",
            OpKind::GroupAggregate => "group_aggregate",
            OpKind::Shuffle => "shuffle",
            OpKind::Repartition => "repartition",
            OpKind::Fused => "fused",
        }
    }

    /// Ordered parameter names; operand lists align with these positionally.
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            OpKind::Scan => &["source"],
            OpKind::Project => &["input", "columns"],
            OpKind::Filter => &["input", "predicate"],
            OpKind::Assign => &["input", "name", "expr"],
            OpKind::MapPartitions => &["input", "callable"],
            OpKind::Reduction => &["input", "aggs", "split_every"],
            OpKind::GroupAggregate => &["input", "keys", "aggs", "split_every"],
            OpKind::Shuffle => &["input", "on", "npartitions"],
            OpKind::Repartition => &["input", "npartitions"],
            OpKind::Fused => &["input", "members"],
        }
    }

    /// Partition-local operations: output partition i depends only on input
    /// partition i.
    pub fn is_blockwise(&self) -> bool {
        matches!(
            self,
            OpKind::Project | OpKind::Filter | OpKind::Assign | OpKind::MapPartitions
        )
    }

    /// Whether a node of this kind may be merged with adjacent blockwise
    /// nodes into one composite task.
    pub fn is_fusable(&self) -> bool {
        self.is_blockwise()
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
