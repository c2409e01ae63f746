#![forbid(unsafe_code)]
//! splitframe-frame: the user-facing builder API.
//!
//! A [`Frame`] is a cheap handle onto a shared expression arena plus the id
//! of its current root. Builder methods append nodes and hand back a new
//! handle; nothing executes here. `optimize` runs the rewrite pipeline and
//! `lower` produces the task graph for the external execution engine.

pub mod dsl;

use std::sync::{Arc, Mutex, MutexGuard};

use splitframe_core::{
    AggSpec, CallableRef, Error, ExprArena, ExprId, Result, ScalarExpr, ScanSource, Schema,
};
use splitframe_planner::{lower, optimize, LowerError, OptimizeReport, TaskGraph};

/// Default tree-reduction fan-in for aggregations.
pub const DEFAULT_SPLIT_EVERY: u64 = 8;

/// Deferred dataframe handle.
#[derive(Debug, Clone)]
pub struct Frame {
    arena: Arc<Mutex<ExprArena>>,
    root: ExprId,
}

impl Frame {
    /// Start a new plan from a data source.
    pub fn scan(source: ScanSource) -> Result<Self> {
        let mut arena = ExprArena::new();
        let root = arena.scan(source)?;
        Ok(Self {
            arena: Arc::new(Mutex::new(arena)),
            root,
        })
    }

    pub fn root(&self) -> ExprId {
        self.root
    }

    /// Select a column subset, in the given order.
    pub fn select<S: Into<String>>(&self, columns: Vec<S>) -> Result<Self> {
        let cols = columns.into_iter().map(Into::into).collect();
        let root = self.lock().project(self.root, cols)?;
        Ok(self.at(root))
    }

    /// Keep rows matching a predicate, given in expression syntax
    /// (e.g. `"amount > 10 and region == 'eu'"`).
    pub fn filter(&self, predicate: &str) -> Result<Self> {
        let pred = ScalarExpr::parse(predicate).map_err(Error::Plan)?;
        let root = self.lock().filter(self.root, pred)?;
        Ok(self.at(root))
    }

    /// Add (or overwrite) one computed column.
    pub fn assign(&self, name: &str, expr: &str) -> Result<Self> {
        let expr = ScalarExpr::parse(expr).map_err(Error::Plan)?;
        let root = self.lock().assign(self.root, name, expr)?;
        Ok(self.at(root))
    }

    /// Apply an opaque per-partition callable from the executor's registry.
    pub fn map_partitions(&self, callable: CallableRef) -> Result<Self> {
        let root = self.lock().map_partitions(self.root, callable)?;
        Ok(self.at(root))
    }

    /// Reduce the whole frame to a single partition of aggregates.
    pub fn reduce(&self, aggs: Vec<AggSpec>, split_every: u64) -> Result<Self> {
        let root = self.lock().reduction(self.root, aggs, split_every)?;
        Ok(self.at(root))
    }

    /// Start a groupby aggregation over the given key columns.
    pub fn groupby<S: Into<String>>(&self, keys: Vec<S>) -> GroupBy {
        GroupBy {
            frame: self.clone(),
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Hash-redistribute rows so equal keys land in the same partition.
    pub fn shuffle<S: Into<String>>(&self, on: Vec<S>, npartitions: u64) -> Result<Self> {
        let on = on.into_iter().map(Into::into).collect();
        let root = self.lock().shuffle(self.root, on, npartitions)?;
        Ok(self.at(root))
    }

    /// Change the partition count without changing row content.
    pub fn repartition(&self, npartitions: u64) -> Result<Self> {
        let root = self.lock().repartition(self.root, npartitions)?;
        Ok(self.at(root))
    }

    pub fn schema(&self) -> Schema {
        self.lock().schema(self.root).clone()
    }

    pub fn npartitions(&self) -> Option<usize> {
        self.lock().npartitions(self.root)
    }

    /// Human-readable plan tree for the current root.
    pub fn explain(&self) -> String {
        splitframe_core::tree_repr(&self.lock(), self.root)
    }

    /// Run the full rewrite pipeline, returning the optimized frame and the
    /// per-pass report.
    pub fn optimize(&self) -> (Self, OptimizeReport) {
        let report = optimize(&mut self.lock(), self.root);
        (self.at(report.root), report)
    }

    /// Lower the current plan to its task graph. Callers usually optimize
    /// first; lowering an unoptimized plan is valid, just larger.
    pub fn lower(&self) -> std::result::Result<TaskGraph, LowerError> {
        lower(&self.lock(), self.root)
    }

    fn at(&self, root: ExprId) -> Self {
        Self {
            arena: Arc::clone(&self.arena),
            root,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExprArena> {
        // The arena holds no invariant that a panicked builder call could
        // break mid-update, so a poisoned lock is still usable.
        match self.arena.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Intermediate groupby builder; finish with [`GroupBy::agg`].
#[derive(Debug, Clone)]
pub struct GroupBy {
    frame: Frame,
    keys: Vec<String>,
}

impl GroupBy {
    pub fn agg(self, aggs: Vec<AggSpec>, split_every: u64) -> Result<Frame> {
        let root = self
            .frame
            .lock()
            .group_aggregate(self.frame.root, self.keys, aggs, split_every)?;
        Ok(self.frame.at(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitframe_core::{DataType, Field};

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
    fn builder_chain_tracks_schema_and_partitions() {
        let frame = Frame::scan(events(4)).unwrap();
        let out = frame
            .filter("amount > 10")
            .unwrap()
            .select(vec!["region", "amount"])
            .unwrap();
        assert_eq!(out.schema().names(), vec!["region", "amount"]);
        assert_eq!(out.npartitions(), Some(4));
    }

    #[test]
    fn groupby_produces_single_partition() {
        let frame = Frame::scan(events(4)).unwrap();
        let out = frame
            .groupby(vec!["region"])
            .agg(
                vec![AggSpec::parse("sum:amount").unwrap()],
                DEFAULT_SPLIT_EVERY,
            )
            .unwrap();
        assert_eq!(out.npartitions(), Some(1));
        assert_eq!(out.schema().names(), vec!["region", "sum(amount)"]);
    }

    #[test]
    fn conjunctive_predicates_parse_through_the_builder() {
        let frame = Frame::scan(events(4)).unwrap();
        let out = frame.filter("amount > 10 and region == 'eu'").unwrap();
        assert_eq!(out.schema().names(), vec!["ts", "region", "amount"]);
        assert_eq!(out.npartitions(), Some(4));
    }

    #[test]
    fn bad_predicate_is_a_plan_error() {
        let frame = Frame::scan(events(2)).unwrap();
        assert!(frame.filter("amount >").is_err());
    }

    #[test]
    fn handles_share_one_arena() {
        let frame = Frame::scan(events(2)).unwrap();
        let a = frame.filter("amount > 1").unwrap();
        let b = frame.filter("amount > 1").unwrap();
        assert_eq!(a.root(), b.root());
    }
}
