//! Arena-allocated expression trees with structural deduplication.
//!
//! Nodes are immutable once constructed and referenced by stable `ExprId`
//! handles, so multiple parents can share a child without ownership
//! ambiguity. Insertion canonicalizes: two structurally identical subtrees
//! resolve to the same `ExprId`, keyed by the blake3 structural token.
//!
//! Derived properties (output schema, partition count, token) are computed
//! when a node is inserted; children always precede parents and nodes never
//! change, so the caches never invalidate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::{hash_serde, Token};
use crate::kind::OpKind;
use crate::node::ExprNode;
use crate::operand::{AggSpec, CallableRef, Operand, ScanSource};
use crate::scalar::ScalarExpr;
use crate::schema::{Field, Schema};

/// Stable handle to a node within one arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ExprId(pub u32);

impl std::fmt::Display for ExprId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Per-session node store. Created per plan-building/optimize session and
/// discarded after lowering; it is the only piece of shared state, and
/// callers that share one across threads must synchronize it externally.
#[derive(Debug, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
    tokens: Vec<Token>,
    schemas: Vec<Schema>,
    npartitions: Vec<Option<usize>>,
    /// Structural token → canonical node.
    dedup: HashMap<Token, ExprId>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a node, validating its operand contract and deduplicating by
    /// structural identity. Returns the canonical id.
    pub fn push(&mut self, kind: OpKind, operands: Vec<Operand>) -> Result<ExprId> {
        let node = ExprNode::validated(kind, operands)?;
        for child in node.children() {
            if child.0 as usize >= self.nodes.len() {
                return Err(Error::Invariant(format!(
                    "operand {} of `{}` references a node outside this arena",
                    child,
                    kind.name()
                )));
            }
        }
        let token = self.node_token(&node)?;
        if let Some(existing) = self.dedup.get(&token) {
            return Ok(*existing);
        }
        let schema = self
            .derive_schema(&node)
            .map_err(|e| e.with_context(format!("constructing `{}`", node.kind.name())))?;
        let nparts = self.derive_npartitions(&node);
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.tokens.push(token);
        self.schemas.push(schema);
        self.npartitions.push(nparts);
        self.dedup.insert(token, id);
        Ok(id)
    }

    pub fn node(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: ExprId) -> OpKind {
        self.node(id).kind
    }

    pub fn operands(&self, id: ExprId) -> &[Operand] {
        &self.node(id).operands
    }

    /// Operand for a named parameter slot.
    pub fn operand(&self, id: ExprId, name: &str) -> Option<&Operand> {
        self.node(id).operand(name)
    }

    /// First child node, for unary operations.
    pub fn input_of(&self, id: ExprId) -> Option<ExprId> {
        self.operand(id, "input").and_then(Operand::as_node)
    }

    pub fn children(&self, id: ExprId) -> Vec<ExprId> {
        self.node(id).children()
    }

    /// Output schema of a node.
    pub fn schema(&self, id: ExprId) -> &Schema {
        &self.schemas[id.0 as usize]
    }

    /// Estimated output partition count; `None` when unknown.
    pub fn npartitions(&self, id: ExprId) -> Option<usize> {
        self.npartitions[id.0 as usize]
    }

    /// Structural identity token.
    pub fn token(&self, id: ExprId) -> Token {
        self.tokens[id.0 as usize]
    }

    /// Stable task-key base name: "kind-shorttoken".
    pub fn key_name(&self, id: ExprId) -> String {
        format!("{}-{}", self.kind(id).name(), self.token(id).short())
    }

    /// Depth of the tree rooted at `id` (leaf = 1).
    pub fn depth(&self, id: ExprId) -> usize {
        let children = self.children(id);
        1 + children
            .iter()
            .map(|c| self.depth(*c))
            .max()
            .unwrap_or(0)
    }

    /// Every node reachable from `root`, depth-first, each visited once.
    pub fn walk(&self, root: ExprId) -> Vec<ExprId> {
        let mut stack = vec![root];
        let mut seen: Vec<bool> = vec![false; self.nodes.len()];
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            if seen[id.0 as usize] {
                continue;
            }
            seen[id.0 as usize] = true;
            out.push(id);
            for child in self.children(id) {
                stack.push(child);
            }
        }
        out
    }

    /// Parents of every node reachable from `root`. Deduplicated and sorted
    /// so rule application order is deterministic for shared subexpressions.
    pub fn dependents(&self, root: ExprId) -> HashMap<ExprId, Vec<ExprId>> {
        let mut out: HashMap<ExprId, Vec<ExprId>> = HashMap::new();
        for id in self.walk(root) {
            for child in self.children(id) {
                let entry = out.entry(child).or_default();
                if !entry.contains(&id) {
                    entry.push(id);
                }
            }
        }
        for parents in out.values_mut() {
            parents.sort();
        }
        out
    }

    /// Rebuild a node with one child operand substituted.
    pub fn with_input(&mut self, id: ExprId, new_input: ExprId) -> Result<ExprId> {
        let node = self.node(id).clone();
        let params = node.kind.parameters();
        let mut operands = node.operands;
        let mut replaced = false;
        for (param, op) in params.iter().zip(operands.iter_mut()) {
            if *param == "input" {
                *op = Operand::Node(new_input);
                replaced = true;
            }
        }
        if !replaced {
            return Err(Error::Invariant(format!(
                "`{}` has no input operand to substitute",
                node.kind.name()
            )));
        }
        self.push(node.kind, operands)
    }

    // --- convenience constructors, one per operation kind ---

    pub fn scan(&mut self, source: ScanSource) -> Result<ExprId> {
        self.push(OpKind::Scan, vec![Operand::Source(source)])
    }

    pub fn project(&mut self, input: ExprId, columns: Vec<String>) -> Result<ExprId> {
        self.push(
            OpKind::Project,
            vec![Operand::Node(input), Operand::Columns(columns)],
        )
    }

    pub fn filter(&mut self, input: ExprId, predicate: ScalarExpr) -> Result<ExprId> {
        self.push(
            OpKind::Filter,
            vec![Operand::Node(input), Operand::Expr(predicate)],
        )
    }

    pub fn assign(
        &mut self,
        input: ExprId,
        name: impl Into<String>,
        expr: ScalarExpr,
    ) -> Result<ExprId> {
        self.push(
            OpKind::Assign,
            vec![
                Operand::Node(input),
                Operand::Str(name.into()),
                Operand::Expr(expr),
            ],
        )
    }

    pub fn map_partitions(&mut self, input: ExprId, callable: CallableRef) -> Result<ExprId> {
        self.push(
            OpKind::MapPartitions,
            vec![Operand::Node(input), Operand::Callable(callable)],
        )
    }

    pub fn reduction(
        &mut self,
        input: ExprId,
        aggs: Vec<AggSpec>,
        split_every: u64,
    ) -> Result<ExprId> {
        self.push(
            OpKind::Reduction,
            vec![
                Operand::Node(input),
                Operand::Aggs(aggs),
                Operand::Num(split_every),
            ],
        )
    }

    pub fn group_aggregate(
        &mut self,
        input: ExprId,
        keys: Vec<String>,
        aggs: Vec<AggSpec>,
        split_every: u64,
    ) -> Result<ExprId> {
        self.push(
            OpKind::GroupAggregate,
            vec![
                Operand::Node(input),
                Operand::Columns(keys),
                Operand::Aggs(aggs),
                Operand::Num(split_every),
            ],
        )
    }

    pub fn shuffle(&mut self, input: ExprId, on: Vec<String>, npartitions: u64) -> Result<ExprId> {
        self.push(
            OpKind::Shuffle,
            vec![
                Operand::Node(input),
                Operand::Columns(on),
                Operand::Num(npartitions),
            ],
        )
    }

    pub fn repartition(&mut self, input: ExprId, npartitions: u64) -> Result<ExprId> {
        self.push(
            OpKind::Repartition,
            vec![Operand::Node(input), Operand::Num(npartitions)],
        )
    }

    /// `members` lists the fused chain outermost-first; the innermost
    /// member's input must be `input`.
    pub fn fused(&mut self, input: ExprId, members: Vec<ExprId>) -> Result<ExprId> {
        self.push(
            OpKind::Fused,
            vec![Operand::Node(input), Operand::NodeList(members)],
        )
    }

    // --- derived properties ---

    fn node_token(&self, node: &ExprNode) -> Result<Token> {
        // Child operands contribute their structural tokens, so the
        // fingerprint is independent of arena id assignment.
        let mut parts: Vec<serde_json::Value> = Vec::with_capacity(node.operands.len());
        for op in &node.operands {
            let v = match op {
                Operand::Node(id) => {
                    serde_json::json!({ "node": self.token(*id).to_hex() })
                }
                Operand::NodeList(ids) => {
                    let hexes: Vec<String> =
                        ids.iter().map(|id| self.token(*id).to_hex()).collect();
                    serde_json::json!({ "nodes": hexes })
                }
                literal => serde_json::to_value(literal)?,
            };
            parts.push(v);
        }
        hash_serde(&(node.kind.name(), parts))
    }

    fn derive_schema(&self, node: &ExprNode) -> Result<Schema> {
        let input_schema = |node: &ExprNode| -> Result<Schema> {
            let input = node
                .operand("input")
                .and_then(Operand::as_node)
                .ok_or_else(|| Error::Invariant("missing input operand".into()))?;
            Ok(self.schema(input).clone())
        };
        match node.kind {
            OpKind::Scan => {
                let source = node
                    .operand("source")
                    .and_then(Operand::as_source)
                    .ok_or_else(|| Error::Invariant("scan without source".into()))?;
                let out = source.output_schema()?;
                if let Some(pred) = &source.predicate {
                    check_columns(&source.schema, pred.columns().iter(), "scan predicate")?;
                }
                Ok(out)
            }
            OpKind::Project => {
                let input = input_schema(node)?;
                let cols = node
                    .operand("columns")
                    .and_then(Operand::as_columns)
                    .ok_or_else(|| Error::Invariant("project without columns".into()))?;
                input.project(cols)
            }
            OpKind::Filter => {
                let input = input_schema(node)?;
                let pred = node
                    .operand("predicate")
                    .and_then(Operand::as_expr)
                    .ok_or_else(|| Error::Invariant("filter without predicate".into()))?;
                check_columns(&input, pred.columns().iter(), "filter predicate")?;
                Ok(input)
            }
            OpKind::Assign => {
                let mut input = input_schema(node)?;
                let name = node
                    .operand("name")
                    .and_then(Operand::as_str)
                    .ok_or_else(|| Error::Invariant("assign without name".into()))?;
                let expr = node
                    .operand("expr")
                    .and_then(Operand::as_expr)
                    .ok_or_else(|| Error::Invariant("assign without expr".into()))?;
                let data_type = expr.infer_type(&input).map_err(Error::Schema)?;
                match input.index_of(name) {
                    Some(idx) => input.fields[idx] = Field::new(name, data_type, true),
                    None => input.fields.push(Field::new(name, data_type, true)),
                }
                Ok(input)
            }
            OpKind::MapPartitions => {
                let input = input_schema(node)?;
                let callable = node
                    .operand("callable")
                    .and_then(Operand::as_callable)
                    .ok_or_else(|| Error::Invariant("map_partitions without callable".into()))?;
                Ok(callable.schema.clone().unwrap_or(input))
            }
            OpKind::Reduction => {
                let input = input_schema(node)?;
                let aggs = node
                    .operand("aggs")
                    .and_then(Operand::as_aggs)
                    .ok_or_else(|| Error::Invariant("reduction without aggs".into()))?;
                let mut fields = Vec::with_capacity(aggs.len());
                for agg in aggs {
                    fields.push(agg.output_field(&input).map_err(Error::Schema)?);
                }
                Ok(Schema::new(fields))
            }
            OpKind::GroupAggregate => {
                let input = input_schema(node)?;
                let keys = node
                    .operand("keys")
                    .and_then(Operand::as_columns)
                    .ok_or_else(|| Error::Invariant("group_aggregate without keys".into()))?;
                let aggs = node
                    .operand("aggs")
                    .and_then(Operand::as_aggs)
                    .ok_or_else(|| Error::Invariant("group_aggregate without aggs".into()))?;
                let mut out = input.project(keys)?;
                for agg in aggs {
                    out.fields
                        .push(agg.output_field(&input).map_err(Error::Schema)?);
                }
                Ok(out)
            }
            OpKind::Shuffle => {
                let input = input_schema(node)?;
                let on = node
                    .operand("on")
                    .and_then(Operand::as_columns)
                    .ok_or_else(|| Error::Invariant("shuffle without keys".into()))?;
                check_columns(&input, on.iter(), "shuffle keys")?;
                Ok(input)
            }
            OpKind::Repartition => input_schema(node),
            OpKind::Fused => {
                let members = match node.operand("members") {
                    Some(Operand::NodeList(ids)) => ids,
                    _ => return Err(Error::Invariant("fused without members".into())),
                };
                Ok(self.schema(members[0]).clone())
            }
        }
    }

    fn derive_npartitions(&self, node: &ExprNode) -> Option<usize> {
        let input_nparts = || {
            node.operand("input")
                .and_then(Operand::as_node)
                .and_then(|id| self.npartitions(id))
        };
        match node.kind {
            OpKind::Scan => node
                .operand("source")
                .and_then(Operand::as_source)
                .and_then(|s| s.npartitions),
            OpKind::Project | OpKind::Filter | OpKind::Assign | OpKind::MapPartitions => {
                input_nparts()
            }
            OpKind::Reduction | OpKind::GroupAggregate => Some(1),
            OpKind::Shuffle | OpKind::Repartition => node
                .operand("npartitions")
                .and_then(Operand::as_num)
                .map(|n| n as usize),
            OpKind::Fused => {
                let members = match node.operand("members") {
                    Some(Operand::NodeList(ids)) => ids,
                    _ => return None,
                };
                self.npartitions(members[0])
            }
        }
    }
}

fn check_columns<'a>(
    schema: &Schema,
    mut names: impl Iterator<Item = &'a String>,
    what: &str,
) -> Result<()> {
    if let Some(missing) = names.find(|n| !schema.contains(n)) {
        return Err(Error::Schema(format!(
            "{} references unknown column '{}'; available: {:?}",
            what,
            missing,
            schema.names()
        )));
    }
    Ok(())
}
