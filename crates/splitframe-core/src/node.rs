//! Expression nodes and their construction contract.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kind::OpKind;
use crate::operand::Operand;

/// Immutable record of one logical operation.
///
/// `operands` aligns positionally with `kind.parameters()`; the arena
/// enforces the contract at construction and nodes are never mutated after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprNode {
    pub kind: OpKind,
    pub operands: Vec<Operand>,
}

impl ExprNode {
    /// Validate arity and operand types against the kind's parameter
    /// contract. Fails immediately; errors are never deferred to rewrite or
    /// lowering time.
    pub fn validated(kind: OpKind, operands: Vec<Operand>) -> Result<Self> {
        let params = kind.parameters();
        if operands.len() != params.len() {
            return Err(Error::Construct {
                kind: kind.name(),
                detail: format!(
                    "expected {} operands {:?}, got {}",
                    params.len(),
                    params,
                    operands.len()
                ),
            });
        }
        for (param, operand) in params.iter().zip(&operands) {
            check_slot(kind, param, operand)?;
        }
        Ok(Self { kind, operands })
    }

    /// Operand for a named parameter slot.
    pub fn operand(&self, name: &str) -> Option<&Operand> {
        let idx = self.kind.parameters().iter().position(|p| *p == name)?;
        self.operands.get(idx)
    }

    /// Child node references, in operand order. `NodeList` members count.
    pub fn children(&self) -> Vec<crate::ExprId> {
        let mut out = Vec::new();
        for op in &self.operands {
            match op {
                Operand::Node(id) => out.push(*id),
                Operand::NodeList(ids) => out.extend(ids.iter().copied()),
                _ => {}
            }
        }
        out
    }
}

fn check_slot(kind: OpKind, param: &str, operand: &Operand) -> Result<()> {
    let ok = match (kind, param) {
        (OpKind::Scan, "source") => matches!(operand, Operand::Source(_)),
        (_, "input") => matches!(operand, Operand::Node(_)),
        (OpKind::Project, "columns") => matches!(operand, Operand::Columns(_)),
        (OpKind::Filter, "predicate") => matches!(operand, Operand::Expr(_)),
        (OpKind::Assign, "name") => matches!(operand, Operand::Str(_)),
        (OpKind::Assign, "expr") => matches!(operand, Operand::Expr(_)),
        (OpKind::MapPartitions, "callable") => matches!(operand, Operand::Callable(_)),
        (OpKind::Reduction, "aggs") | (OpKind::GroupAggregate, "aggs") => {
            matches!(operand, Operand::Aggs(a) if !a.is_empty())
        }
        (OpKind::GroupAggregate, "keys") => {
            matches!(operand, Operand::Columns(c) if !c.is_empty())
        }
        (OpKind::Shuffle, "on") => matches!(operand, Operand::Columns(c) if !c.is_empty()),
        (OpKind::Reduction, "split_every") | (OpKind::GroupAggregate, "split_every") => {
            matches!(operand, Operand::Num(n) if *n >= 2)
        }
        (OpKind::Shuffle, "npartitions") | (OpKind::Repartition, "npartitions") => {
            matches!(operand, Operand::Num(n) if *n >= 1)
        }
        (OpKind::Fused, "members") => {
            matches!(operand, Operand::NodeList(ids) if !ids.is_empty())
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::Construct {
            kind: kind.name(),
            detail: format!(
                "operand for parameter '{}' has invalid type/value '{}'",
                param,
                operand.tag()
            ),
        })
    }
}
