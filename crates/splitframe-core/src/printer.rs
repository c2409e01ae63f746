//! Textual plan rendering for debugging and snapshot tests.
//!
//! One line per node: kind name plus `param=value` pairs for literal
//! operands, children indented two spaces per level. Pure read-only view;
//! shared subtrees are printed at each occurrence (the structure is acyclic,
//! so there is no cycle risk).

use crate::arena::{ExprArena, ExprId};
use crate::kind::OpKind;
use crate::operand::Operand;

/// Render the tree rooted at `root` as indented text.
pub fn tree_repr(arena: &ExprArena, root: ExprId) -> String {
    let mut lines = Vec::new();
    repr_lines(arena, root, 0, &mut lines);
    lines.join("\n")
}

fn repr_lines(arena: &ExprArena, id: ExprId, indent: usize, lines: &mut Vec<String>) {
    let node = arena.node(id);
    let mut header = format!("{}{}:", "  ".repeat(indent), node.kind.name());

    for (param, operand) in node.kind.parameters().iter().zip(&node.operands) {
        match operand {
            Operand::Node(_) => {}
            Operand::NodeList(ids) => {
                // Fused member summary; the members' own subtrees are the
                // chain itself, rendered via the input child below.
                let kinds: Vec<&str> = ids.iter().map(|m| arena.kind(*m).name()).collect();
                header.push_str(&format!(" {}=[{}]", param, kinds.join(", ")));
            }
            literal => {
                header.push_str(&format!(" {}={}", param, literal_repr(literal)));
            }
        }
    }
    lines.push(header);

    let children: Vec<ExprId> = match node.kind {
        // Fused members reference the same chain that flows into `input`;
        // recursing into both would print the chain twice.
        OpKind::Fused => node
            .operand("input")
            .and_then(Operand::as_node)
            .into_iter()
            .collect(),
        _ => node.children(),
    };
    for child in children {
        repr_lines(arena, child, indent + 1, lines);
    }
}

fn literal_repr(operand: &Operand) -> String {
    match operand {
        Operand::Columns(cols) => format!("{:?}", cols),
        Operand::Expr(e) => e.to_string(),
        Operand::Aggs(aggs) => {
            let parts: Vec<String> = aggs.iter().map(|a| a.to_string()).collect();
            format!("[{}]", parts.join(", "))
        }
        Operand::Str(s) => s.clone(),
        Operand::Num(n) => n.to_string(),
        Operand::Source(s) => {
            let mut out = format!("{}", s.location);
            match s.npartitions {
                Some(n) => out.push_str(&format!(" npartitions={}", n)),
                None => out.push_str(" npartitions=?"),
            }
            if let Some(cols) = &s.columns {
                out.push_str(&format!(" columns={:?}", cols));
            }
            if let Some(pred) = &s.predicate {
                out.push_str(&format!(" predicate={}", pred));
            }
            out
        }
        Operand::Callable(c) => c.key.clone(),
        Operand::Node(_) | Operand::NodeList(_) => unreachable!("handled by caller"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::ScanSource;
    use crate::scalar::ScalarExpr;
    use crate::schema::{DataType, Field, Schema};

    #[test]
    fn indents_children_two_spaces() {
        let mut arena = ExprArena::new();
        let s = arena
            .scan(ScanSource::new(
                "mem://t",
                Schema::new(vec![Field::new("a", DataType::Int64, false)]),
                Some(2),
            ))
            .unwrap();
        let f = arena
            .filter(s, ScalarExpr::parse("a > 1").unwrap())
            .unwrap();
        let p = arena.project(f, vec!["a".into()]).unwrap();

        let repr = tree_repr(&arena, p);
        let lines: Vec<&str> = repr.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("project:"));
        assert!(lines[1].starts_with("  filter:"));
        assert!(lines[2].starts_with("    scan:"));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let mut arena = ExprArena::new();
        let s = arena
            .scan(ScanSource::new(
                "mem://t",
                Schema::new(vec![Field::new("a", DataType::Int64, false)]),
                Some(2),
            ))
            .unwrap();
        let p = arena.project(s, vec!["a".into()]).unwrap();
        assert_eq!(tree_repr(&arena, p), tree_repr(&arena, p));
    }
}
