//! The lowered task graph: keyed per-partition tasks with explicit
//! dependencies, handed off to an external execution engine.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Globally unique task identity: operation key-name plus partition index.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TaskKey {
    pub name: String,
    pub index: u32,
}

impl TaskKey {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.name, self.index)
    }
}

/// What a task runs: an operator key the executor resolves, plus the
/// operator's configuration. Inputs arrive as the dependency outputs in
/// `deps` order, so no payload data appears here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorBinding {
    pub key: String,
    pub config: serde_json::Value,
}

impl OperatorBinding {
    pub fn new(key: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            config,
        }
    }
}

/// One unit of work over one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub key: TaskKey,
    pub binding: OperatorBinding,
    pub deps: Vec<TaskKey>,
}

/// Dependency-ordered task list plus the keys producing the final result
/// partitions, in partition order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub tasks: Vec<Task>,
    pub outputs: Vec<TaskKey>,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate task key {0}")]
    DuplicateKey(TaskKey),
    #[error("task {task} depends on {dep}, which is not defined before it")]
    ForwardDep { task: TaskKey, dep: TaskKey },
    #[error("output {0} names no task")]
    UnknownOutput(TaskKey),
}

impl TaskGraph {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, key: &TaskKey) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.key == key)
    }

    /// Check well-formedness: keys unique, every dependency defined earlier
    /// in the list (which proves acyclicity), outputs resolvable.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen: BTreeSet<&TaskKey> = BTreeSet::new();
        for task in &self.tasks {
            for dep in &task.deps {
                if !seen.contains(dep) {
                    return Err(GraphError::ForwardDep {
                        task: task.key.clone(),
                        dep: dep.clone(),
                    });
                }
            }
            if !seen.insert(&task.key) {
                return Err(GraphError::DuplicateKey(task.key.clone()));
            }
        }
        for out in &self.outputs {
            if !seen.contains(out) {
                return Err(GraphError::UnknownOutput(out.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, index: u32, deps: Vec<TaskKey>) -> Task {
        Task {
            key: TaskKey::new(name, index),
            binding: OperatorBinding::new("noop", serde_json::json!({})),
            deps,
        }
    }

    #[test]
    fn validate_accepts_dependency_order() {
        let graph = TaskGraph {
            tasks: vec![
                task("scan", 0, vec![]),
                task("filter", 0, vec![TaskKey::new("scan", 0)]),
            ],
            outputs: vec![TaskKey::new("filter", 0)],
        };
        graph.validate().unwrap();
    }

    #[test]
    fn validate_rejects_forward_dependency() {
        let graph = TaskGraph {
            tasks: vec![task("filter", 0, vec![TaskKey::new("scan", 0)])],
            outputs: vec![],
        };
        assert!(matches!(
            graph.validate(),
            Err(GraphError::ForwardDep { .. })
        ));
    }

    #[test]
    fn validate_rejects_unknown_output() {
        let graph = TaskGraph {
            tasks: vec![task("scan", 0, vec![])],
            outputs: vec![TaskKey::new("missing", 0)],
        };
        assert!(matches!(graph.validate(), Err(GraphError::UnknownOutput(_))));
    }
}
