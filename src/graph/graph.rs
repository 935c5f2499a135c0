// src/graph/graph.rs

//! Directed acyclic graph over tasks.
//!
//! Node weights are task ids; tasks themselves live in a side map so that
//! status updates never touch the graph structure. Every edge insertion is
//! provisionally applied, checked with a topological sort, and rolled back
//! on cycle, leaving the graph identical to its pre-call state.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TaskloomError};
use crate::types::{DocRef, TaskId};

use super::task::{Task, TaskStatus};

/// Edge type in the DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Sequential dependency: the target runs only after the source
    /// completes. Gates readiness.
    #[default]
    Dependency,
    /// Parallel branch marker from a fork point. Never gates readiness;
    /// sibling targets become ready independently once their own
    /// dependencies are satisfied.
    Fork,
}

#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<TaskId, EdgeKind>,
    tasks: HashMap<TaskId, Task>,
    indices: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            tasks: HashMap::new(),
            indices: HashMap::new(),
        }
    }

    /// Add a task to the graph.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(TaskloomError::AlreadyExists(format!("task {}", task.id)));
        }

        let idx = self.graph.add_node(task.id.clone());
        self.indices.insert(task.id.clone(), idx);
        self.tasks.insert(task.id.clone(), task);

        Ok(())
    }

    /// Add a dependency: `to` runs only after `from` completes.
    ///
    /// The edge is inserted provisionally and validated with a topological
    /// sort; on cycle it is removed again and `CycleDetected` is returned,
    /// leaving the graph unchanged.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<()> {
        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;

        let edge = self.graph.add_edge(from_idx, to_idx, EdgeKind::Dependency);

        if let Err(cycle) = toposort(&self.graph, None) {
            let involved = self
                .graph
                .node_weight(cycle.node_id())
                .cloned()
                .unwrap_or_default();
            self.graph.remove_edge(edge);
            return Err(TaskloomError::CycleDetected(format!(
                "adding dependency {from} -> {to} would close a cycle through '{involved}'"
            )));
        }

        Ok(())
    }

    /// Fork: mark `targets` as parallel branches of `source`.
    ///
    /// Atomic: if any target is unknown or the fork edges would close a
    /// cycle, no edges are added at all.
    pub fn fork(&mut self, source: &str, targets: &[&str]) -> Result<()> {
        let source_idx = self.index_of(source)?;

        let mut target_indices = Vec::with_capacity(targets.len());
        for target in targets {
            target_indices.push(self.index_of(target)?);
        }

        let mut added = Vec::with_capacity(targets.len());
        for target_idx in target_indices {
            added.push(self.graph.add_edge(source_idx, target_idx, EdgeKind::Fork));
        }

        if toposort(&self.graph, None).is_err() {
            // Remove in reverse insertion order; each is the last edge at
            // removal time, so the remaining indices stay valid.
            for edge in added.into_iter().rev() {
                self.graph.remove_edge(edge);
            }
            return Err(TaskloomError::CycleDetected(format!(
                "fork from '{source}' would close a cycle"
            )));
        }

        Ok(())
    }

    /// Tasks that are ready to execute: `Pending`, with every
    /// `Dependency`-edge predecessor `Completed`. Fork edges are ignored.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|task| task.is_pending() && self.deps_satisfied(&task.id))
            .collect()
    }

    fn deps_satisfied(&self, task_id: &str) -> bool {
        let Some(&idx) = self.indices.get(task_id) else {
            return false;
        };

        self.graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|edge| *edge.weight() == EdgeKind::Dependency)
            .all(|edge| {
                self.graph
                    .node_weight(edge.source())
                    .and_then(|id| self.tasks.get(id))
                    .map(|t| t.is_completed())
                    .unwrap_or(false)
            })
    }

    /// Topologically sorted execution order.
    ///
    /// Insertion already guards against cycles; this re-validates for
    /// defense in depth.
    pub fn execution_order(&self) -> Result<Vec<TaskId>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let involved = self
                .graph
                .node_weight(cycle.node_id())
                .cloned()
                .unwrap_or_default();
            TaskloomError::CycleDetected(format!("cycle through '{involved}'"))
        })?;

        Ok(sorted
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect())
    }

    /// Mark a task completed, possibly unblocking dependents on the next
    /// `ready_tasks` call.
    pub fn mark_completed(&mut self, task_id: &str, result_doc: Option<DocRef>) -> Result<()> {
        let task = self.task_mut_checked(task_id)?;
        task.complete(result_doc);
        Ok(())
    }

    /// Mark a task failed. Its dependents can never become ready.
    pub fn mark_failed(&mut self, task_id: &str, reason: impl Into<String>) -> Result<()> {
        let task = self.task_mut_checked(task_id)?;
        task.fail(reason);
        Ok(())
    }

    fn task_mut_checked(&mut self, task_id: &str) -> Result<&mut Task> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskloomError::NotFound(format!("task {task_id}")))?;

        if task.is_done() {
            return Err(TaskloomError::InvalidTransition(format!(
                "task {task_id} is already terminal ({:?})",
                task.status
            )));
        }

        Ok(task)
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub(crate) fn get_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(task_id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Ids of `Dependency`-edge predecessors of a task.
    pub fn dependencies_of(&self, task_id: &str) -> Vec<TaskId> {
        self.edge_neighbors(task_id, Direction::Incoming, EdgeKind::Dependency)
    }

    /// Ids of `Dependency`-edge successors of a task.
    pub fn dependents_of(&self, task_id: &str) -> Vec<TaskId> {
        self.edge_neighbors(task_id, Direction::Outgoing, EdgeKind::Dependency)
    }

    /// Ids of parallel branches forked from `source`.
    pub fn fork_targets(&self, source: &str) -> Vec<TaskId> {
        self.edge_neighbors(source, Direction::Outgoing, EdgeKind::Fork)
    }

    fn edge_neighbors(&self, task_id: &str, dir: Direction, kind: EdgeKind) -> Vec<TaskId> {
        let Some(&idx) = self.indices.get(task_id) else {
            return vec![];
        };

        self.graph
            .edges_directed(idx, dir)
            .filter(|edge| *edge.weight() == kind)
            .filter_map(|edge| {
                let other = match dir {
                    Direction::Incoming => edge.source(),
                    Direction::Outgoing => edge.target(),
                };
                self.graph.node_weight(other).cloned()
            })
            .collect()
    }

    /// Edge kind between two tasks, if an edge exists.
    pub fn edge_kind(&self, from: &str, to: &str) -> Option<EdgeKind> {
        let from_idx = self.indices.get(from)?;
        let to_idx = self.indices.get(to)?;

        self.graph
            .find_edge(*from_idx, *to_idx)
            .and_then(|edge| self.graph.edge_weight(edge).copied())
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// True when every task is terminal.
    pub fn is_complete(&self) -> bool {
        self.tasks.values().all(|t| t.is_done())
    }

    pub fn stats(&self) -> GraphStats {
        let total = self.tasks.len();
        let completed = self.tasks.values().filter(|t| t.is_completed()).count();
        let failed = self.tasks.values().filter(|t| t.is_failed()).count();
        let pending = self.tasks.values().filter(|t| t.is_pending()).count();
        let in_progress = self.tasks.values().filter(|t| t.is_in_progress()).count();

        GraphStats {
            total,
            pending,
            in_progress,
            completed,
            failed,
        }
    }

    fn index_of(&self, task_id: &str) -> Result<NodeIndex> {
        self.indices
            .get(task_id)
            .copied()
            .ok_or_else(|| TaskloomError::NotFound(format!("task {task_id}")))
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TaskloomError;

    fn graph_abc() -> TaskGraph {
        let mut graph = TaskGraph::new();
        graph.add_task(Task::new("A", "").with_id("a")).unwrap();
        graph.add_task(Task::new("B", "").with_id("b")).unwrap();
        graph.add_task(Task::new("C", "").with_id("c")).unwrap();
        graph
    }

    #[test]
    fn duplicate_task_rejected() {
        let mut graph = graph_abc();
        let err = graph.add_task(Task::new("A again", "").with_id("a"));
        assert!(matches!(err, Err(TaskloomError::AlreadyExists(_))));
    }

    #[test]
    fn chain_readiness() {
        let mut graph = graph_abc();
        graph.add_dependency("a", "b").unwrap();
        graph.add_dependency("b", "c").unwrap();

        let ready: Vec<_> = graph.ready_tasks().iter().map(|t| t.id.clone()).collect();
        assert_eq!(ready, vec!["a"]);

        graph.mark_completed("a", None).unwrap();
        let ready: Vec<_> = graph.ready_tasks().iter().map(|t| t.id.clone()).collect();
        assert_eq!(ready, vec!["b"]);
    }

    #[test]
    fn cycle_rolls_back_edge() {
        let mut graph = graph_abc();
        graph.add_dependency("a", "b").unwrap();
        let edges_before = graph.edge_count();

        let err = graph.add_dependency("b", "a");
        assert!(matches!(err, Err(TaskloomError::CycleDetected(_))));
        assert_eq!(graph.edge_count(), edges_before);

        // The surviving edge still behaves.
        assert_eq!(graph.edge_kind("a", "b"), Some(EdgeKind::Dependency));
        assert_eq!(graph.execution_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut graph = graph_abc();
        assert!(matches!(
            graph.add_dependency("a", "a"),
            Err(TaskloomError::CycleDetected(_))
        ));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn fork_is_atomic_on_unknown_target() {
        let mut graph = graph_abc();
        let err = graph.fork("a", &["b", "missing"]);
        assert!(matches!(err, Err(TaskloomError::NotFound(_))));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn fork_edges_do_not_gate_readiness() {
        let mut graph = graph_abc();
        graph.fork("a", &["b", "c"]).unwrap();

        // All three are ready: fork edges are markers, not dependencies.
        assert_eq!(graph.ready_tasks().len(), 3);
        assert_eq!(graph.fork_targets("a").len(), 2);
        assert_eq!(graph.edge_kind("a", "b"), Some(EdgeKind::Fork));
    }

    #[test]
    fn terminal_marks_are_final() {
        let mut graph = graph_abc();
        graph.mark_completed("a", None).unwrap();
        assert!(matches!(
            graph.mark_failed("a", "late"),
            Err(TaskloomError::InvalidTransition(_))
        ));
        assert!(matches!(
            graph.mark_completed("missing", None),
            Err(TaskloomError::NotFound(_))
        ));
    }

    #[test]
    fn failed_dependency_blocks_dependents() {
        let mut graph = graph_abc();
        graph.add_dependency("a", "b").unwrap();
        graph.mark_failed("a", "broken").unwrap();

        assert!(graph.ready_tasks().is_empty());
        assert!(!graph.is_complete());

        let stats = graph.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 2);
    }
}
