// src/plan/mod.rs

//! Declarative execution plans.
//!
//! A plan describes tasks, dependency/fork edges and fork-point context
//! design as plain serde-friendly specs (the planning agent emits them as
//! JSON). [`ExecutionPlan::materialize`] validates the plan and builds the
//! live structures: a [`TaskGraph`], a [`ContextTree`] with one branch per
//! fork branch task, and the join/branch-ownership registries the scheduler
//! core needs to keep graph and tree in lockstep.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::context::ContextTree;
use crate::errors::{Result, TaskloomError};
use crate::graph::{EdgeKind, Task, TaskGraph, TaskKind};
use crate::types::{AbandonedBranchPolicy, DocRef, NodeId, TaskId};

/// Task specification from planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub subject: String,
    pub description: String,
    /// When set, this task is a context-fill task whose result document is
    /// appended to the context node of the named fork-branch task.
    #[serde(default)]
    pub fills_context_of: Option<TaskId>,
}

/// Edge specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: TaskId,
    pub to: TaskId,
    #[serde(default)]
    pub kind: EdgeKind,
}

/// Configuration of one fork point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkSpec {
    /// Task whose completion the branches are sequenced after.
    pub trigger: TaskId,
    /// Branch tasks; each gets its own context node `ctx-<task id>`.
    pub branches: Vec<TaskId>,
    /// Shared document attached once to the whole sibling set.
    #[serde(default)]
    pub cached_prefix: Option<DocRef>,
    /// Whether settled branches are merged back into the fork's source
    /// context node instead of completing in place.
    #[serde(default)]
    pub merge_into_source: bool,
}

/// Complete execution plan: workflow DAG plus context-tree design.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub tasks: Vec<TaskSpec>,
    pub edges: Vec<EdgeSpec>,
    pub forks: Vec<ForkSpec>,
    /// Documents every task inherits via the context root.
    #[serde(default)]
    pub root_docs: Vec<DocRef>,
}

/// Live structures built from a validated plan.
#[derive(Debug)]
pub struct Materialized {
    pub graph: TaskGraph,
    pub tree: ContextTree,
    /// Join task -> branch point whose completion it must confirm.
    pub joins: HashMap<TaskId, String>,
    /// Fork-branch task -> context node it owns (and settles on finish).
    pub branch_owner: HashMap<TaskId, NodeId>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate plan consistency without building anything.
    pub fn validate(&self) -> Result<()> {
        let mut task_ids = std::collections::HashSet::new();
        for task in &self.tasks {
            if !task_ids.insert(task.id.as_str()) {
                return Err(TaskloomError::AlreadyExists(format!(
                    "plan task {}",
                    task.id
                )));
            }
        }

        for edge in &self.edges {
            for id in [&edge.from, &edge.to] {
                if !task_ids.contains(id.as_str()) {
                    return Err(TaskloomError::NotFound(format!(
                        "edge references unknown task {id}"
                    )));
                }
            }
        }

        let branch_ids: std::collections::HashSet<&str> = self
            .forks
            .iter()
            .flat_map(|f| f.branches.iter().map(|b| b.as_str()))
            .collect();

        for fork in &self.forks {
            if !task_ids.contains(fork.trigger.as_str()) {
                return Err(TaskloomError::NotFound(format!(
                    "fork references unknown trigger task {}",
                    fork.trigger
                )));
            }
            for branch in &fork.branches {
                if !task_ids.contains(branch.as_str()) {
                    return Err(TaskloomError::NotFound(format!(
                        "fork references unknown branch task {branch}"
                    )));
                }
            }
        }

        for task in &self.tasks {
            if let Some(target) = &task.fills_context_of {
                if !branch_ids.contains(target.as_str()) {
                    return Err(TaskloomError::NotFound(format!(
                        "task {} fills context of '{target}', which is not a fork branch",
                        task.id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Validate and build the live graph, tree and registries.
    pub fn materialize(&self, policy: AbandonedBranchPolicy) -> Result<Materialized> {
        self.validate()?;

        let mut graph = TaskGraph::new();
        let mut tree = ContextTree::with_abandoned_policy(policy);

        let root_id = tree.init_root(self.root_docs.clone())?.node_id.clone();

        for spec in &self.tasks {
            let mut task = Task::new(&spec.subject, &spec.description)
                .with_id(&spec.id)
                .with_context_ref(&root_id);
            if let Some(target) = &spec.fills_context_of {
                task.kind = TaskKind::ContextFill {
                    target_node: format!("ctx-{target}"),
                };
            }
            graph.add_task(task)?;
        }

        for edge in &self.edges {
            match edge.kind {
                EdgeKind::Dependency => graph.add_dependency(&edge.from, &edge.to)?,
                EdgeKind::Fork => graph.fork(&edge.from, &[edge.to.as_str()])?,
            }
        }

        // Context node each task reads from; starts at the root and is
        // refined fork by fork so nested forks branch from their trigger's
        // own node.
        let mut bound_node: HashMap<TaskId, NodeId> = HashMap::new();
        let mut joins = HashMap::new();
        let mut branch_owner = HashMap::new();

        for fork in &self.forks {
            let source_node = bound_node
                .get(&fork.trigger)
                .cloned()
                .unwrap_or_else(|| root_id.clone());

            let ids: Vec<&str> = fork.branches.iter().map(|b| b.as_str()).collect();
            let bp = tree.branch_with_ids(&source_node, &ids, fork.cached_prefix.clone())?;

            if fork.merge_into_source {
                if let Some(bp_mut) = tree.branch_point_mut(&bp.id) {
                    bp_mut.merge_target = Some(source_node.clone());
                }
            }

            for (branch_task, node_id) in fork.branches.iter().zip(&bp.branches) {
                if let Some(task) = graph.get_mut(branch_task) {
                    task.context_ref = Some(node_id.clone());
                }
                bound_node.insert(branch_task.clone(), node_id.clone());
                branch_owner.insert(branch_task.clone(), node_id.clone());
            }

            // A task whose dependency predecessors cover every branch of
            // this fork is its join; it must confirm the branch point
            // before running.
            for task in graph.tasks() {
                let deps = graph.dependencies_of(&task.id);
                if !fork.branches.is_empty()
                    && fork.branches.iter().all(|b| deps.contains(b))
                {
                    joins.insert(task.id.clone(), bp.id.clone());
                }
            }
        }

        Ok(Materialized {
            graph,
            tree,
            joins,
            branch_owner,
        })
    }
}

/// Builder for creating execution plans programmatically.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    plan: ExecutionPlan,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents attached to the context root, visible to every task.
    pub fn root_docs(mut self, docs: &[&str]) -> Self {
        self.plan.root_docs = docs.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Add a worker task.
    pub fn task(mut self, id: &str, subject: &str, description: &str) -> Self {
        self.plan.tasks.push(TaskSpec {
            id: id.to_string(),
            subject: subject.to_string(),
            description: description.to_string(),
            fills_context_of: None,
        });
        self
    }

    /// Add a context-fill task feeding the context node of a branch task.
    pub fn context_fill(mut self, id: &str, subject: &str, fills: &str) -> Self {
        self.plan.tasks.push(TaskSpec {
            id: id.to_string(),
            subject: subject.to_string(),
            description: String::new(),
            fills_context_of: Some(fills.to_string()),
        });
        self
    }

    /// `to` runs only after `from` completes.
    pub fn dependency(mut self, from: &str, to: &str) -> Self {
        self.plan.edges.push(EdgeSpec {
            from: from.to_string(),
            to: to.to_string(),
            kind: EdgeKind::Dependency,
        });
        self
    }

    /// Fork `branches` off `trigger`.
    ///
    /// Adds one Fork marker edge per branch, plus a Dependency edge
    /// trigger -> branch so the branches are sequenced after the trigger
    /// (fork edges themselves never gate readiness).
    pub fn fork(self, trigger: &str, branches: &[&str], cached_prefix: Option<&str>) -> Self {
        self.fork_inner(trigger, branches, cached_prefix, false)
    }

    /// Like [`fork`](Self::fork), but settled branches are merged back into
    /// the fork's source context node.
    pub fn fork_merged(
        self,
        trigger: &str,
        branches: &[&str],
        cached_prefix: Option<&str>,
    ) -> Self {
        self.fork_inner(trigger, branches, cached_prefix, true)
    }

    fn fork_inner(
        mut self,
        trigger: &str,
        branches: &[&str],
        cached_prefix: Option<&str>,
        merge_into_source: bool,
    ) -> Self {
        for branch in branches {
            self.plan.edges.push(EdgeSpec {
                from: trigger.to_string(),
                to: branch.to_string(),
                kind: EdgeKind::Fork,
            });
            self.plan.edges.push(EdgeSpec {
                from: trigger.to_string(),
                to: branch.to_string(),
                kind: EdgeKind::Dependency,
            });
        }

        self.plan.forks.push(ForkSpec {
            trigger: trigger.to_string(),
            branches: branches.iter().map(|b| b.to_string()).collect(),
            cached_prefix: cached_prefix.map(|c| c.to_string()),
            merge_into_source,
        });

        self
    }

    /// Join: `target` runs only after every source completes.
    pub fn join(mut self, sources: &[&str], target: &str) -> Self {
        for source in sources {
            self.plan.edges.push(EdgeSpec {
                from: source.to_string(),
                to: target.to_string(),
                kind: EdgeKind::Dependency,
            });
        }
        self
    }

    /// Build and validate the plan.
    pub fn build(self) -> Result<ExecutionPlan> {
        self.plan.validate()?;
        Ok(self.plan)
    }

    /// Build without validation (for tests exercising invalid plans).
    pub fn build_unchecked(self) -> ExecutionPlan {
        self.plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fork_join_plan() -> ExecutionPlan {
        PlanBuilder::new()
            .root_docs(&["docs/spec.md"])
            .task("analyze", "Analyze", "Analyze the codebase")
            .task("write-tests", "Write tests", "")
            .task("write-docs", "Write docs", "")
            .task("merge", "Merge results", "")
            .fork(
                "analyze",
                &["write-tests", "write-docs"],
                Some("cache/analysis.md"),
            )
            .join(&["write-tests", "write-docs"], "merge")
            .build()
            .unwrap()
    }

    #[test]
    fn builder_produces_consistent_plan() {
        let plan = fork_join_plan();
        assert_eq!(plan.tasks.len(), 4);
        // 2 fork markers + 2 trigger deps + 2 join deps.
        assert_eq!(plan.edges.len(), 6);
        assert_eq!(plan.forks.len(), 1);
    }

    #[test]
    fn validate_rejects_unknown_edge_target() {
        let plan = PlanBuilder::new()
            .task("a", "A", "")
            .dependency("a", "nonexistent")
            .build_unchecked();
        assert!(plan.validate().is_err());
    }

    #[test]
    fn materialize_builds_graph_and_tree() {
        let plan = fork_join_plan();
        let m = plan.materialize(AbandonedBranchPolicy::default()).unwrap();

        assert_eq!(m.graph.fork_targets("analyze").len(), 2);
        assert_eq!(
            m.graph.edge_kind("write-tests", "merge"),
            Some(EdgeKind::Dependency)
        );

        // Branch tasks read from their own context nodes.
        let tests_task = m.graph.get("write-tests").unwrap();
        assert_eq!(tests_task.context_ref.as_deref(), Some("ctx-write-tests"));
        assert_eq!(
            m.tree.get_docs("ctx-write-tests"),
            vec!["docs/spec.md", "cache/analysis.md"]
        );

        // The merge task is registered as the fork's join.
        let bp_id = m.joins.get("merge").expect("merge registered as join");
        let bp = m.tree.branch_point(bp_id).unwrap();
        assert_eq!(bp.branches.len(), 2);

        assert_eq!(
            m.branch_owner.get("write-docs").map(String::as_str),
            Some("ctx-write-docs")
        );
    }

    #[test]
    fn only_the_trigger_is_initially_ready() {
        let plan = fork_join_plan();
        let m = plan.materialize(AbandonedBranchPolicy::default()).unwrap();

        let ready: Vec<_> = m.graph.ready_tasks().iter().map(|t| t.id.clone()).collect();
        assert_eq!(ready, vec!["analyze"]);
    }

    #[test]
    fn context_fill_targets_branch_node() {
        let plan = PlanBuilder::new()
            .task("start", "Start", "")
            .task("branch-a", "Branch A", "")
            .context_fill("fill-a", "Prepare branch A docs", "branch-a")
            .fork("start", &["branch-a"], None)
            .dependency("fill-a", "branch-a")
            .build()
            .unwrap();

        let m = plan.materialize(AbandonedBranchPolicy::default()).unwrap();
        let fill = m.graph.get("fill-a").unwrap();
        assert!(fill.is_context_fill());
        assert_eq!(fill.target_context_node(), Some("ctx-branch-a"));
    }

    #[test]
    fn plan_round_trips_through_json() {
        let plan = fork_join_plan();
        let json = serde_json::to_string(&plan).unwrap();
        let back: ExecutionPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tasks.len(), plan.tasks.len());
        assert!(back.validate().is_ok());
    }
}
