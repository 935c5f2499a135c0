// src/context/tree.rs

//! Arena-backed context tree.
//!
//! Nodes live in a flat id-indexed map; `parent` is an id, and `children`
//! is a reverse index maintained alongside it. No owning back-edges exist,
//! so reference cycles are impossible by construction.

use std::collections::HashMap;

use tracing::debug;

use crate::errors::{Result, TaskloomError};
use crate::types::{AbandonedBranchPolicy, DocRef, NodeId};

use super::node::{BranchPoint, ContextNode, ContextStatus};

#[derive(Debug, Default)]
pub struct ContextTree {
    nodes: HashMap<NodeId, ContextNode>,
    /// Reverse index derived from `parent`, in insertion order.
    children: HashMap<NodeId, Vec<NodeId>>,
    branch_points: HashMap<String, BranchPoint>,
    root: Option<NodeId>,
    abandoned_policy: AbandonedBranchPolicy,
}

impl ContextTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_abandoned_policy(policy: AbandonedBranchPolicy) -> Self {
        Self {
            abandoned_policy: policy,
            ..Self::default()
        }
    }

    /// Create the single root node with the given initial documents.
    pub fn init_root(&mut self, docs: Vec<DocRef>) -> Result<&ContextNode> {
        if let Some(existing) = &self.root {
            return Err(TaskloomError::AlreadyExists(format!(
                "context root {existing}"
            )));
        }

        let root = ContextNode::new_root(docs);
        let node_id = root.node_id.clone();
        self.nodes.insert(node_id.clone(), root);
        self.root = Some(node_id.clone());

        Ok(&self.nodes[&node_id])
    }

    pub fn root(&self) -> Option<&ContextNode> {
        self.root.as_ref().and_then(|id| self.nodes.get(id))
    }

    pub fn get(&self, node_id: &str) -> Option<&ContextNode> {
        self.nodes.get(node_id)
    }

    /// Fork `count` anonymous branches from a source node.
    pub fn branch(
        &mut self,
        source_id: &str,
        count: usize,
        cached_prefix: Option<DocRef>,
    ) -> Result<BranchPoint> {
        self.branch_inner(source_id, cached_prefix, count, None)
    }

    /// Fork one branch per explicit id (`ctx-<id>` naming, so branch nodes
    /// can mirror the tasks they belong to).
    pub fn branch_with_ids(
        &mut self,
        source_id: &str,
        ids: &[&str],
        cached_prefix: Option<DocRef>,
    ) -> Result<BranchPoint> {
        self.branch_inner(source_id, cached_prefix, ids.len(), Some(ids))
    }

    fn branch_inner(
        &mut self,
        source_id: &str,
        cached_prefix: Option<DocRef>,
        count: usize,
        ids: Option<&[&str]>,
    ) -> Result<BranchPoint> {
        let source = self
            .nodes
            .get(source_id)
            .ok_or_else(|| TaskloomError::NotFound(format!("context node {source_id}")))?;

        if !source.is_active() {
            return Err(TaskloomError::InvalidTransition(format!(
                "cannot branch from non-active context node {source_id}"
            )));
        }

        let source_id = source.node_id.clone();

        // Validate the whole id batch before inserting anything, so a
        // rejected fork creates zero nodes.
        if let Some(ids) = ids {
            for id in ids {
                let node_id = format!("ctx-{id}");
                if self.nodes.contains_key(&node_id) {
                    return Err(TaskloomError::AlreadyExists(format!(
                        "context node {node_id}"
                    )));
                }
            }
        }

        let mut branch_point = BranchPoint::new(&source_id);

        for i in 0..count {
            let mut node = ContextNode::fork_from(&source_id, cached_prefix.clone());
            if let Some(ids) = ids {
                node.node_id = format!("ctx-{}", ids[i]);
            }

            branch_point.branches.push(node.node_id.clone());
            self.children
                .entry(source_id.clone())
                .or_default()
                .push(node.node_id.clone());
            self.nodes.insert(node.node_id.clone(), node);
        }

        debug!(
            source = %source_id,
            branch_point = %branch_point.id,
            branches = branch_point.branches.len(),
            "forked context branches"
        );

        self.branch_points
            .insert(branch_point.id.clone(), branch_point.clone());

        Ok(branch_point)
    }

    /// Append a document to a node's `delta_docs`.
    pub fn add_doc(&mut self, node_id: &str, doc: DocRef) -> Result<()> {
        let node = self.active_mut(node_id)?;
        node.delta_docs.push(doc);
        Ok(())
    }

    /// Terminal transition: finished successfully.
    pub fn complete(&mut self, node_id: &str) -> Result<()> {
        let node = self.active_mut(node_id)?;
        node.status = ContextStatus::Completed;
        Ok(())
    }

    /// Terminal transition: cancelled or failed.
    pub fn abandon(&mut self, node_id: &str) -> Result<()> {
        let node = self.active_mut(node_id)?;
        node.status = ContextStatus::Abandoned;
        Ok(())
    }

    /// Terminal transition: folded into `target`, which must exist.
    pub fn merge_into(&mut self, node_id: &str, target: &str) -> Result<()> {
        if !self.nodes.contains_key(target) {
            return Err(TaskloomError::NotFound(format!("context node {target}")));
        }

        let target = target.to_string();
        let node = self.active_mut(node_id)?;
        node.status = ContextStatus::Merged { into: target };
        Ok(())
    }

    fn active_mut(&mut self, node_id: &str) -> Result<&mut ContextNode> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| TaskloomError::NotFound(format!("context node {node_id}")))?;

        if !node.is_active() {
            return Err(TaskloomError::InvalidTransition(format!(
                "context node {node_id} is not active ({:?})",
                node.status
            )));
        }

        Ok(node)
    }

    /// Whether every branch of a branch point has settled.
    ///
    /// Under the default `Block` policy an `Abandoned` branch keeps the
    /// branch point incomplete forever; under `Count` it is treated as
    /// terminal.
    pub fn is_branch_complete(&self, branch_point_id: &str) -> Result<bool> {
        let branch_point = self.branch_points.get(branch_point_id).ok_or_else(|| {
            TaskloomError::NotFound(format!("branch point {branch_point_id}"))
        })?;

        Ok(branch_point.branches.iter().all(|node_id| {
            self.nodes
                .get(node_id)
                .map(|n| match self.abandoned_policy {
                    AbandonedBranchPolicy::Block => n.is_settled(),
                    AbandonedBranchPolicy::Count => {
                        n.is_settled() || matches!(n.status, ContextStatus::Abandoned)
                    }
                })
                .unwrap_or(false)
        }))
    }

    pub fn branch_point(&self, branch_point_id: &str) -> Option<&BranchPoint> {
        self.branch_points.get(branch_point_id)
    }

    /// Branch point one of whose branches is the given node.
    pub fn branch_point_containing(&self, node_id: &str) -> Option<&BranchPoint> {
        self.branch_points
            .values()
            .find(|bp| bp.branches.iter().any(|b| b == node_id))
    }

    pub(crate) fn branch_point_mut(&mut self, branch_point_id: &str) -> Option<&mut BranchPoint> {
        self.branch_points.get_mut(branch_point_id)
    }

    /// Ancestor chain from the node up to the root (node first).
    pub fn ancestors(&self, node_id: &str) -> Vec<&ContextNode> {
        let mut result = vec![];
        let mut current = self.nodes.get(node_id);

        while let Some(node) = current {
            result.push(node);
            current = node.parent.as_ref().and_then(|pid| self.nodes.get(pid));
        }

        result
    }

    /// Children of a node, via the reverse index.
    pub fn children(&self, node_id: &str) -> Vec<&ContextNode> {
        self.children
            .get(node_id)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    /// All documents visible to a node: for each ancestor root-to-node, its
    /// `cached_prefix` (if set) then its `delta_docs`, with duplicates
    /// removed preserving first occurrence.
    pub fn get_docs(&self, node_id: &str) -> Vec<DocRef> {
        let ancestors = self.ancestors(node_id);
        let mut docs: Vec<DocRef> = vec![];

        for node in ancestors.into_iter().rev() {
            if let Some(prefix) = &node.cached_prefix {
                push_unique(&mut docs, prefix);
            }
            for doc in &node.delta_docs {
                push_unique(&mut docs, doc);
            }
        }

        docs
    }

    pub fn active_nodes(&self) -> Vec<&ContextNode> {
        self.nodes.values().filter(|n| n.is_active()).collect()
    }
}

fn push_unique(docs: &mut Vec<DocRef>, doc: &str) {
    if !docs.iter().any(|d| d == doc) {
        docs.push(doc.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_single() {
        let mut tree = ContextTree::new();
        tree.init_root(vec![]).unwrap();
        assert!(matches!(
            tree.init_root(vec![]),
            Err(TaskloomError::AlreadyExists(_))
        ));
    }

    #[test]
    fn branch_and_children_index() {
        let mut tree = ContextTree::new();
        let root_id = tree.init_root(vec![]).unwrap().node_id.clone();

        let bp = tree.branch(&root_id, 3, None).unwrap();
        assert_eq!(bp.branches.len(), 3);
        assert_eq!(tree.children(&root_id).len(), 3);
        assert_eq!(tree.active_nodes().len(), 4);

        for branch_id in &bp.branches {
            let node = tree.get(branch_id).unwrap();
            assert_eq!(node.parent.as_deref(), Some(root_id.as_str()));
        }
    }

    #[test]
    fn branch_from_terminal_node_rejected() {
        let mut tree = ContextTree::new();
        let root_id = tree.init_root(vec![]).unwrap().node_id.clone();
        let bp = tree.branch(&root_id, 1, None).unwrap();
        let branch_id = bp.branches[0].clone();

        tree.complete(&branch_id).unwrap();
        assert!(matches!(
            tree.branch(&branch_id, 2, None),
            Err(TaskloomError::InvalidTransition(_))
        ));
        assert_eq!(tree.children(&branch_id).len(), 0);

        tree.abandon(&root_id).unwrap();
        assert!(matches!(
            tree.branch(&root_id, 2, None),
            Err(TaskloomError::InvalidTransition(_))
        ));
    }

    #[test]
    fn terminal_transitions_fire_once() {
        let mut tree = ContextTree::new();
        let root_id = tree.init_root(vec![]).unwrap().node_id.clone();
        let bp = tree.branch(&root_id, 2, None).unwrap();
        let (a, b) = (bp.branches[0].clone(), bp.branches[1].clone());

        tree.complete(&a).unwrap();
        assert!(matches!(
            tree.complete(&a),
            Err(TaskloomError::InvalidTransition(_))
        ));
        assert!(matches!(
            tree.add_doc(&a, "late.md".into()),
            Err(TaskloomError::InvalidTransition(_))
        ));

        tree.merge_into(&b, &root_id).unwrap();
        assert!(matches!(
            tree.abandon(&b),
            Err(TaskloomError::InvalidTransition(_))
        ));
    }

    #[test]
    fn merge_requires_existing_target() {
        let mut tree = ContextTree::new();
        let root_id = tree.init_root(vec![]).unwrap().node_id.clone();
        assert!(matches!(
            tree.merge_into(&root_id, "nope"),
            Err(TaskloomError::NotFound(_))
        ));
        // Failed merge must not have transitioned the node.
        assert!(tree.get(&root_id).unwrap().is_active());
    }

    #[test]
    fn docs_inherit_root_to_leaf() {
        let mut tree = ContextTree::new();
        let root_id = tree
            .init_root(vec!["spec.md".into()])
            .unwrap()
            .node_id
            .clone();

        let bp = tree
            .branch(&root_id, 2, Some("shared.md".into()))
            .unwrap();
        let (b1, b2) = (bp.branches[0].clone(), bp.branches[1].clone());

        assert_eq!(tree.get_docs(&b1), vec!["spec.md", "shared.md"]);

        tree.add_doc(&b1, "work.md".into()).unwrap();
        assert_eq!(tree.get_docs(&b1), vec!["spec.md", "shared.md", "work.md"]);
        // Sibling is untouched.
        assert_eq!(tree.get_docs(&b2), vec!["spec.md", "shared.md"]);
    }

    #[test]
    fn docs_deduplicate_keeping_first() {
        let mut tree = ContextTree::new();
        let root_id = tree
            .init_root(vec!["spec.md".into(), "notes.md".into()])
            .unwrap()
            .node_id
            .clone();

        let bp = tree.branch(&root_id, 1, Some("spec.md".into())).unwrap();
        let b = bp.branches[0].clone();
        tree.add_doc(&b, "notes.md".into()).unwrap();
        tree.add_doc(&b, "extra.md".into()).unwrap();

        assert_eq!(tree.get_docs(&b), vec!["spec.md", "notes.md", "extra.md"]);
    }

    #[test]
    fn ancestors_walk_to_root() {
        let mut tree = ContextTree::new();
        let root_id = tree.init_root(vec![]).unwrap().node_id.clone();
        let level1 = tree.branch(&root_id, 1, None).unwrap().branches[0].clone();
        let level2 = tree.branch(&level1, 1, None).unwrap().branches[0].clone();

        let chain: Vec<_> = tree
            .ancestors(&level2)
            .iter()
            .map(|n| n.node_id.clone())
            .collect();
        assert_eq!(chain, vec![level2, level1, root_id]);
    }

    #[test]
    fn branch_completion_default_blocks_abandoned() {
        let mut tree = ContextTree::new();
        let root_id = tree.init_root(vec![]).unwrap().node_id.clone();
        let bp = tree.branch(&root_id, 3, None).unwrap();

        tree.complete(&bp.branches[0]).unwrap();
        tree.merge_into(&bp.branches[1], &root_id).unwrap();
        assert!(!tree.is_branch_complete(&bp.id).unwrap());

        tree.abandon(&bp.branches[2]).unwrap();
        // Abandoned blocks completion under the default policy.
        assert!(!tree.is_branch_complete(&bp.id).unwrap());

        assert!(matches!(
            tree.is_branch_complete("branch-nope"),
            Err(TaskloomError::NotFound(_))
        ));
    }

    #[test]
    fn branch_completion_count_policy_admits_abandoned() {
        let mut tree = ContextTree::with_abandoned_policy(AbandonedBranchPolicy::Count);
        let root_id = tree.init_root(vec![]).unwrap().node_id.clone();
        let bp = tree.branch(&root_id, 2, None).unwrap();

        tree.complete(&bp.branches[0]).unwrap();
        tree.abandon(&bp.branches[1]).unwrap();
        assert!(tree.is_branch_complete(&bp.id).unwrap());
    }

    #[test]
    fn explicit_branch_ids() {
        let mut tree = ContextTree::new();
        let root_id = tree.init_root(vec![]).unwrap().node_id.clone();

        let bp = tree
            .branch_with_ids(&root_id, &["task-1", "task-2"], None)
            .unwrap();
        assert_eq!(bp.branches, vec!["ctx-task-1", "ctx-task-2"]);

        // Reusing an id is rejected.
        assert!(matches!(
            tree.branch_with_ids(&root_id, &["task-1"], None),
            Err(TaskloomError::AlreadyExists(_))
        ));
    }
}
