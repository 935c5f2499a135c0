// src/context/node.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{DocRef, NodeId};

/// A node in the context tree holding document references for one branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextNode {
    pub node_id: NodeId,
    /// Parent node id (`None` for root). Id only — children are derived via
    /// a reverse index, never stored as owning edges.
    pub parent: Option<NodeId>,
    /// Shared document attached once at fork time and inherited by
    /// reference, instead of being copied into every sibling.
    pub cached_prefix: Option<DocRef>,
    /// Documents local to this branch (delta from the parent).
    pub delta_docs: Vec<DocRef>,
    pub created_at: DateTime<Utc>,
    pub status: ContextStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    /// Accepts forks and document additions.
    Active,
    /// Finished successfully.
    Completed,
    /// Cancelled or failed; immutable and never counted as complete under
    /// the default policy.
    Abandoned,
    /// Folded into another node.
    Merged { into: NodeId },
}

impl ContextNode {
    pub(crate) fn new_root(docs: Vec<DocRef>) -> Self {
        Self {
            node_id: format!("ctx-{}", short_uuid()),
            parent: None,
            cached_prefix: None,
            delta_docs: docs,
            created_at: Utc::now(),
            status: ContextStatus::Active,
        }
    }

    pub(crate) fn fork_from(parent: &NodeId, cached_prefix: Option<DocRef>) -> Self {
        Self {
            node_id: format!("ctx-{}", short_uuid()),
            parent: Some(parent.clone()),
            cached_prefix,
            delta_docs: vec![],
            created_at: Utc::now(),
            status: ContextStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, ContextStatus::Active)
    }

    /// Terminal in a way that counts toward branch completion.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            ContextStatus::Completed | ContextStatus::Merged { .. }
        )
    }
}

/// Record of one fork operation: the set of branch ids created together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchPoint {
    pub id: String,
    /// Node the branches were forked from.
    pub source_node: NodeId,
    /// Branch nodes created by this fork.
    pub branches: Vec<NodeId>,
    /// Node that branch results are merged into, when the plan declares one.
    pub merge_target: Option<NodeId>,
    pub created_at: DateTime<Utc>,
}

impl BranchPoint {
    pub(crate) fn new(source_node: &str) -> Self {
        Self {
            id: format!("branch-{}", short_uuid()),
            source_node: source_node.to_string(),
            branches: vec![],
            merge_target: None,
            created_at: Utc::now(),
        }
    }
}

fn short_uuid() -> String {
    Uuid::new_v4()
        .to_string()
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string()
}
