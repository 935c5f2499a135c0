use std::str::FromStr;

use serde::Deserialize;

/// Canonical task identifier used throughout the crate.
pub type TaskId = String;

/// Identifier of a context-tree node.
pub type NodeId = String;

/// Opaque document reference (an id or path understood by the `DocStore`).
pub type DocRef = String;

/// How `is_branch_complete` treats `Abandoned` branches.
///
/// - `Block`: an abandoned branch keeps its branch point incomplete forever
///   (default behaviour).
/// - `Count`: an abandoned branch is treated as terminal, so the branch
///   point can still complete once every sibling is `Completed` or `Merged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbandonedBranchPolicy {
    Block,
    Count,
}

impl Default for AbandonedBranchPolicy {
    fn default() -> Self {
        AbandonedBranchPolicy::Block
    }
}

impl FromStr for AbandonedBranchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "block" => Ok(AbandonedBranchPolicy::Block),
            "count" => Ok(AbandonedBranchPolicy::Count),
            other => Err(format!(
                "invalid abandoned_branches policy: {other} (expected \"block\" or \"count\")"
            )),
        }
    }
}
