// src/context/mod.rs

//! Context tree: hierarchical document references.
//!
//! The tree decides which reference documents each task may see. It is NOT
//! about session management — it curates per-branch reading lists:
//!
//! - root node: documents every task needs
//! - branch nodes: branch-specific documents
//! - each node: `cached_prefix` (one shared document, set at fork time)
//!   plus `delta_docs` (node-local additions)
//!
//! The documents visible to a node are the root-to-node concatenation of
//! those two lists, deduplicated.

pub mod node;
pub mod tree;

pub use node::{BranchPoint, ContextNode, ContextStatus};
pub use tree::ContextTree;
