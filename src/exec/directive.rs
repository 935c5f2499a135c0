// src/exec/directive.rs

//! Boundary parsing of worker-output directives.
//!
//! Workers can ask for content to be shared with other tasks by embedding
//! delimited blocks in their output:
//!
//! ```text
//! [ADD_CONTEXT:ctx-node-id]
//! ## Title
//! Content for sibling/downstream tasks...
//! [/ADD_CONTEXT]
//! ```
//!
//! The blocks are parsed here, at the worker boundary, into typed commands.
//! Raw tagged text never reaches the scheduler core.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{DocRef, NodeId};

static ADD_CONTEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[ADD_CONTEXT:([^\]]*)\](.*?)\[/ADD_CONTEXT\]")
        .expect("directive regex is valid")
});

/// A parsed `ADD_CONTEXT` block, prior to the payload being written to the
/// document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAppend {
    pub node_id: NodeId,
    pub content: String,
}

/// Typed append command: the payload has been persisted and only the
/// reference travels onward into the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendDoc {
    pub node_id: NodeId,
    pub doc_ref: DocRef,
}

/// Extract all well-formed `ADD_CONTEXT` blocks from worker output.
///
/// Blocks with an empty node id or empty content, and blocks missing their
/// closing tag, are ignored.
pub fn parse_add_context(output: &str) -> Vec<RawAppend> {
    ADD_CONTEXT_RE
        .captures_iter(output)
        .filter_map(|caps| {
            let node_id = caps[1].trim();
            let content = caps[2].trim();
            if node_id.is_empty() || content.is_empty() {
                return None;
            }
            Some(RawAppend {
                node_id: node_id.to_string(),
                content: content.to_string(),
            })
        })
        .collect()
}
