// src/search/mod.rs

//! Optional search collaborator.
//!
//! When enabled, the runtime queries the index before each dispatch and
//! prepends the discovered documents to the task's assembled context. The
//! index never participates in graph or tree invariants.

use anyhow::Result;

use crate::types::DocRef;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub doc_ref: DocRef,
    pub score: f32,
}

/// Abstract ranked-search interface over the document corpus.
pub trait SearchIndex: Send + Sync {
    /// Ranked documents matching the keywords, best first.
    fn query(&self, keywords: &str, limit: usize) -> Result<Vec<SearchHit>>;
}
