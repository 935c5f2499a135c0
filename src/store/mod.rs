// src/store/mod.rs

//! Document store collaborator.
//!
//! The core treats document references as opaque ids/paths; this module is
//! the only place that knows how to turn them into content. Production code
//! uses [`FsDocStore`]; tests use [`MemoryDocStore`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::types::{DocRef, TaskId};

/// Abstract document store interface.
pub trait DocStore: Send + Sync + Debug {
    /// Read a document's content by reference.
    fn read(&self, doc: &str) -> Result<String>;

    /// Write a document and return the reference it is readable under.
    fn write(&self, id: &str, content: &str) -> Result<DocRef>;

    /// Content of the most recent result document for a task, if any.
    fn latest_result_for(&self, task_id: &str) -> Result<Option<String>>;
}

/// Id under which a task attempt's result document is written.
pub fn result_doc_id(task_id: &str, attempt: u32) -> String {
    format!("results/{task_id}-attempt-{attempt}.md")
}

/// Id under which a directive payload targeting a context node is written.
pub fn append_doc_id(task_id: &str, node_id: &str) -> String {
    format!("context/{task_id}-add-{node_id}.md")
}

fn attempt_of(doc: &str, prefix: &str) -> Option<u32> {
    doc.strip_prefix(prefix)?
        .strip_suffix(".md")?
        .parse()
        .ok()
}

/// Markdown files under a root directory.
#[derive(Debug)]
pub struct FsDocStore {
    root: PathBuf,
}

impl FsDocStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DocStore for FsDocStore {
    fn read(&self, doc: &str) -> Result<String> {
        let under_root = self.root.join(doc);
        if under_root.is_file() {
            return fs::read_to_string(&under_root)
                .with_context(|| format!("reading document {under_root:?}"));
        }
        // Fall back to the reference as a plain path, for documents that
        // live outside the store (e.g. a project's own spec files).
        fs::read_to_string(doc).with_context(|| format!("reading document {doc:?}"))
    }

    fn write(&self, id: &str, content: &str) -> Result<DocRef> {
        let path = self.root.join(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {parent:?}"))?;
        }
        fs::write(&path, content).with_context(|| format!("writing document {path:?}"))?;
        Ok(id.to_string())
    }

    fn latest_result_for(&self, task_id: &str) -> Result<Option<String>> {
        let results_dir = self.root.join("results");
        if !results_dir.is_dir() {
            return Ok(None);
        }

        let prefix = format!("{task_id}-attempt-");
        let mut best: Option<(u32, PathBuf)> = None;

        for entry in fs::read_dir(&results_dir)
            .with_context(|| format!("reading dir {results_dir:?}"))?
        {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(attempt) = attempt_of(name, &prefix) {
                if best.as_ref().is_none_or(|(a, _)| attempt > *a) {
                    best = Some((attempt, path));
                }
            }
        }

        match best {
            Some((_, path)) => Ok(Some(
                fs::read_to_string(&path).with_context(|| format!("reading {path:?}"))?,
            )),
            None => Ok(None),
        }
    }
}

/// In-memory document store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryDocStore {
    docs: Mutex<HashMap<DocRef, String>>,
}

impl MemoryDocStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document outside the `DocStore` interface.
    pub fn add_doc(&self, doc: impl Into<DocRef>, content: impl Into<String>) {
        self.docs.lock().unwrap().insert(doc.into(), content.into());
    }
}

impl DocStore for MemoryDocStore {
    fn read(&self, doc: &str) -> Result<String> {
        self.docs
            .lock()
            .unwrap()
            .get(doc)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("document not found: {doc}"))
    }

    fn write(&self, id: &str, content: &str) -> Result<DocRef> {
        self.docs
            .lock()
            .unwrap()
            .insert(id.to_string(), content.to_string());
        Ok(id.to_string())
    }

    fn latest_result_for(&self, task_id: &str) -> Result<Option<String>> {
        let prefix = format!("results/{task_id}-attempt-");
        let docs = self.docs.lock().unwrap();

        Ok(docs
            .iter()
            .filter_map(|(doc, content)| attempt_of(doc, &prefix).map(|a| (a, content)))
            .max_by_key(|(a, _)| *a)
            .map(|(_, content)| content.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryDocStore::new();
        let doc = store.write("notes/a.md", "hello").unwrap();
        assert_eq!(store.read(&doc).unwrap(), "hello");
        assert!(store.read("missing").is_err());
    }

    #[test]
    fn latest_result_picks_highest_attempt() {
        let store = MemoryDocStore::new();
        store
            .write(&result_doc_id("task-1", 1), "first try")
            .unwrap();
        store
            .write(&result_doc_id("task-1", 2), "second try")
            .unwrap();
        store
            .write(&result_doc_id("task-10", 1), "other task")
            .unwrap();

        assert_eq!(
            store.latest_result_for("task-1").unwrap().as_deref(),
            Some("second try")
        );
        assert_eq!(store.latest_result_for("task-2").unwrap(), None);
    }

    #[test]
    fn fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocStore::new(dir.path());

        let doc = store.write(&result_doc_id("t", 1), "out").unwrap();
        assert_eq!(store.read(&doc).unwrap(), "out");
        assert_eq!(store.latest_result_for("t").unwrap().as_deref(), Some("out"));
    }
}
