// src/engine/mod.rs

//! Scheduler engine.
//!
//! This module ties together:
//! - the task graph and context tree (owned by the pure core)
//! - the runtime event loop reacting to worker results, cancellations and
//!   shutdown signals
//! - context assembly and dispatch to the worker backend
//!
//! The pure core state machine lives in [`core`] (with its event handlers
//! in [`event_handlers`]); the async/IO shell is implemented in
//! [`runtime`]. All graph/tree mutation happens inside the core, which is
//! only ever driven from the shell's single event loop — the single-writer
//! discipline that keeps the invariants provable without locks.

use crate::exec::directive::AppendDoc;
use crate::graph::TaskKind;
use crate::types::{DocRef, TaskId};

/// Outcome of one worker dispatch, already parsed at the exec boundary.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Success {
        /// Result document written by the worker loop.
        result_doc: DocRef,
        /// Typed `ADD_CONTEXT` commands extracted from the output.
        appends: Vec<AppendDoc>,
    },
    Failure {
        reason: String,
        /// Whatever output the worker produced before failing; recorded in
        /// the attempt for retry-aware prompting.
        output: String,
        /// True when the dispatch exceeded its deadline. Treated like any
        /// other failure, but kept visible for logging.
        timed_out: bool,
    },
}

/// Events flowing into the runtime from the worker loop and the embedding
/// application.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatch finished with a concrete outcome.
    TaskFinished { task: TaskId, outcome: TaskOutcome },
    /// A dispatch was cancelled externally before finishing. No partial
    /// mutations from it are ever applied.
    TaskCancelled { task: TaskId },
    /// Graceful shutdown requested.
    ShutdownRequested,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Exit the runtime once no task is running and nothing more can be
    /// dispatched (finished or permanently blocked).
    pub exit_when_idle: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            exit_when_idle: true,
        }
    }
}

/// Description of one dispatch the core wants the shell to perform.
///
/// Context is still referential here; the shell resolves references into
/// content through the document store before handing the order to the
/// worker backend.
#[derive(Debug, Clone)]
pub struct DispatchSpec {
    pub task_id: TaskId,
    pub subject: String,
    pub description: String,
    pub kind: TaskKind,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Documents visible via the task's context node, root to leaf.
    pub context_refs: Vec<DocRef>,
    /// Completed dependency predecessors whose results are included.
    pub dep_results_of: Vec<TaskId>,
    /// Formatted notes from prior failed attempts, oldest first.
    pub attempt_notes: Vec<String>,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::{RunReport, Runtime};
