// src/engine/core.rs

//! Pure core scheduler state machine.
//!
//! This module contains a synchronous, deterministic core that consumes
//! [`RuntimeEvent`]s and produces:
//! - updated graph/tree state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! events from channels, resolving document references and handing work
//! orders to the worker backend.
//!
//! The core is the single mutation point for both the task graph and the
//! context tree, and is unit-testable without Tokio, channels or IO.

use std::collections::HashMap;

use crate::config::SchedulerConfig;
use crate::context::ContextTree;
use crate::graph::TaskGraph;
use crate::plan::Materialized;
use crate::types::{NodeId, TaskId};

use super::event_handlers::CoreStep;
use super::{RuntimeEvent, RuntimeOptions};

/// Pure core runtime state.
///
/// Owns the task graph, the context tree and the fork/join registries.
/// It has **no** channels, no Tokio types, and performs no IO.
#[derive(Debug)]
pub struct CoreRuntime {
    pub(super) graph: TaskGraph,
    pub(super) tree: ContextTree,
    /// Join task -> branch point it must confirm before dispatch.
    pub(super) joins: HashMap<TaskId, String>,
    /// Fork-branch task -> context node it settles on finish.
    pub(super) branch_owner: HashMap<TaskId, NodeId>,
    pub(super) max_attempts: u32,
    pub(super) options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(
        materialized: Materialized,
        scheduler: &SchedulerConfig,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            graph: materialized.graph,
            tree: materialized.tree,
            joins: materialized.joins,
            branch_owner: materialized.branch_owner,
            max_attempts: scheduler.max_attempts,
            options,
        }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn tree(&self) -> &ContextTree {
        &self.tree
    }

    /// Kick off the run: dispatch everything that is ready up front.
    pub fn start(&mut self) -> CoreStep {
        self.collect_and_finish(Vec::new(), Vec::new())
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskFinished { task, outcome } => {
                self.handle_task_finished(task, outcome)
            }
            RuntimeEvent::TaskCancelled { task } => self.handle_task_cancelled(task),
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                newly_failed: Vec::new(),
                faults: Vec::new(),
                keep_running: false,
            },
        }
    }
}
