// src/exec/backend.rs

//! Pluggable worker abstraction.
//!
//! The runtime talks to a `WorkerBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake in tests while keeping the
//! production dispatch path in [`super::worker_loop`].
//!
//! - [`Worker`] is the external collaborator that actually performs a task
//!   (an LLM process, a subprocess, a fake in tests).
//! - [`ChannelWorkerBackend`] is the default backend: it forwards work
//!   orders over an mpsc channel to the background worker loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::engine::{DispatchSpec, RuntimeEvent};
use crate::errors::{Error, Result};
use crate::graph::TaskKind;
use crate::store::DocStore;
use crate::types::TaskId;

use super::worker_loop::spawn_worker_loop;

/// One resolved context document handed to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDoc {
    /// Where the content came from (a doc ref, or `result:<task-id>`).
    pub source: String,
    pub content: String,
}

/// A fully assembled unit of work for the external worker.
#[derive(Debug, Clone)]
pub struct WorkOrder {
    pub task_id: TaskId,
    pub subject: String,
    pub description: String,
    pub kind: TaskKind,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Resolved context documents: auto-discovered first, then the context
    /// tree's reading list root-to-leaf, then dependency results.
    pub context: Vec<ContextDoc>,
    /// Formatted notes from prior failed attempts, oldest first.
    pub attempt_notes: Vec<String>,
}

impl WorkOrder {
    pub(crate) fn from_spec(spec: &DispatchSpec, context: Vec<ContextDoc>) -> Self {
        Self {
            task_id: spec.task_id.clone(),
            subject: spec.subject.clone(),
            description: spec.description.clone(),
            kind: spec.kind.clone(),
            attempt: spec.attempt,
            context,
            attempt_notes: spec.attempt_notes.clone(),
        }
    }
}

/// What the worker collaborator reports back for one order.
#[derive(Debug, Clone)]
pub struct WorkerReply {
    pub success: bool,
    /// Free-form output; may embed `ADD_CONTEXT` directive blocks, which
    /// are parsed at this boundary and never travel further as raw text.
    pub output: String,
}

/// The external collaborator that performs a task.
///
/// Implementations are stateless with respect to the scheduler: everything
/// they need arrives in the [`WorkOrder`], and everything they produce goes
/// back through the [`WorkerReply`].
pub trait Worker: Send + Sync {
    fn perform(
        &self,
        order: WorkOrder,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WorkerReply>> + Send + '_>>;
}

/// Trait abstracting how assembled work orders are executed.
///
/// Production code uses [`ChannelWorkerBackend`]; tests can provide their
/// own implementation that completes orders synthetically.
pub trait WorkerBackend: Send {
    /// Dispatch the given orders for execution.
    fn dispatch(
        &mut self,
        orders: Vec<WorkOrder>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Handle for cancelling an in-flight dispatch from outside the runtime.
///
/// Cancellation is all-or-nothing: the dispatch's results and directives
/// are dropped, the task fails, and its branch node (if any) is abandoned.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: mpsc::Sender<TaskId>,
}

impl CancelHandle {
    pub(crate) fn new(tx: mpsc::Sender<TaskId>) -> Self {
        Self { tx }
    }

    pub async fn cancel(&self, task_id: impl Into<TaskId>) -> Result<()> {
        self.tx.send(task_id.into()).await.map_err(Error::from)?;
        Ok(())
    }
}

/// Production backend: forwards orders to the background worker loop.
pub struct ChannelWorkerBackend {
    order_tx: mpsc::Sender<WorkOrder>,
    cancel: CancelHandle,
}

impl ChannelWorkerBackend {
    /// Create the backend, wiring it to the given runtime event sender.
    ///
    /// This spawns the background worker loop immediately.
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        worker: Arc<dyn Worker>,
        store: Arc<dyn DocStore>,
        deadline: Duration,
        buffer: usize,
    ) -> Self {
        let handles = spawn_worker_loop(runtime_tx, worker, store, deadline, buffer);
        Self {
            order_tx: handles.order_tx,
            cancel: CancelHandle::new(handles.cancel_tx),
        }
    }

    /// Cancellation handle, cloneable and usable from outside the runtime.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl WorkerBackend for ChannelWorkerBackend {
    fn dispatch(
        &mut self,
        orders: Vec<WorkOrder>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.order_tx.clone();

        Box::pin(async move {
            for order in orders {
                tx.send(order).await.map_err(Error::from)?;
            }
            Ok(())
        })
    }
}
