// src/exec/worker_loop.rs

//! Background loop that owns in-flight worker dispatches.
//!
//! Each work order runs in its own Tokio task, and **per task id there is
//! never more than one dispatch in flight**. Every dispatch runs under the
//! configured deadline; a timeout is reported as an ordinary failure so a
//! task can never be left `InProgress` forever. Cancellation kills the
//! dispatch without reporting a result for it — the runtime only learns
//! `TaskCancelled`, so nothing from the cancelled attempt is applied.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::errors::TaskloomError;
use crate::store::{DocStore, append_doc_id, result_doc_id};
use crate::types::TaskId;

use super::backend::{WorkOrder, Worker};
use super::directive::{AppendDoc, parse_add_context};

/// Channel ends returned by [`spawn_worker_loop`].
pub(crate) struct WorkerLoopHandles {
    pub order_tx: mpsc::Sender<WorkOrder>,
    pub cancel_tx: mpsc::Sender<TaskId>,
}

/// Internal handle for a currently in-flight dispatch.
struct ActiveOrder {
    attempt: u32,
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background worker loop.
pub(crate) fn spawn_worker_loop(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    worker: Arc<dyn Worker>,
    store: Arc<dyn DocStore>,
    deadline: Duration,
    buffer: usize,
) -> WorkerLoopHandles {
    let (order_tx, mut order_rx) = mpsc::channel::<WorkOrder>(buffer);
    let (cancel_tx, mut cancel_rx) = mpsc::channel::<TaskId>(buffer);

    tokio::spawn(async move {
        info!("worker loop started");

        // At most one ActiveOrder per task id.
        let mut active: HashMap<TaskId, ActiveOrder> = HashMap::new();

        loop {
            tokio::select! {
                order = order_rx.recv() => {
                    let Some(order) = order else { break };
                    handle_order(order, &mut active, &runtime_tx, &worker, &store, deadline);
                }
                cancelled = cancel_rx.recv() => {
                    let Some(task_id) = cancelled else { break };
                    handle_cancel(&task_id, &mut active);
                }
            }
        }

        info!("worker loop finished (channels closed)");
    });

    WorkerLoopHandles {
        order_tx,
        cancel_tx,
    }
}

fn handle_order(
    order: WorkOrder,
    active: &mut HashMap<TaskId, ActiveOrder>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    worker: &Arc<dyn Worker>,
    store: &Arc<dyn DocStore>,
    deadline: Duration,
) {
    let task_id = order.task_id.clone();

    // Ignore a duplicate of the attempt that is already in flight. A later
    // attempt replaces the stale entry (dropping its cancel sender, which
    // silently ends a dispatch that somehow never reported).
    if let Some(existing) = active.get(&task_id) {
        if existing.attempt == order.attempt && !existing.handle.is_finished() {
            warn!(
                task = %task_id,
                attempt = order.attempt,
                "dispatch already in flight for this attempt; ignoring duplicate order"
            );
            return;
        }
    }

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let rt_tx = runtime_tx.clone();
    let worker = Arc::clone(worker);
    let store = Arc::clone(store);
    let spawn_id = task_id.clone();
    let attempt = order.attempt;

    let handle = tokio::spawn(async move {
        run_order(order, rt_tx, worker, store, deadline, cancel_rx).await;
        debug!(task = %spawn_id, "dispatch future finished");
    });

    active.insert(
        task_id,
        ActiveOrder {
            attempt,
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

fn handle_cancel(task_id: &str, active: &mut HashMap<TaskId, ActiveOrder>) {
    let Some(existing) = active.get_mut(task_id) else {
        debug!(task = %task_id, "cancel requested for task with no in-flight dispatch");
        return;
    };

    info!(task = %task_id, "cancelling in-flight dispatch");
    if let Some(cancel) = existing.cancel.take() {
        if cancel.send(()).is_err() {
            debug!(task = %task_id, "dispatch already finished while cancelling");
        }
    }
}

/// Run a single dispatch under the deadline, reporting exactly one event:
/// `TaskFinished` on completion/timeout, `TaskCancelled` on cancellation.
async fn run_order(
    order: WorkOrder,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    worker: Arc<dyn Worker>,
    store: Arc<dyn DocStore>,
    deadline: Duration,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let task_id = order.task_id.clone();
    let attempt = order.attempt;

    debug!(
        task = %task_id,
        attempt,
        docs = order.context.len(),
        "starting worker dispatch"
    );

    tokio::select! {
        result = timeout(deadline, worker.perform(order)) => {
            let outcome = match result {
                Err(_elapsed) => {
                    let err = TaskloomError::Timeout {
                        task: task_id.clone(),
                        secs: deadline.as_secs(),
                    };
                    warn!(task = %task_id, attempt, "{err}");
                    TaskOutcome::Failure {
                        reason: err.to_string(),
                        output: String::new(),
                        timed_out: true,
                    }
                }
                Ok(Err(e)) => TaskOutcome::Failure {
                    reason: format!("worker error: {e}"),
                    output: String::new(),
                    timed_out: false,
                },
                Ok(Ok(reply)) if !reply.success => TaskOutcome::Failure {
                    reason: "worker reported failure".to_string(),
                    output: reply.output,
                    timed_out: false,
                },
                Ok(Ok(reply)) => apply_reply(&task_id, attempt, &reply.output, &store),
            };

            let _ = runtime_tx
                .send(RuntimeEvent::TaskFinished {
                    task: task_id,
                    outcome,
                })
                .await;
        }

        cancel = &mut cancel_rx => {
            match cancel {
                Ok(()) => {
                    info!(task = %task_id, attempt, "dispatch cancelled; dropping its results");
                    let _ = runtime_tx
                        .send(RuntimeEvent::TaskCancelled { task: task_id })
                        .await;
                }
                Err(e) => {
                    debug!(task = %task_id, error = %e, "cancel channel closed without cancellation");
                }
            }
        }
    }
}

/// Success path: persist the result, parse directives, persist their
/// payloads. Any store failure downgrades the reply to a failed attempt.
fn apply_reply(
    task_id: &str,
    attempt: u32,
    output: &str,
    store: &Arc<dyn DocStore>,
) -> TaskOutcome {
    let result_doc = match store.write(&result_doc_id(task_id, attempt), output) {
        Ok(doc) => doc,
        Err(e) => {
            return TaskOutcome::Failure {
                reason: format!("failed to persist result: {e}"),
                output: output.to_string(),
                timed_out: false,
            };
        }
    };

    let mut appends = Vec::new();
    for raw in parse_add_context(output) {
        match store.write(&append_doc_id(task_id, &raw.node_id), &raw.content) {
            Ok(doc_ref) => appends.push(AppendDoc {
                node_id: raw.node_id,
                doc_ref,
            }),
            Err(e) => {
                warn!(
                    task = %task_id,
                    node = %raw.node_id,
                    error = %e,
                    "failed to persist directive payload; skipping"
                );
            }
        }
    }

    TaskOutcome::Success {
        result_doc,
        appends,
    }
}
