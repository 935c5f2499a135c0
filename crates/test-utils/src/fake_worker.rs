use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use taskloom::exec::{WorkOrder, Worker, WorkerReply};

/// One scripted reply for a fake dispatch.
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// Worker succeeds with this output.
    Success(String),
    /// Worker reports failure with this output.
    Failure(String),
    /// Worker errors out at the infrastructure level.
    Error(String),
    /// Worker never completes; only a deadline or cancellation ends it.
    Hang,
}

impl FakeReply {
    pub fn success(output: impl Into<String>) -> Self {
        FakeReply::Success(output.into())
    }

    pub fn failure(output: impl Into<String>) -> Self {
        FakeReply::Failure(output.into())
    }
}

/// A fake worker that:
/// - records every order it performs, in arrival order
/// - replies per task id from a script, falling back to success.
#[derive(Default)]
pub struct FakeWorker {
    performed: Mutex<Vec<WorkOrder>>,
    scripts: Mutex<HashMap<String, VecDeque<FakeReply>>>,
}

impl FakeWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arc-wrapped, ready to hand to the runtime.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Queue replies for a task; each dispatch consumes one. Once the
    /// queue is empty the worker falls back to a generic success.
    pub fn script(&self, task_id: &str, replies: impl IntoIterator<Item = FakeReply>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(task_id.to_string())
            .or_default()
            .extend(replies);
    }

    /// Task ids in the order they were performed.
    pub fn performed(&self) -> Vec<String> {
        self.performed
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.task_id.clone())
            .collect()
    }

    /// Full work orders, for asserting on assembled context.
    pub fn orders(&self) -> Vec<WorkOrder> {
        self.performed.lock().unwrap().clone()
    }

    /// How many times a task was dispatched.
    pub fn dispatch_count(&self, task_id: &str) -> usize {
        self.performed
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.task_id == task_id)
            .count()
    }

    fn next_reply(&self, task_id: &str) -> Option<FakeReply> {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(task_id)
            .and_then(|q| q.pop_front())
    }
}

impl Worker for FakeWorker {
    fn perform(
        &self,
        order: WorkOrder,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WorkerReply>> + Send + '_>> {
        let task_id = order.task_id.clone();
        let subject = order.subject.clone();
        self.performed.lock().unwrap().push(order);

        let reply = self.next_reply(&task_id);

        Box::pin(async move {
            match reply {
                Some(FakeReply::Success(output)) => Ok(WorkerReply {
                    success: true,
                    output,
                }),
                Some(FakeReply::Failure(output)) => Ok(WorkerReply {
                    success: false,
                    output,
                }),
                Some(FakeReply::Error(msg)) => Err(anyhow::anyhow!(msg)),
                Some(FakeReply::Hang) => std::future::pending().await,
                None => Ok(WorkerReply {
                    success: true,
                    output: format!("Completed: {subject}"),
                }),
            }
        })
    }
}
