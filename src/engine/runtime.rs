// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::SearchConfig;
use crate::errors::Result;
use crate::exec::{ContextDoc, WorkOrder, WorkerBackend};
use crate::graph::GraphStats;
use crate::search::SearchIndex;
use crate::store::DocStore;
use crate::types::TaskId;

use super::core::CoreRuntime;
use super::event_handlers::CoreCommand;
use super::{DispatchSpec, RuntimeEvent};

/// Summary of a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub stats: GraphStats,
    /// Failed tasks with their terminal reasons.
    pub failed: Vec<(TaskId, String)>,
    /// Consistency faults surfaced during the run.
    pub faults: Vec<String>,
}

/// Drives the scheduler core in response to `RuntimeEvent`s and delegates
/// dispatching to a [`WorkerBackend`].
///
/// This is a pure IO shell around [`CoreRuntime`], which contains all the
/// scheduling semantics. The shell reads events from the channel, resolves
/// document references into content, and hands assembled work orders to the
/// backend.
pub struct Runtime<B: WorkerBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    backend: B,
    store: Arc<dyn DocStore>,
    search: Option<Arc<dyn SearchIndex>>,
    search_cfg: SearchConfig,
    faults: Vec<String>,
}

impl<B: WorkerBackend> fmt::Debug for Runtime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<B: WorkerBackend> Runtime<B> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        backend: B,
        store: Arc<dyn DocStore>,
        search: Option<Arc<dyn SearchIndex>>,
        search_cfg: SearchConfig,
    ) -> Self {
        Self {
            core,
            event_rx,
            backend,
            store,
            search,
            search_cfg,
            faults: Vec::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Seeds the run by dispatching everything initially ready.
    /// - Consumes `RuntimeEvent`s and feeds them into the pure core.
    /// - Executes the commands returned by the core.
    pub async fn run(mut self) -> Result<RunReport> {
        info!("taskloom runtime started");

        let step = self.core.start();
        let mut keep_running = step.keep_running;
        self.execute_step(step).await?;

        while keep_running {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            keep_running = step.keep_running;
            self.execute_step(step).await?;
        }

        info!("runtime exiting");
        Ok(self.report())
    }

    async fn execute_step(&mut self, step: super::event_handlers::CoreStep) -> Result<()> {
        for fault in &step.faults {
            error!(%fault, "core reported consistency fault");
            self.faults.push(fault.to_string());
        }

        for task in &step.newly_failed {
            warn!(task = %task, "task reached terminal failure");
        }

        for command in step.commands {
            self.execute_command(command).await?;
        }

        Ok(())
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(specs) => {
                let orders: Vec<WorkOrder> =
                    specs.iter().map(|spec| self.assemble_order(spec)).collect();

                let ids: Vec<_> = orders.iter().map(|o| o.task_id.as_str()).collect();
                debug!(?ids, "dispatching assembled work orders");

                self.backend.dispatch(orders).await?;
            }
            CoreCommand::RequestExit => {
                info!("core requested exit");
            }
        }
        Ok(())
    }

    /// Resolve a dispatch spec into a full work order: auto-discovered
    /// documents first, then the context tree's reading list, then
    /// dependency results. Unreadable references are skipped with a
    /// warning rather than failing the dispatch.
    fn assemble_order(&self, spec: &DispatchSpec) -> WorkOrder {
        let mut context = Vec::new();

        if let Some(search) = self.search.as_ref().filter(|_| self.search_cfg.enabled) {
            match search.query(&spec.subject, self.search_cfg.max_results) {
                Ok(hits) => {
                    for hit in hits {
                        self.push_doc(&mut context, &hit.doc_ref);
                    }
                }
                Err(e) => warn!(task = %spec.task_id, error = %e, "search query failed"),
            }
        }

        for doc_ref in &spec.context_refs {
            self.push_doc(&mut context, doc_ref);
        }

        for dep in &spec.dep_results_of {
            match self.store.latest_result_for(dep) {
                Ok(Some(content)) => context.push(ContextDoc {
                    source: format!("result:{dep}"),
                    content,
                }),
                Ok(None) => debug!(task = %spec.task_id, dep = %dep, "dependency has no result document"),
                Err(e) => warn!(task = %spec.task_id, dep = %dep, error = %e, "could not load dependency result"),
            }
        }

        WorkOrder::from_spec(spec, context)
    }

    fn push_doc(&self, context: &mut Vec<ContextDoc>, doc_ref: &str) {
        if context.iter().any(|d| d.source == doc_ref) {
            return;
        }
        match self.store.read(doc_ref) {
            Ok(content) => context.push(ContextDoc {
                source: doc_ref.to_string(),
                content,
            }),
            Err(e) => warn!(doc = %doc_ref, error = %e, "skipping unreadable document"),
        }
    }

    fn report(&self) -> RunReport {
        let failed = self
            .core
            .graph()
            .tasks()
            .filter_map(|t| match &t.status {
                crate::graph::TaskStatus::Failed { reason } => {
                    Some((t.id.clone(), reason.clone()))
                }
                _ => None,
            })
            .collect();

        RunReport {
            stats: self.core.graph().stats(),
            failed,
            faults: self.faults.clone(),
        }
    }
}
