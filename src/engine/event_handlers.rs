// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, info, warn};

use crate::engine::{DispatchSpec, TaskOutcome};
use crate::errors::TaskloomError;
use crate::types::TaskId;

use super::core::CoreRuntime;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Assemble context for these tasks and hand them to the worker backend.
    DispatchTasks(Vec<DispatchSpec>),
    /// Request that the runtime loop exits (run finished or fully blocked).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Tasks that reached `Failed` in this step (retry budget spent,
    /// cancellation, or a consistency fault at a join).
    pub newly_failed: Vec<TaskId>,
    /// Invariant violations surfaced by this step. Never silently dropped:
    /// the shell logs them and the run report carries them.
    pub faults: Vec<TaskloomError>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreRuntime {
    /// Handle a finished dispatch.
    pub(super) fn handle_task_finished(
        &mut self,
        task_id: TaskId,
        outcome: TaskOutcome,
    ) -> CoreStep {
        let mut newly_failed = Vec::new();

        match outcome {
            TaskOutcome::Success {
                result_doc,
                appends,
            } => {
                match self.graph.mark_completed(&task_id, Some(result_doc.clone())) {
                    Ok(()) => {
                        debug!(task = %task_id, result = %result_doc, "task completed");
                        self.apply_success_effects(&task_id, &result_doc, appends);
                    }
                    Err(e) => {
                        // Late completion of a task that was cancelled or is
                        // unknown; nothing from it may be applied.
                        warn!(task = %task_id, error = %e, "ignoring stale completion");
                    }
                }
            }
            TaskOutcome::Failure {
                reason,
                output,
                timed_out,
            } => {
                self.record_failure(&task_id, reason, output, timed_out, &mut newly_failed);
            }
        }

        self.collect_and_finish(newly_failed, Vec::new())
    }

    /// Handle an external cancellation: the task fails with no attempt
    /// recorded, and the branch node it owns (if any) is abandoned. Nothing
    /// from the cancelled dispatch is ever applied.
    pub(super) fn handle_task_cancelled(&mut self, task_id: TaskId) -> CoreStep {
        let mut newly_failed = Vec::new();

        match self.graph.mark_failed(&task_id, "cancelled externally") {
            Ok(()) => {
                info!(task = %task_id, "task cancelled");
                newly_failed.push(task_id.clone());
                self.abandon_owned_node(&task_id);
            }
            Err(e) => {
                warn!(task = %task_id, error = %e, "ignoring cancellation for non-running task");
            }
        }

        self.collect_and_finish(newly_failed, Vec::new())
    }

    /// Context-tree effects of a successful task.
    fn apply_success_effects(
        &mut self,
        task_id: &str,
        result_doc: &str,
        appends: Vec<crate::exec::directive::AppendDoc>,
    ) {
        // Context-fill results feed the target node directly.
        let target = self
            .graph
            .get(task_id)
            .and_then(|t| t.target_context_node().map(String::from));
        if let Some(target) = target {
            match self.tree.add_doc(&target, result_doc.to_string()) {
                Ok(()) => info!(task = %task_id, node = %target, "context fill applied"),
                Err(e) => warn!(task = %task_id, node = %target, error = %e, "context fill target rejected"),
            }
        }

        // Typed ADD_CONTEXT directives; unknown or inactive nodes are
        // skipped, never fatal.
        for append in appends {
            match self.tree.add_doc(&append.node_id, append.doc_ref.clone()) {
                Ok(()) => {
                    info!(task = %task_id, node = %append.node_id, doc = %append.doc_ref, "discovered context added")
                }
                Err(e) => {
                    warn!(task = %task_id, node = %append.node_id, error = %e, "skipping context directive")
                }
            }
        }

        self.settle_owned_node(task_id);
    }

    /// Terminate the branch node owned by a finished branch task: merged
    /// into the branch point's merge target when one is declared, completed
    /// otherwise.
    fn settle_owned_node(&mut self, task_id: &str) {
        let Some(node_id) = self.branch_owner.get(task_id).cloned() else {
            return;
        };

        let merge_target = self
            .tree
            .branch_point_containing(&node_id)
            .and_then(|bp| bp.merge_target.clone());

        let result = match merge_target {
            Some(target) => self.tree.merge_into(&node_id, &target),
            None => self.tree.complete(&node_id),
        };

        if let Err(e) = result {
            warn!(task = %task_id, node = %node_id, error = %e, "could not settle branch node");
        }
    }

    fn abandon_owned_node(&mut self, task_id: &str) {
        let Some(node_id) = self.branch_owner.get(task_id).cloned() else {
            return;
        };

        if let Err(e) = self.tree.abandon(&node_id) {
            debug!(task = %task_id, node = %node_id, error = %e, "branch node already terminal");
        }
    }

    /// Record a failed attempt and either reset for retry or fail for good.
    fn record_failure(
        &mut self,
        task_id: &str,
        reason: String,
        output: String,
        timed_out: bool,
        newly_failed: &mut Vec<TaskId>,
    ) {
        let max_attempts = self.max_attempts;

        let Some(task) = self.graph.get_mut(task_id) else {
            warn!(task = %task_id, "failure reported for unknown task; ignoring");
            return;
        };
        if task.is_done() {
            warn!(task = %task_id, "ignoring stale failure for terminal task");
            return;
        }

        task.record_attempt(output, reason.clone());
        let attempts = task.attempts.len() as u32;

        if attempts < max_attempts {
            task.reset_for_retry();
            info!(
                task = %task_id,
                attempt = attempts,
                max_attempts,
                timed_out,
                reason = %reason,
                "attempt failed; task re-queued"
            );
        } else {
            let exhausted = TaskloomError::RetryExhausted {
                task: task_id.to_string(),
                cap: max_attempts,
            };
            task.fail(exhausted.to_string());
            warn!(task = %task_id, attempts, timed_out, "retry budget spent; task failed");
            newly_failed.push(task_id.to_string());
            self.abandon_owned_node(task_id);
        }
    }

    /// Collect everything that is now ready, mark it in progress, and close
    /// out the step.
    pub(super) fn collect_and_finish(
        &mut self,
        mut newly_failed: Vec<TaskId>,
        mut faults: Vec<TaskloomError>,
    ) -> CoreStep {
        let dispatches = self.collect_ready(&mut newly_failed, &mut faults);

        let mut commands = Vec::new();
        if !dispatches.is_empty() {
            commands.push(CoreCommand::DispatchTasks(dispatches));
        }

        let mut keep_running = true;
        let stats = self.graph.stats();
        let nothing_running = stats.in_progress == 0;
        if self.options.exit_when_idle && nothing_running && commands.is_empty() {
            // Either every task is terminal, or the remainder is permanently
            // blocked behind failures; no event will ever arrive again.
            keep_running = false;
            commands.push(CoreCommand::RequestExit);
        }

        CoreStep {
            commands,
            newly_failed,
            faults,
            keep_running,
        }
    }

    /// Ready tasks become `InProgress` and turn into dispatch specs.
    ///
    /// A registered join is additionally gated on its branch point: if the
    /// graph says ready but the tree says incomplete, the two structures
    /// have diverged — the join fails with a `ConsistencyFault` instead of
    /// running against a half-settled context.
    fn collect_ready(
        &mut self,
        newly_failed: &mut Vec<TaskId>,
        faults: &mut Vec<TaskloomError>,
    ) -> Vec<DispatchSpec> {
        let ready: Vec<TaskId> = self
            .graph
            .ready_tasks()
            .iter()
            .map(|t| t.id.clone())
            .collect();

        let mut dispatches = Vec::new();

        for task_id in ready {
            if let Some(bp_id) = self.joins.get(&task_id).cloned() {
                match self.tree.is_branch_complete(&bp_id) {
                    Ok(true) => {}
                    Ok(false) => {
                        let detail = format!(
                            "join '{task_id}' is ready in the graph but branch point \
                             '{bp_id}' is incomplete in the context tree"
                        );
                        self.fail_join(&task_id, detail, newly_failed, faults);
                        continue;
                    }
                    Err(e) => {
                        let detail = format!(
                            "join '{task_id}' references unknown branch point '{bp_id}': {e}"
                        );
                        self.fail_join(&task_id, detail, newly_failed, faults);
                        continue;
                    }
                }
            }

            if let Some(spec) = self.start_task(&task_id) {
                dispatches.push(spec);
            }
        }

        dispatches
    }

    fn fail_join(
        &mut self,
        task_id: &str,
        detail: String,
        newly_failed: &mut Vec<TaskId>,
        faults: &mut Vec<TaskloomError>,
    ) {
        let fault = TaskloomError::ConsistencyFault(detail);
        tracing::error!(task = %task_id, %fault, "consistency fault at join");
        if self.graph.mark_failed(task_id, fault.to_string()).is_ok() {
            newly_failed.push(task_id.to_string());
        }
        faults.push(fault);
    }

    /// Mark one ready task `InProgress` and build its dispatch spec.
    fn start_task(&mut self, task_id: &str) -> Option<DispatchSpec> {
        let (subject, description, kind, context_ref, attempt, attempt_notes) = {
            let task = self.graph.get(task_id)?;
            (
                task.subject.clone(),
                task.description.clone(),
                task.kind.clone(),
                task.context_ref.clone(),
                task.current_attempt(),
                task.attempt_notes(),
            )
        };

        let context_refs = context_ref
            .as_deref()
            .map(|node| self.tree.get_docs(node))
            .unwrap_or_default();

        let dep_results_of = self.graph.dependencies_of(task_id);

        self.graph.get_mut(task_id)?.start();

        debug!(
            task = %task_id,
            attempt,
            docs = context_refs.len(),
            deps = dep_results_of.len(),
            "task dispatched"
        );

        Some(DispatchSpec {
            task_id: task_id.to_string(),
            subject,
            description,
            kind,
            attempt,
            context_refs,
            dep_results_of,
            attempt_notes,
        })
    }
}
