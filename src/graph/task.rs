// src/graph/task.rs

//! Task entity and per-task state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{DocRef, NodeId, TaskId};

/// Task kind distinguishing context preparation from actual work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Context fill task: its result document is appended to the target
    /// context node so downstream tasks inherit it.
    ContextFill { target_node: NodeId },
    /// Worker task: actual implementation work.
    #[default]
    Worker,
}

/// Record of one failed attempt, kept for retry-aware prompting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_num: u32,
    pub output: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(attempt_num: u32, output: String, reason: String) -> Self {
        Self {
            attempt_num,
            output,
            reason,
            timestamp: Utc::now(),
        }
    }

    /// Format this attempt as context for the next one.
    pub fn as_context(&self) -> String {
        format!(
            "## Previous attempt #{} ({})\n\n### Output:\n{}\n\n### Failure:\n{}\n",
            self.attempt_num,
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.output,
            self.reason
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed { reason: String },
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

/// One unit of work in the task graph.
///
/// Owned by the scheduler core; all mutation goes through
/// [`crate::engine::CoreRuntime`]'s single mutation point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub subject: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub kind: TaskKind,
    /// Context node whose documents this task loads before running.
    pub context_ref: Option<NodeId>,
    /// Result document written on successful completion.
    pub result_doc: Option<DocRef>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Previous failed attempts, oldest first.
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
}

impl Task {
    pub fn new(subject: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: format!("task-{}", short_uuid()),
            subject: subject.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            kind: TaskKind::Worker,
            context_ref: None,
            result_doc: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            attempts: vec![],
        }
    }

    /// Create a context fill task targeting a context node.
    pub fn new_context_fill(
        subject: impl Into<String>,
        description: impl Into<String>,
        target_node: impl Into<NodeId>,
    ) -> Self {
        let mut task = Self::new(subject, description);
        task.id = format!("ctx-fill-{}", short_uuid());
        task.kind = TaskKind::ContextFill {
            target_node: target_node.into(),
        };
        task
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_context_ref(mut self, context_ref: impl Into<NodeId>) -> Self {
        self.context_ref = Some(context_ref.into());
        self
    }

    pub fn is_context_fill(&self) -> bool {
        matches!(self.kind, TaskKind::ContextFill { .. })
    }

    /// Target context node, for context fill tasks.
    pub fn target_context_node(&self) -> Option<&str> {
        match &self.kind {
            TaskKind::ContextFill { target_node } => Some(target_node),
            TaskKind::Worker => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, TaskStatus::Pending)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self.status, TaskStatus::InProgress)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, TaskStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, TaskStatus::Failed { .. })
    }

    /// Terminal either way.
    pub fn is_done(&self) -> bool {
        self.is_completed() || self.is_failed()
    }

    pub(crate) fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn complete(&mut self, result_doc: Option<DocRef>) {
        self.status = TaskStatus::Completed;
        self.result_doc = result_doc;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Failed {
            reason: reason.into(),
        };
        self.completed_at = Some(Utc::now());
    }

    /// Record a failed attempt for retry learning.
    pub(crate) fn record_attempt(&mut self, output: String, reason: String) {
        let attempt_num = self.attempts.len() as u32 + 1;
        self.attempts
            .push(AttemptRecord::new(attempt_num, output, reason));
    }

    /// Current attempt number (1-based).
    pub fn current_attempt(&self) -> u32 {
        self.attempts.len() as u32 + 1
    }

    /// Prior-attempt notes for retry-aware prompting, oldest first.
    pub fn attempt_notes(&self) -> Vec<String> {
        self.attempts.iter().map(|a| a.as_context()).collect()
    }

    /// Reset for retry (keeps attempt history).
    pub(crate) fn reset_for_retry(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.result_doc = None;
    }
}

fn short_uuid() -> String {
    // First group of a v4 UUID is plenty for in-process ids.
    Uuid::new_v4()
        .to_string()
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_lifecycle() {
        let mut task = Task::new("Test task", "Do something");
        assert!(task.is_pending());
        assert_eq!(task.current_attempt(), 1);

        task.start();
        assert!(task.is_in_progress());
        assert!(task.started_at.is_some());

        task.complete(Some("results/test.md".to_string()));
        assert!(task.is_completed());
        assert!(task.is_done());
        assert_eq!(task.result_doc.as_deref(), Some("results/test.md"));
    }

    #[test]
    fn retry_keeps_attempt_history() {
        let mut task = Task::new("Flaky", "");
        task.start();
        task.record_attempt("partial output".into(), "worker failed".into());
        task.reset_for_retry();

        assert!(task.is_pending());
        assert_eq!(task.attempts.len(), 1);
        assert_eq!(task.current_attempt(), 2);
        assert!(task.attempt_notes()[0].contains("attempt #1"));
    }

    #[test]
    fn context_fill_target() {
        let task = Task::new_context_fill("Fill", "", "ctx-auth");
        assert!(task.is_context_fill());
        assert_eq!(task.target_context_node(), Some("ctx-auth"));
    }
}
