// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::types::AbandonedBranchPolicy;

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Maximum attempts per task before it is marked `Failed` with a
    /// retry-exhausted reason. Must be >= 1.
    pub max_attempts: u32,
    /// Deadline for a single worker dispatch, in seconds. A dispatch that
    /// outlives this is recorded as a failed attempt.
    pub worker_deadline_secs: u64,
    /// Buffer size of the work-order channel into the worker loop.
    pub dispatch_buffer: usize,
    /// How `is_branch_complete` treats abandoned branches.
    pub abandoned_branches: AbandonedBranchPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            worker_deadline_secs: 300,
            dispatch_buffer: 32,
            abandoned_branches: AbandonedBranchPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn worker_deadline(&self) -> Duration {
        Duration::from_secs(self.worker_deadline_secs)
    }
}

/// `[search]` section: optional pre-dispatch document discovery.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Whether to query the search index before each dispatch.
    pub enabled: bool,
    /// Maximum auto-discovered documents prepended to a task's context.
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_results: 5,
        }
    }
}

/// Raw deserialized config, prior to semantic validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfigFile {
    pub scheduler: SchedulerConfig,
    pub search: SearchConfig,
}

/// Validated configuration.
///
/// Constructed via `TryFrom<RawConfigFile>` (see [`super::validate`]) so
/// that invalid values cannot leak past loading.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub scheduler: SchedulerConfig,
    pub search: SearchConfig,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(scheduler: SchedulerConfig, search: SearchConfig) -> Self {
        Self { scheduler, search }
    }
}
