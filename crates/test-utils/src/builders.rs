#![allow(dead_code)]

use taskloom::config::{ConfigFile, RawConfigFile};
use taskloom::plan::{ExecutionPlan, PlanBuilder};

/// Linear chain plan: each task depends on the previous one.
pub fn chain_plan(ids: &[&str]) -> ExecutionPlan {
    let mut builder = PlanBuilder::new();
    for id in ids {
        builder = builder.task(id, &format!("Task {id}"), "");
    }
    for pair in ids.windows(2) {
        builder = builder.dependency(pair[0], pair[1]);
    }
    builder.build().expect("chain plan is valid")
}

/// Diamond: `start` forks into the branches, which join into `merge`.
pub fn fork_join_plan(branches: &[&str]) -> ExecutionPlan {
    let mut builder = PlanBuilder::new()
        .root_docs(&["docs/spec.md"])
        .task("start", "Start", "");
    for branch in branches {
        builder = builder.task(branch, &format!("Branch {branch}"), "");
    }
    builder
        .task("merge", "Merge", "")
        .fork("start", branches, Some("cache/shared.md"))
        .join(branches, "merge")
        .build()
        .expect("fork/join plan is valid")
}

/// Config with a custom attempt budget and worker deadline.
pub fn config_with(max_attempts: u32, deadline_secs: u64) -> ConfigFile {
    let raw: RawConfigFile = toml_like(max_attempts, deadline_secs);
    ConfigFile::try_from(raw).expect("test config is valid")
}

fn toml_like(max_attempts: u32, deadline_secs: u64) -> RawConfigFile {
    let mut raw = RawConfigFile::default();
    raw.scheduler.max_attempts = max_attempts;
    raw.scheduler.worker_deadline_secs = deadline_secs;
    raw
}
