// src/lib.rs

pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod logging;
pub mod plan;
pub mod search;
pub mod store;
pub mod types;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::config::ConfigFile;
use crate::engine::{CoreRuntime, RunReport, Runtime, RuntimeEvent, RuntimeOptions};
use crate::errors::Result;
use crate::exec::{ChannelWorkerBackend, Worker};
use crate::plan::ExecutionPlan;
use crate::search::SearchIndex;
use crate::store::DocStore;

/// High-level entry point: run a plan to completion.
///
/// This wires together:
/// - plan materialization (task graph + context tree + join registry)
/// - the pure scheduler core and its async IO shell
/// - the background worker loop with deadline enforcement
///
/// The runtime exits once every task is terminal or permanently blocked,
/// and returns a [`RunReport`] with final statistics, failures and any
/// consistency faults.
pub async fn run_plan(
    plan: &ExecutionPlan,
    cfg: &ConfigFile,
    worker: Arc<dyn Worker>,
    store: Arc<dyn DocStore>,
    search: Option<Arc<dyn SearchIndex>>,
) -> Result<RunReport> {
    let materialized = plan.materialize(cfg.scheduler.abandoned_branches)?;

    info!(
        tasks = materialized.graph.stats().total,
        joins = materialized.joins.len(),
        "plan materialized"
    );

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    // Background worker loop behind the channel backend.
    let backend = ChannelWorkerBackend::new(
        rt_tx.clone(),
        worker,
        Arc::clone(&store),
        cfg.scheduler.worker_deadline(),
        cfg.scheduler.dispatch_buffer,
    );

    let options = RuntimeOptions {
        exit_when_idle: true,
    };

    // Pure core (single source of truth for semantics) + async IO shell.
    let core = CoreRuntime::new(materialized, &cfg.scheduler, options);
    let runtime = Runtime::new(core, rt_rx, backend, store, search, cfg.search.clone());

    runtime.run().await
}
