// src/exec/mod.rs

//! Worker execution layer.
//!
//! This module owns everything between the scheduler core and the external
//! worker collaborator:
//!
//! - [`backend`] provides the [`Worker`] collaborator trait, the
//!   [`WorkerBackend`] abstraction the runtime dispatches through, and the
//!   production [`ChannelWorkerBackend`]. Tests swap in fakes.
//! - [`worker_loop`] owns the in-flight dispatches: per-task cancellation
//!   handles, deadline enforcement, result-document writes and boundary
//!   parsing of worker output.
//! - [`directive`] parses `ADD_CONTEXT` blocks into typed commands so raw
//!   tagged text never reaches the core.

pub mod backend;
pub mod directive;
pub mod worker_loop;

pub use backend::{
    CancelHandle, ChannelWorkerBackend, ContextDoc, WorkOrder, Worker, WorkerBackend, WorkerReply,
};
pub use directive::{AppendDoc, parse_add_context};
