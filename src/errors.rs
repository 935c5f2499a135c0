// src/errors.rs

//! Crate-wide error taxonomy and helpers.
//!
//! Structural errors (`CycleDetected`, `InvalidTransition`, `NotFound`,
//! `AlreadyExists`) are synchronous return values and never mutate state on
//! failure. Execution errors (worker failures, deadlines) are recorded as
//! task attempts and drive bounded retry; they only surface here once the
//! retry budget is spent.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskloomError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Cycle detected in task graph: {0}")]
    CycleDetected(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Worker deadline exceeded for task '{task}' after {secs}s")]
    Timeout { task: String, secs: u64 },

    #[error("Task '{task}' exhausted its {cap} attempts")]
    RetryExhausted { task: String, cap: u32 },

    #[error("Consistency fault: {0}")]
    ConsistencyFault(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskloomError>;
