// src/config/mod.rs

//! Configuration for the scheduler's own knobs.
//!
//! Task graphs and context trees are built programmatically (see
//! [`crate::plan`]); the TOML file only carries runtime parameters:
//! retry budget, worker deadline, dispatch buffering, the abandoned-branch
//! policy, and optional pre-dispatch search.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, RawConfigFile, SchedulerConfig, SearchConfig};
