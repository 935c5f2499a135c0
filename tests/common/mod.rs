// tests/common/mod.rs

#![allow(dead_code)]

pub use taskloom_test_utils::{builders, fake_worker, init_tracing, with_timeout};
