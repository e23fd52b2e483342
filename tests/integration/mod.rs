//! Integration tests for the Courier request orchestration engine

mod abort_cancellation;
mod config_integration;
mod debounce_watch;
mod orchestrator_lifecycle;

pub use test_utils::{with_env, MockTransport};
