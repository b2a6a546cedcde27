//! # Composable Streams Testing
//!
//! Testing utilities for sequences built with `composable-streams-core`.
//!
//! This crate provides:
//! - [`VirtualScheduler`] and [`VirtualExecutor`]: deterministic virtual time
//! - [`StepVerifier`]: fluent, ordered expectations over one observation
//! - [`RecordingSubscriber`] and [`RecordingHook`]: signal recorders
//! - [`properties`]: proptest strategies for sequence inputs
//!
//! ## Example
//!
//! ```
//! use composable_streams_core::Flux;
//! use composable_streams_testing::StepVerifier;
//! use std::time::Duration;
//!
//! let first = Flux::from_iter(["A", "B", "C"]).delay_elements(Duration::from_millis(100));
//! let second = Flux::from_iter(["D", "E", "F"]).delay_elements(Duration::from_millis(125));
//!
//! StepVerifier::create(first.merge_with(second))
//!     .expect_next_sequence(["A", "D", "B", "E", "C", "F"])
//!     .verify_complete();
//! ```

pub mod mocks;
pub mod step_verifier;
pub mod virtual_time;

pub use mocks::{Recorded, RecordingHook, RecordingSubscriber};
pub use step_verifier::StepVerifier;
pub use virtual_time::{VirtualExecutor, VirtualScheduler};

use composable_streams_runtime::{Runtime, RuntimeConfig};

/// Property-based testing strategies
///
/// Inputs shaped for sequence laws: short value lists and per-element
/// delays small enough to keep virtual runs cheap.
pub mod properties {
    use proptest::prelude::*;
    use std::time::Duration;

    /// Lists of up to `max_len` arbitrary values
    pub fn values<T: Arbitrary>(max_len: usize) -> impl Strategy<Value = Vec<T>> {
        prop::collection::vec(any::<T>(), 0..=max_len)
    }

    /// Per-element delays between 1ms and `max_millis`
    pub fn delay(max_millis: u64) -> impl Strategy<Value = Duration> {
        (1..=max_millis.max(1)).prop_map(Duration::from_millis)
    }

    /// Lists of lower-case ASCII names, one to eight letters each
    pub fn names(max_len: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-z]{1,8}", 0..=max_len)
    }
}

/// Runtime for tests: metrics off, short shutdown timeout
#[must_use]
pub fn test_runtime() -> Runtime {
    Runtime::with_config(
        RuntimeConfig::default()
            .with_metrics_enabled(false)
            .with_shutdown_timeout(std::time::Duration::from_secs(1)),
    )
}

/// Install a `tracing` subscriber writing through the test harness
///
/// Honours `RUST_LOG`. Calling it more than once is harmless.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
