//! Tokio-backed scheduler.

use composable_streams_core::scheduler::Scheduler;
use futures::future::BoxFuture;
use std::time::Duration;

/// Scheduler using `tokio::time`
///
/// `now` is measured from construction. Because it relies on
/// `tokio::time`, it follows tokio's paused clock in
/// `#[tokio::test(start_paused = true)]` tests.
#[derive(Debug, Clone, Copy)]
pub struct TokioScheduler {
    origin: tokio::time::Instant,
}

impl TokioScheduler {
    /// Create a scheduler whose clock starts now
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}
