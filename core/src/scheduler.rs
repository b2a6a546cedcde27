//! Scheduler abstraction - the timing substrate of every delay operator.
//!
//! Sequences never reach for an ambient timer. The scheduler is injected when
//! a sequence is observed and handed to every node as the operation tree is
//! opened, so the same pipeline can run on a real clock in production and on
//! virtual time in tests.
//!
//! # Implementations
//!
//! - `TokioScheduler` (runtime crate) - `tokio::time` backed, honours tokio's paused test clock
//! - `VirtualScheduler` (testing crate) - deterministic virtual time advanced by the test

use futures::future::BoxFuture;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Scheduler trait - abstracts time for delayed emission
///
/// # Examples
///
/// ```ignore
/// // Production - real timers
/// let scheduler: SchedulerRef = Arc::new(TokioScheduler::new());
///
/// // Test - virtual time advanced explicitly
/// let scheduler: SchedulerRef = Arc::new(VirtualScheduler::new());
/// ```
pub trait Scheduler: Send + Sync + Debug {
    /// Time elapsed since the scheduler was created
    fn now(&self) -> Duration;

    /// A future that resolves once `duration` has elapsed on this scheduler
    ///
    /// Dropping the future before it resolves cancels the timer.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Shared handle to a scheduler, as passed through an opened operation tree
pub type SchedulerRef = Arc<dyn Scheduler>;
