//! Deterministic virtual time.
//!
//! [`VirtualScheduler`] is a clock that only moves when told to, plus a queue
//! of pending timers ordered by deadline and then by registration order.
//! [`VirtualExecutor`] runs observations on a single-threaded pool and moves
//! the clock from one deadline to the next, running every ready task to a
//! standstill in between.
//!
//! Three delayed sequences racing each other therefore always produce the
//! same interleaving, and a pipeline that takes 300ms of virtual time
//! finishes instantly.
//!
//! # Example
//!
//! ```
//! use composable_streams_core::Flux;
//! use composable_streams_testing::VirtualExecutor;
//! use std::time::Duration;
//!
//! let mut executor = VirtualExecutor::new();
//! let flux = Flux::from_iter(["A", "B", "C"]).delay_elements(Duration::from_millis(100));
//!
//! let values = executor.collect(flux);
//! assert_eq!(values, Ok(vec!["A", "B", "C"]));
//! assert_eq!(executor.now(), Duration::from_millis(300));
//! ```

use composable_streams_core::subscription::observe;
use composable_streams_core::{Element, Flux, Scheduler, SchedulerRef, SequenceError, Subscriber, Subscription};
use futures::executor::LocalPool;
use futures::future::{BoxFuture, FutureExt};
use futures::task::{AtomicWaker, LocalSpawnExt};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

type TimerKey = (Duration, u64);

#[derive(Debug, Default)]
struct TimerState {
    fired: AtomicBool,
    waker: AtomicWaker,
}

#[derive(Debug, Default)]
struct Clock {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerKey, Arc<TimerState>>,
}

/// Virtual clock and timer queue
///
/// Clones share the same clock.
#[derive(Debug, Clone, Default)]
pub struct VirtualScheduler {
    clock: Arc<Mutex<Clock>>,
}

impl VirtualScheduler {
    /// Create a scheduler at virtual time zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of timers waiting to fire
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.lock().timers.len()
    }

    /// Deadline of the earliest pending timer
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.lock().timers.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Move the clock to `at` and fire every timer due by then
    ///
    /// Timers fire in (deadline, registration) order. The clock never moves
    /// backwards. Returns the number of timers fired.
    pub fn fire_due(&self, at: Duration) -> usize {
        let due: Vec<Arc<TimerState>> = {
            let mut clock = self.lock();
            clock.now = clock.now.max(at);
            let now = clock.now;
            let later = clock.timers.split_off(&(now, u64::MAX));
            std::mem::replace(&mut clock.timers, later).into_values().collect()
        };
        for timer in &due {
            timer.fired.store(true, Ordering::Release);
            timer.waker.wake();
        }
        if !due.is_empty() {
            tracing::trace!(now_ms = at.as_millis(), fired = due.len(), "Virtual timers fired");
        }
        due.len()
    }
}

impl Scheduler for VirtualScheduler {
    fn now(&self) -> Duration {
        self.lock().now
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        if duration.is_zero() {
            return Box::pin(futures::future::ready(()));
        }
        let state = Arc::new(TimerState::default());
        let key = {
            let mut clock = self.lock();
            let key = (clock.now + duration, clock.next_id);
            clock.next_id += 1;
            clock.timers.insert(key, Arc::clone(&state));
            key
        };
        Box::pin(VirtualSleep {
            scheduler: self.clone(),
            key,
            state,
        })
    }
}

/// Pending virtual timer; dropping it unregisters the timer
struct VirtualSleep {
    scheduler: VirtualScheduler,
    key: TimerKey,
    state: Arc<TimerState>,
}

impl Future for VirtualSleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.state.waker.register(cx.waker());
        if self.state.fired.load(Ordering::Acquire) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for VirtualSleep {
    fn drop(&mut self) {
        if !self.state.fired.load(Ordering::Acquire) {
            self.scheduler.lock().timers.remove(&self.key);
        }
    }
}

/// Single-threaded executor driven by virtual time
///
/// Nothing runs between calls: every method runs ready tasks until they
/// stall, and only [`advance_by`](Self::advance_by),
/// [`advance_to`](Self::advance_to), [`run`](Self::run) and the blocking
/// helpers move the clock.
pub struct VirtualExecutor {
    pool: LocalPool,
    scheduler: VirtualScheduler,
    live: Rc<Cell<usize>>,
}

impl VirtualExecutor {
    /// Create an executor with a fresh clock at zero
    #[must_use]
    pub fn new() -> Self {
        Self::with_scheduler(VirtualScheduler::new())
    }

    /// Create an executor driving an existing clock
    #[must_use]
    pub fn with_scheduler(scheduler: VirtualScheduler) -> Self {
        Self {
            pool: LocalPool::new(),
            scheduler,
            live: Rc::new(Cell::new(0)),
        }
    }

    /// The virtual clock
    #[must_use]
    pub const fn scheduler(&self) -> &VirtualScheduler {
        &self.scheduler
    }

    /// The virtual clock as a shared scheduler handle
    #[must_use]
    pub fn scheduler_ref(&self) -> SchedulerRef {
        Arc::new(self.scheduler.clone())
    }

    /// Current virtual time
    #[must_use]
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// Number of spawned observations that have not finished
    #[must_use]
    pub fn live_observations(&self) -> usize {
        self.live.get()
    }

    /// Start observing `sequence` on the pool
    ///
    /// The observation makes progress on the next call that runs the pool.
    pub fn observe<T, S>(&mut self, sequence: impl Into<Flux<T>>, subscriber: S) -> Subscription
    where
        T: Element,
        S: Subscriber<T> + 'static,
    {
        let (subscription, observation) = observe(sequence, &self.scheduler_ref(), subscriber);
        let live = Rc::clone(&self.live);
        live.set(live.get() + 1);
        let spawned = self.pool.spawner().spawn_local(async move {
            let state = observation.await;
            tracing::trace!(state = %state, "Virtual observation finished");
            live.set(live.get() - 1);
        });
        if let Err(error) = spawned {
            tracing::error!(error = %error, "Failed to spawn virtual observation");
        }
        subscription
    }

    /// Run every ready task until none can make progress, without moving time
    pub fn run_until_idle(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Advance the clock by `duration`, firing due timers in order
    pub fn advance_by(&mut self, duration: Duration) {
        let target = self.now() + duration;
        self.advance_to(target);
    }

    /// Advance the clock to `target`, firing due timers in order
    ///
    /// Tasks run to a standstill after each deadline, so work scheduled by
    /// one timer can register (and see fire) a later timer within the same
    /// call.
    pub fn advance_to(&mut self, target: Duration) {
        self.run_until_idle();
        while let Some(deadline) = self.scheduler.next_deadline() {
            if deadline > target {
                break;
            }
            self.scheduler.fire_due(deadline);
            self.run_until_idle();
        }
        self.scheduler.fire_due(target);
        self.run_until_idle();
    }

    /// Run spawned observations until they finish or nothing is left to fire
    ///
    /// Returns the virtual time reached. An observation of an infinite
    /// timer-driven sequence keeps this running, so cancel it first or use
    /// [`advance_by`](Self::advance_by).
    pub fn run(&mut self) -> Duration {
        self.run_until_idle();
        while self.live.get() > 0 {
            let Some(deadline) = self.scheduler.next_deadline() else {
                break;
            };
            self.scheduler.fire_due(deadline);
            self.run_until_idle();
        }
        self.now()
    }

    /// Drive `future` to completion on virtual time
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::Stalled`] if the future cannot finish: no task
    /// can make progress and no timer is pending.
    pub fn block_on<F>(&mut self, future: F) -> Result<F::Output, SequenceError>
    where
        F: Future + 'static,
    {
        let mut handle = self
            .pool
            .spawner()
            .spawn_local_with_handle(future)
            .map_err(|error| SequenceError::failed(format!("spawn failed: {error}")))?;

        loop {
            self.run_until_idle();
            if let Some(output) = (&mut handle).now_or_never() {
                return Ok(output);
            }
            let Some(deadline) = self.scheduler.next_deadline() else {
                tracing::debug!(now_ms = self.now().as_millis(), "Virtual executor stalled");
                return Err(SequenceError::Stalled);
            };
            self.scheduler.fire_due(deadline);
        }
    }

    /// Observe `sequence` to completion and collect its values
    ///
    /// # Errors
    ///
    /// Returns the sequence's error signal, or [`SequenceError::Stalled`] if
    /// it never terminates.
    pub fn collect<T: Element>(&mut self, sequence: impl Into<Flux<T>>) -> Result<Vec<T>, SequenceError> {
        let flux = sequence.into();
        let scheduler = self.scheduler_ref();
        self.block_on(async move { flux.to_vec(&scheduler).await })?
    }
}

impl Default for VirtualExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VirtualExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualExecutor")
            .field("now", &self.now())
            .field("pending_timers", &self.scheduler.pending_timers())
            .field("live_observations", &self.live.get())
            .finish_non_exhaustive()
    }
}
