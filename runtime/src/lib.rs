//! # Composable Streams Runtime
//!
//! Tokio runtime for Composable Streams.
//!
//! This crate runs observations of lazy sequences as tokio tasks and supplies
//! the production scheduler their delay operators use.
//!
//! ## Core Components
//!
//! - **Runtime**: Spawns observations, tracks them, and shuts down gracefully
//! - **`TokioScheduler`**: `tokio::time` backed [`Scheduler`](composable_streams_core::Scheduler)
//! - **Metrics**: Prometheus counters for observation lifecycles
//!
//! ## Example
//!
//! ```no_run
//! use composable_streams_core::{CallbackSubscriber, Flux};
//! use composable_streams_runtime::Runtime;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), composable_streams_runtime::error::RuntimeError> {
//! let runtime = Runtime::new();
//!
//! let names = Flux::from_iter(["alex", "ben", "chloe"])
//!     .map(str::to_uppercase)
//!     .delay_elements(Duration::from_millis(100));
//!
//! let handle = runtime.observe(names, CallbackSubscriber::new(|name: String| println!("{name}")))?;
//! handle.wait().await?;
//!
//! runtime.shutdown(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Prometheus metrics for observability
pub mod metrics;

/// Tokio-backed scheduler
pub mod scheduler;

pub use runtime::{ObservationHandle, Runtime};
pub use scheduler::TokioScheduler;

/// Error types for the runtime
pub mod error {
    use composable_streams_core::SequenceError;
    use thiserror::Error;

    /// Errors that can occur during runtime operations
    #[derive(Error, Debug)]
    pub enum RuntimeError {
        /// The runtime is shutting down and not accepting new observations
        #[error("Runtime is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for observations to finish
        ///
        /// The observations still running were cancelled.
        #[error("Shutdown timed out with {0} observations still running")]
        ShutdownTimeout(usize),

        /// The observed sequence terminated with an error
        #[error(transparent)]
        Sequence(#[from] SequenceError),

        /// An observation task failed to complete
        ///
        /// This typically means a subscriber callback panicked.
        #[error("Observation task failed: {0}")]
        TaskFailed(#[from] tokio::task::JoinError),

        /// `observe` was called outside a tokio runtime
        #[error("No tokio runtime available: {0}")]
        NoTokioRuntime(String),
    }
}

use error::RuntimeError;

/// Runtime configuration
///
/// # Example
///
/// ```
/// use composable_streams_runtime::RuntimeConfig;
/// use std::time::Duration;
///
/// let config = RuntimeConfig::default()
///     .with_shutdown_timeout(Duration::from_secs(5))
///     .with_metrics_enabled(false)
///     .with_observation_name("names");
/// assert_eq!(config.observation_name, "names");
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Default timeout for graceful shutdown
    pub shutdown_timeout: Duration,
    /// Whether observations record Prometheus metrics
    pub metrics_enabled: bool,
    /// Name attached to the tracing span of every observation
    pub observation_name: &'static str,
}

impl RuntimeConfig {
    /// Create a configuration with custom values
    #[must_use]
    pub const fn new(shutdown_timeout: Duration, metrics_enabled: bool, observation_name: &'static str) -> Self {
        Self {
            shutdown_timeout,
            metrics_enabled,
            observation_name,
        }
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enable or disable metrics recording
    #[must_use]
    pub const fn with_metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Set the name used in observation spans
    #[must_use]
    pub const fn with_observation_name(mut self, name: &'static str) -> Self {
        self.observation_name = name;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
            metrics_enabled: true,
            observation_name: "flux",
        }
    }
}

/// Guard that keeps an observation counted while its task is alive
///
/// Decrements on drop, so an aborted or panicking task is still accounted for.
struct ActiveObservationGuard {
    active: Arc<AtomicUsize>,
    metrics_enabled: bool,
}

impl ActiveObservationGuard {
    fn new(active: &Arc<AtomicUsize>, metrics_enabled: bool) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        if metrics_enabled {
            crate::metrics::ObservationMetrics::record_started();
        }
        Self {
            active: Arc::clone(active),
            metrics_enabled,
        }
    }
}

impl Drop for ActiveObservationGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.metrics_enabled {
            crate::metrics::ObservationMetrics::record_released();
        }
    }
}

/// Runtime module - runs observations on tokio tasks
pub mod runtime {
    use super::{ActiveObservationGuard, Arc, AtomicUsize, Duration, Ordering, RuntimeConfig, RuntimeError};
    use crate::metrics::ObservationMetrics;
    use crate::scheduler::TokioScheduler;
    use composable_streams_core::subscription::{Subscription, SubscriptionState, observe};
    use composable_streams_core::{Element, Flux, Mono, SchedulerRef, Subscriber};
    use std::sync::atomic::AtomicBool;
    use std::sync::{Mutex, PoisonError};
    use tokio::task::JoinHandle;
    use tracing::Instrument;

    /// Handle to an observation running on the runtime
    ///
    /// Dropping the handle does not cancel the observation; call
    /// [`cancel`](Self::cancel) for that.
    #[derive(Debug)]
    pub struct ObservationHandle {
        subscription: Subscription,
        task: JoinHandle<SubscriptionState>,
    }

    impl ObservationHandle {
        /// The observation's subscription
        #[must_use]
        pub const fn subscription(&self) -> &Subscription {
            &self.subscription
        }

        /// Cancel the observation; see [`Subscription::cancel`]
        pub fn cancel(&self) -> bool {
            self.subscription.cancel()
        }

        /// Wait for the observation to reach a terminal state
        ///
        /// # Errors
        ///
        /// Returns [`RuntimeError::TaskFailed`] if the observation task
        /// panicked or was aborted.
        pub async fn wait(self) -> Result<SubscriptionState, RuntimeError> {
            Ok(self.task.await?)
        }
    }

    /// The Runtime - executes observations of lazy sequences
    ///
    /// The Runtime manages:
    /// 1. The scheduler handed to every observed sequence
    /// 2. One tokio task per observation
    /// 3. Bookkeeping of live observations for graceful shutdown
    /// 4. Lifecycle metrics
    ///
    /// # Example
    ///
    /// ```ignore
    /// let runtime = Runtime::new();
    /// let letters = runtime.collect(service.names_flux_map(3)).await?;
    /// ```
    pub struct Runtime {
        config: RuntimeConfig,
        scheduler: SchedulerRef,
        shutdown: Arc<AtomicBool>,
        active: Arc<AtomicUsize>,
        live: Arc<Mutex<Vec<Subscription>>>,
    }

    impl Runtime {
        /// Create a runtime with the default configuration and a [`TokioScheduler`]
        #[must_use]
        pub fn new() -> Self {
            Self::with_config(RuntimeConfig::default())
        }

        /// Create a runtime with an explicit configuration
        #[must_use]
        pub fn with_config(config: RuntimeConfig) -> Self {
            Self::with_scheduler(config, Arc::new(TokioScheduler::new()))
        }

        /// Create a runtime whose sequences use `scheduler` for delays
        #[must_use]
        pub fn with_scheduler(config: RuntimeConfig, scheduler: SchedulerRef) -> Self {
            Self {
                config,
                scheduler,
                shutdown: Arc::new(AtomicBool::new(false)),
                active: Arc::new(AtomicUsize::new(0)),
                live: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// The runtime's configuration
        #[must_use]
        pub const fn config(&self) -> &RuntimeConfig {
            &self.config
        }

        /// The scheduler handed to observed sequences
        #[must_use]
        pub const fn scheduler(&self) -> &SchedulerRef {
            &self.scheduler
        }

        /// Number of observations currently running or collecting
        #[must_use]
        pub fn active_observations(&self) -> usize {
            self.active.load(Ordering::Acquire)
        }

        /// Whether [`shutdown`](Self::shutdown) has been initiated
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }

        /// Observe `sequence` on a new tokio task
        ///
        /// Returns as soon as the task is spawned; signals are delivered to
        /// `subscriber` from that task.
        ///
        /// # Errors
        ///
        /// - [`RuntimeError::ShutdownInProgress`] after shutdown was initiated
        /// - [`RuntimeError::NoTokioRuntime`] when called outside a tokio runtime
        #[tracing::instrument(skip_all, name = "runtime_observe", fields(observation = self.config.observation_name))]
        pub fn observe<T, S>(
            &self,
            sequence: impl Into<Flux<T>>,
            subscriber: S,
        ) -> Result<ObservationHandle, RuntimeError>
        where
            T: Element,
            S: Subscriber<T> + 'static,
        {
            self.ensure_running()?;
            let tokio_handle = tokio::runtime::Handle::try_current()
                .map_err(|e| RuntimeError::NoTokioRuntime(e.to_string()))?;

            let flux = sequence.into();
            let operator = flux.operator_name();
            let (subscription, observation) = observe(flux, &self.scheduler, subscriber);
            self.track(&subscription);

            let guard = ActiveObservationGuard::new(&self.active, self.config.metrics_enabled);
            let metrics_enabled = self.config.metrics_enabled;
            let span = tracing::debug_span!("observation", observation = self.config.observation_name, operator);
            let started = tokio::time::Instant::now();

            tracing::trace!(operator, "Spawning observation");
            let task = tokio_handle.spawn(
                async move {
                    let _guard = guard;
                    let state = observation.await;
                    tracing::debug!(state = %state, "Observation finished");
                    if metrics_enabled {
                        ObservationMetrics::record_terminated(state, started.elapsed());
                    }
                    state
                }
                .instrument(span),
            );

            Ok(ObservationHandle { subscription, task })
        }

        /// Observe `sequence` on the current task and collect every value
        ///
        /// # Errors
        ///
        /// - [`RuntimeError::ShutdownInProgress`] after shutdown was initiated
        /// - [`RuntimeError::Sequence`] if the sequence terminates with an error
        #[tracing::instrument(skip_all, name = "runtime_collect", fields(observation = self.config.observation_name))]
        pub async fn collect<T: Element>(&self, sequence: impl Into<Flux<T>>) -> Result<Vec<T>, RuntimeError> {
            self.ensure_running()?;
            let flux = sequence.into();
            let _guard = ActiveObservationGuard::new(&self.active, self.config.metrics_enabled);
            let started = tokio::time::Instant::now();

            let result = flux.to_vec(&self.scheduler).await;
            if self.config.metrics_enabled {
                let state = if result.is_ok() {
                    SubscriptionState::Completed
                } else {
                    SubscriptionState::Errored
                };
                ObservationMetrics::record_terminated(state, started.elapsed());
            }
            Ok(result?)
        }

        /// Observe `mono` on the current task and return its value, if any
        ///
        /// # Errors
        ///
        /// Same as [`collect`](Self::collect).
        pub async fn value<T: Element>(&self, mono: Mono<T>) -> Result<Option<T>, RuntimeError> {
            Ok(self.collect(mono).await?.into_iter().next())
        }

        /// Gracefully shut down the runtime
        ///
        /// New observations are rejected immediately. Running observations
        /// get until `timeout` to finish; any still running then are
        /// cancelled.
        ///
        /// # Errors
        ///
        /// Returns [`RuntimeError::ShutdownTimeout`] with the number of
        /// observations that had to be cancelled.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), RuntimeError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);

            let deadline = tokio::time::Instant::now() + timeout;
            let poll_interval = Duration::from_millis(10);

            loop {
                let active = self.active.load(Ordering::Acquire);
                if active == 0 {
                    tracing::info!("All observations finished, shutdown successful");
                    if self.config.metrics_enabled {
                        ObservationMetrics::record_shutdown("completed");
                    }
                    return Ok(());
                }

                let now = tokio::time::Instant::now();
                if now >= deadline {
                    tracing::error!(
                        active_observations = active,
                        "Shutdown timeout: {} observations still running, cancelling", active
                    );
                    self.cancel_all();
                    if self.config.metrics_enabled {
                        ObservationMetrics::record_shutdown("timeout");
                    }
                    return Err(RuntimeError::ShutdownTimeout(active));
                }

                tracing::debug!(active_observations = active, "Waiting for observations to finish");
                tokio::time::sleep(poll_interval.min(deadline - now)).await;
            }
        }

        /// Shut down with the configured default timeout
        ///
        /// # Errors
        ///
        /// See [`shutdown`](Self::shutdown).
        pub async fn shutdown_gracefully(&self) -> Result<(), RuntimeError> {
            self.shutdown(self.config.shutdown_timeout).await
        }

        fn ensure_running(&self) -> Result<(), RuntimeError> {
            if self.is_shutting_down() {
                tracing::warn!("Rejecting observation: runtime is shutting down");
                return Err(RuntimeError::ShutdownInProgress);
            }
            Ok(())
        }

        fn track(&self, subscription: &Subscription) {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            live.retain(|tracked| !tracked.is_terminated());
            live.push(subscription.clone());
        }

        fn cancel_all(&self) {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            for subscription in live.drain(..) {
                subscription.cancel();
            }
        }
    }

    impl Default for Runtime {
        fn default() -> Self {
            Self::new()
        }
    }

    impl std::fmt::Debug for Runtime {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Runtime")
                .field("config", &self.config)
                .field("active_observations", &self.active_observations())
                .field("shutting_down", &self.is_shutting_down())
                .finish_non_exhaustive()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap and panic
mod tests {
    use super::*;
    use composable_streams_core::subscription::SubscriptionState;
    use composable_streams_core::{CallbackSubscriber, Flux, Mono, SequenceError};
    use std::sync::Mutex;

    fn quiet() -> Runtime {
        Runtime::with_config(RuntimeConfig::default().with_metrics_enabled(false))
    }

    #[tokio::test(start_paused = true)]
    async fn collect_waits_for_delayed_values() {
        let runtime = quiet();
        let start = tokio::time::Instant::now();
        let flux = Flux::from_iter(["A", "B", "C"]).delay_elements(Duration::from_millis(100));

        assert_eq!(runtime.collect(flux).await.unwrap(), vec!["A", "B", "C"]);
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        assert_eq!(runtime.active_observations(), 0);
    }

    #[tokio::test]
    async fn collect_surfaces_sequence_errors() {
        let runtime = quiet();
        let result = runtime.collect(Flux::<i32>::error(SequenceError::failed("boom"))).await;
        assert!(matches!(result, Err(RuntimeError::Sequence(SequenceError::Failed(_)))));
    }

    #[tokio::test]
    async fn value_returns_the_mono_value() {
        let runtime = quiet();
        assert_eq!(runtime.value(Mono::just(5)).await.unwrap(), Some(5));
        assert_eq!(runtime.value(Mono::<i32>::empty()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn observe_delivers_to_subscriber_on_a_task() {
        let runtime = quiet();
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);

        let handle = runtime
            .observe(
                Flux::from_iter([1, 2, 3]),
                CallbackSubscriber::new(move |n: i32| sink.lock().unwrap().push(n)),
            )
            .unwrap();

        assert_eq!(handle.wait().await.unwrap(), SubscriptionState::Completed);
        assert_eq!(*values.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_running_observations() {
        let runtime = quiet();
        let flux = Flux::just("late").delay_elements(Duration::from_millis(500));
        let handle = runtime.observe(flux, CallbackSubscriber::new(|_| {})).unwrap();

        runtime.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(runtime.is_shutting_down());
        assert_eq!(handle.wait().await.unwrap(), SubscriptionState::Completed);

        let rejected = runtime.observe(Flux::just(1), CallbackSubscriber::new(|_: i32| {}));
        assert!(matches!(rejected, Err(RuntimeError::ShutdownInProgress)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_timeout_cancels_stragglers() {
        let runtime = quiet();
        let handle = runtime
            .observe(Flux::<i32>::never(), CallbackSubscriber::new(|_: i32| {}))
            .unwrap();
        tokio::task::yield_now().await;

        let result = runtime.shutdown(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(RuntimeError::ShutdownTimeout(1))));
        assert_eq!(handle.wait().await.unwrap(), SubscriptionState::Cancelled);
        assert_eq!(runtime.active_observations(), 0);
    }

    #[test]
    fn observe_outside_tokio_is_an_error() {
        let runtime = quiet();
        let result = runtime.observe(Flux::just(1), CallbackSubscriber::new(|_: i32| {}));
        assert!(matches!(result, Err(RuntimeError::NoTokioRuntime(_))));
    }

    #[test]
    fn config_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert!(config.metrics_enabled);
        assert_eq!(config.observation_name, "flux");
    }
}
