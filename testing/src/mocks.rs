//! Recording test doubles
//!
//! [`RecordingSubscriber`] and [`RecordingHook`] capture every signal with
//! the scheduler time it was seen at. Clones share one log, so a test keeps
//! one clone for assertions and hands the other to the code under test.

use composable_streams_core::{Element, SchedulerRef, SequenceError, Signal, SignalHook, Subscriber, Subscription};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A signal with the scheduler time it was recorded at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded<T> {
    /// Scheduler time of the signal
    pub at: Duration,
    /// The signal itself
    pub signal: Signal<T>,
}

#[derive(Debug)]
struct Log<T> {
    scheduler: SchedulerRef,
    signals: Mutex<Vec<Recorded<T>>>,
}

impl<T: Element> Log<T> {
    fn new(scheduler: &SchedulerRef) -> Arc<Self> {
        Arc::new(Self {
            scheduler: Arc::clone(scheduler),
            signals: Mutex::new(Vec::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Recorded<T>>> {
        self.signals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, signal: Signal<T>) {
        let at = self.scheduler.now();
        self.lock().push(Recorded { at, signal });
    }

    fn signals(&self) -> Vec<Recorded<T>> {
        self.lock().clone()
    }

    fn values(&self) -> Vec<T> {
        self.lock()
            .iter()
            .filter_map(|recorded| match &recorded.signal {
                Signal::Next(value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    fn timed_values(&self) -> Vec<(Duration, T)> {
        self.lock()
            .iter()
            .filter_map(|recorded| match &recorded.signal {
                Signal::Next(value) => Some((recorded.at, value.clone())),
                _ => None,
            })
            .collect()
    }

    fn terminal(&self) -> Option<Signal<T>> {
        self.lock()
            .iter()
            .rev()
            .map(|recorded| &recorded.signal)
            .find(|signal| signal.is_terminal())
            .cloned()
    }

    fn count(&self, name: &str) -> usize {
        self.lock().iter().filter(|recorded| recorded.signal.name() == name).count()
    }
}

/// Subscriber recording every signal it receives
///
/// # Example
///
/// ```
/// use composable_streams_core::Flux;
/// use composable_streams_testing::{RecordingSubscriber, VirtualExecutor};
/// use std::time::Duration;
///
/// let mut executor = VirtualExecutor::new();
/// let subscriber = RecordingSubscriber::new(&executor.scheduler_ref());
///
/// executor.observe(
///     Flux::from_iter([1, 2]).delay_elements(Duration::from_millis(10)),
///     subscriber.clone(),
/// );
/// executor.run();
///
/// assert_eq!(subscriber.timed_values(), vec![
///     (Duration::from_millis(10), 1),
///     (Duration::from_millis(20), 2),
/// ]);
/// assert!(subscriber.is_completed());
/// ```
#[derive(Debug)]
pub struct RecordingSubscriber<T> {
    log: Arc<Log<T>>,
    cancel_after: Option<usize>,
    subscription: Option<Subscription>,
    received: usize,
}

impl<T: Element> RecordingSubscriber<T> {
    /// Record signals stamped with `scheduler` time
    #[must_use]
    pub fn new(scheduler: &SchedulerRef) -> Self {
        Self {
            log: Log::new(scheduler),
            cancel_after: None,
            subscription: None,
            received: 0,
        }
    }

    /// Cancel the subscription after receiving `count` values
    #[must_use]
    pub const fn cancel_after(mut self, count: usize) -> Self {
        self.cancel_after = Some(count);
        self
    }

    /// Every signal received so far
    #[must_use]
    pub fn signals(&self) -> Vec<Recorded<T>> {
        self.log.signals()
    }

    /// Every value received so far
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.log.values()
    }

    /// Every value received so far, with its arrival time
    #[must_use]
    pub fn timed_values(&self) -> Vec<(Duration, T)> {
        self.log.timed_values()
    }

    /// The terminal signal, once received
    #[must_use]
    pub fn terminal(&self) -> Option<Signal<T>> {
        self.log.terminal()
    }

    /// Whether the observation completed
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.terminal(), Some(Signal::Complete))
    }

    /// Whether the observation was cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.terminal(), Some(Signal::Cancel))
    }

    /// The error signal, if the observation failed
    #[must_use]
    pub fn error(&self) -> Option<SequenceError> {
        match self.terminal() {
            Some(Signal::Error(error)) => Some(error),
            _ => None,
        }
    }
}

impl<T> Clone for RecordingSubscriber<T> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            cancel_after: self.cancel_after,
            subscription: None,
            received: 0,
        }
    }
}

impl<T: Element> Subscriber<T> for RecordingSubscriber<T> {
    fn on_subscribe(&mut self, subscription: &Subscription) {
        self.log.push(Signal::Subscribe);
        self.subscription = Some(subscription.clone());
        if self.cancel_after == Some(0) {
            subscription.cancel();
        }
    }

    fn on_next(&mut self, value: T) {
        self.log.push(Signal::Next(value));
        self.received += 1;
        if let (Some(limit), Some(subscription)) = (self.cancel_after, &self.subscription) {
            if self.received >= limit {
                subscription.cancel();
            }
        }
    }

    fn on_complete(&mut self) {
        self.log.push(Signal::Complete);
    }

    fn on_error(&mut self, error: SequenceError) {
        self.log.push(Signal::Error(error));
    }

    fn on_cancel(&mut self) {
        self.log.push(Signal::Cancel);
    }
}

/// Hook recording every signal passing a point of a pipeline
///
/// Attach a clone with [`Flux::tap`](composable_streams_core::Flux::tap)
/// to see what an inner node observed, including cancellations caused by
/// downstream operators.
#[derive(Debug)]
pub struct RecordingHook<T> {
    log: Arc<Log<T>>,
}

impl<T: Element> RecordingHook<T> {
    /// Record signals stamped with `scheduler` time
    #[must_use]
    pub fn new(scheduler: &SchedulerRef) -> Self {
        Self { log: Log::new(scheduler) }
    }

    /// Every signal seen so far
    #[must_use]
    pub fn signals(&self) -> Vec<Recorded<T>> {
        self.log.signals()
    }

    /// Every signal seen so far, without timestamps
    #[must_use]
    pub fn signal_kinds(&self) -> Vec<Signal<T>> {
        self.log.signals().into_iter().map(|recorded| recorded.signal).collect()
    }

    /// Every value seen so far
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.log.values()
    }

    /// The terminal signal, once seen
    #[must_use]
    pub fn terminal(&self) -> Option<Signal<T>> {
        self.log.terminal()
    }

    /// Number of times the node was opened
    #[must_use]
    pub fn subscriptions(&self) -> usize {
        self.log.count("onSubscribe")
    }

    /// Number of cancellations seen
    #[must_use]
    pub fn cancellations(&self) -> usize {
        self.log.count("cancel")
    }
}

impl<T> Clone for RecordingHook<T> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
        }
    }
}

impl<T: Element> SignalHook<T> for RecordingHook<T> {
    fn on_subscribe(&self) {
        self.log.push(Signal::Subscribe);
    }

    fn on_next(&self, value: &T) {
        self.log.push(Signal::Next(value.clone()));
    }

    fn on_complete(&self) {
        self.log.push(Signal::Complete);
    }

    fn on_error(&self, error: &SequenceError) {
        self.log.push(Signal::Error(error.clone()));
    }

    fn on_cancel(&self) {
        self.log.push(Signal::Cancel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_time::VirtualExecutor;
    use composable_streams_core::Flux;

    #[test]
    fn subscriber_records_order_and_completion() {
        let mut executor = VirtualExecutor::new();
        let subscriber = RecordingSubscriber::new(&executor.scheduler_ref());

        executor.observe(Flux::from_iter(["A", "B"]), subscriber.clone());
        executor.run();

        let kinds: Vec<Signal<&str>> = subscriber.signals().into_iter().map(|r| r.signal).collect();
        assert_eq!(kinds, vec![Signal::Subscribe, Signal::Next("A"), Signal::Next("B"), Signal::Complete]);
    }

    #[test]
    fn subscriber_cancels_after_limit() {
        let mut executor = VirtualExecutor::new();
        let subscriber = RecordingSubscriber::new(&executor.scheduler_ref()).cancel_after(2);

        let subscription = executor.observe(Flux::interval(Duration::from_millis(5)), subscriber.clone());
        executor.run();

        assert_eq!(subscriber.values(), vec![0, 1]);
        assert!(subscriber.is_cancelled());
        assert!(subscription.is_cancelled());
        assert_eq!(executor.now(), Duration::from_millis(10));
    }

    #[test]
    fn hook_sees_cancel_from_downstream_take() {
        let mut executor = VirtualExecutor::new();
        let hook = RecordingHook::new(&executor.scheduler_ref());
        let subscriber = RecordingSubscriber::new(&executor.scheduler_ref());

        executor.observe(Flux::from_iter([1, 2, 3]).tap(hook.clone()).take(1), subscriber.clone());
        executor.run();

        assert_eq!(hook.signal_kinds(), vec![Signal::Subscribe, Signal::Next(1), Signal::Cancel]);
        assert_eq!(hook.cancellations(), 1);
        assert!(subscriber.is_completed());
    }

    #[test]
    fn subscriber_records_error_terminal() {
        let mut executor = VirtualExecutor::new();
        let subscriber = RecordingSubscriber::new(&executor.scheduler_ref());

        executor.observe(Flux::<u8>::error(SequenceError::failed("boom")), subscriber.clone());
        executor.run();

        assert_eq!(subscriber.error(), Some(SequenceError::failed("boom")));
        assert!(subscriber.values().is_empty());
    }
}
