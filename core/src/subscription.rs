//! Observation lifecycle: starting, driving and cancelling a sequence.
//!
//! [`observe`] returns a [`Subscription`] handle together with the
//! [`Observation`] future that drives the sequence. The observation does
//! nothing until it is polled; a runtime usually spawns it.
//!
//! ```text
//!   Unsubscribed ──poll──▶ Active ──┬──▶ Completed
//!         │                         ├──▶ Errored
//!         └──────cancel()───────────┴──▶ Cancelled
//! ```
//!
//! Terminal states are final: whichever of cancellation and the upstream
//! terminal signal is recorded first wins, and the subscriber sees exactly
//! that one.

use crate::Element;
use crate::flux::Flux;
use crate::scheduler::SchedulerRef;
use crate::subscriber::Subscriber;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::StreamExt;
use futures::task::AtomicWaker;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::Poll;

/// Lifecycle state of one observation
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Created, not yet polled
    Unsubscribed = 0,
    /// Values are being delivered
    Active = 1,
    /// The sequence completed
    Completed = 2,
    /// The sequence terminated with an error
    Errored = 3,
    /// The consumer cancelled before termination
    Cancelled = 4,
}

impl SubscriptionState {
    /// Whether no further signal will be delivered
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Cancelled)
    }

    /// Lowercase name, used as a metrics label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unsubscribed => "unsubscribed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::Cancelled => "cancelled",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unsubscribed,
            1 => Self::Active,
            2 => Self::Completed,
            3 => Self::Errored,
            _ => Self::Cancelled,
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    waker: AtomicWaker,
}

/// Handle to one observation
///
/// Clones refer to the same observation. Cancelling is idempotent and safe
/// from any thread, including from inside a subscriber callback.
#[derive(Debug, Clone)]
pub struct Subscription {
    shared: Arc<Shared>,
}

impl Subscription {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(SubscriptionState::Unsubscribed as u8),
                waker: AtomicWaker::new(),
            }),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Whether [`cancel`](Self::cancel) took effect
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state() == SubscriptionState::Cancelled
    }

    /// Whether the observation reached any terminal state
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state().is_terminal()
    }

    /// Stop the observation
    ///
    /// Callbacks run on the task driving the observation. A cancel issued
    /// from a callback stops delivery at once; one issued from another
    /// thread may race with at most the value already being delivered.
    /// The upstream streams are dropped (cancelled) the next time the
    /// driver runs. Returns `false` if the observation had already
    /// terminated.
    pub fn cancel(&self) -> bool {
        let mut current = self.shared.state.load(Ordering::Acquire);
        loop {
            if SubscriptionState::from_u8(current).is_terminal() {
                return false;
            }
            match self.shared.state.compare_exchange(
                current,
                SubscriptionState::Cancelled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    tracing::trace!("Subscription cancelled");
                    self.shared.waker.wake();
                    return true;
                },
                Err(actual) => current = actual,
            }
        }
    }

    fn transition(&self, from: SubscriptionState, to: SubscriptionState) -> bool {
        self.shared
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Future driving one observation, resolving to its terminal state
pub type Observation = BoxFuture<'static, SubscriptionState>;

/// Start observing `sequence`, delivering its signals to `subscriber`
///
/// Nothing happens until the returned [`Observation`] is polled. Timing
/// operators inside the sequence use `scheduler`.
///
/// # Example
///
/// ```
/// use composable_streams_core::flux::Flux;
/// use composable_streams_core::subscriber::CallbackSubscriber;
/// use composable_streams_core::subscription::{SubscriptionState, observe};
/// # use composable_streams_core::scheduler::{Scheduler, SchedulerRef};
/// # use futures::future::BoxFuture;
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # #[derive(Debug)]
/// # struct Immediate;
/// # impl Scheduler for Immediate {
/// #     fn now(&self) -> Duration { Duration::ZERO }
/// #     fn sleep(&self, _: Duration) -> BoxFuture<'static, ()> { Box::pin(async {}) }
/// # }
/// # let scheduler: SchedulerRef = Arc::new(Immediate);
///
/// let (subscription, observation) = observe(
///     Flux::from_iter([1, 2, 3]),
///     &scheduler,
///     CallbackSubscriber::new(|n: i32| println!("{n}")),
/// );
/// let state = futures::executor::block_on(observation);
/// assert_eq!(state, SubscriptionState::Completed);
/// assert!(subscription.is_terminated());
/// ```
pub fn observe<T, S>(
    sequence: impl Into<Flux<T>>,
    scheduler: &SchedulerRef,
    subscriber: S,
) -> (Subscription, Observation)
where
    T: Element,
    S: Subscriber<T> + 'static,
{
    let subscription = Subscription::new();
    let observation = drive(sequence.into(), Arc::clone(scheduler), subscriber, subscription.clone()).boxed();
    (subscription, observation)
}

async fn drive<T, S>(
    flux: Flux<T>,
    scheduler: SchedulerRef,
    mut subscriber: S,
    subscription: Subscription,
) -> SubscriptionState
where
    T: Element,
    S: Subscriber<T>,
{
    if !subscription.transition(SubscriptionState::Unsubscribed, SubscriptionState::Active) {
        tracing::debug!(operator = flux.operator_name(), "Cancelled before the observation started");
        subscriber.on_cancel();
        return subscription.state();
    }

    tracing::trace!(operator = flux.operator_name(), "Observation started");
    subscriber.on_subscribe(&subscription);

    let mut stream = flux.open(&scheduler);
    loop {
        let signal = future::poll_fn(|cx| {
            subscription.shared.waker.register(cx.waker());
            if subscription.is_cancelled() {
                return Poll::Ready(None);
            }
            stream.poll_next_unpin(cx).map(Some)
        })
        .await;

        match signal {
            Some(Some(Ok(value))) => {
                if subscription.state() == SubscriptionState::Active {
                    subscriber.on_next(value);
                }
            },
            Some(Some(Err(error))) => {
                drop(stream);
                if subscription.transition(SubscriptionState::Active, SubscriptionState::Errored) {
                    tracing::debug!(error = %error, "Observation terminated with error");
                    subscriber.on_error(error);
                } else {
                    subscriber.on_cancel();
                }
                return subscription.state();
            },
            Some(None) => {
                drop(stream);
                if subscription.transition(SubscriptionState::Active, SubscriptionState::Completed) {
                    tracing::trace!("Observation completed");
                    subscriber.on_complete();
                } else {
                    subscriber.on_cancel();
                }
                return subscription.state();
            },
            None => {
                drop(stream);
                tracing::debug!("Observation cancelled, upstream dropped");
                subscriber.on_cancel();
                return SubscriptionState::Cancelled;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SequenceError;
    use crate::subscriber::CallbackSubscriber;
    use crate::test_support::scheduler;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Subscribed,
        Next(i32),
        Completed,
        Errored(SequenceError),
        Cancelled,
    }

    #[derive(Clone, Default)]
    struct Log {
        events: Arc<Mutex<Vec<Event>>>,
        cancel_after: Option<usize>,
        subscription: Arc<Mutex<Option<Subscription>>>,
    }

    impl Log {
        fn push(&self, event: Event) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().map(|events| events.clone()).unwrap_or_default()
        }
    }

    impl Subscriber<i32> for Log {
        fn on_subscribe(&mut self, subscription: &Subscription) {
            if let Ok(mut slot) = self.subscription.lock() {
                *slot = Some(subscription.clone());
            }
            self.push(Event::Subscribed);
        }

        fn on_next(&mut self, value: i32) {
            self.push(Event::Next(value));
            let seen = self.events().iter().filter(|event| matches!(event, Event::Next(_))).count();
            if self.cancel_after == Some(seen) {
                if let Ok(slot) = self.subscription.lock() {
                    if let Some(subscription) = slot.as_ref() {
                        subscription.cancel();
                    }
                }
            }
        }

        fn on_complete(&mut self) {
            self.push(Event::Completed);
        }

        fn on_error(&mut self, error: SequenceError) {
            self.push(Event::Errored(error));
        }

        fn on_cancel(&mut self) {
            self.push(Event::Cancelled);
        }
    }

    #[tokio::test]
    async fn delivers_values_then_completion() {
        let log = Log::default();
        let (subscription, observation) = observe(Flux::from_iter([1, 2]), &scheduler(), log.clone());

        assert_eq!(subscription.state(), SubscriptionState::Unsubscribed);
        assert_eq!(observation.await, SubscriptionState::Completed);
        assert_eq!(
            log.events(),
            vec![Event::Subscribed, Event::Next(1), Event::Next(2), Event::Completed]
        );
        assert!(subscription.is_terminated());
        assert!(!subscription.cancel());
    }

    #[tokio::test]
    async fn delivers_error_once() {
        let log = Log::default();
        let flux = Flux::just(1).concat_with(Flux::error(SequenceError::failed("boom")));
        let (_, observation) = observe(flux, &scheduler(), log.clone());

        assert_eq!(observation.await, SubscriptionState::Errored);
        assert_eq!(
            log.events(),
            vec![
                Event::Subscribed,
                Event::Next(1),
                Event::Errored(SequenceError::failed("boom"))
            ]
        );
    }

    #[tokio::test]
    async fn cancel_from_inside_on_next_stops_delivery() {
        let log = Log {
            cancel_after: Some(2),
            ..Log::default()
        };
        let (subscription, observation) = observe(Flux::from_iter(1..=10), &scheduler(), log.clone());

        assert_eq!(observation.await, SubscriptionState::Cancelled);
        assert!(subscription.is_cancelled());
        assert_eq!(
            log.events(),
            vec![Event::Subscribed, Event::Next(1), Event::Next(2), Event::Cancelled]
        );
    }

    #[tokio::test]
    async fn cancel_before_start_never_subscribes() {
        let log = Log::default();
        let (subscription, observation) = observe(Flux::from_iter([1]), &scheduler(), log.clone());

        assert!(subscription.cancel());
        assert!(!subscription.cancel());
        assert_eq!(observation.await, SubscriptionState::Cancelled);
        assert_eq!(log.events(), vec![Event::Cancelled]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_from_another_task_wakes_the_driver() {
        let log = Log::default();
        let (subscription, observation) = observe(Flux::<i32>::never(), &scheduler(), log.clone());
        let handle = tokio::spawn(observation);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(subscription.state(), SubscriptionState::Active);
        subscription.cancel();

        assert_eq!(handle.await.ok(), Some(SubscriptionState::Cancelled));
        assert_eq!(log.events(), vec![Event::Subscribed, Event::Cancelled]);
    }

    #[tokio::test]
    async fn callback_subscriber_runs_callbacks() {
        let values = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(Mutex::new(false));
        let (sink, done) = (Arc::clone(&values), Arc::clone(&completed));

        let subscriber = CallbackSubscriber::new(move |value: i32| {
            if let Ok(mut values) = sink.lock() {
                values.push(value);
            }
        })
        .with_complete(move || {
            if let Ok(mut done) = done.lock() {
                *done = true;
            }
        });

        let (_, observation) = observe(Flux::from_iter([4, 5]), &scheduler(), subscriber);
        assert_eq!(observation.await, SubscriptionState::Completed);
        assert_eq!(values.lock().map(|v| v.clone()).unwrap_or_default(), vec![4, 5]);
        assert_eq!(completed.lock().map(|done| *done).ok(), Some(true));
    }

    #[test]
    fn state_labels() {
        assert_eq!(SubscriptionState::Cancelled.to_string(), "cancelled");
        assert!(SubscriptionState::Errored.is_terminal());
        assert!(!SubscriptionState::Active.is_terminal());
    }
}
