//! Consumers of a sequence.
//!
//! A [`Subscriber`] receives the signals of one observation started with
//! [`observe`](crate::subscription::observe): any number of `on_next` calls
//! followed by at most one terminal callback.

use crate::error::SequenceError;
use crate::subscription::Subscription;

/// Receiver of one observation's signals
///
/// Callbacks are invoked sequentially from the task driving the
/// observation, never concurrently. After `on_complete`, `on_error` or
/// `on_cancel` no further callback is made.
pub trait Subscriber<T>: Send {
    /// The observation became active
    ///
    /// The handle may be stored to cancel the observation later.
    fn on_subscribe(&mut self, _subscription: &Subscription) {}

    /// A value was emitted
    fn on_next(&mut self, value: T);

    /// The sequence completed
    fn on_complete(&mut self) {}

    /// The sequence terminated with `error`
    ///
    /// The default implementation logs the error, so an unhandled failure
    /// never disappears silently.
    fn on_error(&mut self, error: SequenceError) {
        tracing::error!(error = %error, "Sequence terminated with an unhandled error");
    }

    /// The observation was cancelled before a terminal signal
    fn on_cancel(&mut self) {}
}

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type CompleteFn = Box<dyn FnOnce() + Send>;
type ErrorFn = Box<dyn FnOnce(SequenceError) + Send>;
type CancelFn = Box<dyn FnOnce() + Send>;

/// Subscriber assembled from closures
///
/// # Example
///
/// ```
/// use composable_streams_core::subscriber::CallbackSubscriber;
///
/// let subscriber = CallbackSubscriber::new(|name: String| println!("{name}"))
///     .with_complete(|| println!("done"))
///     .with_error(|error| eprintln!("failed: {error}"));
/// # drop(subscriber);
/// ```
pub struct CallbackSubscriber<T> {
    on_next: NextFn<T>,
    on_complete: Option<CompleteFn>,
    on_error: Option<ErrorFn>,
    on_cancel: Option<CancelFn>,
}

impl<T> CallbackSubscriber<T> {
    /// Subscriber running `on_next` for every value
    #[must_use]
    pub fn new<F>(on_next: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        Self {
            on_next: Box::new(on_next),
            on_complete: None,
            on_error: None,
            on_cancel: None,
        }
    }

    /// Run `callback` on completion
    #[must_use]
    pub fn with_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Run `callback` on the error signal
    ///
    /// Without one, errors are logged.
    #[must_use]
    pub fn with_error<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(SequenceError) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Run `callback` when the observation is cancelled
    #[must_use]
    pub fn with_cancel<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_cancel = Some(Box::new(callback));
        self
    }
}

impl<T> Subscriber<T> for CallbackSubscriber<T> {
    fn on_next(&mut self, value: T) {
        (self.on_next)(value);
    }

    fn on_complete(&mut self) {
        if let Some(callback) = self.on_complete.take() {
            callback();
        }
    }

    fn on_error(&mut self, error: SequenceError) {
        match self.on_error.take() {
            Some(callback) => callback(error),
            None => tracing::error!(error = %error, "Sequence terminated with an unhandled error"),
        }
    }

    fn on_cancel(&mut self) {
        if let Some(callback) = self.on_cancel.take() {
            callback();
        }
    }
}

impl<T> std::fmt::Debug for CallbackSubscriber<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSubscriber")
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .finish_non_exhaustive()
    }
}
