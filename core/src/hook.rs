//! Lifecycle hooks: observe a sequence's signals without changing them.
//!
//! A [`SignalHook`] attached with [`Flux::tap`] sees, per observation:
//!
//! - `on_subscribe` once, when the node is opened
//! - `on_next` for every value passing through
//! - exactly one of `on_complete`, `on_error` or `on_cancel`
//!
//! `on_cancel` fires when the observation is dropped before a terminal signal
//! reached the hook, whether the consumer cancelled or a downstream operator
//! (`take`, `zip`, a failing `merge` input) stopped pulling.
//!
//! A panicking hook is logged and ignored; it never alters the signals.

use crate::Element;
use crate::error::{SequenceError, guarded};
use crate::flux::{Flux, Node, SignalStream};
use futures::stream::{Stream, StreamExt};
use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A lifecycle signal, as recorded by hooks and test subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<T> {
    /// The node was opened for an observation
    Subscribe,
    /// A value was emitted
    Next(T),
    /// The sequence completed
    Complete,
    /// The sequence terminated with an error
    Error(SequenceError),
    /// The observation was cancelled before termination
    Cancel,
}

impl<T> Signal<T> {
    /// Whether this signal ends the observation
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error(_) | Self::Cancel)
    }

    /// Signal name, as printed by the logging hook
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Subscribe => "onSubscribe",
            Self::Next(_) => "onNext",
            Self::Complete => "onComplete",
            Self::Error(_) => "onError",
            Self::Cancel => "cancel",
        }
    }
}

/// Observer of a sequence's lifecycle
///
/// Every method has a no-op default, so implementors only override the
/// signals they care about.
pub trait SignalHook<T>: Send + Sync {
    /// The node was opened for an observation
    fn on_subscribe(&self) {}

    /// A value is passing through
    fn on_next(&self, _value: &T) {}

    /// The upstream completed
    fn on_complete(&self) {}

    /// The upstream terminated with `error`
    fn on_error(&self, _error: &SequenceError) {}

    /// The observation stopped before a terminal signal
    fn on_cancel(&self) {}
}

impl<T, H: SignalHook<T> + ?Sized> SignalHook<T> for Arc<H> {
    fn on_subscribe(&self) {
        (**self).on_subscribe();
    }

    fn on_next(&self, value: &T) {
        (**self).on_next(value);
    }

    fn on_complete(&self) {
        (**self).on_complete();
    }

    fn on_error(&self, error: &SequenceError) {
        (**self).on_error(error);
    }

    fn on_cancel(&self) {
        (**self).on_cancel();
    }
}

/// Forwards every signal unchanged while reporting it to a hook
pub(crate) struct TapStream<T> {
    upstream: SignalStream<T>,
    hook: Arc<dyn SignalHook<T>>,
    terminated: bool,
}

impl<T> TapStream<T> {
    pub(crate) fn new(upstream: SignalStream<T>, hook: Arc<dyn SignalHook<T>>) -> Self {
        let tap = Self {
            upstream,
            hook,
            terminated: false,
        };
        tap.notify(|hook| hook.on_subscribe());
        tap
    }

    fn notify(&self, signal: impl FnOnce(&dyn SignalHook<T>)) {
        if let Err(error) = guarded("tap", || signal(self.hook.as_ref())) {
            tracing::warn!(error = %error, "Signal hook panicked, ignoring");
        }
    }
}

impl<T: Element> Stream for TapStream<T> {
    type Item = Result<T, SequenceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }

        match this.upstream.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(value))) => {
                this.notify(|hook| hook.on_next(&value));
                Poll::Ready(Some(Ok(value)))
            },
            Poll::Ready(Some(Err(error))) => {
                this.terminated = true;
                this.notify(|hook| hook.on_error(&error));
                Poll::Ready(Some(Err(error)))
            },
            Poll::Ready(None) => {
                this.terminated = true;
                this.notify(|hook| hook.on_complete());
                Poll::Ready(None)
            },
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for TapStream<T> {
    fn drop(&mut self) {
        if !self.terminated {
            self.notify(|hook| hook.on_cancel());
        }
    }
}

/// Hook logging every signal through `tracing` at INFO level
///
/// Output follows the familiar reactive log format, e.g.
/// `onNext("ALEX")`, `onComplete()`, `cancel()`.
#[derive(Debug, Clone)]
pub struct TracingHook {
    label: Arc<str>,
}

impl TracingHook {
    /// Create a hook logging under `label`
    #[must_use]
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self { label: label.into() }
    }

    /// The label attached to every log line
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T: Debug> SignalHook<T> for TracingHook {
    fn on_subscribe(&self) {
        tracing::info!(sequence = %self.label, "onSubscribe()");
    }

    fn on_next(&self, value: &T) {
        tracing::info!(sequence = %self.label, "onNext({value:?})");
    }

    fn on_complete(&self) {
        tracing::info!(sequence = %self.label, "onComplete()");
    }

    fn on_error(&self, error: &SequenceError) {
        tracing::error!(sequence = %self.label, "onError({error})");
    }

    fn on_cancel(&self) {
        tracing::info!(sequence = %self.label, "cancel()");
    }
}

type NextCallback<T> = Box<dyn Fn(&T) + Send + Sync>;
type CompleteCallback = Box<dyn Fn() + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&SequenceError) + Send + Sync>;

/// Hook built from individual side-effect closures
struct CallbackHook<T> {
    on_next: Option<NextCallback<T>>,
    on_complete: Option<CompleteCallback>,
    on_error: Option<ErrorCallback>,
}

impl<T> Default for CallbackHook<T> {
    fn default() -> Self {
        Self {
            on_next: None,
            on_complete: None,
            on_error: None,
        }
    }
}

impl<T> SignalHook<T> for CallbackHook<T> {
    fn on_next(&self, value: &T) {
        if let Some(callback) = &self.on_next {
            callback(value);
        }
    }

    fn on_complete(&self) {
        if let Some(callback) = &self.on_complete {
            callback();
        }
    }

    fn on_error(&self, error: &SequenceError) {
        if let Some(callback) = &self.on_error {
            callback(error);
        }
    }
}

impl<T: Element> Flux<T> {
    /// Attach a lifecycle hook
    ///
    /// The hook sees the signals of every observation of the returned
    /// sequence; the values themselves pass through untouched.
    #[must_use]
    pub fn tap<H>(self, hook: H) -> Self
    where
        H: SignalHook<T> + 'static,
    {
        Self::from_node(Node::Tap {
            source: self,
            hook: Arc::new(hook),
        })
    }

    /// Log every signal at INFO level under the label `flux`
    #[must_use]
    pub fn log(self) -> Self
    where
        T: Debug,
    {
        self.log_named("flux")
    }

    /// Log every signal at INFO level under `label`
    #[must_use]
    pub fn log_named(self, label: impl Into<Arc<str>>) -> Self
    where
        T: Debug,
    {
        self.tap(TracingHook::new(label))
    }

    /// Run `callback` for every value passing through
    #[must_use]
    pub fn do_on_next<F>(self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.tap(CallbackHook {
            on_next: Some(Box::new(callback)),
            ..CallbackHook::default()
        })
    }

    /// Run `callback` when the sequence completes
    #[must_use]
    pub fn do_on_complete<F>(self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.tap(CallbackHook {
            on_complete: Some(Box::new(callback)),
            ..CallbackHook::default()
        })
    }

    /// Run `callback` when the sequence terminates with an error
    #[must_use]
    pub fn do_on_error<F>(self, callback: F) -> Self
    where
        F: Fn(&SequenceError) + Send + Sync + 'static,
    {
        self.tap(CallbackHook {
            on_error: Some(Box::new(callback)),
            ..CallbackHook::default()
        })
    }
}
