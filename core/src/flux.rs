//! The multi-value sequence and its operation tree.
//!
//! A [`Flux`] is an immutable handle to one node of a tagged operation tree.
//! Building a pipeline only allocates nodes; nothing runs until the tree is
//! opened for an observation, at which point every node yields a fresh
//! [`SignalStream`] wired to its upstream streams.
//!
//! ```text
//!   Flux::from_iter([..])          Values
//!        .map(f)                     └─ Operator("map")
//!        .filter(p)                       └─ Filter
//!        .concat_with(other)                   └─ Concat[Filter, other]
//! ```
//!
//! Opening the same tree twice yields two independent streams (cold
//! semantics): no node keeps per-observation state.

use crate::Element;
use crate::error::{SequenceError, guarded};
use crate::hook::SignalHook;
use crate::scheduler::SchedulerRef;
use crate::{combinators, hook, operators};
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use futures::future;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The stream a node yields when it is opened for one observation
///
/// Every `SignalStream` ends right after its first `Err` item.
pub type SignalStream<T> = BoxStream<'static, Result<T, SequenceError>>;

/// Opens a type-changing operator node against a scheduler
pub(crate) type OpenFn<T> = Arc<dyn Fn(&SchedulerRef) -> SignalStream<T> + Send + Sync>;

/// Shared predicate closure used by `filter`
pub(crate) type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A node of the operation tree
///
/// Variants that preserve the element type are spelled out so the tree can be
/// inspected; operators that change the element type (`map`, `concat_map`,
/// `zip`, ...) are erased behind [`Node::Operator`].
pub(crate) enum Node<T> {
    /// Completes without emitting
    Empty,

    /// Never emits and never terminates
    Never,

    /// Terminates immediately with an error
    Error(SequenceError),

    /// Emits a fixed collection in order, then completes
    Values(Arc<[T]>),

    /// Builds the sequence to observe at subscription time
    Defer(Arc<dyn Fn() -> Flux<T> + Send + Sync>),

    /// Keeps values matching a predicate
    Filter {
        source: Flux<T>,
        predicate: Predicate<T>,
    },

    /// Emits at most `count` values, then cancels upstream
    Take { source: Flux<T>, count: usize },

    /// Delays every value by `delay` relative to the previous emission
    DelayElements { source: Flux<T>, delay: Duration },

    /// Falls back to another sequence when the source completes empty
    SwitchIfEmpty { source: Flux<T>, fallback: Flux<T> },

    /// Drains each source in turn
    Concat(Vec<Flux<T>>),

    /// Subscribes to every source at once and interleaves by arrival
    Merge(Vec<Flux<T>>),

    /// Subscribes to every source at once, emits in declaration order
    MergeSequential(Vec<Flux<T>>),

    /// Observes lifecycle signals without altering them
    Tap {
        source: Flux<T>,
        hook: Arc<dyn SignalHook<T>>,
    },

    /// Type-changing operator, opened through a closure
    Operator { name: &'static str, open: OpenFn<T> },
}

/// An asynchronous sequence of zero or more values
///
/// `Flux` values are cheap to clone (a reference count) and immutable: every
/// operator consumes `self` and returns a new `Flux` wrapping the old one.
///
/// # Example
///
/// ```
/// use composable_streams_core::flux::Flux;
///
/// let names = Flux::from_iter(["alex", "ben", "chloe"]);
/// let shouted = names.clone().map(str::to_uppercase);
///
/// // `names` itself is untouched by the map above
/// assert_eq!(names.operator_name(), "values");
/// assert_eq!(shouted.operator_name(), "map");
/// ```
pub struct Flux<T> {
    node: Arc<Node<T>>,
}

impl<T> Clone for Flux<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T> Flux<T> {
    pub(crate) fn from_node(node: Node<T>) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    /// Wrap a type-changing operator as a node
    pub(crate) fn operator<F>(name: &'static str, open: F) -> Self
    where
        F: Fn(&SchedulerRef) -> SignalStream<T> + Send + Sync + 'static,
    {
        Self::from_node(Node::Operator {
            name,
            open: Arc::new(open),
        })
    }

    pub(crate) fn node(&self) -> &Node<T> {
        &self.node
    }

    /// Name of the outermost node, as shown in logs and `Debug` output
    #[must_use]
    pub fn operator_name(&self) -> &'static str {
        match self.node() {
            Node::Empty => "empty",
            Node::Never => "never",
            Node::Error(_) => "error",
            Node::Values(_) => "values",
            Node::Defer(_) => "defer",
            Node::Filter { .. } => "filter",
            Node::Take { .. } => "take",
            Node::DelayElements { .. } => "delay_elements",
            Node::SwitchIfEmpty { .. } => "switch_if_empty",
            Node::Concat(_) => "concat",
            Node::Merge(_) => "merge",
            Node::MergeSequential(_) => "merge_sequential",
            Node::Tap { .. } => "tap",
            Node::Operator { name, .. } => name,
        }
    }
}

impl<T: Element> Flux<T> {
    /// A sequence emitting a single value, then completing
    #[must_use]
    pub fn just(value: T) -> Self {
        Self::from_node(Node::Values(Arc::from(vec![value])))
    }

    /// A sequence completing without emitting
    #[must_use]
    pub fn empty() -> Self {
        Self::from_node(Node::Empty)
    }

    /// A sequence that never emits and never terminates
    ///
    /// Useful as a placeholder input for merge and zip, and for exercising
    /// cancellation.
    #[must_use]
    pub fn never() -> Self {
        Self::from_node(Node::Never)
    }

    /// A sequence terminating immediately with `error`
    #[must_use]
    pub fn error(error: SequenceError) -> Self {
        Self::from_node(Node::Error(error))
    }

    /// Build the sequence lazily, once per observation
    ///
    /// A panic inside `factory` is delivered as the error signal.
    #[must_use]
    pub fn defer<F>(factory: F) -> Self
    where
        F: Fn() -> Self + Send + Sync + 'static,
    {
        Self::from_node(Node::Defer(Arc::new(factory)))
    }

    /// Adapt a stream produced by `factory`, invoked once per observation
    ///
    /// The adapted stream is cut off after its first error.
    #[must_use]
    pub fn from_stream<F, S>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = Result<T, SequenceError>> + Send + 'static,
    {
        let factory = Arc::new(factory);
        Self::operator("from_stream", move |_scheduler| {
            match guarded("from_stream", || factory()) {
                Ok(produced) => operators::fuse_errors(produced.boxed()),
                Err(error) => stream::once(future::ready(Err(error))).boxed(),
            }
        })
    }

    /// Open the operation tree for one observation
    ///
    /// Every call walks the tree again and returns an independent stream. The
    /// subscription driver is the usual caller; the method is public so that
    /// collaborators can consume a sequence as a plain `futures` stream.
    #[must_use]
    pub fn open(&self, scheduler: &SchedulerRef) -> SignalStream<T> {
        match self.node() {
            Node::Empty => stream::empty().boxed(),
            Node::Never => stream::pending().boxed(),
            Node::Error(error) => stream::once(future::ready(Err(error.clone()))).boxed(),
            Node::Values(values) => {
                let values = Arc::clone(values);
                stream::iter((0..values.len()).map(move |index| Ok(values[index].clone()))).boxed()
            },
            Node::Defer(factory) => match guarded("defer", || factory()) {
                Ok(flux) => flux.open(scheduler),
                Err(error) => stream::once(future::ready(Err(error))).boxed(),
            },
            Node::Filter { source, predicate } => {
                operators::filter_stream(source.open(scheduler), Arc::clone(predicate))
            },
            Node::Take { source, count } => {
                if *count == 0 {
                    stream::empty().boxed()
                } else {
                    operators::take_stream(source.open(scheduler), *count)
                }
            },
            Node::DelayElements { source, delay } => {
                operators::delay_stream(source.open(scheduler), Arc::clone(scheduler), *delay)
            },
            Node::SwitchIfEmpty { source, fallback } => operators::switch_if_empty_stream(
                source.open(scheduler),
                fallback.clone(),
                Arc::clone(scheduler),
            ),
            Node::Concat(sources) => combinators::concat_stream(sources.clone(), Arc::clone(scheduler)),
            Node::Merge(sources) => {
                combinators::MergeStream::new(sources.iter().map(|source| source.open(scheduler)).collect())
                    .boxed()
            },
            Node::MergeSequential(sources) => combinators::MergeSequentialStream::new(
                sources.iter().map(|source| source.open(scheduler)).collect(),
            )
            .boxed(),
            Node::Tap { source, hook } => {
                hook::TapStream::new(source.open(scheduler), Arc::clone(hook)).boxed()
            },
            Node::Operator { open, .. } => open(scheduler),
        }
    }

    /// Observe the sequence to completion and collect every value
    ///
    /// # Errors
    ///
    /// Returns the sequence's error signal if it terminates with one.
    pub async fn to_vec(&self, scheduler: &SchedulerRef) -> Result<Vec<T>, SequenceError> {
        self.open(scheduler).try_collect().await
    }
}

impl Flux<u64> {
    /// An infinite sequence emitting `0, 1, 2, ...`, one value per `period`
    ///
    /// The first value is emitted one `period` after subscription. Only
    /// cancellation (or a downstream `take`) ends it.
    #[must_use]
    pub fn interval(period: Duration) -> Self {
        Self::operator("interval", move |scheduler| {
            let scheduler = Arc::clone(scheduler);
            Box::pin(async_stream::stream! {
                let mut tick: u64 = 0;
                loop {
                    scheduler.sleep(period).await;
                    yield Ok(tick);
                    tick += 1;
                }
            })
        })
    }
}

impl<T: Element> FromIterator<T> for Flux<T> {
    /// Emit the collected values in iteration order, then complete
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let values: Vec<T> = iter.into_iter().collect();
        if values.is_empty() {
            Self::empty()
        } else {
            Self::from_node(Node::Values(Arc::from(values)))
        }
    }
}

impl<T> fmt::Debug for Flux<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Node::Empty => write!(f, "Flux::Empty"),
            Node::Never => write!(f, "Flux::Never"),
            Node::Error(error) => f.debug_tuple("Flux::Error").field(error).finish(),
            Node::Values(values) => f
                .debug_struct("Flux::Values")
                .field("len", &values.len())
                .finish(),
            Node::Defer(_) => write!(f, "Flux::Defer(<factory>)"),
            Node::Filter { source, .. } => f
                .debug_struct("Flux::Filter")
                .field("source", source)
                .finish_non_exhaustive(),
            Node::Take { source, count } => f
                .debug_struct("Flux::Take")
                .field("source", source)
                .field("count", count)
                .finish(),
            Node::DelayElements { source, delay } => f
                .debug_struct("Flux::DelayElements")
                .field("source", source)
                .field("delay", delay)
                .finish(),
            Node::SwitchIfEmpty { source, fallback } => f
                .debug_struct("Flux::SwitchIfEmpty")
                .field("source", source)
                .field("fallback", fallback)
                .finish(),
            Node::Concat(sources) => f.debug_tuple("Flux::Concat").field(sources).finish(),
            Node::Merge(sources) => f.debug_tuple("Flux::Merge").field(sources).finish(),
            Node::MergeSequential(sources) => f
                .debug_tuple("Flux::MergeSequential")
                .field(sources)
                .finish(),
            Node::Tap { source, .. } => f
                .debug_struct("Flux::Tap")
                .field("source", source)
                .finish_non_exhaustive(),
            Node::Operator { name, .. } => write!(f, "Flux::Operator({name})"),
        }
    }
}
