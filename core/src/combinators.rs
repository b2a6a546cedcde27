//! Multi-source combinators: concatenation, merging and zipping.
//!
//! | Combinator         | Subscribes inputs | Output order                     |
//! |--------------------|-------------------|----------------------------------|
//! | `concat`           | one at a time     | declaration order                |
//! | `merge`            | all at once       | arrival order                    |
//! | `merge_sequential` | all at once       | declaration order (buffered)     |
//! | `zip`              | all at once       | one tuple per index, shortest wins |
//!
//! Inputs that become ready at the same instant are always served in
//! declaration order.

use crate::Element;
use crate::error::{SequenceError, guarded};
use crate::flux::{Flux, Node, SignalStream};
use crate::operators::signal_stream;
use crate::scheduler::SchedulerRef;
use async_stream::try_stream;
use futures::stream::{Stream, StreamExt};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

impl<T: Element> Flux<T> {
    /// Drain each source completely, in declaration order
    ///
    /// A source is not subscribed until the one before it completes. An error
    /// from any source ends the whole sequence.
    #[must_use]
    pub fn concat(sources: impl IntoIterator<Item = Self>) -> Self {
        let sources: Vec<Self> = sources.into_iter().collect();
        if sources.is_empty() {
            return Self::empty();
        }
        Self::from_node(Node::Concat(sources))
    }

    /// `self` followed by `other`
    #[must_use]
    pub fn concat_with(self, other: Self) -> Self {
        Self::concat([self, other])
    }

    /// Subscribe to every source at once and emit values as they arrive
    ///
    /// Completes once every source has completed; the first error from any
    /// source is emitted and the remaining sources are cancelled.
    #[must_use]
    pub fn merge(sources: impl IntoIterator<Item = Self>) -> Self {
        let sources: Vec<Self> = sources.into_iter().collect();
        if sources.is_empty() {
            return Self::empty();
        }
        Self::from_node(Node::Merge(sources))
    }

    /// Merge `self` with `other`
    #[must_use]
    pub fn merge_with(self, other: Self) -> Self {
        Self::merge([self, other])
    }

    /// Subscribe to every source at once but emit in declaration order
    ///
    /// Values from a later source are buffered until every earlier source
    /// has completed. Total time is bounded by the slowest source, not the
    /// sum of all sources.
    #[must_use]
    pub fn merge_sequential(sources: impl IntoIterator<Item = Self>) -> Self {
        let sources: Vec<Self> = sources.into_iter().collect();
        if sources.is_empty() {
            return Self::empty();
        }
        Self::from_node(Node::MergeSequential(sources))
    }

    /// Pair the n-th value of `first` with the n-th value of `second`
    ///
    /// Completes as soon as either input completes with no value waiting to
    /// be paired; the other input is then cancelled.
    #[must_use]
    pub fn zip<U: Element>(first: Self, second: Flux<U>) -> Flux<(T, U)> {
        Flux::operator("zip", move |scheduler| {
            ZipStream {
                left: Some(first.open(scheduler)),
                right: Some(second.open(scheduler)),
                left_slot: None,
                right_slot: None,
            }
            .boxed()
        })
    }

    /// Zip three sequences into triples
    #[must_use]
    pub fn zip3<B, C>(first: Self, second: Flux<B>, third: Flux<C>) -> Flux<(T, B, C)>
    where
        B: Element,
        C: Element,
    {
        Flux::zip(Flux::zip(first, second), third).map(|((a, b), c)| (a, b, c))
    }

    /// Zip four sequences into quadruples
    #[must_use]
    pub fn zip4<B, C, D>(first: Self, second: Flux<B>, third: Flux<C>, fourth: Flux<D>) -> Flux<(T, B, C, D)>
    where
        B: Element,
        C: Element,
        D: Element,
    {
        Flux::zip(Flux::zip3(first, second, third), fourth).map(|((a, b, c), d)| (a, b, c, d))
    }

    /// Zip `self` with `other`, combining each pair with `combiner`
    ///
    /// A panic inside `combiner` terminates the sequence with an error.
    #[must_use]
    pub fn zip_with<U, R, F>(self, other: Flux<U>, combiner: F) -> Flux<R>
    where
        U: Element,
        R: Element,
        F: Fn(T, U) -> R + Send + Sync + 'static,
    {
        let combiner = Arc::new(combiner);
        let zipped = Flux::zip(self, other);
        Flux::operator("zip_with", move |scheduler| {
            let mut pairs = zipped.open(scheduler);
            let combiner = Arc::clone(&combiner);
            signal_stream(try_stream! {
                while let Some(pair) = pairs.next().await {
                    let (left, right) = pair?;
                    yield guarded("zip_with", || combiner(left, right))?;
                }
            })
        })
    }

    /// Zip any number of same-typed sequences, combining each row of values
    ///
    /// `combiner` receives one value per source, in declaration order.
    #[must_use]
    pub fn zip_all<R, F>(sources: impl IntoIterator<Item = Self>, combiner: F) -> Flux<R>
    where
        R: Element,
        F: Fn(Vec<T>) -> R + Send + Sync + 'static,
    {
        let sources: Vec<Self> = sources.into_iter().collect();
        let combiner = Arc::new(combiner);
        Flux::operator("zip_all", move |scheduler| {
            let mut rows = ZipAllStream::new(sources.iter().map(|source| source.open(scheduler)).collect());
            let combiner = Arc::clone(&combiner);
            signal_stream(try_stream! {
                while let Some(row) = rows.next().await {
                    let row = row?;
                    yield guarded("zip_all", || combiner(row))?;
                }
            })
        })
    }
}

/// Opens each source only after the previous one completed
pub(crate) fn concat_stream<T: Element>(sources: Vec<Flux<T>>, scheduler: SchedulerRef) -> SignalStream<T> {
    signal_stream(try_stream! {
        for source in sources {
            let mut current = source.open(&scheduler);
            while let Some(value) = current.next().await {
                yield value?;
            }
        }
    })
}

/// Interleaves every input by arrival
pub(crate) struct MergeStream<T> {
    inputs: Vec<Option<SignalStream<T>>>,
    done: bool,
}

impl<T> MergeStream<T> {
    pub(crate) fn new(inputs: Vec<SignalStream<T>>) -> Self {
        Self {
            inputs: inputs.into_iter().map(Some).collect(),
            done: false,
        }
    }
}

impl<T: Element> Stream for MergeStream<T> {
    type Item = Result<T, SequenceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let mut pending = false;
        for index in 0..this.inputs.len() {
            let Some(input) = this.inputs[index].as_mut() else {
                continue;
            };
            match input.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(value))) => return Poll::Ready(Some(Ok(value))),
                Poll::Ready(Some(Err(error))) => {
                    this.done = true;
                    this.inputs.clear();
                    return Poll::Ready(Some(Err(error)));
                },
                Poll::Ready(None) => this.inputs[index] = None,
                Poll::Pending => pending = true,
            }
        }

        if pending {
            Poll::Pending
        } else {
            this.done = true;
            Poll::Ready(None)
        }
    }
}

/// Values buffered per non-head input of `merge_sequential`
pub const MERGE_SEQUENTIAL_PREFETCH: usize = 32;

/// Subscribes to every input at once, serving them strictly in order
///
/// `head` is the input currently being forwarded. Inputs after it are
/// drained into per-input buffers as their values arrive, up to
/// [`MERGE_SEQUENTIAL_PREFETCH`] values each; a full buffer is not polled
/// again until the head reaches it.
pub(crate) struct MergeSequentialStream<T> {
    inputs: Vec<Option<SignalStream<T>>>,
    buffers: Vec<VecDeque<T>>,
    head: usize,
    done: bool,
}

impl<T> Unpin for MergeSequentialStream<T> {}

impl<T> MergeSequentialStream<T> {
    pub(crate) fn new(inputs: Vec<SignalStream<T>>) -> Self {
        let buffers = inputs.iter().map(|_| VecDeque::new()).collect();
        Self {
            inputs: inputs.into_iter().map(Some).collect(),
            buffers,
            head: 0,
            done: false,
        }
    }

    fn fail(&mut self, error: SequenceError) -> Poll<Option<Result<T, SequenceError>>> {
        self.done = true;
        self.inputs.clear();
        self.buffers.clear();
        Poll::Ready(Some(Err(error)))
    }
}

impl<T: Element> Stream for MergeSequentialStream<T> {
    type Item = Result<T, SequenceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        for index in (this.head + 1)..this.inputs.len() {
            while this.buffers[index].len() < MERGE_SEQUENTIAL_PREFETCH {
                let Some(input) = this.inputs[index].as_mut() else {
                    break;
                };
                match input.poll_next_unpin(cx) {
                    Poll::Ready(Some(Ok(value))) => this.buffers[index].push_back(value),
                    Poll::Ready(Some(Err(error))) => return this.fail(error),
                    Poll::Ready(None) => this.inputs[index] = None,
                    Poll::Pending => break,
                }
            }
        }

        loop {
            if this.head >= this.inputs.len() {
                this.done = true;
                return Poll::Ready(None);
            }
            if let Some(value) = this.buffers[this.head].pop_front() {
                return Poll::Ready(Some(Ok(value)));
            }
            let Some(input) = this.inputs[this.head].as_mut() else {
                this.head += 1;
                continue;
            };
            match input.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(value))) => return Poll::Ready(Some(Ok(value))),
                Poll::Ready(Some(Err(error))) => return this.fail(error),
                Poll::Ready(None) => {
                    this.inputs[this.head] = None;
                    this.head += 1;
                },
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Pairs two inputs index by index
struct ZipStream<A, B> {
    left: Option<SignalStream<A>>,
    right: Option<SignalStream<B>>,
    left_slot: Option<A>,
    right_slot: Option<B>,
}

impl<A, B> Unpin for ZipStream<A, B> {}

impl<A, B> ZipStream<A, B> {
    fn finish(&mut self) {
        self.left = None;
        self.right = None;
        self.left_slot = None;
        self.right_slot = None;
    }
}

impl<A: Element, B: Element> Stream for ZipStream<A, B> {
    type Item = Result<(A, B), SequenceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let (Some(left), Some(right)) = (this.left.as_mut(), this.right.as_mut()) else {
            return Poll::Ready(None);
        };

        if this.left_slot.is_none() {
            match left.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(value))) => this.left_slot = Some(value),
                Poll::Ready(Some(Err(error))) => {
                    this.finish();
                    return Poll::Ready(Some(Err(error)));
                },
                Poll::Ready(None) => {
                    this.finish();
                    return Poll::Ready(None);
                },
                Poll::Pending => {},
            }
        }
        if this.right_slot.is_none() {
            match right.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(value))) => this.right_slot = Some(value),
                Poll::Ready(Some(Err(error))) => {
                    this.finish();
                    return Poll::Ready(Some(Err(error)));
                },
                Poll::Ready(None) => {
                    this.finish();
                    return Poll::Ready(None);
                },
                Poll::Pending => {},
            }
        }

        match (this.left_slot.take(), this.right_slot.take()) {
            (Some(left), Some(right)) => Poll::Ready(Some(Ok((left, right)))),
            (left, right) => {
                this.left_slot = left;
                this.right_slot = right;
                Poll::Pending
            },
        }
    }
}

/// Rows of one value per input, for any number of same-typed inputs
struct ZipAllStream<T> {
    inputs: Vec<SignalStream<T>>,
    slots: SmallVec<[Option<T>; 4]>,
    done: bool,
}

impl<T> Unpin for ZipAllStream<T> {}

impl<T> ZipAllStream<T> {
    fn new(inputs: Vec<SignalStream<T>>) -> Self {
        let slots = inputs.iter().map(|_| None).collect();
        Self {
            done: inputs.is_empty(),
            inputs,
            slots,
        }
    }

    fn finish(&mut self, last: Option<SequenceError>) -> Poll<Option<Result<Vec<T>, SequenceError>>> {
        self.done = true;
        self.inputs.clear();
        self.slots.clear();
        Poll::Ready(last.map(Err))
    }
}

impl<T: Element> Stream for ZipAllStream<T> {
    type Item = Result<Vec<T>, SequenceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        for index in 0..this.inputs.len() {
            if this.slots[index].is_some() {
                continue;
            }
            match this.inputs[index].poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(value))) => this.slots[index] = Some(value),
                Poll::Ready(Some(Err(error))) => return this.finish(Some(error)),
                Poll::Ready(None) => return this.finish(None),
                Poll::Pending => {},
            }
        }

        if this.slots.iter().all(Option::is_some) {
            let row = this.slots.iter_mut().filter_map(Option::take).collect();
            Poll::Ready(Some(Ok(row)))
        } else {
            Poll::Pending
        }
    }
}
