//! Single-upstream operators: mapping, filtering, expansion, fallback, timing.
//!
//! Each operator is a pure constructor of a new node; the matching
//! `*_stream` function is what runs when that node is opened.

use crate::Element;
use crate::error::{SequenceError, guarded};
use crate::flux::{Flux, Node, Predicate, SignalStream};
use crate::mono::Mono;
use crate::pipeline::Pipeline;
use crate::scheduler::SchedulerRef;
use async_stream::try_stream;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use futures::future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// Default number of inner sequences `flat_map` keeps subscribed at once
pub const DEFAULT_CONCURRENCY: usize = 256;

/// Box a stream of signals
pub(crate) fn signal_stream<T, S>(stream: S) -> SignalStream<T>
where
    S: Stream<Item = Result<T, SequenceError>> + Send + 'static,
{
    Box::pin(stream)
}

impl<T: Element> Flux<T> {
    /// Apply `mapper` to every value, in emission order
    ///
    /// A panic inside `mapper` terminates the sequence with
    /// [`SequenceError::Panicked`].
    #[must_use]
    pub fn map<U, F>(self, mapper: F) -> Flux<U>
    where
        U: Element,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let mapper = Arc::new(mapper);
        Flux::operator("map", move |scheduler| {
            let mut upstream = self.open(scheduler);
            let mapper = Arc::clone(&mapper);
            signal_stream(try_stream! {
                while let Some(value) = upstream.next().await {
                    let value = value?;
                    yield guarded("map", || mapper(value))?;
                }
            })
        })
    }

    /// Apply a fallible `mapper`; an `Err` becomes the error signal
    #[must_use]
    pub fn try_map<U, F>(self, mapper: F) -> Flux<U>
    where
        U: Element,
        F: Fn(T) -> Result<U, SequenceError> + Send + Sync + 'static,
    {
        let mapper = Arc::new(mapper);
        Flux::operator("try_map", move |scheduler| {
            let mut upstream = self.open(scheduler);
            let mapper = Arc::clone(&mapper);
            signal_stream(try_stream! {
                while let Some(value) = upstream.next().await {
                    let value = value?;
                    yield guarded("try_map", || mapper(value))??;
                }
            })
        })
    }

    /// Keep only the values for which `predicate` holds
    #[must_use]
    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::from_node(Node::Filter {
            source: self,
            predicate: Arc::new(predicate),
        })
    }

    /// Ordered expansion
    ///
    /// For each upstream value, in upstream order, the inner sequence
    /// `expander(value)` is drained completely before the next upstream value
    /// is expanded. Output order is upstream-major, inner-minor.
    #[must_use]
    pub fn concat_map<U, F>(self, expander: F) -> Flux<U>
    where
        U: Element,
        F: Fn(T) -> Flux<U> + Send + Sync + 'static,
    {
        let expander = Arc::new(expander);
        Flux::operator("concat_map", move |scheduler| {
            let mut upstream = self.open(scheduler);
            let expander = Arc::clone(&expander);
            let scheduler = Arc::clone(scheduler);
            signal_stream(try_stream! {
                while let Some(value) = upstream.next().await {
                    let value = value?;
                    let mut inner = guarded("concat_map", || expander(value))?.open(&scheduler);
                    while let Some(item) = inner.next().await {
                        yield item?;
                    }
                }
            })
        })
    }

    /// Concurrent expansion with [`DEFAULT_CONCURRENCY`]
    ///
    /// See [`Flux::flat_map_with_concurrency`].
    #[must_use]
    pub fn flat_map<U, F>(self, expander: F) -> Flux<U>
    where
        U: Element,
        F: Fn(T) -> Flux<U> + Send + Sync + 'static,
    {
        self.flat_map_with_concurrency(expander, DEFAULT_CONCURRENCY)
    }

    /// Concurrent expansion
    ///
    /// Every upstream value is expanded and its inner sequence subscribed as
    /// soon as it arrives, up to `max_concurrency` live inner subscriptions.
    /// The output contains every inner value, but the relative order of values
    /// from different inner sequences depends on their timing and is not part
    /// of the contract.
    #[must_use]
    pub fn flat_map_with_concurrency<U, F>(self, expander: F, max_concurrency: usize) -> Flux<U>
    where
        U: Element,
        F: Fn(T) -> Flux<U> + Send + Sync + 'static,
    {
        let expander: Expander<T, U> = Arc::new(expander);
        let max_concurrency = max_concurrency.max(1);
        Flux::operator("flat_map", move |scheduler| {
            FlatMapStream {
                upstream: Some(self.open(scheduler)),
                expander: Arc::clone(&expander),
                scheduler: Arc::clone(scheduler),
                inners: Vec::new(),
                max_concurrency,
                done: false,
            }
            .boxed()
        })
    }

    /// Apply a pipeline function to this sequence at composition time
    #[must_use]
    pub fn transform<U, F>(self, pipeline: F) -> Flux<U>
    where
        F: FnOnce(Self) -> Flux<U>,
    {
        pipeline(self)
    }

    /// Apply a reusable, named [`Pipeline`]
    #[must_use]
    pub fn transform_with<U: Element>(self, pipeline: &Pipeline<T, U>) -> Flux<U> {
        pipeline.apply(self)
    }

    /// Continue with `fallback` if this sequence completes without a value
    ///
    /// `fallback` is only subscribed once the upstream completion shows it
    /// was empty; it is never subscribed otherwise.
    #[must_use]
    pub fn switch_if_empty(self, fallback: Self) -> Self {
        Self::from_node(Node::SwitchIfEmpty {
            source: self,
            fallback,
        })
    }

    /// Emit `value` if this sequence completes without a value
    #[must_use]
    pub fn default_if_empty(self, value: T) -> Self {
        self.switch_if_empty(Self::just(value))
    }

    /// Emit at most `count` values, then cancel upstream and complete
    #[must_use]
    pub fn take(self, count: usize) -> Self {
        Self::from_node(Node::Take {
            source: self,
            count,
        })
    }

    /// The first value as a [`Mono`]; empty if this sequence is empty
    #[must_use]
    pub fn next(self) -> Mono<T> {
        Mono::from_flux(self.take(1))
    }

    /// Delay every value by `delay`, measured from the previous emission
    ///
    /// Completion is forwarded without delay.
    #[must_use]
    pub fn delay_elements(self, delay: Duration) -> Self {
        Self::from_node(Node::DelayElements {
            source: self,
            delay,
        })
    }

    /// Gather every value into a single `Vec`, emitted on completion
    #[must_use]
    pub fn collect_list(self) -> Mono<Vec<T>> {
        Mono::from_flux(Flux::operator("collect_list", move |scheduler| {
            let upstream = self.open(scheduler);
            stream::once(upstream.try_collect::<Vec<T>>()).boxed()
        }))
    }

    /// Count the values, emitted on completion
    #[must_use]
    pub fn count(self) -> Mono<usize> {
        Mono::from_flux(Flux::operator("count", move |scheduler| {
            let upstream = self.open(scheduler);
            stream::once(upstream.try_fold(0_usize, |count, _| future::ready(Ok(count + 1)))).boxed()
        }))
    }
}

/// Cut a stream off after its first error
pub(crate) fn fuse_errors<T: Element>(mut upstream: SignalStream<T>) -> SignalStream<T> {
    signal_stream(try_stream! {
        while let Some(value) = upstream.next().await {
            yield value?;
        }
    })
}

pub(crate) fn filter_stream<T: Element>(mut upstream: SignalStream<T>, predicate: Predicate<T>) -> SignalStream<T> {
    signal_stream(try_stream! {
        while let Some(value) = upstream.next().await {
            let value = value?;
            if guarded("filter", || predicate(&value))? {
                yield value;
            }
        }
    })
}

pub(crate) fn take_stream<T: Element>(mut upstream: SignalStream<T>, count: usize) -> SignalStream<T> {
    signal_stream(try_stream! {
        let mut remaining = count;
        while remaining > 0 {
            let Some(value) = upstream.next().await else {
                break;
            };
            remaining -= 1;
            yield value?;
        }
    })
}

pub(crate) fn delay_stream<T: Element>(
    mut upstream: SignalStream<T>,
    scheduler: SchedulerRef,
    delay: Duration,
) -> SignalStream<T> {
    signal_stream(try_stream! {
        while let Some(value) = upstream.next().await {
            let value = value?;
            scheduler.sleep(delay).await;
            yield value;
        }
    })
}

pub(crate) fn switch_if_empty_stream<T: Element>(
    mut upstream: SignalStream<T>,
    fallback: Flux<T>,
    scheduler: SchedulerRef,
) -> SignalStream<T> {
    signal_stream(try_stream! {
        let mut emitted = false;
        while let Some(value) = upstream.next().await {
            emitted = true;
            yield value?;
        }
        if !emitted {
            tracing::trace!("Upstream completed empty, switching to fallback");
            let mut fallback = fallback.open(&scheduler);
            while let Some(value) = fallback.next().await {
                yield value?;
            }
        }
    })
}

type Expander<T, U> = Arc<dyn Fn(T) -> Flux<U> + Send + Sync>;

/// Eagerly subscribes to one inner stream per upstream value
///
/// Inner streams are polled in subscription order, so values that are ready
/// at the same time come out in upstream order.
struct FlatMapStream<T, U> {
    upstream: Option<SignalStream<T>>,
    expander: Expander<T, U>,
    scheduler: SchedulerRef,
    inners: Vec<SignalStream<U>>,
    max_concurrency: usize,
    done: bool,
}

impl<T, U> FlatMapStream<T, U> {
    fn fail(&mut self, error: SequenceError) -> Poll<Option<Result<U, SequenceError>>> {
        self.done = true;
        self.upstream = None;
        self.inners.clear();
        Poll::Ready(Some(Err(error)))
    }
}

impl<T: Element, U: Element> Stream for FlatMapStream<T, U> {
    type Item = Result<U, SequenceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        loop {
            while this.inners.len() < this.max_concurrency {
                let Some(upstream) = this.upstream.as_mut() else {
                    break;
                };
                match upstream.poll_next_unpin(cx) {
                    Poll::Ready(Some(Ok(value))) => {
                        match guarded("flat_map", || (this.expander)(value)) {
                            Ok(inner) => {
                                let opened = inner.open(&this.scheduler);
                                this.inners.push(opened);
                            },
                            Err(error) => return this.fail(error),
                        }
                    },
                    Poll::Ready(Some(Err(error))) => return this.fail(error),
                    Poll::Ready(None) => this.upstream = None,
                    Poll::Pending => break,
                }
            }

            let mut index = 0;
            let mut released = false;
            while index < this.inners.len() {
                match this.inners[index].poll_next_unpin(cx) {
                    Poll::Ready(Some(Ok(value))) => return Poll::Ready(Some(Ok(value))),
                    Poll::Ready(Some(Err(error))) => return this.fail(error),
                    Poll::Ready(None) => {
                        drop(this.inners.remove(index));
                        released = true;
                    },
                    Poll::Pending => index += 1,
                }
            }

            if this.upstream.is_none() && this.inners.is_empty() {
                this.done = true;
                return Poll::Ready(None);
            }
            // A finished inner frees a slot; pull upstream again before parking
            if !released {
                return Poll::Pending;
            }
        }
    }
}
