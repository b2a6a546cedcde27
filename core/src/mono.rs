//! The at-most-one-value sequence.
//!
//! A [`Mono`] is a [`Flux`] known to emit at most one value. It shares the
//! operation tree and every operator body with `Flux`; the wrapper only
//! narrows which operators are offered and what they return.

use crate::Element;
use crate::error::SequenceError;
use crate::flux::{Flux, SignalStream};
use crate::hook::SignalHook;
use crate::operators::signal_stream;
use crate::scheduler::SchedulerRef;
use async_stream::try_stream;
use futures::StreamExt;
use futures::stream;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// An asynchronous sequence of zero or one value
///
/// # Example
///
/// ```
/// use composable_streams_core::mono::Mono;
///
/// let greeting = Mono::just("alex").map(str::to_uppercase);
/// let first_letters = greeting.clone().flat_map_many(|name| {
///     name.chars().map(String::from).collect()
/// });
/// assert_eq!(greeting.operator_name(), "map");
/// assert_eq!(first_letters.operator_name(), "concat_map");
/// ```
pub struct Mono<T> {
    flux: Flux<T>,
}

impl<T> Clone for Mono<T> {
    fn clone(&self) -> Self {
        Self {
            flux: self.flux.clone(),
        }
    }
}

impl<T> Mono<T> {
    /// Wrap a sequence that emits at most one value
    pub(crate) fn from_flux(flux: Flux<T>) -> Self {
        Self { flux }
    }

    /// Name of the outermost node
    #[must_use]
    pub fn operator_name(&self) -> &'static str {
        self.flux.operator_name()
    }

    /// View as a multi-value sequence
    #[must_use]
    pub const fn as_flux(&self) -> &Flux<T> {
        &self.flux
    }

    /// Convert into a multi-value sequence
    #[must_use]
    pub fn into_flux(self) -> Flux<T> {
        self.flux
    }
}

impl<T: Element> Mono<T> {
    /// A mono emitting `value`
    #[must_use]
    pub fn just(value: T) -> Self {
        Self::from_flux(Flux::just(value))
    }

    /// A mono emitting `value` if present, completing empty otherwise
    #[must_use]
    pub fn just_or_empty(value: Option<T>) -> Self {
        value.map_or_else(Self::empty, Self::just)
    }

    /// A mono completing without a value
    #[must_use]
    pub fn empty() -> Self {
        Self::from_flux(Flux::empty())
    }

    /// A mono that never terminates
    #[must_use]
    pub fn never() -> Self {
        Self::from_flux(Flux::never())
    }

    /// A mono terminating with `error`
    #[must_use]
    pub fn error(error: SequenceError) -> Self {
        Self::from_flux(Flux::error(error))
    }

    /// Build the mono lazily, once per observation
    #[must_use]
    pub fn defer<F>(factory: F) -> Self
    where
        F: Fn() -> Self + Send + Sync + 'static,
    {
        Self::from_flux(Flux::defer(move || factory().flux))
    }

    /// A mono resolving to the output of a future
    ///
    /// `factory` is invoked once per observation. `Ok` becomes the value,
    /// `Err` becomes the error signal.
    #[must_use]
    pub fn from_future<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, SequenceError>> + Send + 'static,
    {
        Self::from_flux(Flux::from_stream(move || stream::once(factory())))
    }

    /// Apply `mapper` to the value
    #[must_use]
    pub fn map<U, F>(self, mapper: F) -> Mono<U>
    where
        U: Element,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Mono::from_flux(self.flux.map(mapper))
    }

    /// Apply a fallible `mapper` to the value
    #[must_use]
    pub fn try_map<U, F>(self, mapper: F) -> Mono<U>
    where
        U: Element,
        F: Fn(T) -> Result<U, SequenceError> + Send + Sync + 'static,
    {
        Mono::from_flux(self.flux.try_map(mapper))
    }

    /// Keep the value only if `predicate` holds
    #[must_use]
    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::from_flux(self.flux.filter(predicate))
    }

    /// Chain an asynchronous single-value step
    #[must_use]
    pub fn flat_map<U, F>(self, expander: F) -> Mono<U>
    where
        U: Element,
        F: Fn(T) -> Mono<U> + Send + Sync + 'static,
    {
        Mono::from_flux(self.flux.concat_map(move |value| expander(value).flux))
    }

    /// Expand the value into a multi-value sequence
    #[must_use]
    pub fn flat_map_many<U, F>(self, expander: F) -> Flux<U>
    where
        U: Element,
        F: Fn(T) -> Flux<U> + Send + Sync + 'static,
    {
        self.flux.concat_map(expander)
    }

    /// Pair this value with `other`'s value
    ///
    /// Empty if either side is empty.
    #[must_use]
    pub fn zip_with<U: Element>(self, other: Mono<U>) -> Mono<(T, U)> {
        Mono::from_flux(Flux::zip(self.flux, other.flux))
    }

    /// Combine this value with `other`'s value
    #[must_use]
    pub fn zip_with_combiner<U, R, F>(self, other: Mono<U>, combiner: F) -> Mono<R>
    where
        U: Element,
        R: Element,
        F: Fn(T, U) -> R + Send + Sync + 'static,
    {
        Mono::from_flux(self.flux.zip_with(other.flux, combiner))
    }

    /// Both values, in arrival order
    #[must_use]
    pub fn merge_with(self, other: Self) -> Flux<T> {
        self.flux.merge_with(other.flux)
    }

    /// Both values, this one first
    #[must_use]
    pub fn concat_with(self, other: Self) -> Flux<T> {
        self.flux.concat_with(other.flux)
    }

    /// Continue with `fallback` if this mono completes empty
    #[must_use]
    pub fn switch_if_empty(self, fallback: Self) -> Self {
        Self::from_flux(self.flux.switch_if_empty(fallback.flux))
    }

    /// Emit `value` if this mono completes empty
    #[must_use]
    pub fn default_if_empty(self, value: T) -> Self {
        Self::from_flux(self.flux.default_if_empty(value))
    }

    /// Wait for this mono to complete, discard its value, then run `next`
    ///
    /// An error from this mono skips `next` entirely.
    #[must_use]
    pub fn then<U: Element>(self, next: Mono<U>) -> Mono<U> {
        let first = self.flux;
        let next = next.flux;
        Mono::from_flux(Flux::operator("then", move |scheduler| {
            let mut upstream = first.open(scheduler);
            let next = next.clone();
            let scheduler = Arc::clone(scheduler);
            signal_stream(try_stream! {
                while let Some(value) = upstream.next().await {
                    let _ = value?;
                }
                let mut following = next.open(&scheduler);
                while let Some(value) = following.next().await {
                    yield value?;
                }
            })
        }))
    }

    /// Delay the value by `delay`
    #[must_use]
    pub fn delay_element(self, delay: Duration) -> Self {
        Self::from_flux(self.flux.delay_elements(delay))
    }

    /// Apply a mono-to-mono function at composition time
    #[must_use]
    pub fn transform<U, F>(self, pipeline: F) -> Mono<U>
    where
        F: FnOnce(Self) -> Mono<U>,
    {
        pipeline(self)
    }

    /// Attach a lifecycle hook
    #[must_use]
    pub fn tap<H>(self, hook: H) -> Self
    where
        H: SignalHook<T> + 'static,
    {
        Self::from_flux(self.flux.tap(hook))
    }

    /// Log every signal at INFO level under the label `mono`
    #[must_use]
    pub fn log(self) -> Self
    where
        T: Debug,
    {
        self.log_named("mono")
    }

    /// Log every signal at INFO level under `label`
    #[must_use]
    pub fn log_named(self, label: impl Into<Arc<str>>) -> Self
    where
        T: Debug,
    {
        Self::from_flux(self.flux.log_named(label))
    }

    /// Run `callback` with the value when it passes through
    #[must_use]
    pub fn do_on_next<F>(self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self::from_flux(self.flux.do_on_next(callback))
    }

    /// Open the operation tree for one observation
    #[must_use]
    pub fn open(&self, scheduler: &SchedulerRef) -> SignalStream<T> {
        self.flux.open(scheduler)
    }

    /// Observe the mono and return its value, if any
    ///
    /// # Errors
    ///
    /// Returns the mono's error signal if it terminates with one.
    pub async fn value(&self, scheduler: &SchedulerRef) -> Result<Option<T>, SequenceError> {
        let mut stream = self.flux.open(scheduler);
        stream.next().await.transpose()
    }
}

impl<T> From<Mono<T>> for Flux<T> {
    fn from(mono: Mono<T>) -> Self {
        mono.flux
    }
}

impl<T> Debug for Mono<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Mono").field(&self.flux).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{collect, scheduler};

    fn name() -> Mono<&'static str> {
        Mono::just("alex")
    }

    fn split(name: String) -> Flux<String> {
        name.chars().map(String::from).collect()
    }

    #[tokio::test]
    async fn map_filter_keeps_or_drops_value() {
        let kept = name().map(str::to_uppercase).filter(|name| name.len() > 3);
        assert_eq!(kept.value(&scheduler()).await, Ok(Some("ALEX".to_string())));

        let dropped = name().map(str::to_uppercase).filter(|name| name.len() > 4);
        assert_eq!(dropped.value(&scheduler()).await, Ok(None));
    }

    #[tokio::test]
    async fn flat_map_chains_single_value() {
        let mono = name()
            .map(str::to_uppercase)
            .flat_map(|name| Mono::just(split(name)))
            .flat_map(|letters| letters.collect_list());

        let letters = mono.value(&scheduler()).await;
        assert_eq!(
            letters,
            Ok(Some(vec!["A".to_string(), "L".to_string(), "E".to_string(), "X".to_string()]))
        );
    }

    #[tokio::test]
    async fn flat_map_many_expands_value() {
        let flux = name().map(str::to_uppercase).flat_map_many(split);
        let expected: Vec<String> = ["A", "L", "E", "X"].into_iter().map(String::from).collect();
        assert_eq!(collect(&flux).await, Ok(expected));
    }

    #[tokio::test]
    async fn zip_with_is_empty_when_either_side_is() {
        let both = Mono::just("A").zip_with(Mono::just("B"));
        assert_eq!(both.value(&scheduler()).await, Ok(Some(("A", "B"))));

        let one_empty = Mono::just("A").zip_with(Mono::<&str>::empty());
        assert_eq!(one_empty.value(&scheduler()).await, Ok(None));
    }

    #[tokio::test]
    async fn concat_and_merge_produce_two_values() {
        let concat = Mono::just("A").concat_with(Mono::just("B"));
        assert_eq!(collect(&concat).await, Ok(vec!["A", "B"]));

        let merge = Mono::just("A").merge_with(Mono::just("B"));
        assert_eq!(collect(&merge).await, Ok(vec!["A", "B"]));
    }

    #[tokio::test]
    async fn then_discards_first_value() {
        let mono = Mono::just(1).then(Mono::just("next"));
        assert_eq!(mono.value(&scheduler()).await, Ok(Some("next")));

        let failed = Mono::<i32>::error(SequenceError::failed("first")).then(Mono::just("next"));
        assert_eq!(failed.value(&scheduler()).await, Err(SequenceError::failed("first")));
    }

    #[tokio::test]
    async fn from_future_resolves_per_observation() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mono = Mono::from_future(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(call) }
        });

        assert_eq!(mono.value(&scheduler()).await, Ok(Some(0)));
        assert_eq!(mono.value(&scheduler()).await, Ok(Some(1)));
    }

    #[tokio::test]
    async fn switch_if_empty_and_default() {
        let fallback = Mono::<&str>::empty().switch_if_empty(Mono::just("fallback"));
        assert_eq!(fallback.value(&scheduler()).await, Ok(Some("fallback")));

        let default = Mono::<&str>::empty().default_if_empty("default");
        assert_eq!(default.value(&scheduler()).await, Ok(Some("default")));

        assert_eq!(Mono::just_or_empty(None::<i32>).value(&scheduler()).await, Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_element_waits_before_emitting() {
        let start = tokio::time::Instant::now();
        let mono = Mono::just("late").delay_element(Duration::from_secs(1));

        assert_eq!(mono.value(&scheduler()).await, Ok(Some("late")));
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }
}
