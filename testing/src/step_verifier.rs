//! Step-by-step verification of a sequence on virtual time
//!
//! A [`StepVerifier`] lists the signals a sequence is expected to emit, in
//! order, then checks them against one observation driven by a fresh
//! [`VirtualExecutor`]. Delays cost no wall-clock time and every verify
//! method returns how much virtual time the observation took.

#![allow(clippy::module_name_repetitions)] // StepVerifier is the natural name

use crate::virtual_time::VirtualExecutor;
use composable_streams_core::{Element, Flux, SequenceError};
use futures::StreamExt;
use std::fmt::Debug;
use std::time::Duration;

/// Type alias for value predicates
type ValuePredicate<T> = Box<dyn Fn(&T) -> bool>;

/// Type alias for value consumers
type ValueConsumer<T> = Box<dyn FnOnce(T)>;

/// Type alias for error predicates
type ErrorPredicate = Box<dyn FnOnce(&SequenceError) -> bool>;

enum Step<T> {
    Count(usize),
    Matches(ValuePredicate<T>, String),
    Consume(ValueConsumer<T>),
    Cancel,
}

#[derive(Debug)]
enum Outcome {
    Completed,
    Errored(SequenceError),
    Cancelled,
}

enum Terminal {
    Complete,
    Error(SequenceError),
    ErrorMatches(ErrorPredicate),
    Cancelled,
}

/// Fluent expectations over one observation of a sequence
///
/// # Example
///
/// ```
/// use composable_streams_core::Flux;
/// use composable_streams_testing::StepVerifier;
/// use std::time::Duration;
///
/// let elapsed = StepVerifier::create(
///     Flux::from_iter(["alex", "ben", "chloe"])
///         .map(|name| name.to_uppercase())
///         .delay_elements(Duration::from_millis(100)),
/// )
/// .expect_next("ALEX".to_string())
/// .expect_next_count(2)
/// .verify_complete();
///
/// assert_eq!(elapsed, Duration::from_millis(300));
/// ```
pub struct StepVerifier<T> {
    sequence: Flux<T>,
    steps: Vec<Step<T>>,
}

impl<T> StepVerifier<T>
where
    T: Element + Debug,
{
    /// Start verifying `sequence`
    #[must_use]
    pub fn create(sequence: impl Into<Flux<T>>) -> Self {
        Self {
            sequence: sequence.into(),
            steps: Vec::new(),
        }
    }

    /// Expect the next value to equal `expected`
    #[must_use]
    pub fn expect_next(mut self, expected: T) -> Self
    where
        T: PartialEq,
    {
        self.steps.push(expect_equal(expected));
        self
    }

    /// Expect the next values to equal `expected`, in order
    #[must_use]
    pub fn expect_next_sequence(mut self, expected: impl IntoIterator<Item = T>) -> Self
    where
        T: PartialEq,
    {
        self.steps.extend(expected.into_iter().map(expect_equal));
        self
    }

    /// Expect `count` more values, whatever they are
    #[must_use]
    pub fn expect_next_count(mut self, count: usize) -> Self {
        self.steps.push(Step::Count(count));
        self
    }

    /// Expect the next value to satisfy `predicate`
    #[must_use]
    pub fn expect_next_matches<F>(mut self, description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + 'static,
    {
        self.steps.push(Step::Matches(Box::new(predicate), description.into()));
        self
    }

    /// Hand the next value to `consumer`, which may assert on it
    #[must_use]
    pub fn consume_next_with<F>(mut self, consumer: F) -> Self
    where
        F: FnOnce(T) + 'static,
    {
        self.steps.push(Step::Consume(Box::new(consumer)));
        self
    }

    /// Cancel the observation once the previous expectations are met
    ///
    /// Only [`verify_cancelled`](Self::verify_cancelled) accepts a verifier
    /// that cancels, and expectations added after this are never checked.
    #[must_use]
    pub fn then_cancel(mut self) -> Self {
        self.steps.push(Step::Cancel);
        self
    }

    /// Verify the expectations, then a completion
    ///
    /// Returns the virtual time the observation took.
    ///
    /// # Panics
    ///
    /// Panics with a description of the first signal that did not match.
    pub fn verify_complete(self) -> Duration {
        self.verify(Terminal::Complete)
    }

    /// Verify the expectations, then the error signal `expected`
    ///
    /// # Panics
    ///
    /// Panics with a description of the first signal that did not match.
    pub fn verify_error(self, expected: SequenceError) -> Duration {
        self.verify(Terminal::Error(expected))
    }

    /// Verify the expectations, then an error satisfying `predicate`
    ///
    /// # Panics
    ///
    /// Panics with a description of the first signal that did not match.
    pub fn verify_error_matches<F>(self, predicate: F) -> Duration
    where
        F: FnOnce(&SequenceError) -> bool + 'static,
    {
        self.verify(Terminal::ErrorMatches(Box::new(predicate)))
    }

    /// Verify the expectations up to [`then_cancel`](Self::then_cancel)
    ///
    /// # Panics
    ///
    /// Panics if a step did not match or the verifier never cancels.
    pub fn verify_cancelled(self) -> Duration {
        self.verify(Terminal::Cancelled)
    }

    #[allow(clippy::panic)] // Test code can panic
    fn verify(self, terminal: Terminal) -> Duration {
        let mut executor = VirtualExecutor::new();
        let scheduler = executor.scheduler_ref();
        let Self { sequence, steps } = self;
        let operator = sequence.operator_name();

        let run = executor.block_on(async move {
            let mut stream = sequence.open(&scheduler);
            let mut index = 0_usize;

            for step in steps {
                match step {
                    Step::Cancel => {
                        drop(stream);
                        return Ok(Outcome::Cancelled);
                    },
                    Step::Count(count) => {
                        for _ in 0..count {
                            next_value(&mut stream, index, "any value").await?;
                            index += 1;
                        }
                    },
                    Step::Matches(predicate, description) => {
                        let value = next_value(&mut stream, index, &description).await?;
                        if !predicate(&value) {
                            return Err(format!("expected value {description} at index {index}, got {value:?}"));
                        }
                        index += 1;
                    },
                    Step::Consume(consumer) => {
                        let value = next_value(&mut stream, index, "a value to consume").await?;
                        consumer(value);
                        index += 1;
                    },
                }
            }

            match stream.next().await {
                None => Ok(Outcome::Completed),
                Some(Err(error)) => Ok(Outcome::Errored(error)),
                Some(Ok(value)) => Err(format!("expected a terminal signal after {index} values, got value {value:?}")),
            }
        });

        let outcome = match run {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(mismatch)) => panic!("StepVerifier on '{operator}': {mismatch}"),
            Err(error) => panic!("StepVerifier on '{operator}': {error}"),
        };

        match (terminal, outcome) {
            (Terminal::Complete, Outcome::Completed) | (Terminal::Cancelled, Outcome::Cancelled) => {},
            (Terminal::Error(expected), Outcome::Errored(error)) => {
                assert_eq!(error, expected, "StepVerifier on '{operator}': unexpected error signal");
            },
            (Terminal::ErrorMatches(predicate), Outcome::Errored(error)) => {
                assert!(predicate(&error), "StepVerifier on '{operator}': error {error:?} did not match");
            },
            (_, outcome) => panic!("StepVerifier on '{operator}': unexpected termination {outcome:?}"),
        }

        executor.now()
    }
}

fn expect_equal<T: PartialEq + Debug + 'static>(expected: T) -> Step<T> {
    let description = format!("{expected:?}");
    Step::Matches(Box::new(move |value| *value == expected), description)
}

async fn next_value<T>(
    stream: &mut composable_streams_core::SignalStream<T>,
    index: usize,
    expected: &str,
) -> Result<T, String> {
    match stream.next().await {
        Some(Ok(value)) => Ok(value),
        Some(Err(error)) => Err(format!("expected {expected} at index {index}, got error {error:?}")),
        None => Err(format!("expected {expected} at index {index}, got completion")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use composable_streams_core::Mono;
    use std::sync::{Arc, Mutex};

    #[test]
    fn counts_virtual_time() {
        let elapsed = StepVerifier::create(Flux::from_iter([1, 2, 3]).delay_elements(Duration::from_millis(1000)))
            .expect_next_sequence([1, 2, 3])
            .verify_complete();

        assert_eq!(elapsed, Duration::from_secs(3));
    }

    #[test]
    fn verifies_mono() {
        StepVerifier::create(Mono::just("alex").map(str::len))
            .expect_next(4)
            .verify_complete();
    }

    #[test]
    fn verifies_error_signal() {
        let flux = Flux::from_iter([1, 2]).concat_with(Flux::error(SequenceError::failed("boom")));

        StepVerifier::create(flux)
            .expect_next_count(2)
            .verify_error(SequenceError::failed("boom"));
    }

    #[test]
    fn verifies_panicked_operator() {
        let flux = Flux::from_iter([1, 0]).map(|n: i32| 10 / n);

        StepVerifier::create(flux)
            .expect_next(10)
            .verify_error_matches(SequenceError::is_panic);
    }

    #[test]
    fn cancels_infinite_sequence() {
        let elapsed = StepVerifier::create(Flux::interval(Duration::from_millis(10)))
            .expect_next_sequence([0, 1, 2])
            .then_cancel()
            .verify_cancelled();

        assert_eq!(elapsed, Duration::from_millis(30));
    }

    #[test]
    fn consumes_and_matches_values() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);

        StepVerifier::create(Flux::from_iter(["alex", "ben"]))
            .consume_next_with(move |name| *sink.lock().unwrap() = Some(name))
            .expect_next_matches("with three letters", |name| name.len() == 3)
            .verify_complete();

        assert_eq!(*seen.lock().unwrap(), Some("alex"));
    }

    #[test]
    #[should_panic(expected = "expected value 2 at index 1, got 3")]
    fn reports_first_mismatch() {
        StepVerifier::create(Flux::from_iter([1, 3]))
            .expect_next(1)
            .expect_next(2)
            .verify_complete();
    }

    #[test]
    #[should_panic(expected = "stalled")]
    fn reports_stalled_sequence() {
        StepVerifier::create(Flux::<i32>::never()).verify_complete();
    }
}
