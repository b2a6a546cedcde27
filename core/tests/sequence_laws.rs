//! Property tests for the ordering and length laws of the core operators.
//!
//! Every sequence here is synchronous, so a scheduler that never waits is
//! enough and the tests run on `futures`' single-threaded executor.

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use composable_streams_core::{Flux, Scheduler, SchedulerRef, SequenceError};
use futures::StreamExt;
use futures::executor::block_on;
use futures::future::BoxFuture;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Immediate;

impl Scheduler for Immediate {
    fn now(&self) -> Duration {
        Duration::ZERO
    }

    fn sleep(&self, _duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }
}

fn scheduler() -> SchedulerRef {
    Arc::new(Immediate)
}

fn run<T: Clone + Send + Sync + 'static>(flux: &Flux<T>) -> Result<Vec<T>, SequenceError> {
    block_on(flux.to_vec(&scheduler()))
}

proptest! {
    #[test]
    fn map_preserves_order_and_length(values in prop::collection::vec(any::<i32>(), 0..64)) {
        let flux = Flux::from_iter(values.clone()).map(|n| i64::from(n) * 2);
        let expected: Vec<i64> = values.iter().map(|n| i64::from(*n) * 2).collect();
        prop_assert_eq!(run(&flux).unwrap(), expected);
    }

    #[test]
    fn filter_matches_iterator_filter(values in prop::collection::vec(any::<u8>(), 0..64)) {
        let flux = Flux::from_iter(values.clone()).filter(|n| n % 3 == 0);
        let expected: Vec<u8> = values.into_iter().filter(|n| n % 3 == 0).collect();
        prop_assert_eq!(run(&flux).unwrap(), expected);
    }

    #[test]
    fn concat_is_append(
        first in prop::collection::vec(any::<u16>(), 0..32),
        second in prop::collection::vec(any::<u16>(), 0..32),
    ) {
        let flux = Flux::from_iter(first.clone()).concat_with(Flux::from_iter(second.clone()));
        let expected: Vec<u16> = first.into_iter().chain(second).collect();
        prop_assert_eq!(run(&flux).unwrap(), expected);
    }

    #[test]
    fn concat_map_is_upstream_major(values in prop::collection::vec(0_usize..5, 0..16)) {
        let flux = Flux::from_iter(values.clone())
            .concat_map(|n| Flux::from_iter(std::iter::repeat_n(n, n)));
        let expected: Vec<usize> = values.into_iter().flat_map(|n| std::iter::repeat_n(n, n)).collect();
        prop_assert_eq!(run(&flux).unwrap(), expected);
    }

    #[test]
    fn flat_map_keeps_every_inner_value(values in prop::collection::vec(0_usize..5, 0..16)) {
        let flux = Flux::from_iter(values.clone())
            .flat_map(|n| Flux::from_iter(std::iter::repeat_n(n, n)));
        let mut produced = run(&flux).unwrap();
        let mut expected: Vec<usize> = values.into_iter().flat_map(|n| std::iter::repeat_n(n, n)).collect();
        produced.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(produced, expected);
    }

    #[test]
    fn zip_length_is_the_shorter_input(
        left in prop::collection::vec(any::<i8>(), 0..32),
        right in prop::collection::vec(any::<i8>(), 0..32),
    ) {
        let flux = Flux::zip(Flux::from_iter(left.clone()), Flux::from_iter(right.clone()));
        let expected: Vec<(i8, i8)> = left.into_iter().zip(right).collect();
        prop_assert_eq!(run(&flux).unwrap(), expected);
    }

    #[test]
    fn merge_sequential_of_synchronous_inputs_is_concat(
        first in prop::collection::vec(any::<u8>(), 0..16),
        second in prop::collection::vec(any::<u8>(), 0..16),
    ) {
        let merged = Flux::merge_sequential([Flux::from_iter(first.clone()), Flux::from_iter(second.clone())]);
        let concatenated = Flux::from_iter(first).concat_with(Flux::from_iter(second));
        prop_assert_eq!(run(&merged).unwrap(), run(&concatenated).unwrap());
    }

    #[test]
    fn take_is_a_prefix(values in prop::collection::vec(any::<i32>(), 0..32), count in 0_usize..40) {
        let flux = Flux::from_iter(values.clone()).take(count);
        let expected: Vec<i32> = values.into_iter().take(count).collect();
        prop_assert_eq!(run(&flux).unwrap(), expected);
    }

    #[test]
    fn observing_twice_is_identical(values in prop::collection::vec(any::<i32>(), 0..32)) {
        let flux = Flux::from_iter(values).map(|n| n.wrapping_add(1)).filter(|n| n % 2 == 0);
        prop_assert_eq!(run(&flux), run(&flux));
    }
}

#[test]
fn merge_stays_pending_while_an_input_is_live() {
    let flux = Flux::merge([Flux::from_iter([1]), Flux::never()]);
    let mut stream = flux.open(&scheduler());

    let mut first = tokio_test::task::spawn(stream.next());
    tokio_test::assert_ready_eq!(first.poll(), Some(Ok(1)));
    drop(first);

    let mut second = tokio_test::task::spawn(stream.next());
    tokio_test::assert_pending!(second.poll());
}
