//! Helpers shared by the unit tests of this crate

use crate::Element;
use crate::error::SequenceError;
use crate::flux::Flux;
use crate::scheduler::{Scheduler, SchedulerRef};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Scheduler backed by `tokio::time`, so `start_paused` tests run instantly
#[derive(Debug)]
struct TokioTimeScheduler {
    origin: tokio::time::Instant,
}

impl Scheduler for TokioTimeScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

pub(crate) fn scheduler() -> SchedulerRef {
    Arc::new(TokioTimeScheduler {
        origin: tokio::time::Instant::now(),
    })
}

pub(crate) async fn collect<T: Element>(flux: &Flux<T>) -> Result<Vec<T>, SequenceError> {
    flux.to_vec(&scheduler()).await
}
