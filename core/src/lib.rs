//! # Composable Streams Core
//!
//! Lazy, composable asynchronous sequences.
//!
//! This crate provides the two sequence types and everything needed to build
//! pipelines out of them. Nothing here spawns tasks or reads a clock: running
//! a pipeline is the job of a [`Scheduler`](scheduler::Scheduler) and an
//! executor, supplied by the runtime crate in production and by the testing
//! crate under virtual time.
//!
//! ## Core Concepts
//!
//! - **Flux**: A sequence of zero or more values, then completion or an error
//! - **Mono**: A sequence of at most one value
//! - **Operator**: A pure constructor wrapping a sequence in a new node
//! - **Observation**: One run of a sequence, delivering signals to a subscriber
//! - **Scheduler**: Injected time source used by every delay operator
//!
//! ## Laziness
//!
//! Building a pipeline only allocates an operation tree. Every observation
//! opens the tree again, so a sequence observed twice produces its values
//! twice, independently.
//!
//! ## Example
//!
//! ```
//! use composable_streams_core::flux::Flux;
//!
//! let names = Flux::from_iter(["alex", "ben", "chloe"])
//!     .map(str::to_uppercase)
//!     .filter(|name| name.len() > 4)
//!     .map(|name| format!("{}-{name}", name.len()));
//!
//! // Nothing has run yet; `names` describes the pipeline
//! assert_eq!(names.operator_name(), "map");
//! ```

pub mod combinators;
pub mod error;
pub mod flux;
pub mod hook;
pub mod mono;
pub mod operators;
pub mod pipeline;
pub mod scheduler;
pub mod subscriber;
pub mod subscription;

mod macros;

#[cfg(test)]
mod test_support;

pub use error::SequenceError;
pub use flux::{Flux, SignalStream};
pub use hook::{Signal, SignalHook, TracingHook};
pub use mono::Mono;
pub use pipeline::Pipeline;
pub use scheduler::{Scheduler, SchedulerRef};
pub use subscriber::{CallbackSubscriber, Subscriber};
pub use subscription::{Observation, Subscription, SubscriptionState, observe};

/// Value carried by a sequence
///
/// Sequences are observed from any thread and may be observed several
/// times, so their values must be cloneable, thread-safe and owned.
pub trait Element: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Element for T {}
