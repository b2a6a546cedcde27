//! Reusable transformation pipelines.
//!
//! A [`Pipeline`] is a named function from one sequence to another. Applying
//! it only builds nodes around the sequence it is given, so the same pipeline
//! can be applied to any number of upstream sequences without cross-talk.
//!
//! # Example
//!
//! ```
//! use composable_streams_core::flux::Flux;
//! use composable_streams_core::pipeline::Pipeline;
//!
//! let long_names = Pipeline::new("long_names", |names: Flux<&'static str>| {
//!     names.map(str::to_uppercase).filter(|name| name.len() > 3)
//! });
//!
//! let first = Flux::from_iter(["alex", "ben"]).transform_with(&long_names);
//! let second = Flux::just("chloe").transform_with(&long_names);
//! assert_eq!(first.operator_name(), "filter");
//! assert_eq!(second.operator_name(), "filter");
//! ```

use crate::flux::Flux;
use std::fmt;
use std::sync::Arc;

type Stage<T, U> = Arc<dyn Fn(Flux<T>) -> Flux<U> + Send + Sync>;

/// A named, reusable `Flux<T> -> Flux<U>` transformation
pub struct Pipeline<T, U> {
    name: Arc<str>,
    stage: Stage<T, U>,
}

impl<T, U> Clone for Pipeline<T, U> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            stage: Arc::clone(&self.stage),
        }
    }
}

impl<T: 'static, U: 'static> Pipeline<T, U> {
    /// Create a pipeline from a sequence-to-sequence function
    #[must_use]
    pub fn new<F>(name: impl Into<Arc<str>>, stage: F) -> Self
    where
        F: Fn(Flux<T>) -> Flux<U> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            stage: Arc::new(stage),
        }
    }

    /// Apply the pipeline to `upstream`, returning a new sequence
    #[must_use]
    pub fn apply(&self, upstream: Flux<T>) -> Flux<U> {
        (self.stage)(upstream)
    }

    /// Compose with `next`, producing `self` followed by `next`
    #[must_use]
    pub fn and_then<V: 'static>(self, next: Pipeline<U, V>) -> Pipeline<T, V> {
        let name: Arc<str> = format!("{} -> {}", self.name, next.name).into();
        Pipeline {
            name,
            stage: Arc::new(move |upstream| next.apply(self.apply(upstream))),
        }
    }

    /// The pipeline's name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T, U> fmt::Debug for Pipeline<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
