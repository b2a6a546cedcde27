//! Error signals carried by sequences.
//!
//! Errors are terminal signals, not faults: a failure inside a user closure,
//! a failed factory or a panic inside an operator is captured and delivered
//! as the error terminal of the sequence at that point.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error;

/// Error terminal signal of a [`Flux`](crate::flux::Flux) or [`Mono`](crate::mono::Mono).
///
/// `SequenceError` is `Clone` so that a sequence built with
/// [`Flux::error`](crate::flux::Flux::error) can be observed any number of
/// times, each observation receiving its own copy of the error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// Production or a user closure reported a failure
    #[error("Sequence failed: {0}")]
    Failed(String),

    /// A user closure panicked inside an operator
    ///
    /// The panic is caught at the operator boundary and turned into this
    /// error signal; the observing task keeps running.
    #[error("Operator '{operator}' panicked: {message}")]
    Panicked {
        /// Name of the operator whose closure panicked
        operator: &'static str,
        /// Panic payload rendered as text
        message: String,
    },

    /// The driving executor ran out of work before the sequence terminated
    ///
    /// Reported by virtual-time executors when no task can make progress and
    /// no timer is pending.
    #[error("Sequence stalled before reaching a terminal signal")]
    Stalled,
}

impl SequenceError {
    /// Create a [`SequenceError::Failed`] from any displayable message.
    ///
    /// # Examples
    ///
    /// ```
    /// use composable_streams_core::error::SequenceError;
    ///
    /// let error = SequenceError::failed("lookup failed");
    /// assert_eq!(error.to_string(), "Sequence failed: lookup failed");
    /// ```
    #[must_use]
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }

    /// Check whether this error was produced by a caught panic.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

/// Run a user closure, turning a panic into [`SequenceError::Panicked`].
pub(crate) fn guarded<R>(operator: &'static str, f: impl FnOnce() -> R) -> Result<R, SequenceError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| SequenceError::Panicked {
        operator,
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_renders_message() {
        let error = SequenceError::failed("boom");
        assert_eq!(error, SequenceError::Failed("boom".to_string()));
        assert_eq!(error.to_string(), "Sequence failed: boom");
        assert!(!error.is_panic());
    }

    #[test]
    fn guarded_passes_through_values() {
        assert_eq!(guarded("map", || 21 * 2), Ok(42));
    }

    #[test]
    #[allow(clippy::panic)] // Intentional panic for testing error capture
    fn guarded_captures_str_panics() {
        let result: Result<(), _> = guarded("map", || panic!("bad input"));
        assert_eq!(
            result,
            Err(SequenceError::Panicked {
                operator: "map",
                message: "bad input".to_string(),
            })
        );
    }

    #[test]
    #[allow(clippy::panic)] // Intentional panic for testing error capture
    fn guarded_captures_formatted_panics() {
        let value = 7;
        let result: Result<(), _> = guarded("filter", || panic!("bad value {value}"));
        let error = result.err();
        assert!(matches!(
            error,
            Some(SequenceError::Panicked { operator: "filter", ref message }) if message == "bad value 7"
        ));
    }
}
