//! Declarative macros for ergonomic sequence construction

/// Create a `Flux` from a list of values
///
/// `flux![]` is the empty sequence.
///
/// # Example
///
/// ```rust
/// use composable_streams_core::flux;
///
/// let names = flux!["alex", "ben", "chloe"];
/// assert_eq!(names.operator_name(), "values");
///
/// let none: composable_streams_core::flux::Flux<i32> = flux![];
/// assert_eq!(none.operator_name(), "empty");
/// ```
#[macro_export]
macro_rules! flux {
    () => {
        $crate::flux::Flux::empty()
    };
    ($($value:expr),+ $(,)?) => {
        <$crate::flux::Flux<_> as ::std::iter::FromIterator<_>>::from_iter([$($value),+])
    };
}

/// Create a `Mono` from an optional single value
///
/// `mono![]` is the empty mono.
///
/// # Example
///
/// ```rust
/// use composable_streams_core::mono;
///
/// let name = mono!("alex");
/// assert_eq!(name.operator_name(), "values");
/// ```
#[macro_export]
macro_rules! mono {
    () => {
        $crate::mono::Mono::empty()
    };
    ($value:expr $(,)?) => {
        $crate::mono::Mono::just($value)
    };
}

#[cfg(test)]
mod tests {
    use crate::flux::Flux;
    use crate::mono::Mono;
    use crate::test_support::{collect, scheduler};

    #[tokio::test]
    async fn flux_macro_builds_sequences() {
        assert_eq!(collect(&flux![1, 2, 3]).await, Ok(vec![1, 2, 3]));
        assert_eq!(collect(&flux!["a",]).await, Ok(vec!["a"]));

        let empty: Flux<i32> = flux![];
        assert_eq!(collect(&empty).await, Ok(vec![]));
    }

    #[tokio::test]
    async fn mono_macro_builds_monos() {
        assert_eq!(mono!(7).value(&scheduler()).await, Ok(Some(7)));

        let empty: Mono<i32> = mono!();
        assert_eq!(empty.value(&scheduler()).await, Ok(None));
    }
}
