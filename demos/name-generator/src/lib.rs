//! # Name Generator
//!
//! A small service building sequences of names, used to exercise every
//! Composable Streams operator end to end.
//!
//! This example showcases:
//! - Mapping, filtering and fallbacks on a fixed list of names
//! - Ordered (`concat_map`) and concurrent (`flat_map`) expansion
//! - Reusable pipelines (`transform`, `Pipeline`)
//! - Concatenation, merging and zipping of several sources
//! - `Mono` operators bridging to `Flux`
//!
//! Every method only builds a sequence; nothing runs until it is observed.
//!
//! ## Example
//!
//! ```no_run
//! use composable_streams_runtime::Runtime;
//! use name_generator::NameGeneratorService;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = NameGeneratorService::default();
//! let runtime = Runtime::new();
//!
//! let names = runtime.collect(service.names_flux_map(3)).await?;
//! assert_eq!(names, vec!["4-ALEX", "5-CHLOE"]);
//! # Ok(())
//! # }
//! ```

use composable_streams_core::{Flux, Mono, Pipeline};
use std::time::Duration;

/// Names every `names_*` sequence starts from
pub const NAMES: [&str; 3] = ["alex", "ben", "chloe"];

/// Timing of the delayed demonstrations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Delay between characters in [`NameGeneratorService::split_string_with_delay`]
    pub split_delay: Duration,

    /// Per-element delays of the two sources in the merge demonstrations
    pub merge_delays: (Duration, Duration),
}

impl GeneratorConfig {
    /// Create a configuration
    #[must_use]
    pub const fn new(split_delay: Duration, merge_delays: (Duration, Duration)) -> Self {
        Self {
            split_delay,
            merge_delays,
        }
    }

    /// Set the delay between split characters
    #[must_use]
    pub const fn with_split_delay(mut self, delay: Duration) -> Self {
        self.split_delay = delay;
        self
    }

    /// Set the per-element delays of the merge sources
    #[must_use]
    pub const fn with_merge_delays(mut self, first: Duration, second: Duration) -> Self {
        self.merge_delays = (first, second);
        self
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(1000),
            (Duration::from_millis(100), Duration::from_millis(90)),
        )
    }
}

/// Builds the demonstration sequences
#[derive(Debug, Clone, Default)]
pub struct NameGeneratorService {
    config: GeneratorConfig,
}

fn names() -> Flux<String> {
    Flux::from_iter(NAMES.map(String::from))
}

fn letters(values: &[&str]) -> Flux<String> {
    Flux::from_iter(values.iter().map(|value| (*value).to_string()))
}

impl NameGeneratorService {
    /// Create a service with the given timing
    #[must_use]
    pub const fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// The service's timing
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// `alex`, `ben`, `chloe`
    #[must_use]
    pub fn names_flux(&self) -> Flux<String> {
        names()
    }

    /// `alex`
    #[must_use]
    pub fn name_mono(&self) -> Mono<String> {
        Mono::just("alex".to_string())
    }

    /// Upper-cased names longer than `min_len`, prefixed with their length
    #[must_use]
    pub fn names_flux_map(&self, min_len: usize) -> Flux<String> {
        names()
            .map(|name| name.to_uppercase())
            .filter(move |name| name.len() > min_len)
            .map(|name| format!("{}-{name}", name.len()))
            .log_named("names_flux_map")
    }

    /// Characters of the upper-cased names longer than `min_len`
    #[must_use]
    pub fn names_flux_flatmap(&self, min_len: usize) -> Flux<String> {
        names()
            .filter(move |name| name.len() > min_len)
            .map(|name| name.to_uppercase())
            .flat_map(|name| Self::split_string(&name))
            .log_named("names_flux_flatmap")
    }

    /// Like [`names_flux_flatmap`](Self::names_flux_flatmap) through a
    /// reusable stage, `"default"` when nothing is left
    #[must_use]
    pub fn names_flux_transform(&self, min_len: usize) -> Flux<String> {
        let upper_long = move |names: Flux<String>| {
            names
                .map(|name| name.to_uppercase())
                .filter(move |name| name.len() > min_len)
        };

        names()
            .transform(upper_long)
            .flat_map(|name| Self::split_string(&name))
            .default_if_empty("default".to_string())
            .log_named("names_flux_transform")
    }

    /// Characters of five names through a shared pipeline, falling back to
    /// the same pipeline applied to `"default"`
    #[must_use]
    pub fn names_flux_transform_switch_if_empty(&self, min_len: usize) -> Flux<String> {
        let split_long = Pipeline::new("split_long_names", move |names: Flux<String>| {
            names
                .map(|name| name.to_uppercase())
                .filter(move |name| name.len() > min_len)
                .flat_map(|name| Self::split_string(&name))
        });
        let fallback = Flux::just("default".to_string()).transform_with(&split_long);

        Flux::from_iter(["alex", "ben", "chloe", "eNRICO", "CARlos"].map(String::from))
            .transform_with(&split_long)
            .switch_if_empty(fallback)
            .log_named("names_flux_transform_switch_if_empty")
    }

    /// Characters of the long names, every character delayed; names race
    #[must_use]
    pub fn names_flux_flatmap_async(&self, min_len: usize) -> Flux<String> {
        let service = self.clone();
        names()
            .filter(move |name| name.len() > min_len)
            .map(|name| name.to_uppercase())
            .flat_map(move |name| service.split_string_with_delay(&name))
            .log_named("names_flux_flatmap_async")
    }

    /// Characters of the long names, every character delayed, names in order
    #[must_use]
    pub fn names_flux_concatmap(&self, min_len: usize) -> Flux<String> {
        let service = self.clone();
        names()
            .filter(move |name| name.len() > min_len)
            .map(|name| name.to_uppercase())
            .concat_map(move |name| service.split_string_with_delay(&name))
            .log_named("names_flux_concatmap")
    }

    /// One single-character string per character of `name`
    #[must_use]
    pub fn split_string(name: &str) -> Flux<String> {
        Flux::from_iter(name.chars().map(String::from))
    }

    /// [`split_string`](Self::split_string) with every character delayed by
    /// the configured split delay
    #[must_use]
    pub fn split_string_with_delay(&self, name: &str) -> Flux<String> {
        Self::split_string(name).delay_elements(self.config.split_delay)
    }

    /// The names, untouched by a `map` whose result is discarded
    #[must_use]
    pub fn names_flux_immutability(&self) -> Flux<String> {
        let names = names();
        let _uppercased = names.clone().map(|name| name.to_uppercase());
        names
    }

    /// `ALEX` if it is longer than `min_len`, empty otherwise
    #[must_use]
    pub fn names_mono_map_filter(&self, min_len: usize) -> Mono<String> {
        Mono::just("alex".to_string())
            .map(|name| name.to_uppercase())
            .filter(move |name| name.len() > min_len)
    }

    /// The characters of `ALEX` as one list, if it is longer than `min_len`
    #[must_use]
    pub fn names_mono_flat_map(&self, min_len: usize) -> Mono<Vec<String>> {
        self.names_mono_map_filter(min_len)
            .flat_map(|name| Self::split_string_mono(&name))
            .log_named("names_mono_flat_map")
    }

    /// The characters of `ALEX` as a sequence, if it is longer than `min_len`
    #[must_use]
    pub fn names_mono_flat_map_many(&self, min_len: usize) -> Flux<String> {
        self.names_mono_map_filter(min_len)
            .flat_map_many(|name| Self::split_string(&name))
            .log_named("names_mono_flat_map_many")
    }

    /// The characters of `name` collected into one list
    #[must_use]
    pub fn split_string_mono(name: &str) -> Mono<Vec<String>> {
        Mono::just(name.chars().map(String::from).collect())
    }

    /// `A B C` then `D E F`
    #[must_use]
    pub fn explore_concat(&self) -> Flux<String> {
        Flux::concat([letters(&["A", "B", "C"]), letters(&["D", "E", "F"])]).log_named("explore_concat")
    }

    /// `A B C` then `D E F`, chained
    #[must_use]
    pub fn explore_concat_with(&self) -> Flux<String> {
        letters(&["A", "B", "C"])
            .concat_with(letters(&["D", "E", "F"]))
            .log_named("explore_concat_with")
    }

    /// `A` then `B`, from two single values
    #[must_use]
    pub fn explore_concat_with_mono(&self) -> Flux<String> {
        Mono::just("A".to_string())
            .concat_with(Mono::just("B".to_string()))
            .log_named("explore_concat_with_mono")
    }

    fn merge_sources(&self) -> (Flux<String>, Flux<String>) {
        let (first, second) = self.config.merge_delays;
        (
            letters(&["A", "B", "C"]).delay_elements(first),
            letters(&["D", "E", "F"]).delay_elements(second),
        )
    }

    /// Two delayed sources interleaved by arrival time
    #[must_use]
    pub fn explore_merge(&self) -> Flux<String> {
        let (abc, def) = self.merge_sources();
        Flux::merge([abc, def]).log_named("explore_merge")
    }

    /// Two delayed sources interleaved by arrival time, chained
    #[must_use]
    pub fn explore_merge_with(&self) -> Flux<String> {
        let (abc, def) = self.merge_sources();
        abc.merge_with(def).log_named("explore_merge_with")
    }

    /// Two single values interleaved
    #[must_use]
    pub fn explore_merge_with_mono(&self) -> Flux<String> {
        Mono::just("A".to_string())
            .merge_with(Mono::just("B".to_string()))
            .log_named("explore_merge_with_mono")
    }

    /// Two delayed sources subscribed together, emitted in source order
    #[must_use]
    pub fn explore_merge_sequential(&self) -> Flux<String> {
        let (abc, def) = self.merge_sources();
        Flux::merge_sequential([abc, def]).log_named("explore_merge_sequential")
    }

    /// `AD BE CF`
    #[must_use]
    pub fn explore_zip(&self) -> Flux<String> {
        Flux::zip(letters(&["A", "B", "C"]), letters(&["D", "E", "F"]))
            .map(|(first, second)| first + &second)
            .log_named("explore_zip")
    }

    /// `AD14 BE25 CF36`, from four sources
    #[must_use]
    pub fn explore_zip_four(&self) -> Flux<String> {
        Flux::zip4(
            letters(&["A", "B", "C"]),
            letters(&["D", "E", "F"]),
            letters(&["1", "2", "3"]),
            letters(&["4", "5", "6"]),
        )
        .map(|(a, b, c, d)| format!("{a}{b}{c}{d}"))
        .log_named("explore_zip_four")
    }

    /// `AD BE CF`, combined while zipping
    #[must_use]
    pub fn explore_zip_with(&self) -> Flux<String> {
        letters(&["A", "B", "C"])
            .zip_with(letters(&["D", "E", "F"]), |first, second| first + &second)
            .log_named("explore_zip_with")
    }

    /// `AB`, from two single values
    #[must_use]
    pub fn explore_merge_zip_with_mono(&self) -> Mono<String> {
        Mono::just("A".to_string())
            .zip_with(Mono::just("B".to_string()))
            .map(|(first, second)| first + &second)
            .log_named("explore_merge_zip_with_mono")
    }
}
