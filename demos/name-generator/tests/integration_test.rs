//! Integration tests for the name generator sequences
//!
//! Delayed sequences run on virtual time through `StepVerifier`, so the
//! one-second character delays cost nothing.

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use composable_streams_testing::{StepVerifier, VirtualExecutor, test_runtime};
use name_generator::{GeneratorConfig, NameGeneratorService};
use proptest::prelude::*;
use std::time::Duration;

fn service() -> NameGeneratorService {
    NameGeneratorService::default()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

#[test]
fn names_flux_emits_the_names() {
    StepVerifier::create(service().names_flux())
        .expect_next_sequence(strings(&["alex", "ben", "chloe"]))
        .verify_complete();
}

#[test]
fn name_mono_emits_alex() {
    StepVerifier::create(service().name_mono())
        .expect_next("alex".to_string())
        .verify_complete();
}

#[test]
fn names_flux_map_prefixes_long_names() {
    StepVerifier::create(service().names_flux_map(4))
        .expect_next("5-CHLOE".to_string())
        .verify_complete();

    StepVerifier::create(service().names_flux_map(3))
        .expect_next_sequence(strings(&["4-ALEX", "5-CHLOE"]))
        .verify_complete();
}

#[test]
fn names_flux_flatmap_splits_long_names() {
    StepVerifier::create(service().names_flux_flatmap(3))
        .expect_next_count(9)
        .verify_complete();

    let mut letters = VirtualExecutor::new().collect(service().names_flux_flatmap(3)).unwrap();
    letters.sort();
    let mut expected = strings(&["A", "L", "E", "X", "C", "H", "L", "O", "E"]);
    expected.sort();
    assert_eq!(letters, expected);
}

#[test]
fn names_flux_transform_falls_back_to_default() {
    StepVerifier::create(service().names_flux_transform(3))
        .expect_next_count(9)
        .verify_complete();

    StepVerifier::create(service().names_flux_transform(6))
        .expect_next("default".to_string())
        .verify_complete();
}

#[test]
fn names_flux_transform_switch_if_empty_reuses_the_pipeline() {
    StepVerifier::create(service().names_flux_transform_switch_if_empty(3))
        .expect_next_count(21)
        .verify_complete();

    StepVerifier::create(service().names_flux_transform_switch_if_empty(6))
        .expect_next_sequence(strings(&["D", "E", "F", "A", "U", "L", "T"]))
        .verify_complete();
}

#[test]
fn names_flux_flatmap_async_races_the_names() {
    let elapsed = StepVerifier::create(service().names_flux_flatmap_async(3))
        .expect_next_count(9)
        .verify_complete();

    // Both names split concurrently; the longer one sets the pace
    assert_eq!(elapsed, Duration::from_secs(5));
}

#[test]
fn names_flux_flatmap_async_emits_every_letter_once() {
    let mut executor = VirtualExecutor::new();
    let mut letters = executor.collect(service().names_flux_flatmap_async(3)).unwrap();
    letters.sort();

    let mut expected = strings(&["A", "L", "E", "X", "C", "H", "L", "O", "E"]);
    expected.sort();
    assert_eq!(letters, expected);
    assert_eq!(executor.now(), Duration::from_secs(5));
}

#[test]
fn names_flux_concatmap_keeps_name_order() {
    let elapsed = StepVerifier::create(service().names_flux_concatmap(3))
        .expect_next_sequence(strings(&["A", "L", "E", "X", "C", "H", "L", "O", "E"]))
        .verify_complete();

    assert_eq!(elapsed, Duration::from_secs(9));
}

#[test]
fn split_delay_is_configurable() {
    let service = NameGeneratorService::new(GeneratorConfig::default().with_split_delay(Duration::from_millis(5)));

    let elapsed = StepVerifier::create(service.split_string_with_delay("ben"))
        .expect_next_sequence(strings(&["b", "e", "n"]))
        .verify_complete();

    assert_eq!(elapsed, Duration::from_millis(15));
}

#[test]
fn names_flux_immutability_ignores_discarded_map() {
    StepVerifier::create(service().names_flux_immutability())
        .expect_next_sequence(strings(&["alex", "ben", "chloe"]))
        .verify_complete();
}

#[test]
fn names_mono_map_filter() {
    StepVerifier::create(service().names_mono_map_filter(3))
        .expect_next("ALEX".to_string())
        .verify_complete();

    StepVerifier::create(service().names_mono_map_filter(4)).verify_complete();
}

#[test]
fn names_mono_flat_map_collects_letters() {
    StepVerifier::create(service().names_mono_flat_map(3))
        .expect_next(strings(&["A", "L", "E", "X"]))
        .verify_complete();
}

#[test]
fn names_mono_flat_map_many_emits_letters() {
    StepVerifier::create(service().names_mono_flat_map_many(3))
        .expect_next_sequence(strings(&["A", "L", "E", "X"]))
        .verify_complete();
}

#[test]
fn concat_variants_append_in_order() {
    let service = service();
    for flux in [service.explore_concat(), service.explore_concat_with()] {
        StepVerifier::create(flux)
            .expect_next_sequence(strings(&["A", "B", "C", "D", "E", "F"]))
            .verify_complete();
    }

    StepVerifier::create(service.explore_concat_with_mono())
        .expect_next_sequence(strings(&["A", "B"]))
        .verify_complete();
}

#[test]
fn merge_interleaves_by_arrival() {
    let service = service();
    for flux in [service.explore_merge(), service.explore_merge_with()] {
        let elapsed = StepVerifier::create(flux)
            .expect_next_sequence(strings(&["D", "A", "E", "B", "F", "C"]))
            .verify_complete();

        assert_eq!(elapsed, Duration::from_millis(300));
    }

    StepVerifier::create(service.explore_merge_with_mono())
        .expect_next_sequence(strings(&["A", "B"]))
        .verify_complete();
}

#[test]
fn merge_sequential_subscribes_eagerly_and_emits_in_order() {
    let elapsed = StepVerifier::create(service().explore_merge_sequential())
        .expect_next_sequence(strings(&["A", "B", "C", "D", "E", "F"]))
        .verify_complete();

    assert_eq!(elapsed, Duration::from_millis(300));
}

#[test]
fn zip_variants_pair_by_index() {
    let service = service();
    for flux in [service.explore_zip(), service.explore_zip_with()] {
        StepVerifier::create(flux)
            .expect_next_sequence(strings(&["AD", "BE", "CF"]))
            .verify_complete();
    }

    StepVerifier::create(service.explore_zip_four())
        .expect_next_sequence(strings(&["AD14", "BE25", "CF36"]))
        .verify_complete();

    StepVerifier::create(service.explore_merge_zip_with_mono())
        .expect_next("AB".to_string())
        .verify_complete();
}

#[tokio::test(start_paused = true)]
async fn runtime_observes_delayed_pipeline_on_tokio_time() {
    let runtime = test_runtime();
    let start = tokio::time::Instant::now();

    let letters = runtime.collect(service().names_flux_concatmap(4)).await.unwrap();

    assert_eq!(letters.concat(), "CHLOE");
    assert_eq!(start.elapsed(), Duration::from_secs(5));
}

proptest! {
    #[test]
    fn names_flux_map_matches_iterator(min_len in 0_usize..8) {
        let expected: Vec<String> = ["alex", "ben", "chloe"]
            .iter()
            .map(|name| name.to_uppercase())
            .filter(|name| name.len() > min_len)
            .map(|name| format!("{}-{name}", name.len()))
            .collect();

        StepVerifier::create(service().names_flux_map(min_len))
            .expect_next_sequence(expected)
            .verify_complete();
    }
}
