//! Name generator example binary
//!
//! Observes a handful of the service's sequences on the tokio runtime.

use composable_streams_core::CallbackSubscriber;
use composable_streams_runtime::Runtime;
use composable_streams_runtime::metrics::MetricsServer;
use name_generator::{GeneratorConfig, NameGeneratorService};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "name_generator=info,composable_streams_core=info,composable_streams_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Name Generator: Composable Streams ===\n");

    let mut metrics = MetricsServer::new("127.0.0.1:9090".parse()?);
    metrics.start()?;

    let config = GeneratorConfig::default().with_split_delay(Duration::from_millis(200));
    tracing::info!(split_delay = ?config.split_delay, "Starting name generator");
    let service = NameGeneratorService::new(config);
    let runtime = Runtime::new();

    let names = runtime.collect(service.names_flux_map(3)).await?;
    println!("Long names: {names:?}");

    let letters = runtime.collect(service.names_flux_concatmap(3)).await?;
    println!("Letters in order: {}", letters.concat());

    let raced = runtime.collect(service.names_flux_flatmap_async(3)).await?;
    println!("Letters raced: {}", raced.concat());

    let merged = runtime.collect(service.explore_merge()).await?;
    println!("Merged: {}", merged.concat());

    let sequential = runtime.collect(service.explore_merge_sequential()).await?;
    println!("Merged sequentially: {}", sequential.concat());

    let zipped = runtime.collect(service.explore_zip_four()).await?;
    println!("Zipped: {}", zipped.join(" "));

    let handle = runtime.observe(
        service.name_mono(),
        CallbackSubscriber::new(|name: String| println!("Mono name is: {name}"))
            .with_complete(|| println!("Mono completed")),
    )?;
    handle.wait().await?;

    runtime.shutdown_gracefully().await?;
    tracing::info!("Runtime shut down");

    if let Some(exposition) = metrics.render() {
        println!("\n--- Observation metrics ---\n{exposition}");
    }

    println!("\n=== Demonstration Complete ===");
    Ok(())
}
