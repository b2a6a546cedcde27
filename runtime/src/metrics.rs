//! Prometheus metrics for observations.
//!
//! The runtime records, per observation:
//! - `flux_observations_started_total`
//! - `flux_observations_terminated_total{state}`
//! - `flux_observations_active` (gauge)
//! - `flux_observation_duration_seconds` (histogram)
//!
//! Recording is a no-op until a recorder is installed, e.g. with
//! [`MetricsServer::start`].
//!
//! # Example
//!
//! ```rust,no_run
//! use composable_streams_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Later, e.g. from a scrape handler
//! let exposition = server.render().unwrap_or_default();
//! # drop(exposition);
//! # Ok(())
//! # }
//! ```

use composable_streams_core::subscription::SubscriptionState;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder with a render handle.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a metrics server for `addr`
    ///
    /// Only the recorder is managed here; serving [`render`](Self::render)
    /// at `addr` is left to the caller.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe every metric and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    /// A recorder that is already installed (another server, another test)
    /// is not an error; [`render`](Self::render) then returns `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed; exposition is rendered on demand");
                Ok(())
            },
            Err(e) => {
                let message = e.to_string();
                if message.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(message))
                }
            },
        }
    }

    /// Address the exposition is meant to be served on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "flux_observations_started_total",
        "Total number of observations started by the runtime"
    );
    describe_counter!(
        "flux_observations_terminated_total",
        "Total number of observations that reached a terminal state, by state"
    );
    describe_gauge!(
        "flux_observations_active",
        "Number of observations currently running"
    );
    describe_histogram!(
        "flux_observation_duration_seconds",
        "Wall-clock lifetime of an observation"
    );
    describe_counter!(
        "runtime_shutdown_total",
        "Shutdown attempts, by outcome"
    );
}

/// Observation metrics recorder.
pub struct ObservationMetrics;

impl ObservationMetrics {
    /// Record an observation being started.
    pub fn record_started() {
        counter!("flux_observations_started_total").increment(1);
        gauge!("flux_observations_active").increment(1.0);
    }

    /// Record the terminal state and lifetime of an observation.
    pub fn record_terminated(state: SubscriptionState, lifetime: Duration) {
        counter!("flux_observations_terminated_total", "state" => state.as_str()).increment(1);
        histogram!("flux_observation_duration_seconds").record(lifetime.as_secs_f64());
    }

    /// Record an observation no longer being tracked by the runtime.
    pub fn record_released() {
        gauge!("flux_observations_active").decrement(1.0);
    }

    /// Record the outcome of a shutdown.
    pub fn record_shutdown(outcome: &'static str) {
        counter!("runtime_shutdown_total", "outcome" => outcome).increment(1);
    }
}
