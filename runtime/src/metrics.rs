//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the tracker runtime:
//! - Store reductions and effect execution
//! - Requests issued
//! - Settlements applied or discarded as stale
//!
//! # Example
//!
//! ```rust,no_run
//! use request_tracker_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use request_tracker_core::state::Status;
use request_tracker_core::tracker::DiscardReason;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

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

/// Prometheus metrics recorder.
///
/// Installs the global recorder and renders the Prometheus text format.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the metrics are advertised on (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs a
    /// warning and leaves `handle()` empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder wasn't installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Store
    describe_counter!(
        "store_actions_processed_total",
        "Total number of actions reduced by the store"
    );
    describe_histogram!(
        "store_reducer_duration_seconds",
        "Time taken to run the reducer"
    );
    describe_counter!(
        "store_effects_executed_total",
        "Total number of effects spawned"
    );

    // Tracker
    describe_counter!(
        "tracker_requests_total",
        "Total number of requests issued"
    );
    describe_counter!(
        "tracker_settlements_applied_total",
        "Settlements committed to the state, by outcome"
    );
    describe_counter!(
        "tracker_settlements_discarded_total",
        "Settlements dropped because they were stale, by reason"
    );
    describe_histogram!(
        "tracker_fetch_duration_seconds",
        "Time from fetch start to decoded settlement"
    );
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record an action reduced.
    pub fn record_action(duration: Duration) {
        counter!("store_actions_processed_total").increment(1);
        histogram!("store_reducer_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an effect spawned.
    pub fn record_effect() {
        counter!("store_effects_executed_total").increment(1);
    }
}

/// Tracker lifecycle metrics recorder.
pub struct TrackerMetrics;

impl TrackerMetrics {
    /// Record a request issued.
    pub fn record_issued() {
        counter!("tracker_requests_total").increment(1);
    }

    /// Record a settlement committed to the state.
    pub fn record_applied(status: Status, elapsed: Duration) {
        counter!("tracker_settlements_applied_total", "outcome" => status.as_str()).increment(1);
        histogram!("tracker_fetch_duration_seconds").record(elapsed.as_secs_f64());
    }

    /// Record a stale settlement.
    pub fn record_discarded(reason: DiscardReason, elapsed: Duration) {
        counter!("tracker_settlements_discarded_total", "reason" => reason.as_str()).increment(1);
        histogram!("tracker_fetch_duration_seconds").record(elapsed.as_secs_f64());
    }
}
