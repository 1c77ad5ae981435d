use crate::metrics::TrackerMetrics;
use request_tracker_core::environment::Diagnostics;
use request_tracker_core::state::Status;
use request_tracker_core::tracker::{DiscardedSettlement, Generation};
use std::time::Duration;

/// Logs the request lifecycle with `tracing` and records it in `metrics`
///
/// Stale settlements are logged at `debug`: they are expected, but a stale
/// failure can still be worth seeing when diagnosing a flaky backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn on_issued(&self, generation: Generation) {
        tracing::debug!(%generation, "Request issued");
        TrackerMetrics::record_issued();
    }

    fn on_applied(&self, generation: Generation, status: Status, elapsed: Duration) {
        tracing::debug!(
            %generation,
            %status,
            elapsed_ms = elapsed.as_millis(),
            "Settlement applied"
        );
        TrackerMetrics::record_applied(status, elapsed);
    }

    fn on_discarded(&self, discarded: &DiscardedSettlement) {
        match &discarded.error {
            Some(error) => tracing::debug!(
                generation = %discarded.generation,
                current = %discarded.current,
                reason = discarded.reason.as_str(),
                %error,
                "Discarded stale failure"
            ),
            None => tracing::debug!(
                generation = %discarded.generation,
                current = %discarded.current,
                reason = discarded.reason.as_str(),
                "Discarded stale success"
            ),
        }
        TrackerMetrics::record_discarded(discarded.reason, discarded.elapsed);
    }
}
