//! # Request Tracker Testing
//!
//! Testing utilities and helpers for the request tracker.
//!
//! This crate provides:
//! - A fetcher whose settlements the test controls ([`ScriptedFetcher`])
//! - Recorders for lifecycle diagnostics and pushed snapshots
//! - A fixed clock
//! - Given-When-Then assertions for reducers ([`ReducerTest`])
//!
//! ## Example
//!
//! ```ignore
//! use request_tracker_testing::{ScriptedFetcher, StateRecorder};
//!
//! #[tokio::test]
//! async fn test_latest_request_wins() {
//!     let fetcher = ScriptedFetcher::new();
//!     let tracker = RequestTracker::new(fetcher.clone(), JsonDecoder::<Item>::new());
//!
//!     tracker.request("a".into(), ()).unwrap();
//!     let mut b = tracker.request("b".into(), ()).unwrap();
//!
//!     fetcher.resolve("b", r#"{"id":2}"#);
//!     b.wait().await;
//! }
//! ```

use chrono::{DateTime, Utc};
use request_tracker_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks;

/// Fluent reducer assertions
pub mod reducer_test;

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use request_tracker_testing::FixedClock;
/// use request_tracker_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// let time1 = clock.now();
/// let time2 = clock.now();
/// assert_eq!(time1, time2); // Always the same!
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
}

/// Route `tracing` output through the test harness
///
/// Safe to call from every test; only the first call installs the subscriber.
/// Honors `RUST_LOG`, defaulting to `debug` for the tracker crates.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "request_tracker_runtime=debug,request_tracker_core=debug".into()
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{RecordingDiagnostics, ScriptedFetcher, StateRecorder};
pub use reducer_test::{ReducerTest, assertions};
