//! Fetch demo binary
//!
//! Issues a request, immediately supersedes it with a second one, and prints
//! every snapshot the tracker pushes. Whatever order the two responses arrive
//! in, the final state belongs to the second request.
//!
//! # Running the Example
//!
//! ```bash
//! FETCH_DEMO_URL=https://httpbin.org/delay/2 \
//! FETCH_DEMO_SUPERSEDE_URL=https://httpbin.org/json \
//! cargo run -p fetch-demo
//! ```

#![allow(missing_docs)]

use request_tracker_core::environment::JsonDecoder;
use request_tracker_core::tracker::TrackerEnvironment;
use request_tracker_http::{HttpFetcher, HttpOptions};
use request_tracker_runtime::RequestTracker;
use request_tracker_runtime::diagnostics::LogDiagnostics;
use request_tracker_runtime::metrics::MetricsServer;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_URL: &str = "https://httpbin.org/delay/2";
const DEFAULT_SUPERSEDE_URL: &str = "https://httpbin.org/json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fetch_demo=debug,request_tracker_runtime=debug,request_tracker_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut metrics = MetricsServer::new("127.0.0.1:9000".parse()?);
    metrics.start()?;

    let first = std::env::var("FETCH_DEMO_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let second = std::env::var("FETCH_DEMO_SUPERSEDE_URL")
        .unwrap_or_else(|_| DEFAULT_SUPERSEDE_URL.to_string());

    println!("=== Fetch Demo: latest request wins ===\n");

    let environment = TrackerEnvironment::new(HttpFetcher::from_env()?, JsonDecoder::<Value>::new())
        .with_diagnostics(LogDiagnostics);
    let tracker = RequestTracker::with_environment(environment);

    tracker.subscribe(|snapshot| println!("  snapshot: {}", snapshot.status()));

    println!(">>> Requesting {first}");
    tracker.request(first, HttpOptions::get())?;

    println!(">>> Superseding with {second}");
    tracker.request(second, HttpOptions::get())?;

    tracker.drain().await?;

    println!("\nFinal state:");
    println!("{}", serde_json::to_string_pretty(&tracker.snapshot())?);

    if let Some(text) = metrics.render() {
        println!("\nMetrics:\n{text}");
    }

    Ok(())
}
