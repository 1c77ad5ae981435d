//! In-memory collaborators for tracker tests
//!
//! - [`ScriptedFetcher`]: every fetch stays pending until the test resolves or rejects it
//! - [`RecordingDiagnostics`]: captures issued, applied, and discarded settlements
//! - [`StateRecorder`]: captures every snapshot pushed to a listener

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned test mutexes

use futures::future::BoxFuture;
use request_tracker_core::environment::{Diagnostics, Fetcher, RawResponse};
use request_tracker_core::error::RequestError;
use request_tracker_core::state::{RequestState, Status};
use request_tracker_core::tracker::{DiscardedSettlement, Generation};
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

type Responder = oneshot::Sender<Result<RawResponse, RequestError>>;

#[derive(Default)]
struct Script {
    pending: HashMap<String, VecDeque<Responder>>,
    calls: Vec<String>,
}

/// Fetcher whose fetches settle only when the test says so
///
/// Targets are strings. Fetches for the same target settle in the order they
/// were issued. A fetch whose responder is dropped rejects with a transport error.
///
/// # Example
///
/// ```
/// use request_tracker_testing::ScriptedFetcher;
/// use request_tracker_core::environment::Fetcher;
///
/// # tokio_test::block_on(async {
/// let fetcher: ScriptedFetcher = ScriptedFetcher::new();
/// let pending = fetcher.fetch("a".to_string(), ());
///
/// assert!(fetcher.resolve("a", r#"{"id":1}"#));
/// assert_eq!(pending.await.unwrap().body, br#"{"id":1}"#.to_vec());
/// # });
/// ```
pub struct ScriptedFetcher<O = ()> {
    script: Arc<Mutex<Script>>,
    _options: PhantomData<fn() -> O>,
}

impl<O> ScriptedFetcher<O> {
    /// Create a fetcher with nothing in flight
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            _options: PhantomData,
        }
    }

    /// Settle the oldest pending fetch for `target` with a 200 response
    ///
    /// Returns `false` if nothing was pending for `target`.
    pub fn resolve(&self, target: &str, body: impl Into<Vec<u8>>) -> bool {
        self.respond(target, Ok(RawResponse::ok(body)))
    }

    /// Reject the oldest pending fetch for `target` with a transport error
    pub fn reject(&self, target: &str, message: &str) -> bool {
        self.respond(target, Err(RequestError::transport(message)))
    }

    /// Settle the oldest pending fetch for `target` with `outcome`
    pub fn respond(&self, target: &str, outcome: Result<RawResponse, RequestError>) -> bool {
        let responder = {
            let mut script = self.script.lock().unwrap();
            script
                .pending
                .get_mut(target)
                .and_then(VecDeque::pop_front)
        };

        // The receiver is gone only if the fetch future itself was dropped
        responder.is_some_and(|tx| tx.send(outcome).is_ok())
    }

    /// Targets fetched so far, in call order
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Number of fetches not yet settled
    #[must_use]
    pub fn pending(&self) -> usize {
        self.script
            .lock()
            .unwrap()
            .pending
            .values()
            .map(VecDeque::len)
            .sum()
    }
}

impl<O> Default for ScriptedFetcher<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> Clone for ScriptedFetcher<O> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
            _options: PhantomData,
        }
    }
}

impl<O> std::fmt::Debug for ScriptedFetcher<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedFetcher")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl<O> Fetcher for ScriptedFetcher<O>
where
    O: Clone + PartialEq + Send + Sync + std::fmt::Debug + 'static,
{
    type Target = String;
    type Options = O;

    fn fetch(
        &self,
        target: String,
        _options: O,
    ) -> BoxFuture<'static, Result<RawResponse, RequestError>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut script = self.script.lock().unwrap();
            script.calls.push(target.clone());
            script.pending.entry(target).or_default().push_back(tx);
        }

        Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(RequestError::transport("fetch abandoned")))
        })
    }
}

#[derive(Default)]
struct Recorded {
    issued: Vec<Generation>,
    applied: Vec<(Generation, Status)>,
    discarded: Vec<DiscardedSettlement>,
}

/// Diagnostics hook that keeps everything it is told
#[derive(Clone, Default)]
pub struct RecordingDiagnostics {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingDiagnostics {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generations requests were issued under
    #[must_use]
    pub fn issued(&self) -> Vec<Generation> {
        self.recorded.lock().unwrap().issued.clone()
    }

    /// Settlements committed to the state
    #[must_use]
    pub fn applied(&self) -> Vec<(Generation, Status)> {
        self.recorded.lock().unwrap().applied.clone()
    }

    /// Settlements dropped as stale
    #[must_use]
    pub fn discarded(&self) -> Vec<DiscardedSettlement> {
        self.recorded.lock().unwrap().discarded.clone()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn on_issued(&self, generation: Generation) {
        self.recorded.lock().unwrap().issued.push(generation);
    }

    fn on_applied(&self, generation: Generation, status: Status, _elapsed: Duration) {
        self.recorded
            .lock()
            .unwrap()
            .applied
            .push((generation, status));
    }

    fn on_discarded(&self, discarded: &DiscardedSettlement) {
        self.recorded
            .lock()
            .unwrap()
            .discarded
            .push(discarded.clone());
    }
}

/// Collects every snapshot pushed to a listener
///
/// ```ignore
/// let recorder = StateRecorder::new();
/// tracker.subscribe(recorder.listener());
/// // ...
/// assert_eq!(recorder.statuses(), vec![Status::Loading, Status::Success]);
/// ```
pub struct StateRecorder<T> {
    snapshots: Arc<Mutex<Vec<RequestState<T>>>>,
}

impl<T: Clone + Send + 'static> StateRecorder<T> {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A listener that appends each snapshot to this recorder
    #[must_use]
    pub fn listener(&self) -> impl Fn(&RequestState<T>) + Send + Sync + 'static {
        let snapshots = Arc::clone(&self.snapshots);
        move |state: &RequestState<T>| snapshots.lock().unwrap().push(state.clone())
    }

    /// Every snapshot received so far
    #[must_use]
    pub fn snapshots(&self) -> Vec<RequestState<T>> {
        self.snapshots.lock().unwrap().clone()
    }

    /// Status of every snapshot received so far
    #[must_use]
    pub fn statuses(&self) -> Vec<Status> {
        self.snapshots
            .lock()
            .unwrap()
            .iter()
            .map(RequestState::status)
            .collect()
    }

    /// The most recent snapshot, if any
    #[must_use]
    pub fn last(&self) -> Option<RequestState<T>> {
        self.snapshots.lock().unwrap().last().cloned()
    }
}

impl<T: Clone + Send + 'static> Default for StateRecorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for StateRecorder<T> {
    fn clone(&self) -> Self {
        Self {
            snapshots: Arc::clone(&self.snapshots),
        }
    }
}
