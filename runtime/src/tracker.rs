use crate::store::{ListenerId, Store};
use crate::{EffectHandle, StoreConfig, StoreError};
use request_tracker_core::environment::{Decoder, Fetcher};
use request_tracker_core::state::{RequestState, Status};
use request_tracker_core::tracker::{
    Generation, TrackerAction, TrackerActionFor, TrackerEnvironment, TrackerReducer, TrackerState,
    TrackerStateFor,
};
use tokio::sync::watch;

type TrackerStore<F, D> = Store<
    TrackerStateFor<F, D>,
    TrackerActionFor<F, D>,
    TrackerEnvironment<F, D>,
    TrackerReducer<F, D>,
>;

/// Tracks one outstanding request and exposes its state
///
/// Each [`request`](Self::request) supersedes the previous one: whatever the
/// older fetch eventually produces is dropped. Dropping the tracker detaches it,
/// so fetches still running at that point can no longer change anything.
///
/// The tracker is deliberately not `Clone`; share it behind an `Arc` if several
/// tasks need it, since dropping any clone would detach them all.
///
/// # Example
///
/// ```ignore
/// let tracker = RequestTracker::new(HttpFetcher::new(), JsonDecoder::<User>::new());
///
/// let mut handle = tracker.request(url, HttpOptions::default())?;
/// assert!(tracker.snapshot().is_loading());
///
/// handle.wait().await;
/// if let Some(user) = tracker.snapshot().data() { /* ... */ }
/// ```
pub struct RequestTracker<F: Fetcher, D: Decoder> {
    store: TrackerStore<F, D>,
}

impl<F: Fetcher, D: Decoder> RequestTracker<F, D> {
    /// Create a tracker with silent diagnostics and default configuration
    #[must_use]
    pub fn new(fetcher: F, decoder: D) -> Self {
        Self::with_environment(TrackerEnvironment::new(fetcher, decoder))
    }

    /// Create a tracker from a prepared environment
    #[must_use]
    pub fn with_environment(environment: TrackerEnvironment<F, D>) -> Self {
        Self::with_config(environment, StoreConfig::default())
    }

    /// Create a tracker with custom configuration
    #[must_use]
    pub fn with_config(environment: TrackerEnvironment<F, D>, config: StoreConfig) -> Self {
        Self {
            store: Store::with_config(
                TrackerState::new(),
                TrackerReducer::new(),
                environment,
                config,
            ),
        }
    }

    /// Issue a fresh request for `target`
    ///
    /// The state is `Loading` (and listeners have seen it) by the time this
    /// returns. Identical input is not deduplicated.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Detached`] after [`detach`](Self::detach)
    /// - [`StoreError::NoRuntime`] outside a tokio runtime
    pub fn request(
        &self,
        target: F::Target,
        options: F::Options,
    ) -> Result<EffectHandle, StoreError> {
        self.ensure_attached()?;
        tracing::debug!(?target, "Request");
        self.store.send(TrackerAction::Request { target, options })
    }

    /// Issue a request only if `(target, options)` differs from the last input
    ///
    /// The first observation always issues. Returns a completed handle when the
    /// input is unchanged.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Detached`] after [`detach`](Self::detach)
    /// - [`StoreError::NoRuntime`] outside a tokio runtime
    pub fn observe(
        &self,
        target: F::Target,
        options: F::Options,
    ) -> Result<EffectHandle, StoreError> {
        self.ensure_attached()?;
        self.store.send(TrackerAction::Observe { target, options })
    }

    /// Go back to `Idle`; anything in flight is dropped when it settles
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Detached`] after [`detach`](Self::detach).
    pub fn reset(&self) -> Result<(), StoreError> {
        self.ensure_attached()?;
        self.store.reduce_action(TrackerAction::Reset);
        Ok(())
    }

    /// Permanently detach the consumer
    ///
    /// In-flight fetches keep running but their settlements are dropped, and no
    /// transition is emitted from here on. Idempotent; also runs on drop.
    pub fn detach(&self) {
        self.store.reduce_action(TrackerAction::Detach);
    }

    /// Whether [`detach`](Self::detach) has been called
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.store.state(TrackerState::is_detached)
    }

    /// Current state
    #[must_use]
    pub fn snapshot(&self) -> RequestState<D::Output>
    where
        D::Output: Clone,
    {
        self.store.state(|s| s.request().clone())
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> Status {
        self.store.state(|s| s.request().status())
    }

    /// Current generation
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.store.state(TrackerState::generation)
    }

    /// Call `listener` with the new state after every committed transition
    ///
    /// Listeners run synchronously in commit order while the tracker's state
    /// lock is held. That lock is not reentrant: a listener that calls any
    /// tracker method (`status()`, `snapshot()`, `request()`, ...) deadlocks the
    /// calling thread. Hand work off to a channel instead.
    ///
    /// A listener that panics unwinds out of the call that committed the
    /// transition, but the fetch that transition started keeps running and
    /// still settles.
    pub fn subscribe<L>(&self, listener: L) -> ListenerId
    where
        L: Fn(&RequestState<D::Output>) + Send + Sync + 'static,
    {
        self.store
            .subscribe(move |state: &TrackerStateFor<F, D>| listener(state.request()))
    }

    /// Remove a listener; returns whether it was registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.store.unsubscribe(id)
    }

    /// A watch channel that always holds the latest state
    ///
    /// Dropping every receiver unregisters the channel at the next transition.
    pub fn watch(&self) -> watch::Receiver<RequestState<D::Output>>
    where
        D::Output: Clone + Sync,
    {
        self.store
            .watch_with(|state: &TrackerStateFor<F, D>| state.request().clone())
    }

    /// Number of registered listeners and live watch channels
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.store.listener_count()
    }

    /// Number of fetches still running, stale ones included
    #[must_use]
    pub fn pending(&self) -> usize {
        self.store.pending_effects()
    }

    /// Wait until every fetch started by this tracker has settled
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DrainTimeout`] if fetches are still running after
    /// the configured drain timeout.
    pub async fn drain(&self) -> Result<(), StoreError> {
        self.store.drain().await
    }

    fn ensure_attached(&self) -> Result<(), StoreError> {
        if self.is_detached() {
            tracing::warn!("Rejected action: tracker is detached");
            return Err(StoreError::Detached);
        }
        Ok(())
    }
}

impl<F: Fetcher, D: Decoder> Drop for RequestTracker<F, D> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<F: Fetcher, D: Decoder> std::fmt::Debug for RequestTracker<F, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTracker")
            .field("status", &self.status())
            .field("generation", &self.generation())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
