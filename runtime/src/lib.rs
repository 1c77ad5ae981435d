//! # Request Tracker Runtime
//!
//! Runtime implementation for the request tracker.
//!
//! This crate provides the Store that serialises reductions and executes effects,
//! and the [`RequestTracker`] facade built on it.
//!
//! ## Core Components
//!
//! - **Store**: Owns the state, applies actions one at a time, notifies listeners after every committed transition
//! - **Effect Executor**: Spawns fetch effects on tokio and feeds their settlements back
//! - **`RequestTracker`**: `request` / `observe` / `reset` / `detach`, snapshots, subscriptions
//!
//! ## Example
//!
//! ```ignore
//! use request_tracker_runtime::RequestTracker;
//! use request_tracker_core::environment::JsonDecoder;
//!
//! let tracker = RequestTracker::new(fetcher, JsonDecoder::<Item>::new());
//!
//! tracker.subscribe(|snapshot| println!("{}", snapshot.status()));
//! tracker.request("https://example.com/items/1".to_string(), options)?;
//! ```

use request_tracker_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Prometheus metrics for observability
pub mod metrics;

/// Tracing/metrics implementation of the lifecycle diagnostics hook
pub mod diagnostics;

/// The request tracker facade
pub mod tracker;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// The consumer detached; the tracker accepts no further requests
        #[error("Tracker has been detached")]
        Detached,

        /// `send()` was called outside a tokio runtime, so effects cannot run
        #[error("No tokio runtime available to execute effects")]
        NoRuntime,

        /// Drain timed out waiting for effects to complete
        ///
        /// Some fetches were still running when the timeout elapsed.
        #[error("Drain timed out with {0} effects still running")]
        DrainTimeout(usize),
    }
}

pub use error::StoreError;
pub use store::{ListenerId, Revisioned, Store};
pub use tracker::RequestTracker;

/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use request_tracker_runtime::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_drain_timeout(Duration::from_secs(5))
///     .with_drain_poll_interval(Duration::from_millis(5));
/// assert_eq!(config.drain_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long `drain()` waits for in-flight effects
    pub drain_timeout: Duration,
    /// How often `drain()` re-checks the pending effect count
    pub drain_poll_interval: Duration,
}

impl StoreConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub const fn new(drain_timeout: Duration, drain_poll_interval: Duration) -> Self {
        Self {
            drain_timeout,
            drain_poll_interval,
        }
    }

    /// Set the drain timeout
    #[must_use]
    pub const fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set the drain poll interval
    #[must_use]
    pub const fn with_drain_poll_interval(mut self, interval: Duration) -> Self {
        self.drain_poll_interval = interval;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
            drain_poll_interval: Duration::from_millis(10),
        }
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects of one action
/// to complete. For a request, that means the fetch has settled and its
/// settlement has been reduced (applied or discarded).
///
/// # Example
///
/// ```ignore
/// let mut handle = tracker.request(target, options)?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // The fetch started by this request has settled
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a new effect handle and the tracking side used by the executor
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                // Every tracker dropped: nothing left to wait for
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ())
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for drain tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store module - The runtime for reducers
///
/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicCounterGuard, AtomicUsize, DecrementGuard, Duration, Effect, EffectHandle,
        EffectTracking, Ordering, Reducer, StoreConfig, StoreError,
    };
    use crate::metrics::StoreMetrics;
    use request_tracker_core::SmallVec;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use tokio::runtime::Handle;
    use tokio::sync::watch;

    /// State that counts its committed transitions
    ///
    /// The Store notifies listeners only when the revision moves, so reductions
    /// that leave the state alone (a discarded settlement, a detach) are invisible
    /// to subscribers.
    pub trait Revisioned {
        /// Number of transitions committed so far
        fn revision(&self) -> u64;
    }

    impl<T, Target, Options> Revisioned
        for request_tracker_core::tracker::TrackerState<T, Target, Options>
    {
        fn revision(&self) -> u64 {
            Self::revision(self)
        }
    }

    /// Identifies a registered listener
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ListenerId(u64);

    /// Returns `false` once it has nobody left to deliver to
    type Listener<S> = Box<dyn Fn(&S) -> bool + Send + Sync>;

    struct Listeners<S> {
        next_id: u64,
        entries: Vec<(ListenerId, Listener<S>)>,
    }

    impl<S> Listeners<S> {
        const fn new() -> Self {
            Self {
                next_id: 0,
                entries: Vec::new(),
            }
        }

        fn insert(&mut self, listener: Listener<S>) -> ListenerId {
            let id = ListenerId(self.next_id);
            self.next_id += 1;
            self.entries.push((id, listener));
            id
        }

        fn notify(&mut self, state: &S) {
            self.entries.retain(|(_, listener)| listener(state));
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        // A panicking listener must not wedge the tracker; the state itself is
        // only ever replaced whole.
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind a `Mutex`, so reductions are applied one at a time)
    /// 2. Reducer (sequencing logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    /// 5. Listeners, invoked synchronously after every committed transition
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<Mutex<S>>,
        reducer: R,
        environment: Arc<E>,
        listeners: Arc<Mutex<Listeners<S>>>,
        pending_effects: Arc<AtomicUsize>,
        config: StoreConfig,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: Arc::clone(&self.environment),
                listeners: Arc::clone(&self.listeners),
                pending_effects: Arc::clone(&self.pending_effects),
                config: self.config.clone(),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + 'static,
        S: Revisioned + Send + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            Self {
                state: Arc::new(Mutex::new(initial_state)),
                reducer,
                environment: Arc::new(environment),
                listeners: Arc::new(Mutex::new(Listeners::new())),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                config,
            }
        }

        /// The configuration this store was built with
        #[must_use]
        pub const fn config(&self) -> &StoreConfig {
            &self.config
        }

        /// Send an action to the store
        ///
        /// 1. Locks the state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Notifies listeners if a transition was committed
        /// 4. Spawns the returned effects; their actions are fed back through `send`
        ///
        /// Listeners run before any effect is spawned, so the transition made by
        /// this action is always observed before anything its effects produce.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::NoRuntime`] when called outside a tokio runtime.
        /// The action is not reduced in that case.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;

            let (handle, tracking) = EffectHandle::new();
            self.apply(action, |effects| {
                tracing::trace!("Executing {} effects", effects.len());
                for effect in effects {
                    self.execute_effect(effect, &tracking, &runtime);
                }
            });

            Ok(handle)
        }

        /// Reduce an action and notify listeners, dropping any effects
        pub(crate) fn reduce_action(&self, action: A) {
            self.apply(action, drop);
        }

        /// Reduce `action`, hand its effects to `run`, then notify listeners
        ///
        /// Everything happens under the state lock. Effects are started before any
        /// listener runs; whatever they feed back waits for the lock and lands
        /// after the notification.
        fn apply<F>(&self, action: A, run: F)
        where
            F: FnOnce(SmallVec<[Effect<A>; 4]>),
        {
            let mut state = lock(&self.state);
            tracing::trace!("Acquired state lock");

            let before = state.revision();
            let start = std::time::Instant::now();
            let effects = self.reducer.reduce(&mut *state, action, &self.environment);
            StoreMetrics::record_action(start.elapsed());

            run(effects);

            if state.revision() != before {
                tracing::trace!(revision = state.revision(), "Transition committed");
                lock(&self.listeners).notify(&*state);
            }
        }

        /// Execute an effect with tracking
        ///
        /// `Effect::Future` is spawned on `runtime`; the tracking counter and the
        /// global pending count are released by guards, even if the future panics.
        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking, runtime: &Handle) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                },
                Effect::Future(fut) => {
                    tracing::trace!("Executing Effect::Future");
                    StoreMetrics::record_effect();
                    tracking.increment();

                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

                    let guard = DecrementGuard(tracking.clone());
                    let store = self.clone();

                    runtime.spawn(async move {
                        let _guard = guard;
                        let _pending_guard = pending_guard;

                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action, sending to store");
                            if let Err(error) = store.send(action) {
                                tracing::warn!(%error, "Dropped action produced by effect");
                            }
                        }
                    });
                },
            }
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let generation = store.state(|s| s.generation());
        /// ```
        pub fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = lock(&self.state);
            f(&*state)
        }

        /// Register a listener called with the state after every committed transition
        ///
        /// Listeners run synchronously, in commit order, while the state is locked.
        /// The lock is not reentrant: a listener that calls back into the store
        /// (even just to read state) deadlocks.
        pub fn subscribe<L>(&self, listener: L) -> ListenerId
        where
            L: Fn(&S) + Send + Sync + 'static,
        {
            let _state = lock(&self.state);
            lock(&self.listeners).insert(Box::new(move |state: &S| {
                listener(state);
                true
            }))
        }

        /// Remove a listener; returns whether it was registered
        pub fn unsubscribe(&self, id: ListenerId) -> bool {
            let mut listeners = lock(&self.listeners);
            let before = listeners.entries.len();
            listeners.entries.retain(|(entry, _)| *entry != id);
            listeners.entries.len() != before
        }

        /// A watch channel holding `project(state)`, refreshed after every committed transition
        ///
        /// The initial value and the registration happen under the same lock, so
        /// no transition can fall between them. Once every receiver is dropped the
        /// registration is removed at the next committed transition.
        pub fn watch_with<V, P>(&self, project: P) -> watch::Receiver<V>
        where
            V: Send + Sync + 'static,
            P: Fn(&S) -> V + Send + Sync + 'static,
        {
            let state = lock(&self.state);
            let (tx, rx) = watch::channel(project(&*state));
            lock(&self.listeners).insert(Box::new(move |s: &S| {
                if tx.is_closed() {
                    return false;
                }
                tx.send_replace(project(s));
                true
            }));
            rx
        }

        /// Number of registered listeners, watch channels included
        #[must_use]
        pub fn listener_count(&self) -> usize {
            lock(&self.listeners).entries.len()
        }

        /// Number of effects currently running
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Wait for every in-flight effect to finish
        ///
        /// Uses the configured drain timeout.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::DrainTimeout`] if effects are still running when the
        /// timeout expires.
        pub async fn drain(&self) -> Result<(), StoreError> {
            self.drain_with_timeout(self.config.drain_timeout).await
        }

        /// Wait for every in-flight effect to finish, up to `timeout`
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::DrainTimeout`] if effects are still running when the
        /// timeout expires.
        pub async fn drain_with_timeout(&self, timeout: Duration) -> Result<(), StoreError> {
            let start = std::time::Instant::now();

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::debug!("All effects completed");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::warn!(
                        pending_effects = pending,
                        "Drain timeout: {} effects still running", pending
                    );
                    return Err(StoreError::DrainTimeout(pending));
                }

                tokio::time::sleep(self.config.drain_poll_interval).await;
            }
        }
    }
}
