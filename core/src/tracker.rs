//! Lifecycle controller for a single outstanding request.
//!
//! The reducer here turns `(target, options)` inputs into fetch effects and feeds
//! their settlements back, tagging each fetch with the [`Generation`] that was
//! current when it started. A settlement whose generation is no longer current
//! (a newer request superseded it, the tracker was reset, or the consumer
//! detached) is dropped without touching the state.
//!
//! # Flow
//!
//! ```text
//! Request { target, options }
//!   → state: Loading, generation + 1
//!   → Effect::Future(fetch → decode → Settled { generation, outcome })
//!
//! Settled { generation, outcome }
//!   → generation current?  state: Success / Failure
//!   → otherwise            diagnostics.on_discarded(..), state untouched
//! ```

use crate::effect::Effect;
use crate::environment::{Clock, Decoder, Diagnostics, Fetcher, NoopDiagnostics, SystemClock};
use crate::error::RequestError;
use crate::event::{RequestEvent, reduce};
use crate::reducer::Reducer;
use crate::state::RequestState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifies the most recent logical request
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Generation(u64);

impl Generation {
    /// The generation before any request was issued
    pub const ZERO: Self = Self(0);

    /// The generation that supersedes this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Raw counter value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a settlement was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// A newer request (or a reset) replaced the one that settled
    Superseded,

    /// The consumer detached before the fetch settled
    Detached,
}

impl DiscardReason {
    /// Lowercase name, as used in logs and metric labels
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Superseded => "superseded",
            Self::Detached => "detached",
        }
    }
}

/// A settlement that arrived after its request went stale
#[derive(Debug, Clone, PartialEq)]
pub struct DiscardedSettlement {
    /// Generation the settlement belonged to
    pub generation: Generation,
    /// Generation that was current when it arrived
    pub current: Generation,
    /// Why it was dropped
    pub reason: DiscardReason,
    /// The error it carried, if the stale fetch failed
    pub error: Option<RequestError>,
    /// How long the fetch and decode took
    pub elapsed: Duration,
    /// When it was dropped
    pub discarded_at: DateTime<Utc>,
}

/// State owned by the lifecycle controller
///
/// Callers only ever see [`TrackerState::request`] snapshots; the generation and
/// the remembered input are internal sequencing data.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerState<T, Target, Options> {
    request: RequestState<T>,
    generation: Generation,
    revision: u64,
    last_input: Option<(Target, Options)>,
    detached: bool,
}

impl<T, Target, Options> TrackerState<T, Target, Options> {
    /// A fresh, idle tracker state
    #[must_use]
    pub const fn new() -> Self {
        Self {
            request: RequestState::initial(),
            generation: Generation::ZERO,
            revision: 0,
            last_input: None,
            detached: false,
        }
    }

    /// Current request snapshot
    #[must_use]
    pub const fn request(&self) -> &RequestState<T> {
        &self.request
    }

    /// Current generation
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Number of transitions committed so far
    ///
    /// Advances on every applied event, including replacements that produce an
    /// equal state. Discarded settlements and detachment leave it untouched.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Last input a request was issued for
    #[must_use]
    pub const fn last_input(&self) -> Option<&(Target, Options)> {
        self.last_input.as_ref()
    }

    /// Whether the consumer has detached
    #[must_use]
    pub const fn is_detached(&self) -> bool {
        self.detached
    }

    fn commit(&mut self, event: RequestEvent<T>) {
        self.request = reduce(&self.request, event);
        self.revision += 1;
    }
}

impl<T, Target, Options> TrackerState<T, Target, Options>
where
    Target: PartialEq,
    Options: PartialEq,
{
    fn is_last_input(&self, target: &Target, options: &Options) -> bool {
        self.last_input
            .as_ref()
            .is_some_and(|(t, o)| t == target && o == options)
    }
}

impl<T, Target, Options> Default for TrackerState<T, Target, Options> {
    fn default() -> Self {
        Self::new()
    }
}

/// Inputs to the lifecycle controller
#[derive(Debug)]
pub enum TrackerAction<T, Target, Options> {
    /// Issue a fresh request, superseding any in flight
    Request {
        /// What to fetch
        target: Target,
        /// How to fetch it
        options: Options,
    },

    /// Issue a request only if the input differs from the last one
    Observe {
        /// What to fetch
        target: Target,
        /// How to fetch it
        options: Options,
    },

    /// A fetch finished (fed back by the fetch effect)
    Settled {
        /// Generation the fetch was issued under
        generation: Generation,
        /// Decoded payload or the transport/decode error
        outcome: Result<T, RequestError>,
        /// How long fetch and decode took
        elapsed: Duration,
    },

    /// Return to `Idle`, dropping whatever is in flight
    Reset,

    /// The consumer went away; nothing in flight may be applied any more
    Detach,
}

/// Dependencies of the lifecycle controller
pub struct TrackerEnvironment<F, D> {
    /// Transport
    pub fetcher: F,
    /// Response decoder, shared with in-flight fetches
    pub decoder: Arc<D>,
    /// Lifecycle hook
    pub diagnostics: Arc<dyn Diagnostics>,
    /// Time source for diagnostics
    pub clock: Arc<dyn Clock>,
}

impl<F, D> TrackerEnvironment<F, D> {
    /// Create an environment with silent diagnostics and the system clock
    #[must_use]
    pub fn new(fetcher: F, decoder: D) -> Self {
        Self {
            fetcher,
            decoder: Arc::new(decoder),
            diagnostics: Arc::new(NoopDiagnostics),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the diagnostics hook
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: impl Diagnostics) -> Self {
        self.diagnostics = Arc::new(diagnostics);
        self
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

impl<F: Clone, D> Clone for TrackerEnvironment<F, D> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            decoder: Arc::clone(&self.decoder),
            diagnostics: Arc::clone(&self.diagnostics),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<F: std::fmt::Debug, D> std::fmt::Debug for TrackerEnvironment<F, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerEnvironment")
            .field("fetcher", &self.fetcher)
            .finish_non_exhaustive()
    }
}

/// State type driven by [`TrackerReducer<F, D>`]
pub type TrackerStateFor<F, D> =
    TrackerState<<D as Decoder>::Output, <F as Fetcher>::Target, <F as Fetcher>::Options>;

/// Action type driven by [`TrackerReducer<F, D>`]
pub type TrackerActionFor<F, D> =
    TrackerAction<<D as Decoder>::Output, <F as Fetcher>::Target, <F as Fetcher>::Options>;

/// The lifecycle controller
///
/// Generic over the fetcher `F` and decoder `D` so the action and state types
/// follow from them.
pub struct TrackerReducer<F, D> {
    _phantom: PhantomData<fn() -> (F, D)>,
}

impl<F, D> TrackerReducer<F, D> {
    /// Create a new tracker reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<F, D> Default for TrackerReducer<F, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F, D> Clone for TrackerReducer<F, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F, D> Copy for TrackerReducer<F, D> {}

impl<F, D> std::fmt::Debug for TrackerReducer<F, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TrackerReducer")
    }
}

impl<F: Fetcher, D: Decoder> TrackerReducer<F, D> {
    /// `Requested` first, then a new generation, then the fetch
    fn issue(
        state: &mut TrackerStateFor<F, D>,
        target: F::Target,
        options: F::Options,
        env: &TrackerEnvironment<F, D>,
    ) -> Effect<TrackerActionFor<F, D>> {
        state.commit(RequestEvent::Requested);
        state.generation = state.generation.next();
        state.last_input = Some((target.clone(), options.clone()));

        let generation = state.generation;
        env.diagnostics.on_issued(generation);

        let fetch = env.fetcher.fetch(target, options);
        let decoder = Arc::clone(&env.decoder);

        Effect::future(async move {
            let started = Instant::now();
            let outcome = fetch.await.and_then(|response| decoder.decode(response));

            Some(TrackerAction::Settled {
                generation,
                outcome,
                elapsed: started.elapsed(),
            })
        })
    }

    fn settle(
        state: &mut TrackerStateFor<F, D>,
        generation: Generation,
        outcome: Result<D::Output, RequestError>,
        elapsed: Duration,
        env: &TrackerEnvironment<F, D>,
    ) {
        let reason = if state.detached {
            Some(DiscardReason::Detached)
        } else if generation != state.generation {
            Some(DiscardReason::Superseded)
        } else {
            None
        };

        if let Some(reason) = reason {
            env.diagnostics.on_discarded(&DiscardedSettlement {
                generation,
                current: state.generation,
                reason,
                error: outcome.err(),
                elapsed,
                discarded_at: env.clock.now(),
            });
            return;
        }

        state.commit(RequestEvent::from(outcome));
        env.diagnostics
            .on_applied(generation, state.request.status(), elapsed);
    }
}

impl<F: Fetcher, D: Decoder> Reducer for TrackerReducer<F, D> {
    type State = TrackerStateFor<F, D>;
    type Action = TrackerActionFor<F, D>;
    type Environment = TrackerEnvironment<F, D>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TrackerAction::Request { target, options } => {
                if state.detached {
                    return smallvec![Effect::None];
                }
                smallvec![Self::issue(state, target, options, env)]
            },
            TrackerAction::Observe { target, options } => {
                if state.detached || state.is_last_input(&target, &options) {
                    return smallvec![Effect::None];
                }
                smallvec![Self::issue(state, target, options, env)]
            },
            TrackerAction::Settled {
                generation,
                outcome,
                elapsed,
            } => {
                Self::settle(state, generation, outcome, elapsed, env);
                smallvec![Effect::None]
            },
            TrackerAction::Reset => {
                if !state.detached {
                    state.generation = state.generation.next();
                    state.last_input = None;
                    state.commit(RequestEvent::Reset);
                }
                smallvec![Effect::None]
            },
            TrackerAction::Detach => {
                if !state.detached {
                    state.generation = state.generation.next();
                    state.detached = true;
                }
                smallvec![Effect::None]
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{JsonDecoder, RawResponse};
    use crate::state::Status;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    #[derive(Clone, Debug, Default)]
    struct EchoFetcher;

    impl Fetcher for EchoFetcher {
        type Target = String;
        type Options = ();

        fn fetch(
            &self,
            target: String,
            _options: (),
        ) -> BoxFuture<'static, Result<RawResponse, RequestError>> {
            Box::pin(async move {
                if target == "down" {
                    Err(RequestError::transport("timeout"))
                } else {
                    Ok(RawResponse::ok(target))
                }
            })
        }
    }

    #[derive(Default)]
    struct Recorded {
        issued: Mutex<Vec<Generation>>,
        discarded: Mutex<Vec<DiscardedSettlement>>,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Recorded>);

    impl Diagnostics for Recorder {
        fn on_issued(&self, generation: Generation) {
            self.0.issued.lock().unwrap().push(generation);
        }

        fn on_discarded(&self, discarded: &DiscardedSettlement) {
            self.0.discarded.lock().unwrap().push(discarded.clone());
        }
    }

    type TestReducer = TrackerReducer<EchoFetcher, JsonDecoder<serde_json::Value>>;
    type State = TrackerStateFor<EchoFetcher, JsonDecoder<serde_json::Value>>;
    type Action = TrackerActionFor<EchoFetcher, JsonDecoder<serde_json::Value>>;

    fn env(recorder: &Recorder) -> TrackerEnvironment<EchoFetcher, JsonDecoder<serde_json::Value>> {
        TrackerEnvironment::new(EchoFetcher, JsonDecoder::new()).with_diagnostics(recorder.clone())
    }

    fn request(target: &str) -> Action {
        TrackerAction::Request {
            target: target.to_string(),
            options: (),
        }
    }

    /// Run the single fetch effect and return the settlement it feeds back
    fn run_effect(mut effects: SmallVec<[Effect<Action>; 4]>) -> Action {
        assert_eq!(effects.len(), 1);
        match effects.remove(0) {
            Effect::Future(fut) => tokio_test::block_on(fut).unwrap(),
            Effect::None => unreachable!("expected a fetch effect"),
        }
    }

    #[test]
    fn test_request_enters_loading_and_advances_generation() {
        let recorder = Recorder::default();
        let env = env(&recorder);
        let mut state = State::new();

        let effects = TestReducer::new().reduce(&mut state, request(r#"{"id":1}"#), &env);

        assert!(state.request().is_loading());
        assert_eq!(state.generation(), Generation::ZERO.next());
        assert_eq!(state.revision(), 1);
        assert!(matches!(effects.as_slice(), [Effect::Future(_)]));
        assert_eq!(*recorder.0.issued.lock().unwrap(), vec![Generation::ZERO.next()]);
    }

    #[test]
    fn test_current_settlement_is_applied() {
        let recorder = Recorder::default();
        let env = env(&recorder);
        let reducer = TestReducer::new();
        let mut state = State::new();

        let effects = reducer.reduce(&mut state, request(r#"{"id":1}"#), &env);
        let settled = run_effect(effects);
        reducer.reduce(&mut state, settled, &env);

        assert_eq!(
            state.request().data(),
            Some(&serde_json::json!({ "id": 1 }))
        );
        assert_eq!(state.revision(), 2);
    }

    #[test]
    fn test_decode_failure_becomes_failure() {
        let recorder = Recorder::default();
        let env = env(&recorder);
        let reducer = TestReducer::new();
        let mut state = State::new();

        let settled = run_effect(reducer.reduce(&mut state, request("not json"), &env));
        reducer.reduce(&mut state, settled, &env);

        assert_eq!(state.request().status(), Status::Failure);
        assert!(state.request().error().is_some_and(RequestError::is_decode));
    }

    #[test]
    fn test_transport_failure_becomes_failure() {
        let recorder = Recorder::default();
        let env = env(&recorder);
        let reducer = TestReducer::new();
        let mut state = State::new();

        let settled = run_effect(reducer.reduce(&mut state, request("down"), &env));
        reducer.reduce(&mut state, settled, &env);

        assert_eq!(
            state.request().error(),
            Some(&RequestError::transport("timeout"))
        );
    }

    #[test]
    fn test_superseded_settlement_is_discarded() {
        let recorder = Recorder::default();
        let env = env(&recorder);
        let reducer = TestReducer::new();
        let mut state = State::new();

        let first = run_effect(reducer.reduce(&mut state, request(r#"{"id":1}"#), &env));
        let second = run_effect(reducer.reduce(&mut state, request(r#"{"id":2}"#), &env));

        reducer.reduce(&mut state, second, &env);
        let after_second = state.clone();

        reducer.reduce(&mut state, first, &env);

        assert_eq!(state, after_second);
        assert_eq!(
            state.request().data(),
            Some(&serde_json::json!({ "id": 2 }))
        );

        let discarded = recorder.0.discarded.lock().unwrap();
        assert_eq!(discarded.len(), 1);
        assert_eq!(discarded[0].reason, DiscardReason::Superseded);
        assert_eq!(discarded[0].generation, Generation::ZERO.next());
        assert_eq!(discarded[0].current, Generation::ZERO.next().next());
    }

    #[test]
    fn test_detach_discards_and_emits_nothing() {
        let recorder = Recorder::default();
        let env = env(&recorder);
        let reducer = TestReducer::new();
        let mut state = State::new();

        let settled = run_effect(reducer.reduce(&mut state, request("down"), &env));
        reducer.reduce(&mut state, TrackerAction::Detach, &env);
        let revision = state.revision();

        reducer.reduce(&mut state, settled, &env);

        assert!(state.is_detached());
        assert!(state.request().is_loading());
        assert_eq!(state.revision(), revision);

        let discarded = recorder.0.discarded.lock().unwrap();
        assert_eq!(discarded[0].reason, DiscardReason::Detached);
        assert_eq!(discarded[0].error, Some(RequestError::transport("timeout")));
    }

    #[test]
    fn test_requests_after_detach_are_ignored() {
        let recorder = Recorder::default();
        let env = env(&recorder);
        let reducer = TestReducer::new();
        let mut state = State::new();

        reducer.reduce(&mut state, TrackerAction::Detach, &env);
        let effects = reducer.reduce(&mut state, request("x"), &env);

        assert!(effects.iter().all(Effect::is_none));
        assert_eq!(*state.request(), RequestState::Idle);
    }

    #[test]
    fn test_observe_skips_unchanged_input() {
        let recorder = Recorder::default();
        let env = env(&recorder);
        let reducer = TestReducer::new();
        let mut state = State::new();

        let observe = |target: &str| TrackerAction::Observe {
            target: target.to_string(),
            options: (),
        };

        let first = reducer.reduce(&mut state, observe("1"), &env);
        let repeat = reducer.reduce(&mut state, observe("1"), &env);
        let changed = reducer.reduce(&mut state, observe("2"), &env);

        assert!(matches!(first.as_slice(), [Effect::Future(_)]));
        assert!(repeat.iter().all(Effect::is_none));
        assert!(matches!(changed.as_slice(), [Effect::Future(_)]));
        assert_eq!(recorder.0.issued.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_identical_requests_are_not_deduplicated() {
        let recorder = Recorder::default();
        let env = env(&recorder);
        let reducer = TestReducer::new();
        let mut state = State::new();

        reducer.reduce(&mut state, request("1"), &env);
        let again = reducer.reduce(&mut state, request("1"), &env);

        assert!(matches!(again.as_slice(), [Effect::Future(_)]));
        assert_eq!(state.revision(), 2);
        assert_eq!(state.generation().value(), 2);
    }

    #[test]
    fn test_reset_drops_in_flight_fetch() {
        let recorder = Recorder::default();
        let env = env(&recorder);
        let reducer = TestReducer::new();
        let mut state = State::new();

        let settled = run_effect(reducer.reduce(&mut state, request("1"), &env));
        reducer.reduce(&mut state, TrackerAction::Reset, &env);
        reducer.reduce(&mut state, settled, &env);

        assert_eq!(*state.request(), RequestState::Idle);
        assert!(state.last_input().is_none());
        assert_eq!(recorder.0.discarded.lock().unwrap().len(), 1);
    }
}
