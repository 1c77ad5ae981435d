//! # Request Tracker Core
//!
//! Core types for tracking the lifecycle of a single outstanding asynchronous request.
//!
//! This crate provides the pure half of the tracker: the request state model, the
//! transition function, and the lifecycle reducer that sequences requests and drops
//! settlements that have gone stale.
//!
//! ## Core Concepts
//!
//! - **`RequestState`**: `Idle | Loading | Success { data } | Failure { error }`
//! - **`RequestEvent`**: A transition applied to a state (`Requested`, `Succeeded`, `Failed`, `Reset`)
//! - **`reduce`**: Pure function `(State, Event) → State`, always a full replacement
//! - **`TrackerReducer`**: Lifecycle controller `(TrackerState, TrackerAction, Environment) → (TrackerState, Effects)`
//! - **`Generation`**: Token identifying the current request; settlements carrying an older one are discarded
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Explicit Effects (the fetch is returned as a description, the runtime runs it)
//! - Dependency Injection via Environment (`Fetcher`, `Decoder`, `Diagnostics`, `Clock`)
//!
//! ## Example
//!
//! ```
//! use request_tracker_core::event::{reduce, RequestEvent};
//! use request_tracker_core::state::{RequestState, Status};
//!
//! let state: RequestState<u32> = RequestState::initial();
//! let state = reduce(&state, RequestEvent::Requested);
//! assert_eq!(state.status(), Status::Loading);
//!
//! let state = reduce(&state, RequestEvent::Succeeded { data: 7 });
//! assert_eq!(state.data(), Some(&7));
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Error taxonomy for request failures
pub mod error;

/// Request state model
pub mod state;

/// Transition events and the pure transition function
pub mod event;

/// Lifecycle controller reducer with generation-based staleness checks
pub mod tracker;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all sequencing logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for TrackerReducer<F, D> {
    ///     type State = TrackerState<..>;
    ///     type Action = TrackerAction<..>;
    ///     type Environment = TrackerEnvironment<F, D>;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut Self::State,
    ///         action: Self::Action,
    ///         env: &Self::Environment,
    ///     ) -> SmallVec<[Effect<Self::Action>; 4]> {
    ///         match action {
    ///             TrackerAction::Request { target, options } => { /* ... */ }
    ///             _ => smallvec![Effect::None],
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Updates state in place
        /// 2. Returns effect descriptions to be executed
        ///
        /// # Returns
        ///
        /// The effects to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution).
pub mod effect {
    use futures::future::BoxFuture;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(BoxFuture<'static, Option<Action>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wrap a future whose output is fed back into the reducer
        #[must_use]
        pub fn future<F>(fut: F) -> Self
        where
            F: std::future::Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(fut))
        }

        /// Whether this effect does nothing
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external collaborators (transport, decoding, diagnostics, time) are
/// abstracted behind traits and injected via the Environment parameter.
pub mod environment;
