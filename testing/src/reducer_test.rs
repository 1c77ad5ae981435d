//! Given-When-Then harness for reducers
//!
//! A scenario is a starting state, a history of actions that got the reducer
//! there, and one action under test. Only the action under test has its
//! effects checked; the history's effects are dropped unexecuted.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use request_tracker_core::{effect::Effect, reducer::Reducer};

type StateCheck<S> = Box<dyn FnOnce(&S)>;
type EffectCheck<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// One reducer scenario
///
/// # Example
///
/// ```ignore
/// use request_tracker_testing::{ReducerTest, assertions};
///
/// ReducerTest::new(TrackerReducer::new(), environment)
///     .given(TrackerAction::Request { target: "a".into(), options: () })
///     .when(TrackerAction::Reset)
///     .then_state(|state| assert!(state.request().status() == Status::Idle))
///     .then_effects(assertions::assert_no_effects)
///     .run();
/// ```
pub struct ReducerTest<R: Reducer> {
    reducer: R,
    environment: R::Environment,
    state: R::State,
    history: Vec<R::Action>,
    action: Option<R::Action>,
    state_checks: Vec<StateCheck<R::State>>,
    effect_checks: Vec<EffectCheck<R::Action>>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::State: Default,
{
    /// Start a scenario from the default state
    #[must_use]
    pub fn new(reducer: R, environment: R::Environment) -> Self {
        Self {
            reducer,
            environment,
            state: R::State::default(),
            history: Vec::new(),
            action: None,
            state_checks: Vec::new(),
            effect_checks: Vec::new(),
        }
    }
}

impl<R: Reducer> ReducerTest<R> {
    /// Start from `state` instead of the default
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.state = state;
        self
    }

    /// Reduce `action` before the action under test
    #[must_use]
    pub fn given(mut self, action: R::Action) -> Self {
        self.history.push(action);
        self
    }

    /// The action under test; a second call replaces the first
    #[must_use]
    pub fn when(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Check the state left by the action under test
    #[must_use]
    pub fn then_state(mut self, check: impl FnOnce(&R::State) + 'static) -> Self {
        self.state_checks.push(Box::new(check));
        self
    }

    /// Check the effects returned by the action under test
    #[must_use]
    pub fn then_effects(mut self, check: impl FnOnce(&[Effect<R::Action>]) + 'static) -> Self {
        self.effect_checks.push(Box::new(check));
        self
    }

    /// Play the scenario, run every check, and return the final state
    ///
    /// # Panics
    ///
    /// Panics if no action was given with [`when`](Self::when), or if a check fails.
    #[allow(clippy::panic)] // Test harness
    pub fn run(self) -> R::State {
        let Self {
            reducer,
            environment,
            mut state,
            history,
            action,
            state_checks,
            effect_checks,
        } = self;

        let Some(action) = action else {
            panic!("ReducerTest needs an action under test: call when()");
        };

        for earlier in history {
            let _ = reducer.reduce(&mut state, earlier, &environment);
        }
        let effects = reducer.reduce(&mut state, action, &environment);

        state_checks.into_iter().for_each(|check| check(&state));
        effect_checks.into_iter().for_each(|check| check(&effects));

        state
    }
}

/// Reusable effect checks for [`ReducerTest::then_effects`]
pub mod assertions {
    use request_tracker_core::effect::Effect;

    /// Nothing but `Effect::None`
    ///
    /// # Panics
    ///
    /// Panics on any other effect.
    pub fn assert_no_effects<A>(effects: &[Effect<A>]) {
        let real = effects.iter().filter(|e| !e.is_none()).count();
        assert_eq!(real, 0, "expected no effects, got {effects:?}");
    }

    /// Exactly `expected` effects, `Effect::None` included
    ///
    /// # Panics
    ///
    /// Panics on a different count.
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(effects.len(), expected, "unexpected effects: {effects:?}");
    }

    /// At least one `Effect::Future`
    ///
    /// # Panics
    ///
    /// Panics if there is none.
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Future(_))),
            "expected a future effect, got {effects:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptedFetcher;
    use request_tracker_core::environment::JsonDecoder;
    use request_tracker_core::state::{RequestState, Status};
    use request_tracker_core::tracker::{TrackerAction, TrackerEnvironment, TrackerReducer};
    use serde_json::Value;

    type Tracker = TrackerReducer<ScriptedFetcher, JsonDecoder<Value>>;

    fn scenario(fetcher: &ScriptedFetcher) -> ReducerTest<Tracker> {
        ReducerTest::new(
            TrackerReducer::new(),
            TrackerEnvironment::new(fetcher.clone(), JsonDecoder::new()),
        )
    }

    fn request(target: &str) -> TrackerAction<Value, String, ()> {
        TrackerAction::Request {
            target: target.to_string(),
            options: (),
        }
    }

    #[test]
    fn test_history_is_reduced_before_the_action() {
        let fetcher = ScriptedFetcher::new();

        let state = scenario(&fetcher)
            .given(request("a"))
            .given(request("b"))
            .when(TrackerAction::Reset)
            .then_state(|state| assert_eq!(state.request().status(), Status::Idle))
            .then_effects(assertions::assert_no_effects)
            .run();

        assert_eq!(state.generation().value(), 3);
        assert_eq!(fetcher.calls(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_effects_checked_are_those_of_the_action_under_test() {
        let fetcher = ScriptedFetcher::new();

        scenario(&fetcher)
            .given(TrackerAction::Reset)
            .when(request("a"))
            .then_state(|state| assert_eq!(state.request(), &RequestState::Loading))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    #[should_panic(expected = "expected no effects")]
    fn test_no_effects_check_rejects_a_fetch() {
        scenario(&ScriptedFetcher::new())
            .when(request("a"))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    #[should_panic(expected = "needs an action under test")]
    fn test_missing_action_is_reported() {
        let _ = scenario(&ScriptedFetcher::new()).given(request("a")).run();
    }
}
