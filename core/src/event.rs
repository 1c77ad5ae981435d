use crate::error::RequestError;
use crate::state::RequestState;
use serde::{Deserialize, Serialize};

/// A lifecycle change applied to a [`RequestState`]
///
/// The set is closed: there is no way to build an event outside these variants,
/// and deserializing an unknown `type` tag fails instead of being ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestEvent<T> {
    /// A new request was issued
    Requested,

    /// The current request produced a payload
    Succeeded {
        /// Decoded payload
        data: T,
    },

    /// The current request failed
    Failed {
        /// What went wrong
        error: RequestError,
    },

    /// The tracker went back to its initial state
    Reset,
}

impl<T> From<RequestEvent<T>> for RequestState<T> {
    fn from(event: RequestEvent<T>) -> Self {
        match event {
            RequestEvent::Requested => Self::Loading,
            RequestEvent::Succeeded { data } => Self::Success { data },
            RequestEvent::Failed { error } => Self::Failure { error },
            RequestEvent::Reset => Self::initial(),
        }
    }
}

impl<T> From<Result<T, RequestError>> for RequestEvent<T> {
    fn from(outcome: Result<T, RequestError>) -> Self {
        match outcome {
            Ok(data) => Self::Succeeded { data },
            Err(error) => Self::Failed { error },
        }
    }
}

/// Apply an event to a state
///
/// Every event fully replaces the prior state; nothing from `_state` is carried
/// forward, so a payload or error never leaks into the next state. Replaying the
/// same event yields the same state.
#[must_use]
pub fn reduce<T>(_state: &RequestState<T>, event: RequestEvent<T>) -> RequestState<T> {
    RequestState::from(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Status;
    use proptest::prelude::*;

    fn any_state() -> impl Strategy<Value = RequestState<i64>> {
        prop_oneof![
            Just(RequestState::Idle),
            Just(RequestState::Loading),
            any::<i64>().prop_map(|data| RequestState::Success { data }),
            ".*".prop_map(|m| RequestState::Failure {
                error: RequestError::Transport(m)
            }),
            ".*".prop_map(|m| RequestState::Failure {
                error: RequestError::Decode(m)
            }),
        ]
    }

    fn any_error() -> impl Strategy<Value = RequestError> {
        prop_oneof![
            ".*".prop_map(RequestError::Transport),
            ".*".prop_map(RequestError::Decode),
        ]
    }

    fn any_event() -> impl Strategy<Value = RequestEvent<i64>> {
        prop_oneof![
            Just(RequestEvent::Requested),
            any::<i64>().prop_map(|data| RequestEvent::Succeeded { data }),
            any_error().prop_map(|error| RequestEvent::Failed { error }),
            Just(RequestEvent::Reset),
        ]
    }

    proptest! {
        #[test]
        fn requested_always_restarts_clean(state in any_state()) {
            let next = reduce(&state, RequestEvent::Requested);
            prop_assert_eq!(next.status(), Status::Loading);
            prop_assert!(next.data().is_none());
            prop_assert!(next.error().is_none());
        }

        #[test]
        fn succeeded_always_replaces(state in any_state(), value in any::<i64>()) {
            let next = reduce(&state, RequestEvent::Succeeded { data: value });
            prop_assert_eq!(next, RequestState::Success { data: value });
        }

        #[test]
        fn failed_always_replaces(state in any_state(), error in any_error()) {
            let next = reduce(&state, RequestEvent::Failed { error: error.clone() });
            prop_assert_eq!(next.status(), Status::Failure);
            prop_assert!(next.data().is_none());
            prop_assert_eq!(next.error(), Some(&error));
        }

        #[test]
        fn replay_is_idempotent(state in any_state(), event in any_event()) {
            let once = reduce(&state, event.clone());
            let twice = reduce(&once, event);
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_success_after_failure_overwrites() {
        let failed: RequestState<u8> = RequestState::Failure {
            error: RequestError::transport("timeout"),
        };
        let next = reduce(&failed, RequestEvent::Succeeded { data: 1 });
        assert_eq!(next, RequestState::Success { data: 1 });
        assert!(next.error().is_none());
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let state = RequestState::Success { data: 1_u8 };
        assert_eq!(reduce(&state, RequestEvent::Reset), RequestState::Idle);
    }

    #[test]
    fn test_outcome_conversion() {
        let ok: RequestEvent<u8> = Ok(3).into();
        assert_eq!(ok, RequestEvent::Succeeded { data: 3 });

        let err: RequestEvent<u8> = Err(RequestError::decode("bad json")).into();
        assert_eq!(
            err,
            RequestEvent::Failed {
                error: RequestError::decode("bad json")
            }
        );
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result = serde_json::from_str::<RequestEvent<u8>>(r#"{"type":"refresh"}"#);
        assert!(result.is_err());

        let known = serde_json::from_str::<RequestEvent<u8>>(r#"{"type":"succeeded","data":4}"#)
            .unwrap();
        assert_eq!(known, RequestEvent::Succeeded { data: 4 });
    }
}
