use crate::error::RequestError;
use serde::{Deserialize, Serialize};

/// Progress of a tracked request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Nothing has been requested yet
    Idle,

    /// A request is in flight
    Loading,

    /// The most recent request produced a payload
    Success,

    /// The most recent request failed
    Failure,
}

impl Status {
    /// Lowercase name, as used in logs and metric labels
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// Check if the request has settled (succeeded or failed)
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a tracked request
///
/// The payload lives inside the variant it belongs to, so `data` and `error`
/// can never be set together and neither lingers into `Loading`.
///
/// Serializes as `{"status": "success", "data": ...}` or
/// `{"status": "failure", "error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestState<T> {
    /// Nothing has been requested yet
    Idle,

    /// A request is in flight
    Loading,

    /// The most recent request produced a payload
    Success {
        /// Decoded payload
        data: T,
    },

    /// The most recent request failed
    Failure {
        /// What went wrong
        error: RequestError,
    },
}

impl<T> RequestState<T> {
    /// The state every tracker starts in
    #[must_use]
    pub const fn initial() -> Self {
        Self::Idle
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Idle => Status::Idle,
            Self::Loading => Status::Loading,
            Self::Success { .. } => Status::Success,
            Self::Failure { .. } => Status::Failure,
        }
    }

    /// Payload, present only on `Success`
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data } => Some(data),
            _ => None,
        }
    }

    /// Error, present only on `Failure`
    #[must_use]
    pub const fn error(&self) -> Option<&RequestError> {
        match self {
            Self::Failure { error } => Some(error),
            _ => None,
        }
    }

    /// Consume the state, keeping the payload if there is one
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success { data } => Some(data),
            _ => None,
        }
    }

    /// Check if a request is in flight
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_is_idle_without_payload() {
        let state: RequestState<String> = RequestState::initial();
        assert_eq!(state.status(), Status::Idle);
        assert!(state.data().is_none());
        assert!(state.error().is_none());
    }

    #[test]
    fn test_accessors_follow_variant() {
        let success = RequestState::Success { data: 5_u8 };
        assert_eq!(success.status(), Status::Success);
        assert_eq!(success.data(), Some(&5));
        assert!(success.error().is_none());

        let failure: RequestState<u8> = RequestState::Failure {
            error: RequestError::transport("timeout"),
        };
        assert_eq!(failure.status(), Status::Failure);
        assert!(failure.data().is_none());
        assert_eq!(failure.error().map(RequestError::message), Some("timeout"));
        assert!(failure.status().is_settled());
    }

    #[test]
    fn test_serialized_shape() {
        let loading: RequestState<u8> = RequestState::Loading;
        assert_eq!(
            serde_json::to_value(&loading).unwrap(),
            serde_json::json!({ "status": "loading" })
        );

        let success = RequestState::Success {
            data: serde_json::json!({ "id": 2 }),
        };
        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            serde_json::json!({ "status": "success", "data": { "id": 2 } })
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Loading.to_string(), "loading");
        assert!(!Status::Idle.is_settled());
    }
}
