use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a request ended in `Failure`
///
/// Both kinds surface identically as `RequestState::Failure`; only the attached
/// value tells them apart.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RequestError {
    /// The fetch rejected: network failure or a non-success response
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body could not be converted into the payload type
    #[error("Decode error: {0}")]
    Decode(String),
}

impl RequestError {
    /// Create a transport error
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a decode error
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// The underlying error message, without the kind prefix
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transport(message) | Self::Decode(message) => message,
        }
    }

    /// Check if the fetch itself failed
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if decoding the response failed
    #[must_use]
    pub const fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}
