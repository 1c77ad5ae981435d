use crate::error::RequestError;
use crate::state::Status;
use crate::tracker::{DiscardedSettlement, Generation};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```ignore
/// // Production - uses system clock
/// let clock = SystemClock;
///
/// // Test - fixed time for deterministic tests
/// let clock = FixedClock::new(time);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What the transport hands back before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Transport status code (HTTP status for HTTP transports)
    pub status: u16,
    /// Undecoded response body
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Create a response from a status and body
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A 200 response carrying `body`
    #[must_use]
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }
}

/// The external transport operation
///
/// A rejection (`Err`) becomes a `Failure` with a transport error. The returned
/// future is spawned and runs to completion even if its result ends up stale.
pub trait Fetcher: Send + Sync + 'static {
    /// Resource locator, compared by value to detect a new input
    type Target: Clone + PartialEq + Send + Sync + std::fmt::Debug + 'static;

    /// Configuration bag for the fetch call
    type Options: Clone + PartialEq + Send + Sync + std::fmt::Debug + 'static;

    /// Start fetching `target`
    fn fetch(
        &self,
        target: Self::Target,
        options: Self::Options,
    ) -> BoxFuture<'static, Result<RawResponse, RequestError>>;
}

/// Converts a raw response into the typed payload
pub trait Decoder: Send + Sync + 'static {
    /// Payload type
    type Output: Send + 'static;

    /// Decode `response`
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Decode`] if the body cannot be converted.
    fn decode(&self, response: RawResponse) -> Result<Self::Output, RequestError>;
}

/// Decodes a JSON body with `serde_json`
pub struct JsonDecoder<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    /// Create a new JSON decoder
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonDecoder<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonDecoder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonDecoder")
            .field("output", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Decoder for JsonDecoder<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn decode(&self, response: RawResponse) -> Result<T, RequestError> {
        serde_json::from_slice(&response.body).map_err(|e| RequestError::decode(e.to_string()))
    }
}

/// Hook into the request lifecycle
///
/// Dropping a stale settlement is expected, not an error; `on_discarded` only
/// exists so the drop can be observed. Every method defaults to doing nothing.
pub trait Diagnostics: Send + Sync + 'static {
    /// A fetch was started under `generation`
    fn on_issued(&self, _generation: Generation) {}

    /// A settlement was committed to the state
    fn on_applied(&self, _generation: Generation, _status: Status, _elapsed: Duration) {}

    /// A settlement arrived stale and was dropped
    fn on_discarded(&self, _discarded: &DiscardedSettlement) {}
}

/// Ignores every discarded settlement
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiagnostics;

impl Diagnostics for NoopDiagnostics {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    #[test]
    fn test_json_decoder_success() {
        let decoder = JsonDecoder::<Item>::new();
        let item = decoder.decode(RawResponse::ok(r#"{"id":1}"#)).unwrap();
        assert_eq!(item, Item { id: 1 });
    }

    #[test]
    fn test_json_decoder_failure_is_decode_error() {
        let decoder = JsonDecoder::<Item>::new();
        let error = decoder.decode(RawResponse::ok("<html>")).unwrap_err();
        assert!(error.is_decode());
    }
}
