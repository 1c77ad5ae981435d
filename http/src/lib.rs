//! # Request Tracker HTTP
//!
//! [`Fetcher`] implementation over `reqwest`.
//!
//! Targets are URLs. Non-success statuses are transport failures carrying the
//! status code and response body; everything else is handed to the decoder.
//!
//! ## Example
//!
//! ```ignore
//! use request_tracker_http::{HttpFetcher, HttpOptions};
//!
//! let tracker = RequestTracker::new(HttpFetcher::from_env()?, JsonDecoder::<User>::new());
//! tracker.request("https://example.com/users/1".to_string(), HttpOptions::get())?;
//! ```

use futures::future::BoxFuture;
use request_tracker_core::environment::{Fetcher, RawResponse};
use request_tracker_core::error::RequestError;
use reqwest::header::HeaderValue;
use reqwest::{Client, Method};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding the `User-Agent` header
pub const USER_AGENT_ENV: &str = "REQUEST_TRACKER_USER_AGENT";

/// Errors building an [`HttpFetcher`]
#[derive(Debug, Error)]
pub enum HttpConfigError {
    /// The configured user agent is not a valid header value
    #[error("Invalid user agent: {0:?}")]
    InvalidUserAgent(String),

    /// The underlying client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// How to perform a fetch
///
/// Compared by value: [`observe`](request_tracker_core::tracker::TrackerAction::Observe)
/// only re-fetches when the URL or these options change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    /// HTTP method
    pub method: Method,
    /// Extra request headers, sent in order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Option<String>,
    /// Per-request timeout
    pub timeout: Option<Duration>,
}

impl HttpOptions {
    /// A plain `GET`
    #[must_use]
    pub fn get() -> Self {
        Self::default()
    }

    /// A `POST` with `body`
    #[must_use]
    pub fn post(body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Fail the fetch if it takes longer than `timeout`
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }
}

/// `reqwest`-backed fetcher
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with a default client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fetcher over an existing client
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Create a fetcher that sends `user_agent` with every request
    ///
    /// # Errors
    ///
    /// Returns `HttpConfigError::InvalidUserAgent` if `user_agent` is not a valid
    /// header value, or `HttpConfigError::Client` if the client cannot be built.
    pub fn with_user_agent(user_agent: &str) -> Result<Self, HttpConfigError> {
        let value = HeaderValue::from_str(user_agent)
            .map_err(|_| HttpConfigError::InvalidUserAgent(user_agent.to_string()))?;

        let client = Client::builder()
            .user_agent(value)
            .build()
            .map_err(|e| HttpConfigError::Client(e.to_string()))?;

        Ok(Self::with_client(client))
    }

    /// Create a fetcher configured from the environment
    ///
    /// Reads `REQUEST_TRACKER_USER_AGENT`; when unset the client default is used.
    ///
    /// # Errors
    ///
    /// See [`with_user_agent`](Self::with_user_agent).
    pub fn from_env() -> Result<Self, HttpConfigError> {
        match std::env::var(USER_AGENT_ENV) {
            Ok(user_agent) => Self::with_user_agent(&user_agent),
            Err(_) => Ok(Self::new()),
        }
    }
}

impl Fetcher for HttpFetcher {
    type Target = String;
    type Options = HttpOptions;

    fn fetch(
        &self,
        target: String,
        options: HttpOptions,
    ) -> BoxFuture<'static, Result<RawResponse, RequestError>> {
        tracing::debug!(url = %target, method = %options.method, "Fetching");

        let mut request = self.client.request(options.method, target.as_str());
        for (name, value) in options.headers {
            request = request.header(name, value);
        }
        if let Some(body) = options.body {
            request = request.body(body);
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        Box::pin(async move {
            let response = request
                .send()
                .await
                .map_err(|e| RequestError::transport(e.to_string()))?;

            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| RequestError::transport(e.to_string()))?;

            tracing::debug!(url = %target, status = status.as_u16(), bytes = body.len(), "Fetched");

            if !status.is_success() {
                return Err(RequestError::transport(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    String::from_utf8_lossy(&body)
                )));
            }

            Ok(RawResponse::new(status.as_u16(), body.to_vec()))
        })
    }
}
