//! The HTTP transport seam and its reqwest implementation.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Request};

use super::response::HttpResponse;

/// Sends one HTTP request.
///
/// The poller calls [`Transport::send`] once per attempt with a fresh copy of
/// the request. Implementations must not assume connections are reused across
/// calls.
pub trait Transport: Send + Sync {
    /// Send `request` and return the response head with an unread body.
    fn send(&self, request: Request) -> BoxFuture<'_, Result<HttpResponse, TransportError>>;
}

/// Transport that builds a new [`reqwest::Client`] for every request.
///
/// A fresh client means a fresh connection pool, so a service that restarted
/// between attempts is never reached through a stale keep-alive connection.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    request_timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// A transport without a per-request timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each individual request. Without it a hanging request can
    /// overrun the poll deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// The per-request timeout, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    fn client(&self) -> Result<Client, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().map_err(TransportError::from)
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let client = self.client()?;
            let response = client.execute(request).await?;
            Ok(HttpResponse::from_reqwest(response))
        })
    }
}

/// Broad classification of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The connection could not be established.
    Connect,
    /// The request or response timed out.
    Timeout,
    /// The request could not be built or replayed.
    InvalidRequest,
    /// The body could not be streamed.
    Body,
    /// Anything else.
    Other,
}

/// The request could not be sent or its response could not be received.
#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    /// Create an error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a connection failure.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    /// Shorthand for a request that cannot be built.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InvalidRequest, message)
    }

    /// The error classification.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// The human-readable reason.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            TransportErrorKind::Timeout
        } else if error.is_connect() {
            TransportErrorKind::Connect
        } else if error.is_builder() {
            TransportErrorKind::InvalidRequest
        } else if error.is_body() || error.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Other
        };

        Self {
            kind,
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }
}
