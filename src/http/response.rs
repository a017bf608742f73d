//! Owned HTTP responses handed to conditions and callers.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};

use super::body::{Body, BodyError};

/// Status, headers and a lazily read [`Body`].
///
/// Dropping the response releases the body if nobody read it.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    url: Option<Url>,
    body: Body,
}

impl HttpResponse {
    /// A response with the given status, no headers and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            url: None,
            body: Body::empty(),
        }
    }

    pub(crate) fn from_reqwest(response: reqwest::Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            url: Some(response.url().clone()),
            body: Body::stream(response),
        }
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the final URL the response came from.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The final URL, when the response came from a real transport.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// The body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// The body, mutably.
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Take ownership of the body, dropping the head.
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Read the whole body as text. See [`Body::text`].
    pub async fn text(&mut self) -> Result<String, BodyError> {
        self.body.text().await
    }

    /// Read the whole body. See [`Body::bytes`].
    pub async fn bytes(&mut self) -> Result<Vec<u8>, BodyError> {
        self.body.bytes().await
    }

    /// Release the body without reading it.
    pub fn release_body(&mut self) {
        self.body.release();
    }
}
