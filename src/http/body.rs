//! Response bodies with exactly-once release.

use std::mem;

use super::transport::TransportError;

type ReleaseHook = Box<dyn FnOnce() + Send>;

enum State {
    Stream(reqwest::Response),
    Buffered(Vec<u8>),
    Released,
}

/// An HTTP response body.
///
/// A body is *released* exactly once: when it is read to the end, when
/// [`Body::release`] is called, or when it is dropped, whichever happens
/// first. Reading consumes it, so a second read fails with
/// [`BodyError::AlreadyConsumed`].
///
/// # Example
///
/// ```rust
/// use tryuntil::http::{Body, BodyError};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let released = Arc::new(AtomicU32::new(0));
/// let counter = released.clone();
/// let mut body = Body::from("hello").on_release(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// assert_eq!(body.text().await.unwrap(), "hello");
/// assert!(matches!(body.text().await, Err(BodyError::AlreadyConsumed)));
///
/// body.release();
/// drop(body);
/// assert_eq!(released.load(Ordering::SeqCst), 1);
/// # });
/// ```
pub struct Body {
    state: State,
    on_release: Option<ReleaseHook>,
}

impl Body {
    /// An empty, unread body.
    pub fn empty() -> Self {
        Self::buffered(Vec::new())
    }

    fn buffered(bytes: Vec<u8>) -> Self {
        Self {
            state: State::Buffered(bytes),
            on_release: None,
        }
    }

    pub(crate) fn stream(response: reqwest::Response) -> Self {
        Self {
            state: State::Stream(response),
            on_release: None,
        }
    }

    /// Run `hook` when the body is released.
    ///
    /// Replaces any previous hook. Test transports use this to count
    /// releases.
    pub fn on_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// Returns true once the body has been read or released.
    pub fn is_released(&self) -> bool {
        matches!(self.state, State::Released)
    }

    /// Read the whole body, then release it.
    pub async fn bytes(&mut self) -> Result<Vec<u8>, BodyError> {
        let read = match mem::replace(&mut self.state, State::Released) {
            State::Stream(response) => response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|e| BodyError::Read(e.into())),
            State::Buffered(bytes) => Ok(bytes),
            State::Released => return Err(BodyError::AlreadyConsumed),
        };
        self.release();
        read
    }

    /// Read the whole body as text (lossy UTF-8), then release it.
    pub async fn text(&mut self) -> Result<String, BodyError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Release the body without reading it. Idempotent.
    pub fn release(&mut self) {
        self.state = State::Released;
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for Body {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Stream(_) => "stream",
            State::Buffered(_) => "buffered",
            State::Released => "released",
        };
        f.debug_struct("Body").field("state", &state).finish()
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::buffered(bytes)
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Self::buffered(bytes.to_vec())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::buffered(text.into_bytes())
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::buffered(text.as_bytes().to_vec())
    }
}

/// Error reading a [`Body`].
#[derive(Debug)]
pub enum BodyError {
    /// The body was already read or released.
    AlreadyConsumed,
    /// The transport failed while streaming the body.
    Read(TransportError),
}

impl std::fmt::Display for BodyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyConsumed => write!(f, "body already consumed"),
            Self::Read(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BodyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AlreadyConsumed => None,
            Self::Read(e) => Some(e),
        }
    }
}
