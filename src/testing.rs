//! Testing utilities for code that polls.
//!
//! This module provides a scripted, in-memory [`Transport`] and assertion
//! macros for poll outcomes, plus property-based testing support behind the
//! `proptest` feature.
//!
//! # Examples
//!
//! ## FakeTransport
//!
//! ```rust
//! use tryuntil::condition::status_code_is;
//! use tryuntil::testing::{FakeTransport, Scripted};
//! use tryuntil::{assert_polled, PollSettings, Poller};
//! use reqwest::StatusCode;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let fake = FakeTransport::new([
//!     Scripted::status(StatusCode::NOT_FOUND),
//!     Scripted::status(StatusCode::OK),
//! ]);
//! let poller = Poller::with_settings(PollSettings::default()).with_transport(fake);
//!
//! let response = assert_polled!(
//!     poller
//!         .poll_url("http://backend.test/", status_code_is(StatusCode::OK), Duration::from_secs(1))
//!         .await
//! );
//! assert_eq!(response.status(), StatusCode::OK);
//! assert_eq!(poller.transport().requests(), 2);
//! # });
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{self, BoxFuture};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Request, StatusCode, Url};

use crate::http::{HttpResponse, Transport, TransportError, TransportErrorKind};

/// One scripted reply of a [`FakeTransport`].
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Answer with a response.
    Respond {
        /// Status code.
        status: StatusCode,
        /// Response headers.
        headers: HeaderMap,
        /// Full body.
        body: Vec<u8>,
    },
    /// Fail at transport level.
    Fail {
        /// Error classification.
        kind: TransportErrorKind,
        /// Error message.
        message: String,
    },
}

impl Scripted {
    /// A response with `status` and an empty body.
    pub fn status(status: StatusCode) -> Self {
        Self::body(status, Vec::new())
    }

    /// A response with `status` and `body`.
    pub fn body(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self::Respond {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Add a header to a scripted response. No effect on failures.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if let Self::Respond { headers, .. } = &mut self {
            headers.append(name, value);
        }
        self
    }

    /// A connection failure, like a service that is not listening yet.
    pub fn connect_error(message: impl Into<String>) -> Self {
        Self::fail(TransportErrorKind::Connect, message)
    }

    /// A transport failure of any kind.
    pub fn fail(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Fail {
            kind,
            message: message.into(),
        }
    }
}

/// What a [`FakeTransport`] saw of a request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method.
    pub method: Method,
    /// Request URL.
    pub url: Url,
    /// Request headers, including any `Host` override.
    pub headers: HeaderMap,
}

#[derive(Debug, Default)]
struct Script {
    steps: VecDeque<Scripted>,
    last: Option<Scripted>,
    recorded: Vec<RecordedRequest>,
}

/// In-memory [`Transport`] that replays a script.
///
/// Each request consumes the next scripted step; once the script is
/// exhausted the final step repeats forever. Every response body carries a
/// release hook, so tests can assert that no body is left open.
#[derive(Debug, Default)]
pub struct FakeTransport {
    script: Mutex<Script>,
    issued: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl FakeTransport {
    /// A transport replaying `steps` in order.
    pub fn new(steps: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(Script {
                steps: steps.into_iter().collect(),
                ..Script::default()
            }),
            ..Self::default()
        }
    }

    /// A transport answering every request with `step`.
    pub fn always(step: Scripted) -> Self {
        Self::new([step])
    }

    /// Number of requests received.
    pub fn requests(&self) -> usize {
        self.lock().recorded.len()
    }

    /// Every request received, oldest first.
    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.lock().recorded.clone()
    }

    /// Number of response bodies handed out.
    pub fn bodies_issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Number of response bodies released so far.
    pub fn bodies_released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Bodies handed out and not yet released.
    pub fn open_bodies(&self) -> usize {
        self.bodies_issued() - self.bodies_released()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next(&self, request: &Request) -> Option<Scripted> {
        let mut script = self.lock();
        script.recorded.push(RecordedRequest {
            method: request.method().clone(),
            url: request.url().clone(),
            headers: request.headers().clone(),
        });
        match script.steps.pop_front() {
            Some(step) => {
                script.last = Some(step.clone());
                Some(step)
            }
            None => script.last.clone(),
        }
    }

    fn respond(&self, step: Scripted) -> Result<HttpResponse, TransportError> {
        match step {
            Scripted::Respond {
                status,
                headers,
                body,
            } => {
                self.issued.fetch_add(1, Ordering::SeqCst);
                let released = Arc::clone(&self.released);
                let body = crate::http::Body::from(body).on_release(move || {
                    released.fetch_add(1, Ordering::SeqCst);
                });
                let response = headers
                    .iter()
                    .fold(HttpResponse::new(status), |response, (name, value)| {
                        response.with_header(name.clone(), value.clone())
                    });
                Ok(response.with_body(body))
            }
            Scripted::Fail { kind, message } => Err(TransportError::new(kind, message)),
        }
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        let outcome = match self.next(&request) {
            Some(step) => self.respond(step),
            None => Err(TransportError::new(
                TransportErrorKind::Other,
                "no scripted response",
            )),
        };
        Box::pin(future::ready(outcome))
    }
}

/// Assert that a poll call succeeded and return the accepted value.
///
/// # Example
///
/// ```rust
/// use tryuntil::{assert_polled, retry, PollSettings};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let outcome = retry::poll_with(
///     &PollSettings::default(),
///     || async { Ok::<_, String>(7) },
///     (),
///     Duration::from_secs(1),
/// )
/// .await;
/// assert_eq!(assert_polled!(outcome), 7);
/// # });
/// ```
#[macro_export]
macro_rules! assert_polled {
    ($outcome:expr) => {
        match $outcome {
            Ok(value) => value,
            Err(e) => panic!("Expected Success, got: {:?}", e),
        }
    };
}

/// Assert that a poll call timed out and return the last attempt error.
///
/// With a second argument, also assert that the last error's message
/// contains that text.
///
/// # Example
///
/// ```rust
/// use tryuntil::{assert_timed_out, retry, PollSettings};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let outcome = retry::poll_with(
///     &PollSettings::default(),
///     || async { Err::<(), _>("connection refused".to_string()) },
///     (),
///     Duration::from_millis(50),
/// )
/// .await;
/// assert_timed_out!(outcome, "refused");
/// # });
/// ```
#[macro_export]
macro_rules! assert_timed_out {
    ($outcome:expr) => {
        match $outcome {
            Err($crate::retry::PollError::TimedOut { last, .. }) => last,
            Err(other) => panic!("Expected TimedOut, got: {:?}", other),
            Ok(value) => panic!("Expected TimedOut, got Success: {:?}", value),
        }
    };
    ($outcome:expr, $needle:expr) => {{
        let last = $crate::assert_timed_out!($outcome);
        let message = last.to_string();
        assert!(
            message.contains($needle),
            "Expected last error containing {:?}, got: {}",
            $needle,
            message
        );
        last
    }};
}

#[cfg(feature = "proptest")]
use crate::retry::PollSettings;
#[cfg(feature = "proptest")]
use proptest::prelude::*;

#[cfg(feature = "proptest")]
impl Arbitrary for PollSettings {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<bool>(), 1u32..=10, 1u32..=50, 1u64..=30_000)
            .prop_map(|(ci, multiplier, fan_out, max_ms)| {
                PollSettings::default()
                    .with_ci_mode(ci)
                    .with_ci_multiplier(multiplier)
                    .with_fan_out(fan_out)
                    .with_max_interval(std::time::Duration::from_millis(max_ms))
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{AttemptError, PollError};
    use std::time::Duration;

    fn get(url: &str) -> Request {
        Request::new(Method::GET, Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn fake_replays_then_repeats_last() {
        let fake = FakeTransport::new([
            Scripted::connect_error("connection refused"),
            Scripted::body(StatusCode::OK, "up"),
        ]);

        let err = fake.send(get("http://a.test/")).await.unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Connect);

        for _ in 0..3 {
            let mut response = fake.send(get("http://a.test/")).await.unwrap();
            assert_eq!(response.text().await.unwrap(), "up");
        }

        assert_eq!(fake.requests(), 4);
        assert_eq!(fake.bodies_issued(), 3);
        assert_eq!(fake.open_bodies(), 0);
    }

    #[tokio::test]
    async fn fake_counts_open_bodies() {
        let fake = FakeTransport::always(
            Scripted::status(StatusCode::OK)
                .with_header(HeaderName::from_static("x-ready"), HeaderValue::from_static("1")),
        );

        let held = fake.send(get("http://a.test/")).await.unwrap();
        assert_eq!(held.headers()["x-ready"], "1");
        assert_eq!(fake.open_bodies(), 1);

        drop(held);
        assert_eq!(fake.open_bodies(), 0);
    }

    #[tokio::test]
    async fn empty_script_fails() {
        let fake = FakeTransport::new([]);
        let err = fake.send(get("http://a.test/")).await.unwrap_err();
        assert_eq!(err.message(), "no scripted response");
        assert_eq!(fake.requests(), 1);
    }

    #[tokio::test]
    async fn fake_records_requests() {
        let fake = FakeTransport::always(Scripted::status(StatusCode::OK));
        let mut request = get("http://127.0.0.1:8000/health");
        request
            .headers_mut()
            .insert(reqwest::header::HOST, HeaderValue::from_static("test.localhost"));
        fake.send(request).await.unwrap();

        let recorded = fake.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].method, Method::GET);
        assert_eq!(recorded[0].url.path(), "/health");
        assert_eq!(recorded[0].headers["host"], "test.localhost");
    }

    #[test]
    fn assert_polled_macro() {
        let outcome: Result<i32, PollError<String>> = Ok(42);
        assert_eq!(assert_polled!(outcome), 42);
    }

    #[test]
    fn assert_timed_out_macro() {
        let outcome: Result<i32, PollError<String>> = Err(PollError::TimedOut {
            last: AttemptError::Operation("connection refused".to_string()),
            attempts: 10,
            elapsed: Duration::from_secs(1),
        });
        let last = assert_timed_out!(outcome, "refused");
        assert_eq!(last.operation_error().map(String::as_str), Some("connection refused"));
    }

    #[test]
    #[should_panic(expected = "Expected Success, got")]
    fn assert_polled_panics_on_error() {
        let outcome: Result<i32, PollError<String>> = Err(PollError::Fatal {
            cause: AttemptError::Operation("boom".to_string()),
            attempts: 1,
            elapsed: Duration::ZERO,
        });
        assert_polled!(outcome);
    }

    #[test]
    #[should_panic(expected = "Expected TimedOut, got Success")]
    fn assert_timed_out_panics_on_success() {
        let outcome: Result<i32, PollError<String>> = Ok(1);
        assert_timed_out!(outcome);
    }

    #[test]
    #[should_panic(expected = "Expected last error containing")]
    fn assert_timed_out_checks_message() {
        let outcome: Result<i32, PollError<String>> = Err(PollError::TimedOut {
            last: AttemptError::Operation("connection refused".to_string()),
            attempts: 1,
            elapsed: Duration::ZERO,
        });
        assert_timed_out!(outcome, "404");
    }

    #[cfg(feature = "proptest")]
    mod proptest_tests {
        use super::*;
        use crate::retry::RetryPolicy;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_settings_derive_bounded_policies(
                settings in any::<PollSettings>(),
                timeout_ms in 1u64..600_000,
            ) {
                let policy = RetryPolicy::derive(Duration::from_millis(timeout_ms), &settings);
                prop_assert!(policy.interval() <= settings.max_interval());
                prop_assert!(policy.interval() > Duration::ZERO);
            }
        }
    }
}
