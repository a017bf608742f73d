//! Polling specialised for "send a request, check the response".

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderValue, HOST};
use reqwest::{Method, Request, StatusCode, Url};

use super::response::HttpResponse;
use super::transport::{ReqwestTransport, Transport, TransportError};
use crate::condition::{status_code_is, Condition};
use crate::retry::{self, AttemptError, PollError, PollOutcome, PollSettings, RetryPolicy};

/// Outcome of an HTTP poll call.
///
/// On success the caller owns the returned response and its body. On failure
/// the body of the last attempt has already been released.
pub type HttpOutcome = PollOutcome<HttpResponse, TransportError>;

/// Poll entry point bound to one set of [`PollSettings`] and a [`Transport`].
///
/// A `Poller` holds no mutable state, so one instance can serve any number
/// of concurrent poll calls.
///
/// # Example
///
/// ```rust,no_run
/// use tryuntil::condition::body_contains;
/// use tryuntil::Poller;
/// use std::time::Duration;
///
/// # async fn run() {
/// let poller = Poller::new();
/// poller
///     .poll_url(
///         "http://127.0.0.1:8080/api/providers",
///         body_contains("Host:test.localhost"),
///         Duration::from_secs(60),
///     )
///     .await
///     .expect("router never picked up the backend");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Poller<T = ReqwestTransport> {
    settings: PollSettings,
    transport: T,
}

impl Poller<ReqwestTransport> {
    /// A poller using [`PollSettings::from_env`] and a reqwest transport.
    pub fn new() -> Self {
        Self::with_settings(PollSettings::from_env())
    }

    /// A poller using explicit settings and a reqwest transport.
    pub fn with_settings(settings: PollSettings) -> Self {
        Self {
            settings,
            transport: ReqwestTransport::new(),
        }
    }
}

impl Default for Poller<ReqwestTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Poller<T> {
    /// Swap the transport, keeping the settings.
    pub fn with_transport<U: Transport>(self, transport: U) -> Poller<U> {
        Poller {
            settings: self.settings,
            transport,
        }
    }

    /// The settings every call derives its policy from.
    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// The transport used for HTTP calls.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The policy a call with `timeout` would use.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` is zero.
    pub fn policy(&self, timeout: Duration) -> RetryPolicy {
        RetryPolicy::derive(timeout, &self.settings)
    }

    /// Poll an arbitrary operation. See [`retry::poll_with`].
    pub fn poll<V, E, Op, Fut, C>(
        &self,
        operation: Op,
        condition: C,
        timeout: Duration,
    ) -> impl Future<Output = PollOutcome<V, E>>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        C: Condition<V>,
    {
        retry::poll_with(&self.settings, operation, condition, timeout)
    }

    /// Send `request` until a response satisfies `condition`.
    ///
    /// Every attempt sends a fresh copy of the request. Transport errors and
    /// rejected responses are retried; rejected responses are released before
    /// the next attempt. A request whose body cannot be replayed fails with
    /// [`PollError::Fatal`] without being sent.
    ///
    /// # Panics
    ///
    /// Panics immediately if `timeout` is zero.
    pub fn poll_request<'a, C>(
        &'a self,
        request: Request,
        condition: C,
        timeout: Duration,
    ) -> impl Future<Output = HttpOutcome> + 'a
    where
        C: Condition<HttpResponse> + 'a,
    {
        let policy = self.policy(timeout);
        drive(policy, &self.transport, Ok(request), condition)
    }

    /// `GET url` until a response satisfies `condition`.
    ///
    /// An unparsable URL fails with [`PollError::Fatal`] without any attempt.
    ///
    /// # Panics
    ///
    /// Panics immediately if `timeout` is zero.
    pub fn poll_url<'a, C>(
        &'a self,
        url: &str,
        condition: C,
        timeout: Duration,
    ) -> impl Future<Output = HttpOutcome> + 'a
    where
        C: Condition<HttpResponse> + 'a,
    {
        let policy = self.policy(timeout);
        drive(policy, &self.transport, get_request(url), condition)
    }

    /// Send `request` until it goes through at transport level, whatever
    /// the status, and hand back the response.
    pub fn response(
        &self,
        request: Request,
        timeout: Duration,
    ) -> impl Future<Output = HttpOutcome> + '_ {
        self.poll_request(request, (), timeout)
    }

    /// Send `request` until the response has `status`.
    pub fn response_until_status_code(
        &self,
        request: Request,
        timeout: Duration,
        status: StatusCode,
    ) -> impl Future<Output = HttpOutcome> + '_ {
        self.poll_request(request, status_code_is(status), timeout)
    }

    /// `GET url` until it goes through at transport level.
    pub fn get(&self, url: &str, timeout: Duration) -> impl Future<Output = HttpOutcome> + '_ {
        self.poll_url(url, (), timeout)
    }

    /// Sleep for `duration`, scaled by the CI multiplier when active.
    ///
    /// Prefer a poll call; a fixed sleep is only for waits that have no
    /// observable end state.
    pub async fn sleep(&self, duration: Duration) {
        let scaled = self.settings.scale(duration);
        #[cfg(feature = "tracing")]
        tracing::debug!(requested = ?duration, scaled = ?scaled, "sleeping");
        tokio::time::sleep(scaled).await;
    }
}

/// `GET url` with settings from the environment and a reqwest transport.
///
/// # Panics
///
/// Panics immediately if `timeout` is zero.
pub fn poll_url<C>(url: &str, condition: C, timeout: Duration) -> impl Future<Output = HttpOutcome>
where
    C: Condition<HttpResponse>,
{
    let policy = RetryPolicy::derive(timeout, &PollSettings::from_env());
    let request = get_request(url);
    async move {
        let transport = ReqwestTransport::new();
        drive(policy, &transport, request, condition).await
    }
}

/// Send `request` with settings from the environment and a reqwest
/// transport.
///
/// # Panics
///
/// Panics immediately if `timeout` is zero.
pub fn poll_request<C>(
    request: Request,
    condition: C,
    timeout: Duration,
) -> impl Future<Output = HttpOutcome>
where
    C: Condition<HttpResponse>,
{
    let policy = RetryPolicy::derive(timeout, &PollSettings::from_env());
    async move {
        let transport = ReqwestTransport::new();
        drive(policy, &transport, Ok(request), condition).await
    }
}

/// Build a `GET` request for `url`.
pub fn get_request(url: &str) -> Result<Request, TransportError> {
    let parsed = Url::parse(url)
        .map_err(|e| TransportError::invalid_request(format!("invalid URL '{}': {}", url, e)))?;
    Ok(Request::new(Method::GET, parsed))
}

/// Override the `Host` header, for routers that dispatch on virtual host.
///
/// # Example
///
/// ```rust
/// use tryuntil::http::{get_request, with_host};
///
/// let request = with_host(get_request("http://127.0.0.1:8000/health").unwrap(), "test.localhost")
///     .unwrap();
/// assert_eq!(request.headers()["host"], "test.localhost");
/// ```
pub fn with_host(mut request: Request, host: &str) -> Result<Request, TransportError> {
    let value = HeaderValue::from_str(host)
        .map_err(|e| TransportError::invalid_request(format!("invalid host '{}': {}", host, e)))?;
    request.headers_mut().insert(HOST, value);
    Ok(request)
}

async fn drive<Tr, C>(
    policy: RetryPolicy,
    transport: &Tr,
    request: Result<Request, TransportError>,
    condition: C,
) -> HttpOutcome
where
    Tr: Transport + ?Sized,
    C: Condition<HttpResponse>,
{
    let request = match request.and_then(replayable) {
        Ok(request) => request,
        Err(error) => {
            return Err(PollError::Fatal {
                cause: AttemptError::Operation(error),
                attempts: 0,
                elapsed: Duration::ZERO,
            })
        }
    };

    policy
        .run(
            move || {
                let next = request.try_clone();
                async move {
                    let request = next.ok_or_else(not_replayable)?;
                    transport.send(request).await
                }
            },
            condition,
        )
        .await
}

fn replayable(request: Request) -> Result<Request, TransportError> {
    match request.try_clone() {
        Some(_) => Ok(request),
        None => Err(not_replayable()),
    }
}

fn not_replayable() -> TransportError {
    TransportError::invalid_request("request body cannot be replayed")
}
