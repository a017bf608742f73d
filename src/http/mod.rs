//! HTTP polling: send a request until the response satisfies a condition.
//!
//! - [`Poller`] binds [`PollSettings`](crate::PollSettings) to a
//!   [`Transport`] and offers `poll_url`, `poll_request` and the
//!   convenience calls built on them
//! - [`ReqwestTransport`] sends each attempt through a fresh
//!   [`reqwest::Client`]
//! - [`HttpResponse`] and [`Body`] carry the response into conditions; a
//!   rejected response's body is released before the next attempt
//!
//! # Example
//!
//! ```rust,no_run
//! use tryuntil::condition::status_code_is;
//! use tryuntil::http::{get_request, with_host, Poller};
//! use reqwest::StatusCode;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let request = with_host(get_request("http://127.0.0.1:8000/health")?, "test.localhost")?;
//! let response = Poller::new()
//!     .poll_request(request, status_code_is(StatusCode::OK), Duration::from_secs(10))
//!     .await?;
//! assert!(response.status().is_success());
//! # Ok(())
//! # }
//! ```

mod body;
mod poller;
mod response;
mod transport;

pub use body::{Body, BodyError};
pub use poller::{get_request, poll_request, poll_url, with_host, HttpOutcome, Poller};
pub use response::HttpResponse;
pub use transport::{ReqwestTransport, Transport, TransportError, TransportErrorKind};
