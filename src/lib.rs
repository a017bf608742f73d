//! # tryuntil
//!
//! Bounded retry-until-condition polling for tests against systems that
//! become ready *eventually*: a container that is still starting, a router
//! that has not picked up its configuration, a service behind a load
//! balancer that is still warming up.
//!
//! ## Model
//!
//! A poll call runs an operation right away, then once per interval, until
//! a [`Condition`] accepts the result or the deadline passes:
//!
//! - the interval is a tenth of the timeout, capped at five seconds
//! - in CI mode (the `CI` environment variable is set) the deadline is
//!   three times the requested timeout; the interval is unchanged
//! - the caller gets exactly one outcome: the accepted value, or a
//!   [`PollError`] carrying the last failure
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use tryuntil::condition::{body_contains, status_code_is};
//! use tryuntil::{ConditionExt, Poller};
//! use reqwest::StatusCode;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let response = Poller::new()
//!     .poll_url(
//!         "http://127.0.0.1:8080/api/providers",
//!         status_code_is(StatusCode::OK).and(body_contains("Host:test.localhost")),
//!         Duration::from_secs(60),
//!     )
//!     .await?;
//! println!("router ready: {}", response.status());
//! # Ok(())
//! # }
//! ```
//!
//! Anything that is not HTTP goes through [`retry::poll`]:
//!
//! ```rust
//! use tryuntil::{retry, ConditionError, PollSettings};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let ports = retry::poll_with(
//!     &PollSettings::default(),
//!     || async { Ok::<_, String>(vec![8080u16, 8443]) },
//!     |ports: &mut Vec<u16>| {
//!         if ports.contains(&8443) {
//!             Ok(())
//!         } else {
//!             Err(ConditionError::new("TLS port not bound yet"))
//!         }
//!     },
//!     Duration::from_secs(5),
//! )
//! .await
//! .unwrap();
//! assert_eq!(ports.len(), 2);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod condition;
pub mod http;
pub mod retry;
pub mod testing;

// Re-exports
pub use condition::{Condition, ConditionError, ConditionExt};
pub use http::{poll_request, poll_url, HttpOutcome, HttpResponse, Poller, TransportError};
pub use retry::{
    poll, poll_with, AttemptError, InvalidSettings, PollError, PollOutcome, PollSettings,
    RetryPolicy,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::condition::{
        body_contains, header_is, status_code_is, status_success, Condition, ConditionError,
        ConditionExt,
    };
    pub use crate::http::{HttpResponse, Poller, Transport, TransportError};
    pub use crate::retry::{PollError, PollSettings};
}
