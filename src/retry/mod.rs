//! Bounded retry-until-accepted polling.
//!
//! A poll call runs an operation right away, then once per interval, until
//! the result is accepted by a [`Condition`](crate::Condition) or the
//! effective deadline passes:
//!
//! - **Settings**: [`PollSettings`] is plain data holding the CI flag and the
//!   tunables; [`PollSettings::from_env`] is the only environment read
//! - **Policy**: [`RetryPolicy`] is derived per call from the timeout and the
//!   settings (interval = timeout / 10, capped at 5s; deadline scaled by 3
//!   in CI mode)
//! - **Loop**: [`poll`] / [`poll_with`] return a single terminal outcome
//!
//! # Quick Start
//!
//! ```rust
//! use tryuntil::{retry, PollSettings};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let ready = retry::poll_with(
//!     &PollSettings::default(),
//!     || async { Ok::<_, String>("ready") },
//!     (),
//!     Duration::from_secs(1),
//! )
//! .await;
//!
//! assert_eq!(ready, Ok("ready"));
//! # });
//! ```
//!
//! # Error Types
//!
//! - [`PollError`]: terminal failure, carries the last [`AttemptError`]
//! - [`AttemptError`]: why one attempt was not accepted

mod error;
mod poll;
mod policy;

pub use error::{AttemptError, PollError};
pub use poll::{poll, poll_with, PollOutcome};
pub use policy::{
    InvalidSettings, PollSettings, RetryPolicy, CI_ENV_VAR, CI_TIMEOUT_MULTIPLIER, FAN_OUT, MAX_INTERVAL,
};
