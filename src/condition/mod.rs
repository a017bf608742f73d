//! Composable acceptance checks for poll results.
//!
//! A [`Condition`] looks at the successful result of an attempt and either
//! accepts it or explains why not. Conditions compose in order, and the first
//! rejection is the one reported:
//!
//! ```rust
//! use tryuntil::condition::{body_contains, status_code_is};
//! use tryuntil::{Condition, ConditionExt, HttpResponse};
//! use reqwest::StatusCode;
//!
//! # tokio_test::block_on(async {
//! let ready = status_code_is(StatusCode::OK).and(body_contains("ready"));
//!
//! let mut response = HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE).with_body("ready");
//! let err = ready.check(&mut response).await.unwrap_err();
//! assert_eq!(err.message(), "got status code 503, wanted 200");
//! # });
//! ```
//!
//! Closures of type `Fn(&mut T) -> Result<(), ConditionError>` are
//! conditions too, `()` is the condition that accepts everything, and
//! [`all_of`] builds a composite from boxed conditions of mixed types.

mod combinators;
mod http;

pub use combinators::{all_of, AllOf, And, Condition, ConditionError, ConditionExt};

pub use http::{
    body_contains, body_not_contains, header_is, status_code_is, status_success, BodyContains,
    BodyNotContains, HeaderIs, StatusCodeIs, StatusSuccess,
};
