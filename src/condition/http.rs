//! Conditions over HTTP responses.

use futures::future::{self, BoxFuture};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::StatusCode;

use super::combinators::{Condition, ConditionError};
use crate::http::HttpResponse;

/// Rejects unless the status code equals the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCodeIs(pub StatusCode);

/// Check that the response status equals `status`.
///
/// # Example
///
/// ```rust
/// use tryuntil::condition::status_code_is;
/// use tryuntil::{Condition, HttpResponse};
/// use reqwest::StatusCode;
///
/// # tokio_test::block_on(async {
/// let ok = status_code_is(StatusCode::OK);
///
/// let err = ok.check(&mut HttpResponse::new(StatusCode::NOT_FOUND)).await.unwrap_err();
/// assert_eq!(err.message(), "got status code 404, wanted 200");
/// # });
/// ```
pub fn status_code_is(status: StatusCode) -> StatusCodeIs {
    StatusCodeIs(status)
}

impl Condition<HttpResponse> for StatusCodeIs {
    fn check<'a>(
        &'a self,
        response: &'a mut HttpResponse,
    ) -> BoxFuture<'a, Result<(), ConditionError>> {
        let verdict = if response.status() == self.0 {
            Ok(())
        } else {
            Err(ConditionError::new(format!(
                "got status code {}, wanted {}",
                response.status().as_u16(),
                self.0.as_u16()
            )))
        };
        Box::pin(future::ready(verdict))
    }
}

/// Rejects unless the status code is in the 2xx range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSuccess;

/// Check that the response status is 2xx.
pub fn status_success() -> StatusSuccess {
    StatusSuccess
}

impl Condition<HttpResponse> for StatusSuccess {
    fn check<'a>(
        &'a self,
        response: &'a mut HttpResponse,
    ) -> BoxFuture<'a, Result<(), ConditionError>> {
        let verdict = if response.status().is_success() {
            Ok(())
        } else {
            Err(ConditionError::new(format!(
                "got status code {}, wanted 2xx",
                response.status().as_u16()
            )))
        };
        Box::pin(future::ready(verdict))
    }
}

/// Rejects unless the full body contains a substring.
///
/// The body is read to the end and released whatever the verdict; it cannot
/// be read again afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyContains(pub String);

/// Check that the response body contains `needle`.
///
/// # Example
///
/// ```rust
/// use tryuntil::condition::body_contains;
/// use tryuntil::{Condition, HttpResponse};
/// use reqwest::StatusCode;
///
/// # tokio_test::block_on(async {
/// let ready = body_contains("ready");
///
/// let mut response = HttpResponse::new(StatusCode::OK).with_body("status: ready");
/// assert!(ready.check(&mut response).await.is_ok());
/// assert!(response.body().is_released());
///
/// let mut response = HttpResponse::new(StatusCode::OK).with_body("booting");
/// let err = ready.check(&mut response).await.unwrap_err();
/// assert_eq!(err.message(), "could not find 'ready' in body 'booting'");
/// # });
/// ```
pub fn body_contains(needle: impl Into<String>) -> BodyContains {
    BodyContains(needle.into())
}

impl Condition<HttpResponse> for BodyContains {
    fn check<'a>(
        &'a self,
        response: &'a mut HttpResponse,
    ) -> BoxFuture<'a, Result<(), ConditionError>> {
        Box::pin(async move {
            let body = read_body(response).await?;
            if body.contains(self.0.as_str()) {
                Ok(())
            } else {
                Err(ConditionError::new(format!(
                    "could not find '{}' in body '{}'",
                    self.0, body
                )))
            }
        })
    }
}

/// Rejects if the full body contains a substring. Consumes the body like
/// [`BodyContains`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyNotContains(pub String);

/// Check that the response body does not contain `needle`.
pub fn body_not_contains(needle: impl Into<String>) -> BodyNotContains {
    BodyNotContains(needle.into())
}

impl Condition<HttpResponse> for BodyNotContains {
    fn check<'a>(
        &'a self,
        response: &'a mut HttpResponse,
    ) -> BoxFuture<'a, Result<(), ConditionError>> {
        Box::pin(async move {
            let body = read_body(response).await?;
            if body.contains(self.0.as_str()) {
                Err(ConditionError::new(format!(
                    "found unexpected '{}' in body '{}'",
                    self.0, body
                )))
            } else {
                Ok(())
            }
        })
    }
}

/// Rejects unless a header is present with exactly the given value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderIs {
    name: HeaderName,
    value: HeaderValue,
}

/// Check that header `name` is present and equals `value`.
pub fn header_is(name: HeaderName, value: HeaderValue) -> HeaderIs {
    HeaderIs { name, value }
}

impl Condition<HttpResponse> for HeaderIs {
    fn check<'a>(
        &'a self,
        response: &'a mut HttpResponse,
    ) -> BoxFuture<'a, Result<(), ConditionError>> {
        let verdict = match response.headers().get(&self.name) {
            Some(found) if *found == self.value => Ok(()),
            Some(found) => Err(ConditionError::new(format!(
                "got header {}: {:?}, wanted {:?}",
                self.name, found, self.value
            ))),
            None => Err(ConditionError::new(format!(
                "missing header {}",
                self.name
            ))),
        };
        Box::pin(future::ready(verdict))
    }
}

async fn read_body(response: &mut HttpResponse) -> Result<String, ConditionError> {
    response
        .text()
        .await
        .map_err(|e| ConditionError::new(format!("failed to read response body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionExt;
    use crate::http::Body;
    use reqwest::header::CONTENT_TYPE;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn tracked(status: StatusCode, text: &str, released: &Arc<AtomicU32>) -> HttpResponse {
        let released = released.clone();
        HttpResponse::new(status).with_body(Body::from(text).on_release(move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[tokio::test]
    async fn test_status_code_is() {
        let condition = status_code_is(StatusCode::OK);
        assert!(condition
            .check(&mut HttpResponse::new(StatusCode::OK))
            .await
            .is_ok());

        let err = condition
            .check(&mut HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "got status code 503, wanted 200");
    }

    #[tokio::test]
    async fn test_status_success() {
        assert!(status_success()
            .check(&mut HttpResponse::new(StatusCode::NO_CONTENT))
            .await
            .is_ok());
        assert!(status_success()
            .check(&mut HttpResponse::new(StatusCode::BAD_GATEWAY))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_body_contains_releases_on_both_outcomes() {
        let released = Arc::new(AtomicU32::new(0));

        let mut hit = tracked(StatusCode::OK, "Host:test.localhost", &released);
        assert!(body_contains("test.localhost").check(&mut hit).await.is_ok());
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let mut miss = tracked(StatusCode::OK, "not ready yet", &released);
        let err = body_contains("ready!").check(&mut miss).await.unwrap_err();
        assert!(err.message().contains("could not find 'ready!'"));
        assert_eq!(released.load(Ordering::SeqCst), 2);

        drop(hit);
        drop(miss);
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_body_is_unreadable_after_check() {
        let mut response = HttpResponse::new(StatusCode::OK).with_body("ready");
        assert!(body_contains("ready").check(&mut response).await.is_ok());

        let err = body_contains("ready").check(&mut response).await.unwrap_err();
        assert!(err.message().starts_with("failed to read response body"));
    }

    #[tokio::test]
    async fn test_body_not_contains() {
        let mut response = HttpResponse::new(StatusCode::OK).with_body("status: degraded");
        let err = body_not_contains("degraded")
            .check(&mut response)
            .await
            .unwrap_err();
        assert!(err.message().contains("unexpected 'degraded'"));

        let mut response = HttpResponse::new(StatusCode::OK).with_body("status: green");
        assert!(body_not_contains("degraded").check(&mut response).await.is_ok());
    }

    #[tokio::test]
    async fn test_header_is() {
        let condition = header_is(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut json = HttpResponse::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(condition.check(&mut json).await.is_ok());

        let mut text = HttpResponse::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(condition.check(&mut text).await.is_err());

        let err = condition
            .check(&mut HttpResponse::new(StatusCode::OK))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "missing header content-type");
    }

    #[tokio::test]
    async fn test_status_rejection_skips_body_read() {
        let released = Arc::new(AtomicU32::new(0));
        let mut response = tracked(StatusCode::NOT_FOUND, "ready", &released);

        let composite = status_code_is(StatusCode::OK).and(body_contains("ready"));
        let err = composite.check(&mut response).await.unwrap_err();

        assert!(err.message().contains("404"));
        assert!(!response.body().is_released());
        assert_eq!(released.load(Ordering::SeqCst), 0);

        drop(response);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
