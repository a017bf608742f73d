//! Core condition trait, rejection type and composition.

use futures::future::{self, BoxFuture};

/// Why a condition rejected a result.
///
/// A rejection is retried by default. [`ConditionError::fatal`] marks a
/// rejection that cannot turn into an acceptance later, which stops the poll
/// call immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionError {
    message: String,
    fatal: bool,
}

impl ConditionError {
    /// A rejection worth retrying.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    /// A rejection that stops polling at once.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }

    /// The human-readable reason.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this rejection stops polling.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

impl std::fmt::Display for ConditionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConditionError {}

/// A check over an attempt's successful result.
///
/// Conditions receive a mutable borrow so they can consume parts of the
/// result (an HTTP body, for instance). Apart from that they must not have
/// side effects.
///
/// Any `Fn(&mut T) -> Result<(), ConditionError>` closure is a condition:
///
/// ```rust
/// use tryuntil::{Condition, ConditionError};
///
/// # tokio_test::block_on(async {
/// let positive = |n: &mut i32| {
///     if *n > 0 {
///         Ok(())
///     } else {
///         Err(ConditionError::new(format!("{} is not positive", n)))
///     }
/// };
///
/// assert!(positive.check(&mut 5).await.is_ok());
/// assert!(positive.check(&mut -1).await.is_err());
/// # });
/// ```
pub trait Condition<T: ?Sized>: Send + Sync {
    /// Accept (`Ok(())`) or reject the value.
    fn check<'a>(&'a self, value: &'a mut T) -> BoxFuture<'a, Result<(), ConditionError>>;
}

impl<T: ?Sized, F> Condition<T> for F
where
    F: Fn(&mut T) -> Result<(), ConditionError> + Send + Sync,
{
    fn check<'a>(&'a self, value: &'a mut T) -> BoxFuture<'a, Result<(), ConditionError>> {
        Box::pin(future::ready(self(value)))
    }
}

/// The empty condition: accepts everything.
impl<T: ?Sized> Condition<T> for () {
    fn check<'a>(&'a self, _value: &'a mut T) -> BoxFuture<'a, Result<(), ConditionError>> {
        Box::pin(future::ready(Ok(())))
    }
}

/// An absent condition accepts everything.
impl<T: ?Sized, C: Condition<T>> Condition<T> for Option<C> {
    fn check<'a>(&'a self, value: &'a mut T) -> BoxFuture<'a, Result<(), ConditionError>> {
        match self {
            Some(condition) => condition.check(value),
            None => Box::pin(future::ready(Ok(()))),
        }
    }
}

/// Extension trait for chaining conditions.
///
/// # Example
///
/// ```rust
/// use tryuntil::{Condition, ConditionError, ConditionExt};
///
/// # tokio_test::block_on(async {
/// let even = |n: &mut u32| -> Result<(), ConditionError> {
///     if *n % 2 == 0 { Ok(()) } else { Err(ConditionError::new("odd")) }
/// };
/// let small = |n: &mut u32| -> Result<(), ConditionError> {
///     if *n < 10 { Ok(()) } else { Err(ConditionError::new("too big")) }
/// };
///
/// let both = even.and(small);
/// assert!(both.check(&mut 4).await.is_ok());
/// assert_eq!(both.check(&mut 3).await.unwrap_err().message(), "odd");
/// assert_eq!(both.check(&mut 12).await.unwrap_err().message(), "too big");
/// # });
/// ```
pub trait ConditionExt<T: ?Sized>: Condition<T> + Sized {
    /// Check `self`, then `other`; the first rejection wins and `other` is
    /// not evaluated after it.
    fn and<C: Condition<T>>(self, other: C) -> And<Self, C> {
        And(self, other)
    }
}

impl<T: ?Sized, C: Condition<T>> ConditionExt<T> for C {}

/// Sequential conjunction of two conditions.
#[derive(Clone, Copy, Debug)]
pub struct And<C1, C2>(pub C1, pub C2);

impl<T, C1, C2> Condition<T> for And<C1, C2>
where
    T: ?Sized + Send,
    C1: Condition<T>,
    C2: Condition<T>,
{
    fn check<'a>(&'a self, value: &'a mut T) -> BoxFuture<'a, Result<(), ConditionError>> {
        Box::pin(async move {
            self.0.check(&mut *value).await?;
            self.1.check(value).await
        })
    }
}

/// Ordered list of conditions evaluated in sequence.
///
/// The first rejection short-circuits: later members are not evaluated, so a
/// member that consumes shared state (such as a response body) never runs
/// after an earlier member has already rejected.
pub struct AllOf<T: ?Sized> {
    conditions: Vec<Box<dyn Condition<T>>>,
}

impl<T: ?Sized> AllOf<T> {
    /// An empty composite, which accepts everything.
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Append a condition.
    pub fn push<C>(&mut self, condition: C)
    where
        C: Condition<T> + 'static,
    {
        self.conditions.push(Box::new(condition));
    }

    /// Append a condition, builder style.
    pub fn with<C>(mut self, condition: C) -> Self
    where
        C: Condition<T> + 'static,
    {
        self.push(condition);
        self
    }

    /// Number of member conditions.
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Returns true if there are no members.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl<T: ?Sized> Default for AllOf<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for AllOf<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllOf")
            .field("conditions", &self.conditions.len())
            .finish()
    }
}

impl<T: ?Sized + Send> Condition<T> for AllOf<T> {
    fn check<'a>(&'a self, value: &'a mut T) -> BoxFuture<'a, Result<(), ConditionError>> {
        Box::pin(async move {
            for condition in &self.conditions {
                condition.check(&mut *value).await?;
            }
            Ok(())
        })
    }
}

/// Compose boxed conditions into an [`AllOf`].
///
/// # Example
///
/// ```rust
/// use tryuntil::condition::{all_of, Condition, ConditionError};
///
/// # tokio_test::block_on(async {
/// let rules: Vec<Box<dyn Condition<String>>> = vec![
///     Box::new(|s: &mut String| -> Result<(), ConditionError> {
///         if s.starts_with("ok") { Ok(()) } else { Err(ConditionError::new("bad prefix")) }
///     }),
///     Box::new(|s: &mut String| -> Result<(), ConditionError> {
///         if s.len() < 8 { Ok(()) } else { Err(ConditionError::new("too long")) }
///     }),
/// ];
/// let composite = all_of(rules);
///
/// assert!(composite.check(&mut "ok: 1".to_string()).await.is_ok());
/// assert_eq!(
///     composite.check(&mut "nope".to_string()).await.unwrap_err().message(),
///     "bad prefix"
/// );
/// # });
/// ```
pub fn all_of<T: ?Sized>(conditions: Vec<Box<dyn Condition<T>>>) -> AllOf<T> {
    AllOf { conditions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn reject(message: &'static str) -> impl Fn(&mut u32) -> Result<(), ConditionError> {
        move |_| Err(ConditionError::new(message))
    }

    fn counting_accept(counter: Arc<AtomicU32>) -> impl Fn(&mut u32) -> Result<(), ConditionError> {
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unit_accepts() {
        assert!(().check(&mut 1u32).await.is_ok());
    }

    #[tokio::test]
    async fn test_option_condition() {
        let none: Option<fn(&mut u32) -> Result<(), ConditionError>> = None;
        assert!(none.check(&mut 1).await.is_ok());

        let some = Some(reject("rejected"));
        assert_eq!(some.check(&mut 1).await.unwrap_err().message(), "rejected");
    }

    #[tokio::test]
    async fn test_and_short_circuits() {
        let counter = Arc::new(AtomicU32::new(0));
        let composite = reject("A").and(counting_accept(counter.clone()));

        let err = composite.check(&mut 0).await.unwrap_err();
        assert_eq!(err.message(), "A");
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_and_runs_both_on_accept() {
        let counter = Arc::new(AtomicU32::new(0));
        let composite = counting_accept(counter.clone()).and(counting_accept(counter.clone()));

        assert!(composite.check(&mut 0).await.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_all_of_first_rejection_wins() {
        let counter = Arc::new(AtomicU32::new(0));
        let composite = AllOf::new()
            .with(counting_accept(counter.clone()))
            .with(reject("B"))
            .with(reject("C"))
            .with(counting_accept(counter.clone()));

        assert_eq!(composite.len(), 4);
        let err = composite.check(&mut 0).await.unwrap_err();
        assert_eq!(err.message(), "B");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_all_of_accepts() {
        let composite: AllOf<u32> = AllOf::default();
        assert!(composite.is_empty());
        assert!(composite.check(&mut 0).await.is_ok());
    }

    #[test]
    fn test_condition_error() {
        let retry = ConditionError::new("soon");
        assert!(!retry.is_fatal());
        assert_eq!(retry.to_string(), "soon");

        let fatal = ConditionError::fatal("never");
        assert!(fatal.is_fatal());
        assert_eq!(fatal.message(), "never");
    }

    #[test]
    fn test_all_of_debug() {
        let composite = AllOf::new().with(reject("x"));
        assert!(format!("{:?}", composite).contains("AllOf"));
    }
}
