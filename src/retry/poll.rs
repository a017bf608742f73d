//! The retry-until-accepted loop.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use super::error::{AttemptError, PollError};
use super::policy::{PollSettings, RetryPolicy};
use crate::condition::Condition;

/// Terminal outcome of a poll call: the accepted value, or why polling gave up.
pub type PollOutcome<T, E> = Result<T, PollError<E>>;

/// Poll `operation` until its result satisfies `condition`, using settings
/// read from the process environment.
///
/// See [`poll_with`] for the full contract.
///
/// # Panics
///
/// Panics immediately, before the operation runs, if `timeout` is zero.
pub fn poll<T, E, Op, Fut, C>(
    operation: Op,
    condition: C,
    timeout: Duration,
) -> impl Future<Output = PollOutcome<T, E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Condition<T>,
{
    poll_with(&PollSettings::from_env(), operation, condition, timeout)
}

/// Poll `operation` until its result satisfies `condition` or the deadline
/// derived from `timeout` and `settings` elapses.
///
/// The operation runs once right away, so an already-ready system costs no
/// waiting at all. After that it runs once per [`RetryPolicy::interval`]
/// until an attempt is accepted or the deadline passes. Once the deadline
/// has elapsed no further attempt is made, even if a retry tick is due at the
/// same instant.
///
/// Every operation error and every condition rejection counts as "not ready
/// yet" and is retried. The only exception is a rejection built with
/// [`ConditionError::fatal`](crate::ConditionError::fatal), which stops the
/// call at once with [`PollError::Fatal`].
///
/// A rejected value is dropped before the next attempt starts, which is what
/// releases resources such as HTTP response bodies.
///
/// # Panics
///
/// The retry policy is derived when this function is called, not when the
/// returned future is first polled, so a zero `timeout` panics before the
/// operation is ever invoked.
///
/// # Examples
///
/// ```rust
/// use tryuntil::{retry, ConditionError, PollSettings};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let counter = AtomicU32::new(0);
///
/// let value = retry::poll_with(
///     &PollSettings::default(),
///     || {
///         let n = counter.fetch_add(1, Ordering::SeqCst);
///         async move { Ok::<_, String>(n) }
///     },
///     |n: &mut u32| {
///         if *n >= 2 {
///             Ok(())
///         } else {
///             Err(ConditionError::new(format!("only at {}", n)))
///         }
///     },
///     Duration::from_millis(100),
/// )
/// .await
/// .unwrap();
///
/// assert_eq!(value, 2);
/// # });
/// ```
pub fn poll_with<T, E, Op, Fut, C>(
    settings: &PollSettings,
    operation: Op,
    condition: C,
    timeout: Duration,
) -> impl Future<Output = PollOutcome<T, E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Condition<T>,
{
    let policy = RetryPolicy::derive(timeout, settings);
    policy.run(operation, condition)
}

impl RetryPolicy {
    /// Drive `operation` under this policy.
    ///
    /// The deadline is measured from the moment the returned future is first
    /// polled.
    pub async fn run<T, E, Op, Fut, C>(self, mut operation: Op, condition: C) -> PollOutcome<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Condition<T>,
    {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            ci = self.is_multiplier_active(),
            multiplier = self.multiplier(),
            interval = ?self.interval(),
            deadline = ?self.deadline(),
            "polling"
        );

        let start = Instant::now();
        let mut attempts = 1u32;

        let mut last = match attempt(&mut operation, &condition).await {
            Ok(value) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempts, "poll accepted on first attempt");
                return Ok(value);
            }
            Err(error) => error,
        };

        let deadline = tokio::time::sleep_until(start + self.deadline());
        tokio::pin!(deadline);

        let mut ticks = tokio::time::interval_at(start + self.interval(), self.interval());
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if last.is_fatal() {
                #[cfg(feature = "tracing")]
                tracing::warn!(attempts, rejection = ?last.rejection(), "poll aborted");
                return Err(PollError::Fatal {
                    cause: last,
                    attempts,
                    elapsed: start.elapsed(),
                });
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempts,
                rejection = ?last.rejection(),
                next_in = ?self.interval(),
                "attempt not accepted"
            );

            tokio::select! {
                biased;
                _ = &mut deadline => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempts, elapsed = ?start.elapsed(), "poll timed out");
                    return Err(PollError::TimedOut {
                        last,
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
                _ = ticks.tick() => {
                    attempts += 1;
                    match attempt(&mut operation, &condition).await {
                        Ok(value) => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(attempts, elapsed = ?start.elapsed(), "poll accepted");
                            return Ok(value);
                        }
                        Err(error) => last = error,
                    }
                }
            }
        }
    }
}

async fn attempt<T, E, Op, Fut, C>(operation: &mut Op, condition: &C) -> Result<T, AttemptError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Condition<T>,
{
    let mut value = operation().await.map_err(AttemptError::Operation)?;
    condition
        .check(&mut value)
        .await
        .map_err(AttemptError::Rejected)?;
    Ok(value)
}
