//! Error types for poll calls.

use std::time::Duration;

use crate::condition::ConditionError;

/// Why a single attempt was not accepted.
///
/// Attempt errors never reach the caller on their own; the last one is
/// carried by [`PollError`] once the poll call gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    /// The operation itself failed (for HTTP: the request could not be sent).
    Operation(E),
    /// The operation succeeded but a condition rejected its result.
    Rejected(ConditionError),
}

impl<E> AttemptError<E> {
    /// Returns true if a condition rejected the result.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns true if a condition tagged its rejection as fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Rejected(rejection) if rejection.is_fatal())
    }

    /// The operation error, if the operation failed.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Rejected(_) => None,
        }
    }

    /// The condition rejection, if a condition rejected the result.
    pub fn rejection(&self) -> Option<&ConditionError> {
        match self {
            Self::Operation(_) => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operation(e) => write!(f, "{}", e),
            Self::Rejected(rejection) => write!(f, "{}", rejection),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AttemptError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Rejected(rejection) => Some(rejection),
        }
    }
}

/// Terminal failure of a poll call.
///
/// # Examples
///
/// ```rust
/// use tryuntil::{retry, PollError, PollSettings};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let outcome = retry::poll_with(
///     &PollSettings::default(),
///     || async { Err::<(), _>("service unavailable") },
///     (),
///     Duration::from_millis(20),
/// )
/// .await;
///
/// match outcome {
///     Err(PollError::TimedOut { last, attempts, .. }) => {
///         assert_eq!(last.operation_error(), Some(&"service unavailable"));
///         assert!(attempts >= 1);
///     }
///     _ => panic!("Expected timeout"),
/// }
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<E> {
    /// The effective deadline elapsed without an accepted attempt.
    TimedOut {
        /// The failure of the last attempt made.
        last: AttemptError<E>,
        /// Number of attempts made.
        attempts: u32,
        /// Time spent since the call began.
        elapsed: Duration,
    },
    /// The call stopped early because the attempt could not possibly succeed
    /// (a fatal condition rejection or a request that cannot be sent).
    Fatal {
        /// The failure that stopped the call.
        cause: AttemptError<E>,
        /// Number of attempts made.
        attempts: u32,
        /// Time spent since the call began.
        elapsed: Duration,
    },
}

impl<E> PollError<E> {
    /// Returns true if the deadline was reached.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Returns true if the call stopped on a fatal error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// The last attempt failure.
    pub fn cause(&self) -> &AttemptError<E> {
        match self {
            Self::TimedOut { last, .. } => last,
            Self::Fatal { cause, .. } => cause,
        }
    }

    /// Extract the last attempt failure, discarding metadata.
    pub fn into_cause(self) -> AttemptError<E> {
        match self {
            Self::TimedOut { last, .. } => last,
            Self::Fatal { cause, .. } => cause,
        }
    }

    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::TimedOut { attempts, .. } | Self::Fatal { attempts, .. } => *attempts,
        }
    }

    /// Time spent before giving up.
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::TimedOut { elapsed, .. } | Self::Fatal { elapsed, .. } => *elapsed,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for PollError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimedOut {
                last,
                attempts,
                elapsed,
            } => write!(
                f,
                "try operation failed after {} attempts ({:?}): {}",
                attempts, elapsed, last
            ),
            Self::Fatal {
                cause, attempts, ..
            } => write!(
                f,
                "try operation aborted after {} attempts: {}",
                attempts, cause
            ),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for PollError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause())
    }
}
