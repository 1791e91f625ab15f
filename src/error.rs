//! Error types for protected calls and breaker configuration.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

/// Result type for calls made through a circuit breaker.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Error returned by a protected call when no fallback was supplied.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker is open and the call was rejected without being attempted.
    Open {
        /// Name of the dependency whose breaker rejected the call.
        breaker: String,
        /// Time left until the breaker lets a trial call through.
        retry_after: Duration,
    },

    /// The protected call did not complete within the breaker's call timeout.
    Timeout {
        /// Name of the dependency that timed out.
        breaker: String,
        /// The call timeout that elapsed.
        timeout: Duration,
    },

    /// The protected call itself failed.
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Returns true if the call was rejected by an open breaker.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// Returns true if the call timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    /// Returns true when the dependency should be reported as unavailable
    /// (rejected or timed out) rather than as a failure of the request itself.
    pub fn is_unavailable(&self) -> bool {
        self.is_open() || self.is_timeout()
    }

    /// Classifies the error as a recorded failure, if it was one.
    ///
    /// Rejections are never recorded as failures, so `Open` yields `None`.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            BreakerError::Open { .. } => None,
            BreakerError::Timeout { .. } => Some(FailureKind::Timeout),
            BreakerError::Operation(_) => Some(FailureKind::Upstream),
        }
    }

    /// Consumes the error, returning the upstream error if there was one.
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> Display for BreakerError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open {
                breaker,
                retry_after,
            } => write!(
                f,
                "Circuit breaker '{}' is open, retry in {:?}",
                breaker, retry_after
            ),
            BreakerError::Timeout { breaker, timeout } => {
                write!(f, "Call to '{}' timed out after {:?}", breaker, timeout)
            }
            BreakerError::Operation(e) => write!(f, "Operation error: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BreakerError::Open { .. } => None,
            BreakerError::Timeout { .. } => None,
            BreakerError::Operation(e) => Some(e),
        }
    }
}

/// The kind of failure a breaker recorded.
///
/// Both kinds count the same towards tripping; the distinction is kept for
/// logs, hooks and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The call exceeded its timeout.
    Timeout,

    /// The call returned an error.
    Upstream,
}

impl FailureKind {
    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Upstream => "upstream",
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A threshold or duration was zero.
    NonPositive {
        /// Name of the offending setting.
        field: &'static str,
    },
    /// A duration was longer than [`BreakerConfig::MAX_TIMEOUT`](crate::BreakerConfig).
    TooLarge {
        /// Name of the offending setting.
        field: &'static str,
        /// Largest accepted value.
        max: Duration,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositive { field } => {
                write!(f, "Breaker setting '{}' must be greater than zero", field)
            }
            ConfigError::TooLarge { field, max } => {
                write!(f, "Breaker setting '{}' must not exceed {:?}", field, max)
            }
        }
    }
}

impl Error for ConfigError {}
