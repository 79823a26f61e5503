//! Backend error taxonomy and the policy table the poll loop applies to it.
//!
//! Every failure that comes back from the fleet backend is tagged with an
//! [`ErrorKind`]. The loop never inspects messages or source types; it asks
//! the kind for its [`CyclePolicy`] and acts on that.

use std::time::Duration;

/// Classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The credentials were rejected or the session expired.
    InvalidCredentials,
    /// The backend database is temporarily unavailable.
    DatabaseUnavailable,
    /// The account exceeded the backend's query rate limit.
    RateLimited,
    /// The request itself was malformed (unknown method, bad arguments).
    InvalidOperation,
    /// The request never completed: connection, timeout, or server fault.
    Transport,
    /// A request or response body could not be encoded or decoded.
    Serialization,
    /// Anything the backend reported that fits no other kind.
    Unclassified,
}

/// What the poll loop does after a cycle fails with a given [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Log, wait the normal poll interval, and try again.
    RetryAfterInterval,
    /// Log, wait the rate-limit backoff, and try again.
    BackOff,
    /// Log and end the loop.
    Stop,
}

impl ErrorKind {
    /// The loop's response to a cycle failing with this kind.
    pub const fn cycle_policy(self) -> CyclePolicy {
        match self {
            Self::Transport | Self::Serialization => CyclePolicy::RetryAfterInterval,
            Self::RateLimited => CyclePolicy::BackOff,
            Self::InvalidOperation
            | Self::InvalidCredentials
            | Self::DatabaseUnavailable
            | Self::Unclassified => CyclePolicy::Stop,
        }
    }

    /// Stable lowercase name for logging.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::DatabaseUnavailable => "database_unavailable",
            Self::RateLimited => "rate_limited",
            Self::InvalidOperation => "invalid_operation",
            Self::Transport => "transport",
            Self::Serialization => "serialization",
            Self::Unclassified => "unclassified",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CyclePolicy {
    /// How long to wait before the next cycle, or `None` when the loop
    /// should end.
    pub const fn delay(self, interval: Duration, backoff: Duration) -> Option<Duration> {
        match self {
            Self::RetryAfterInterval => Some(interval),
            Self::BackOff => Some(backoff),
            Self::Stop => None,
        }
    }
}

/// A failure reported by, or while talking to, the fleet backend.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct BackendError {
    /// Classification driving the loop's reaction.
    pub kind: ErrorKind,
    /// Human-readable detail for the console.
    pub message: String,
}

impl BackendError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for an [`ErrorKind::Transport`] error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Shorthand for an [`ErrorKind::Serialization`] error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
