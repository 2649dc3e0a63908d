//! Error types for the job queue and circuit breaker
//!
//! Handler failures never escape the worker loop: they are converted into
//! job state. The errors here that reach callers are the queue's own
//! (`QueueError`) and the circuit breaker's (`BreakerError`).

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::job::JobType;

/// Errors returned by `JobQueue` operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    /// No job with this id exists in the job table
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// `wait_for_job` deadline elapsed before the job reached a terminal status
    #[error("timed out after {timeout:?} waiting for job {job_id}")]
    WaitTimeout { job_id: Uuid, timeout: Duration },

    /// Operation is only valid before `start()`
    #[error("job queue is already started")]
    AlreadyStarted,

    /// Invalid queue configuration
    #[error("invalid job queue configuration: {0}")]
    Configuration(String),

    /// Payload could not be built from or decoded into a typed struct
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// A job's type has no registered handler
///
/// Retrying can't fix this, so the job fails terminally on its first attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no handler registered for job type '{0}'")]
pub struct UnknownJobTypeError(pub JobType);

/// Raised by `CircuitBreaker::call` while the breaker is open
#[derive(Error, Debug, Clone, PartialEq)]
#[error("service '{service_name}' is unavailable (circuit open), retry after {retry_after_secs:.1}s")]
pub struct CircuitOpenError {
    /// Name of the protected dependency
    pub service_name: String,
    /// Seconds until the breaker lets a trial call through
    pub retry_after_secs: f64,
}

impl CircuitOpenError {
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs_f64(self.retry_after_secs.max(0.0))
    }
}

/// Outcome of a failed `CircuitBreaker::call`
///
/// Keeps the breaker's own rejection apart from the wrapped operation's
/// error so callers can tell "service degraded" from "request failed".
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// The breaker rejected the call without running the operation
    #[error(transparent)]
    Open(CircuitOpenError),

    /// The operation ran and failed
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Check whether the breaker short-circuited the call
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// The operation's own error, if it ran
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open(_) => None,
        }
    }
}

/// Failure reported by a job handler
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// A circuit breaker rejected a call the handler depends on
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// No handler is registered for the job's type
    #[error(transparent)]
    UnknownJobType(#[from] UnknownJobTypeError),

    /// The handler itself failed
    #[error("{message}")]
    Failed {
        message: String,
        /// Whether another attempt could succeed
        retryable: bool,
    },
}

impl HandlerError {
    /// A transient failure, subject to the retry policy
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure another attempt can't fix; the job fails without retrying
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: false,
        }
    }

    /// Check if the queue should re-enqueue the job after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitOpen(_) => true,
            Self::UnknownJobType(_) => false,
            Self::Failed { retryable, .. } => *retryable,
        }
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::new(format!("IOError: {}", err))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::permanent(format!("invalid job payload: {}", err))
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<CircuitOpenError>() {
            Ok(open) => Self::CircuitOpen(open),
            Err(err) => match err.downcast::<HandlerError>() {
                Ok(handler_err) => handler_err,
                Err(err) => Self::new(format!("{:#}", err)),
            },
        }
    }
}

impl<E: fmt::Display> From<BreakerError<E>> for HandlerError {
    fn from(err: BreakerError<E>) -> Self {
        match err {
            BreakerError::Open(open) => Self::CircuitOpen(open),
            BreakerError::Inner(e) => Self::new(e.to_string()),
        }
    }
}

/// Errors raised by a reconciliation progress source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    /// The external system could not be reached or returned an error
    #[error("progress source unavailable: {0}")]
    SourceUnavailable(String),

    /// The job's result does not carry what the source needs to look it up
    #[error("job {job_id} is not trackable: {reason}")]
    Untrackable { job_id: Uuid, reason: String },

    /// The protected source is short-circuited
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}
