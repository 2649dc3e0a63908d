//! Error handling for the Resonance worker
//!
//! `WorkerError` covers what can go wrong inside the worker's own job
//! handlers and progress sources. It converts into the queue's
//! [`HandlerError`] and [`MonitorError`] at the boundary, keeping the
//! retryable/permanent distinction.

use resonance_job_queue::{BreakerError, HandlerError, MonitorError};
use thiserror::Error;

/// Main worker error type
#[derive(Error, Debug)]
pub enum WorkerError {
    // ========== Job Processing Errors ==========
    /// Invalid job payload (missing or malformed fields)
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Job queue operation failed
    #[error("queue error: {0}")]
    Queue(#[from] resonance_job_queue::QueueError),

    /// Failed to deserialize a job payload or an API response
    #[error("job deserialization failed: {0}")]
    JobDeserialization(#[from] serde_json::Error),

    // ========== Lidarr Integration Errors ==========
    /// Lidarr not configured
    #[error("Lidarr integration not configured")]
    LidarrNotConfigured,

    /// Lidarr API error
    #[error("Lidarr API error: {status_code} - {message}")]
    LidarrApi { status_code: u16, message: String },

    // ========== HTTP/External Service Errors ==========
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A circuit breaker short-circuited the call
    #[error(transparent)]
    CircuitOpen(#[from] resonance_job_queue::CircuitOpenError),
}

impl WorkerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::CircuitOpen(_) => true,
            // Server-side trouble and throttling clear up; client errors don't
            Self::LidarrApi { status_code, .. } => *status_code >= 500 || *status_code == 429,
            _ => false,
        }
    }

    /// Get a severity level for logging
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::LidarrNotConfigured => ErrorSeverity::Critical,

            Self::LidarrApi { .. } | Self::Queue(_) => ErrorSeverity::Error,

            Self::Http(_) | Self::CircuitOpen(_) => ErrorSeverity::Warning,

            Self::InvalidPayload(_) | Self::JobDeserialization(_) => ErrorSeverity::Info,
        }
    }

    /// Log the error with appropriate severity
    pub fn log(&self) {
        match self.severity() {
            ErrorSeverity::Critical => {
                tracing::error!(error = %self, retryable = self.is_retryable(), "Critical worker error");
            }
            ErrorSeverity::Error => {
                tracing::error!(error = %self, retryable = self.is_retryable(), "Worker error");
            }
            ErrorSeverity::Warning => {
                tracing::warn!(error = %self, retryable = self.is_retryable(), "Worker warning");
            }
            ErrorSeverity::Info => {
                tracing::info!(error = %self, retryable = self.is_retryable(), "Worker info");
            }
        }
    }

    /// Create a Lidarr API error
    pub fn lidarr_api(status_code: u16, message: impl Into<String>) -> Self {
        Self::LidarrApi {
            status_code,
            message: message.into(),
        }
    }
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that should trigger alerts
    Critical,
    /// Standard errors
    Error,
    /// Warnings for expected failures
    Warning,
    /// Informational messages
    Info,
}

/// Result type alias for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

// ========== Conversion Implementations ==========

impl From<BreakerError<WorkerError>> for WorkerError {
    fn from(err: BreakerError<WorkerError>) -> Self {
        match err {
            BreakerError::Open(open) => Self::CircuitOpen(open),
            BreakerError::Inner(e) => e,
        }
    }
}

impl From<WorkerError> for HandlerError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::CircuitOpen(open) => HandlerError::CircuitOpen(open),
            err if err.is_retryable() => HandlerError::new(err.to_string()),
            err => HandlerError::permanent(err.to_string()),
        }
    }
}

impl From<WorkerError> for MonitorError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::CircuitOpen(open) => MonitorError::CircuitOpen(open),
            err => MonitorError::SourceUnavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use resonance_job_queue::CircuitOpenError;
    use tracing_test::traced_test;

    fn open() -> CircuitOpenError {
        CircuitOpenError {
            service_name: "lidarr".to_string(),
            retry_after_secs: 30.0,
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(WorkerError::lidarr_api(503, "Service Unavailable").is_retryable());
        assert!(WorkerError::lidarr_api(429, "Too Many Requests").is_retryable());
        assert!(WorkerError::CircuitOpen(open()).is_retryable());

        assert!(!WorkerError::lidarr_api(404, "Album not found").is_retryable());
        assert!(!WorkerError::InvalidPayload("album_id".to_string()).is_retryable());
        assert!(!WorkerError::LidarrNotConfigured.is_retryable());
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(
            WorkerError::LidarrNotConfigured.severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            WorkerError::lidarr_api(500, "boom").severity(),
            ErrorSeverity::Error
        );
        assert_eq!(
            WorkerError::CircuitOpen(open()).severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(
            WorkerError::InvalidPayload("x".to_string()).severity(),
            ErrorSeverity::Info
        );
    }

    #[test]
    fn test_error_display() {
        let err = WorkerError::lidarr_api(404, "Album not found");
        assert_eq!(err.to_string(), "Lidarr API error: 404 - Album not found");
    }

    #[test]
    fn test_handler_error_keeps_retryability() {
        let err: HandlerError = WorkerError::lidarr_api(502, "Bad Gateway").into();
        assert!(err.is_retryable());

        let err: HandlerError = WorkerError::lidarr_api(400, "Bad Request").into();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("400"));

        let err: HandlerError = WorkerError::CircuitOpen(open()).into();
        assert_matches!(err, HandlerError::CircuitOpen(e) if e.service_name == "lidarr");
    }

    #[test]
    fn test_breaker_error_unwraps_inner() {
        let err: WorkerError = BreakerError::Inner(WorkerError::lidarr_api(500, "boom")).into();
        assert_matches!(err, WorkerError::LidarrApi { status_code: 500, .. });

        let err: WorkerError = BreakerError::<WorkerError>::Open(open()).into();
        assert_matches!(err, WorkerError::CircuitOpen(_));
    }

    #[test]
    fn test_monitor_error_conversion() {
        let err: MonitorError = WorkerError::lidarr_api(500, "boom").into();
        assert_matches!(err, MonitorError::SourceUnavailable(msg) if msg.contains("500"));

        let err: MonitorError = WorkerError::CircuitOpen(open()).into();
        assert_matches!(err, MonitorError::CircuitOpen(_));
    }

    #[test]
    #[traced_test]
    fn test_log_uses_severity() {
        WorkerError::lidarr_api(503, "Service Unavailable").log();
        assert!(logs_contain("Worker error"));

        WorkerError::CircuitOpen(open()).log();
        assert!(logs_contain("Worker warning"));
    }
}
