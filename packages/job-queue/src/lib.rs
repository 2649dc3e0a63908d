//! Background job execution core for Resonance
//!
//! This crate runs long-lived, failure-prone work (downloads, metadata sync,
//! playlist import) off the request path:
//!
//! - [`JobQueue`] - in-memory job table, per-type handlers, a bounded worker
//!   pool and a retry policy
//! - [`CircuitBreaker`] / [`CircuitBreakerRegistry`] - per-dependency failure
//!   tracking that short-circuits calls to unhealthy services
//! - [`DownloadMonitor`] - periodic reconciliation of job results with
//!   external download progress
//!
//! All state is process-local. Jobs do not survive a restart and only a
//! single process instance is supported.
//!
//! # Example
//!
//! ```rust,ignore
//! use resonance_job_queue::{JobQueue, JobType, JobPayload, HandlerError};
//! use resonance_shared_config::JobQueueConfig;
//!
//! let queue = JobQueue::new(&JobQueueConfig::default());
//! queue
//!     .register_handler(JobType::MetadataSync, |job| async move {
//!         Ok(serde_json::json!({ "synced": job.id }))
//!     })
//!     .await?;
//! queue.start(4).await?;
//!
//! let id = queue.enqueue(JobType::MetadataSync, JobPayload::new()).await;
//! let job = queue.wait_for_job(id, None).await?;
//! ```

pub mod circuit_breaker;
pub mod error;
pub mod job;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use error::{
    BreakerError, CircuitOpenError, HandlerError, MonitorError, QueueError, QueueResult,
    UnknownJobTypeError,
};
pub use job::{payload_from, Job, JobPayload, JobStatus, JobType};
pub use monitor::{
    has_pending_progress, progress_of, with_progress, DownloadMonitor, ProgressSource,
    ProgressState, ProgressUpdate, ReconcileReport,
};
pub use queue::{HandlerFuture, JobEvent, JobHandler, JobQueue, QueueStats};
pub use registry::CircuitBreakerRegistry;
pub use retry::RetryPolicy;

// Configuration types live in the shared config crate
pub use resonance_shared_config::{CircuitBreakerConfig, JobQueueConfig, RetryBackoffKind};
