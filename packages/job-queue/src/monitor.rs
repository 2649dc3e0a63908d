//! Download progress reconciliation
//!
//! A download handler returns as soon as the external download manager has
//! accepted the request, so its job is `Completed` while bytes are still
//! moving. The monitor polls a [`ProgressSource`] on a fixed interval and
//! streams what it reports into the job's `result.progress`, until the
//! external side reports a terminal state.
//!
//! The monitor never owns a job: every write goes through
//! `JobQueue::update_result`, under the same lock the workers use.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::MonitorError;
use crate::job::{Job, JobStatus, JobType};
use crate::queue::JobQueue;

/// Key under which progress lives in a job's result object
pub const PROGRESS_KEY: &str = "progress";

/// Most in-flight jobs polled per reconciliation pass
const DEFAULT_BATCH_LIMIT: usize = 500;

/// External state of a tracked download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Queued,
    Downloading,
    Completed,
    Failed,
}

impl ProgressState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Progress reported by the external system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub state: ProgressState,
    #[serde(default)]
    pub bytes_downloaded: u64,
    #[serde(default)]
    pub bytes_total: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ProgressUpdate {
    pub fn queued() -> Self {
        Self {
            state: ProgressState::Queued,
            bytes_downloaded: 0,
            bytes_total: None,
            message: None,
        }
    }

    pub fn downloading(bytes_downloaded: u64, bytes_total: Option<u64>) -> Self {
        Self {
            state: ProgressState::Downloading,
            bytes_downloaded,
            bytes_total,
            message: None,
        }
    }

    pub fn completed(bytes_total: Option<u64>) -> Self {
        Self {
            state: ProgressState::Completed,
            bytes_downloaded: bytes_total.unwrap_or(0),
            bytes_total,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: ProgressState::Failed,
            bytes_downloaded: 0,
            bytes_total: None,
            message: Some(message.into()),
        }
    }

    /// Percentage done, when the total size is known
    pub fn percent(&self) -> Option<f64> {
        match self.bytes_total {
            Some(0) => Some(if self.state == ProgressState::Completed { 100.0 } else { 0.0 }),
            Some(total) => Some((self.bytes_downloaded as f64 / total as f64 * 100.0).min(100.0)),
            None if self.state == ProgressState::Completed => Some(100.0),
            None => None,
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "state": self.state,
            "bytes_downloaded": self.bytes_downloaded,
            "bytes_total": self.bytes_total,
            "percent": self.percent(),
            "message": self.message,
            "updated_at": Utc::now(),
        })
    }
}

/// Read the progress a job's result currently carries
pub fn progress_of(job: &Job) -> Option<ProgressUpdate> {
    let progress = job.result.as_ref()?.get(PROGRESS_KEY)?;
    serde_json::from_value(progress.clone()).ok()
}

/// Whether a job's result carries progress that hasn't reached a terminal state
pub fn has_pending_progress(job: &Job) -> bool {
    progress_of(job).is_some_and(|p| !p.state.is_terminal())
}

/// Attach `progress` to a handler result object
///
/// Non-object results are wrapped as `{"value": result}`.
pub fn with_progress(result: Value, progress: &ProgressUpdate) -> Value {
    let mut object = match result {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    object.insert(PROGRESS_KEY.to_string(), progress.to_json());
    Value::Object(object)
}

/// Write `update` into a result unless it already holds a terminal state
fn apply_progress(result: &mut Option<Value>, update: &ProgressUpdate) -> bool {
    let Some(Value::Object(object)) = result else {
        return false;
    };

    let current_is_terminal = object
        .get(PROGRESS_KEY)
        .and_then(|p| serde_json::from_value::<ProgressUpdate>(p.clone()).ok())
        .is_some_and(|p| p.state.is_terminal());
    if current_is_terminal {
        return false;
    }

    object.insert(PROGRESS_KEY.to_string(), update.to_json());
    true
}

/// Where the monitor gets external progress from
pub trait ProgressSource: Send + Sync {
    /// Latest progress for `job`, or `None` when the source has nothing new
    fn poll(&self, job: &Job) -> impl Future<Output = Result<Option<ProgressUpdate>, MonitorError>> + Send;
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Jobs with a non-terminal progress state that were polled
    pub checked: usize,
    /// Jobs whose progress changed
    pub updated: usize,
    /// Jobs that reached `completed` this pass
    pub finished: usize,
    /// Jobs that reached `failed` this pass
    pub failed: usize,
    /// Source errors
    pub errors: usize,
}

/// Periodic loop reconciling job results with external download progress
///
/// Only `result.progress` is ever written. A download that fails on the
/// external side leaves the job `Completed` with no `error` set; callers
/// find the failure in `result.progress.state` and `result.progress.message`.
pub struct DownloadMonitor<S> {
    queue: JobQueue,
    source: S,
    job_type: JobType,
    interval: Duration,
    batch_limit: usize,
}

impl<S: ProgressSource> DownloadMonitor<S> {
    /// Monitor `Download` jobs every `interval`
    pub fn new(queue: JobQueue, source: S, interval: Duration) -> Self {
        Self {
            queue,
            source,
            job_type: JobType::Download,
            interval,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    /// Track a different job type
    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        self.job_type = job_type;
        self
    }

    /// Cap how many in-flight jobs one pass polls
    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    /// Run a single reconciliation pass
    pub async fn reconcile_once(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let job_type = self.job_type;
        let jobs = self
            .queue
            .find_jobs(self.batch_limit, |job| {
                job.status == JobStatus::Completed
                    && job.job_type == job_type
                    && has_pending_progress(job)
            })
            .await;

        for job in jobs {
            let Some(current) = progress_of(&job) else {
                continue;
            };
            report.checked += 1;

            let update = match self.source.poll(&job).await {
                Ok(Some(update)) if update != current => update,
                Ok(_) => continue,
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to poll download progress");
                    continue;
                }
            };

            let mut applied = false;
            if let Err(e) = self
                .queue
                .update_result(job.id, |result| applied = apply_progress(result, &update))
                .await
            {
                tracing::debug!(job_id = %job.id, error = %e, "Tracked job disappeared");
                continue;
            }
            if !applied {
                continue;
            }

            report.updated += 1;
            match update.state {
                ProgressState::Completed => {
                    report.finished += 1;
                    tracing::info!(job_id = %job.id, bytes = update.bytes_downloaded, "Download finished");
                }
                ProgressState::Failed => {
                    report.failed += 1;
                    tracing::warn!(
                        job_id = %job.id,
                        reason = update.message.as_deref().unwrap_or("unknown"),
                        "Download failed"
                    );
                }
                ProgressState::Queued | ProgressState::Downloading => {
                    tracing::debug!(
                        job_id = %job.id,
                        bytes = update.bytes_downloaded,
                        total = ?update.bytes_total,
                        "Download progress"
                    );
                }
            }
        }

        report
    }

    /// Reconcile every `interval` until `token` is cancelled
    ///
    /// The first pass runs one interval after start. Cancellation is only
    /// observed while sleeping between passes.
    pub async fn run(self, token: CancellationToken) {
        tracing::info!(
            job_type = %self.job_type,
            interval_secs = self.interval.as_secs_f64(),
            "Download monitor started"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let report = self.reconcile_once().await;
            if report.checked > 0 {
                tracing::debug!(
                    checked = report.checked,
                    updated = report.updated,
                    finished = report.finished,
                    failed = report.failed,
                    errors = report.errors,
                    "Reconciliation pass done"
                );
            }
        }

        tracing::info!("Download monitor stopped");
    }

    /// Spawn `run` on the runtime
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()>
    where
        S: 'static,
    {
        tokio::spawn(self.run(token))
    }
}
