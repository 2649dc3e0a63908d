//! Job model and lifecycle state machine
//!
//! ```text
//! Pending ──► Running ──► Completed
//!    ▲           │
//!    └─(retry)── Failed ──► (terminal once retries are exhausted)
//!
//! Pending | Running ──► Cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};

/// Handler-specific key/value payload
pub type JobPayload = Map<String, Value>;

/// Build a payload map from any struct that serializes to a JSON object
pub fn payload_from<T: Serialize>(value: &T) -> QueueResult<JobPayload> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(QueueError::InvalidPayload(format!(
            "payload must serialize to a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(QueueError::InvalidPayload(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Category of work; selects the handler that processes a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Fetch a release from the download manager
    Download,
    /// Refresh artist/album metadata from an external catalogue
    MetadataSync,
    /// Import a playlist from an external service
    PlaylistImport,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::MetadataSync => "metadata_sync",
            Self::PlaylistImport => "playlist_import",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "download" => Ok(Self::Download),
            "metadata_sync" => Ok(Self::MetadataSync),
            "playlist_import" => Ok(Self::PlaylistImport),
            other => Err(format!("unknown job type '{}'", other)),
        }
    }
}

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether no further transition can happen from this status
    ///
    /// `Failed` is only observable once retries are exhausted: a retried job
    /// is put back to `Pending` under the same lock that records the failure.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `Job::record_failure` decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureOutcome {
    /// Attempts remain; the job is back to `Pending`
    Requeued,
    /// The job is terminally `Failed`
    Exhausted,
}

/// A unit of background work plus its execution state
///
/// Callers only ever see clones of the queue's record; mutation goes through
/// the queue so that every transition happens under the job-table lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Handler result; the reconciliation monitor may keep updating it after completion
    pub result: Option<Value>,
    /// Last failure message
    pub error: Option<String>,
    /// Number of `Failed` transitions so far
    pub retries: u32,
    pub max_retries: u32,
    /// Enqueue order, used for newest-first listing
    #[serde(skip)]
    pub(crate) sequence: u64,
}

impl Job {
    pub(crate) fn new(job_type: JobType, payload: JobPayload, max_retries: u32, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            payload,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retries: 0,
            max_retries,
            sequence,
        }
    }

    /// Decode the payload into a handler's own payload struct
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.payload.clone()))
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Pending → Running; false if the job was cancelled while queued
    pub(crate) fn start(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        true
    }

    /// Running → Completed; false if the job is no longer running
    pub(crate) fn complete(&mut self, result: Value) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Running → Failed, then back to Pending when attempts remain
    ///
    /// Returns `None` if the job is no longer running (cancelled meanwhile).
    pub(crate) fn record_failure(&mut self, error: String, retryable: bool) -> Option<FailureOutcome> {
        if self.status != JobStatus::Running {
            return None;
        }
        self.status = JobStatus::Failed;
        self.retries += 1;
        self.error = Some(error);

        if retryable && self.retries < self.max_retries {
            self.status = JobStatus::Pending;
            Some(FailureOutcome::Requeued)
        } else {
            self.completed_at = Some(Utc::now());
            Some(FailureOutcome::Exhausted)
        }
    }

    /// Pending | Running → Cancelled; false for terminal jobs
    pub(crate) fn cancel(&mut self) -> bool {
        if !matches!(self.status, JobStatus::Pending | JobStatus::Running) {
            return false;
        }
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        true
    }
}
