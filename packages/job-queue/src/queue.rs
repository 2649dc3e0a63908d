//! In-memory job queue with a bounded worker pool
//!
//! Jobs live in a process-local table indexed by id; nothing survives a
//! restart and only a single process instance is supported. Pending job ids
//! travel over an unbounded channel that `num_workers` consumer loops drain
//! in submission order, so at most `num_workers` handlers run at once.
//!
//! # Shutdown
//!
//! `stop()` lets every worker finish the job it is running and then waits
//! for the loops to exit. In-flight handlers are never interrupted.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use resonance_shared_config::JobQueueConfig;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{HandlerError, QueueError, QueueResult, UnknownJobTypeError};
use crate::job::{FailureOutcome, Job, JobPayload, JobStatus, JobType};
use crate::monitor::has_pending_progress;
use crate::retry::RetryPolicy;

/// Channel capacity for job lifecycle events
const EVENT_CAPACITY: usize = 256;

/// Boxed future returned by a job handler
pub type HandlerFuture = BoxFuture<'static, Result<Value, HandlerError>>;

/// Type-erased job handler
pub type JobHandler = Arc<dyn Fn(Job) -> HandlerFuture + Send + Sync>;

/// A status transition, broadcast to `subscribe()` receivers
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub retries: u32,
    pub at: DateTime<Utc>,
}

impl JobEvent {
    fn for_job(job: &Job, status: JobStatus) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type,
            status,
            retries: job.retries,
            at: Utc::now(),
        }
    }
}

/// Snapshot of the job table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub num_workers: usize,
    pub is_running: bool,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed + self.cancelled
    }
}

/// Running worker loops and the token that stops them
struct WorkerSet {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

struct QueueInner {
    jobs: RwLock<HashMap<Uuid, Job>>,
    handlers: RwLock<HashMap<JobType, JobHandler>>,
    sender: mpsc::UnboundedSender<Uuid>,
    receiver: Mutex<mpsc::UnboundedReceiver<Uuid>>,
    events: broadcast::Sender<JobEvent>,
    next_sequence: AtomicU64,
    started: AtomicBool,
    workers: Mutex<Option<WorkerSet>>,
    retry_policy: RetryPolicy,
    default_max_retries: u32,
    wait_poll_interval: Duration,
}

/// Asynchronous job queue
///
/// Cheap to clone; all clones share the same job table and workers.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("started", &self.inner.started.load(Ordering::Acquire))
            .field("retry_policy", &self.inner.retry_policy)
            .field("default_max_retries", &self.inner.default_max_retries)
            .finish()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(&JobQueueConfig::default())
    }
}

impl JobQueue {
    /// Create a queue using the retry policy described by `config`
    pub fn new(config: &JobQueueConfig) -> Self {
        Self::with_retry_policy(config, RetryPolicy::from(config))
    }

    /// Create a queue with an explicit retry policy
    pub fn with_retry_policy(config: &JobQueueConfig, retry_policy: RetryPolicy) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(QueueInner {
                jobs: RwLock::new(HashMap::new()),
                handlers: RwLock::new(HashMap::new()),
                sender,
                receiver: Mutex::new(receiver),
                events,
                next_sequence: AtomicU64::new(0),
                started: AtomicBool::new(false),
                workers: Mutex::new(None),
                retry_policy,
                default_max_retries: config.max_retries,
                wait_poll_interval: config.wait_poll_interval(),
            }),
        }
    }

    /// Register the handler for a job type
    ///
    /// Must happen before `start()`. Registering a type twice replaces the
    /// earlier handler.
    pub async fn register_handler<F, Fut>(&self, job_type: JobType, handler: F) -> QueueResult<()>
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        if self.inner.started.load(Ordering::Acquire) {
            return Err(QueueError::AlreadyStarted);
        }

        let handler: JobHandler = Arc::new(move |job| handler(job).boxed());
        if self
            .inner
            .handlers
            .write()
            .await
            .insert(job_type, handler)
            .is_some()
        {
            tracing::warn!(job_type = %job_type, "Replacing previously registered job handler");
        } else {
            tracing::debug!(job_type = %job_type, "Registered job handler");
        }
        Ok(())
    }

    /// Enqueue a job with the configured default attempt ceiling
    pub async fn enqueue(&self, job_type: JobType, payload: JobPayload) -> Uuid {
        self.enqueue_with_retries(job_type, payload, self.inner.default_max_retries)
            .await
    }

    /// Enqueue a job in `Pending` state and hand it to the workers
    ///
    /// Never waits for worker availability.
    pub async fn enqueue_with_retries(
        &self,
        job_type: JobType,
        payload: JobPayload,
        max_retries: u32,
    ) -> Uuid {
        // Sequence and channel order agree because both happen under the lock
        let mut jobs = self.inner.jobs.write().await;
        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::Relaxed);
        let job = Job::new(job_type, payload, max_retries, sequence);
        let job_id = job.id;
        self.inner.emit(JobEvent::for_job(&job, JobStatus::Pending));
        jobs.insert(job_id, job);
        self.inner.dispatch(job_id);
        drop(jobs);

        tracing::debug!(job_id = %job_id, job_type = %job_type, max_retries, "Job enqueued");
        job_id
    }

    /// Start `num_workers` consumer loops
    pub async fn start(&self, num_workers: usize) -> QueueResult<()> {
        if num_workers == 0 {
            return Err(QueueError::Configuration(
                "num_workers must be at least 1".to_string(),
            ));
        }

        let mut workers = self.inner.workers.lock().await;
        if workers.is_some() {
            return Err(QueueError::AlreadyStarted);
        }
        self.inner.started.store(true, Ordering::Release);

        let token = CancellationToken::new();
        let handles = (0..num_workers)
            .map(|worker_id| {
                let inner = self.inner.clone();
                let token = token.clone();
                tokio::spawn(async move { inner.worker_loop(worker_id, token).await })
            })
            .collect();

        *workers = Some(WorkerSet { token, handles });
        tracing::info!(num_workers, "Job queue started");
        Ok(())
    }

    /// Signal every worker to exit after its current job and wait for them
    pub async fn stop(&self) {
        let Some(workers) = self.inner.workers.lock().await.take() else {
            return;
        };

        tracing::info!("Stopping job queue, waiting for in-flight jobs");
        workers.token.cancel();
        for handle in workers.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Job worker task ended abnormally");
            }
        }
        self.inner.started.store(false, Ordering::Release);
        tracing::info!("Job queue stopped");
    }

    /// Whether worker loops are currently running
    pub fn is_running(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Look up a job by id
    pub async fn get_job(&self, job_id: Uuid) -> Option<Job> {
        self.inner.jobs.read().await.get(&job_id).cloned()
    }

    /// Cancel a pending or running job
    ///
    /// Returns `Ok(false)` for jobs that are already terminal. A running
    /// handler is not interrupted; its eventual outcome is discarded.
    pub async fn cancel_job(&self, job_id: Uuid) -> QueueResult<bool> {
        let mut jobs = self.inner.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;

        let was_running = job.status == JobStatus::Running;
        if !job.cancel() {
            return Ok(false);
        }
        self.inner.emit(JobEvent::for_job(job, JobStatus::Cancelled));
        drop(jobs);

        tracing::info!(job_id = %job_id, was_running, "Job cancelled");
        Ok(true)
    }

    /// List jobs newest-first, optionally filtered by status and type
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        job_type: Option<JobType>,
        limit: usize,
    ) -> Vec<Job> {
        self.find_jobs(limit, |job| {
            status.map_or(true, |s| job.status == s) && job_type.map_or(true, |t| job.job_type == t)
        })
        .await
    }

    /// Newest-first jobs matching `predicate`, capped at `limit` after filtering
    pub async fn find_jobs<P>(&self, limit: usize, predicate: P) -> Vec<Job>
    where
        P: Fn(&Job) -> bool,
    {
        let jobs = self.inner.jobs.read().await;
        let mut matching: Vec<&Job> = jobs.values().filter(|&job| predicate(job)).collect();
        matching.sort_unstable_by(|a, b| b.sequence.cmp(&a.sequence));
        matching.into_iter().take(limit).cloned().collect()
    }

    /// Poll until the job is terminal or `timeout` elapses
    pub async fn wait_for_job(&self, job_id: Uuid, timeout: Option<Duration>) -> QueueResult<Job> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let job = self
                .get_job(job_id)
                .await
                .ok_or(QueueError::JobNotFound(job_id))?;
            if job.is_terminal() {
                return Ok(job);
            }

            let mut pause = self.inner.wait_poll_interval;
            if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    return Err(QueueError::WaitTimeout { job_id, timeout });
                }
                pause = pause.min(deadline - now);
            }
            tokio::time::sleep(pause).await;
        }
    }

    /// Mutate a job's result in place under the job-table lock
    ///
    /// Used by reconciliation loops that stream external progress into a
    /// job after its handler has returned.
    pub async fn update_result<F>(&self, job_id: Uuid, update: F) -> QueueResult<Job>
    where
        F: FnOnce(&mut Option<Value>),
    {
        let mut jobs = self.inner.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;
        update(&mut job.result);
        Ok(job.clone())
    }

    /// Drop terminal jobs that finished more than `older_than` ago
    ///
    /// Completed jobs whose download progress is still moving are kept so
    /// the monitor can keep following them.
    pub async fn purge_finished(&self, older_than: Duration) -> usize {
        let cutoff = match chrono::Duration::from_std(older_than) {
            Ok(age) => Utc::now() - age,
            Err(_) => return 0,
        };

        let mut jobs = self.inner.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            let expired = job.is_terminal() && job.completed_at.is_some_and(|at| at < cutoff);
            !expired || has_pending_progress(job)
        });
        let removed = before - jobs.len();

        if removed > 0 {
            tracing::debug!(removed, "Purged finished jobs");
        }
        removed
    }

    /// Purge jobs older than `retention` every `every` until `token` is cancelled
    pub fn spawn_purge_loop(
        &self,
        retention: Duration,
        every: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(every) => {}
                }
                queue.purge_finished(retention).await;
            }
            tracing::debug!("Job purge loop stopped");
        })
    }

    /// Count jobs by status
    pub async fn stats(&self) -> QueueStats {
        let num_workers = self
            .inner
            .workers
            .lock()
            .await
            .as_ref()
            .map_or(0, |w| w.handles.len());

        let jobs = self.inner.jobs.read().await;
        let mut stats = QueueStats {
            num_workers,
            is_running: num_workers > 0,
            ..QueueStats::default()
        };
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Receive every status transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }
}

impl QueueInner {
    fn emit(&self, event: JobEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn dispatch(&self, job_id: Uuid) {
        if self.sender.send(job_id).is_err() {
            tracing::error!(job_id = %job_id, "Work channel closed, job will not run");
        }
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize, token: CancellationToken) {
        tracing::debug!(worker_id, "Job worker started");

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = async { self.receiver.lock().await.recv().await } => next,
            };

            match next {
                Some(job_id) => self.run_job(worker_id, job_id).await,
                None => break,
            }
        }

        tracing::debug!(worker_id, "Job worker stopped");
    }

    async fn run_job(self: &Arc<Self>, worker_id: usize, job_id: Uuid) {
        let job = {
            let mut jobs = self.jobs.write().await;
            let Some(job) = jobs.get_mut(&job_id) else {
                tracing::debug!(worker_id, job_id = %job_id, "Job vanished before it could run");
                return;
            };
            if !job.start() {
                tracing::debug!(
                    worker_id,
                    job_id = %job_id,
                    status = %job.status,
                    "Skipping job that is no longer pending"
                );
                return;
            }
            self.emit(JobEvent::for_job(job, JobStatus::Running));
            job.clone()
        };

        tracing::debug!(
            worker_id,
            job_id = %job_id,
            job_type = %job.job_type,
            attempt = job.retries + 1,
            "Processing job"
        );

        let handler = self.handlers.read().await.get(&job.job_type).cloned();
        let outcome = match handler {
            Some(handler) => {
                // A panicking handler takes down its own task, not the worker
                match tokio::spawn(async move { handler(job).await }).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_panic() => Err(HandlerError::new(format!(
                        "handler panicked: {}",
                        panic_message(e.into_panic())
                    ))),
                    Err(e) => Err(HandlerError::new(format!("handler task failed: {}", e))),
                }
            }
            None => Err(UnknownJobTypeError(job.job_type).into()),
        };

        match outcome {
            Ok(result) => self.mark_completed(worker_id, job_id, result).await,
            Err(error) => self.mark_failed(worker_id, job_id, error).await,
        }
    }

    async fn mark_completed(&self, worker_id: usize, job_id: Uuid, result: Value) {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&job_id) else {
            return;
        };

        if job.complete(result) {
            self.emit(JobEvent::for_job(job, JobStatus::Completed));
            drop(jobs);
            tracing::info!(worker_id, job_id = %job_id, "Job completed");
        } else {
            tracing::warn!(
                worker_id,
                job_id = %job_id,
                status = %job.status,
                "Discarding result of job that is no longer running"
            );
        }
    }

    async fn mark_failed(self: &Arc<Self>, worker_id: usize, job_id: Uuid, error: HandlerError) {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&job_id) else {
            return;
        };

        let Some(outcome) = job.record_failure(error.to_string(), error.is_retryable()) else {
            tracing::warn!(
                worker_id,
                job_id = %job_id,
                status = %job.status,
                error = %error,
                "Discarding failure of job that is no longer running"
            );
            return;
        };

        let failed = JobEvent::for_job(job, JobStatus::Failed);
        self.emit(failed.clone());
        if outcome == FailureOutcome::Requeued {
            self.emit(JobEvent {
                status: JobStatus::Pending,
                ..failed
            });
        }
        let retries = job.retries;
        let max_retries = job.max_retries;
        drop(jobs);

        match outcome {
            FailureOutcome::Requeued => {
                let delay = self.retry_policy.delay_for(retries);
                tracing::warn!(
                    worker_id,
                    job_id = %job_id,
                    retries,
                    max_retries,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %error,
                    "Job failed, retrying"
                );
                self.schedule_retry(job_id, delay);
            }
            FailureOutcome::Exhausted => {
                tracing::error!(
                    worker_id,
                    job_id = %job_id,
                    retries,
                    max_retries,
                    retryable = error.is_retryable(),
                    error = %error,
                    "Job failed permanently"
                );
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, job_id: Uuid, delay: Duration) {
        if delay.is_zero() {
            self.dispatch(job_id);
            return;
        }

        let inner = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.dispatch(job_id);
        });
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
