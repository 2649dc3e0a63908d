//! Integration tests for the download reconciliation monitor
//!
//! A scripted progress source stands in for the download manager so each
//! pass can be driven step by step.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use resonance_job_queue::{
    progress_of, with_progress, DownloadMonitor, HandlerError, Job, JobPayload, JobQueue,
    JobQueueConfig, JobStatus, JobType, MonitorError, ProgressSource, ProgressState,
    ProgressUpdate, ReconcileReport,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

/// Progress source whose answers are set by the test
#[derive(Clone, Default)]
struct ScriptedSource {
    progress: Arc<Mutex<HashMap<Uuid, ProgressUpdate>>>,
    unavailable: Arc<AtomicBool>,
    polls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn set(&self, job_id: Uuid, update: ProgressUpdate) {
        self.progress.lock().unwrap().insert(job_id, update);
    }
}

impl ProgressSource for ScriptedSource {
    async fn poll(&self, job: &Job) -> Result<Option<ProgressUpdate>, MonitorError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MonitorError::SourceUnavailable("connection refused".to_string()));
        }
        Ok(self.progress.lock().unwrap().get(&job.id).cloned())
    }
}

/// Queue with a download handler that hands back a queued progress record
async fn started_queue() -> JobQueue {
    let queue = JobQueue::new(&JobQueueConfig {
        wait_poll_interval_ms: 5,
        ..JobQueueConfig::default()
    });
    queue
        .register_handler(JobType::Download, |job| async move {
            if job.payload.contains_key("broken") {
                return Err(HandlerError::permanent("bad album id"));
            }
            Ok(with_progress(
                json!({"album_id": job.payload["album_id"]}),
                &ProgressUpdate::queued(),
            ))
        })
        .await
        .unwrap();
    queue
        .register_handler(JobType::MetadataSync, |_job| async { Ok(json!({"synced": 3})) })
        .await
        .unwrap();
    queue.start(2).await.unwrap();
    queue
}

async fn completed_download(queue: &JobQueue, album_id: i64) -> Uuid {
    let mut payload = JobPayload::new();
    payload.insert("album_id".to_string(), json!(album_id));
    let id = queue.enqueue(JobType::Download, payload).await;
    let job = queue.wait_for_job(id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    id
}

#[tokio::test]
async fn test_progress_streams_into_completed_job() {
    let queue = started_queue().await;
    let source = ScriptedSource::default();
    let monitor = DownloadMonitor::new(queue.clone(), source.clone(), Duration::from_secs(60));
    let id = completed_download(&queue, 42).await;

    // Nothing reported yet
    let report = monitor.reconcile_once().await;
    assert_eq!(report.checked, 1);
    assert_eq!(report.updated, 0);

    source.set(id, ProgressUpdate::downloading(50, Some(200)));
    let report = monitor.reconcile_once().await;
    assert_eq!(
        report,
        ReconcileReport {
            checked: 1,
            updated: 1,
            ..ReconcileReport::default()
        }
    );
    let job = queue.get_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let result = job.result.clone().unwrap();
    assert_eq!(result["album_id"], 42);
    assert_eq!(result["progress"]["state"], "downloading");
    assert_eq!(result["progress"]["percent"], 25.0);

    // Same answer again is not an update
    assert_eq!(monitor.reconcile_once().await.updated, 0);

    source.set(id, ProgressUpdate::completed(Some(200)));
    let report = monitor.reconcile_once().await;
    assert_eq!(report.finished, 1);
    let progress = progress_of(&queue.get_job(id).await.unwrap()).unwrap();
    assert_eq!(progress.state, ProgressState::Completed);
    assert_eq!(progress.bytes_downloaded, 200);

    // Terminal progress is no longer polled
    let polls = source.polls.load(Ordering::SeqCst);
    assert_eq!(monitor.reconcile_once().await.checked, 0);
    assert_eq!(source.polls.load(Ordering::SeqCst), polls);
    queue.stop().await;
}

#[tokio::test]
async fn test_external_failure_is_recorded_in_result() {
    let queue = started_queue().await;
    let source = ScriptedSource::default();
    let monitor = DownloadMonitor::new(queue.clone(), source.clone(), Duration::from_secs(60));
    let id = completed_download(&queue, 7).await;

    source.set(id, ProgressUpdate::failed("no indexer returned results"));
    let report = monitor.reconcile_once().await;
    assert_eq!(report.failed, 1);

    let job = queue.get_job(id).await.unwrap();
    // The job itself stays completed; only its result carries the outcome
    assert_eq!(job.status, JobStatus::Completed);
    let progress = progress_of(&job).unwrap();
    assert_eq!(progress.state, ProgressState::Failed);
    assert_eq!(progress.message.as_deref(), Some("no indexer returned results"));
    queue.stop().await;
}

#[tokio::test]
async fn test_source_errors_are_counted_not_fatal() {
    let queue = started_queue().await;
    let source = ScriptedSource::default();
    let monitor = DownloadMonitor::new(queue.clone(), source.clone(), Duration::from_secs(60));
    let first = completed_download(&queue, 1).await;
    let second = completed_download(&queue, 2).await;

    source.set(first, ProgressUpdate::downloading(1, Some(2)));
    source.set(second, ProgressUpdate::downloading(1, Some(2)));
    source.unavailable.store(true, Ordering::SeqCst);

    let report = monitor.reconcile_once().await;
    assert_eq!(report.checked, 2);
    assert_eq!(report.errors, 2);
    assert_eq!(report.updated, 0);
    assert_eq!(
        progress_of(&queue.get_job(first).await.unwrap()).unwrap().state,
        ProgressState::Queued
    );

    source.unavailable.store(false, Ordering::SeqCst);
    assert_eq!(monitor.reconcile_once().await.updated, 2);
    queue.stop().await;
}

#[tokio::test]
async fn test_only_tracked_jobs_are_polled() {
    let queue = started_queue().await;
    let source = ScriptedSource::default();
    let monitor = DownloadMonitor::new(queue.clone(), source.clone(), Duration::from_secs(60));

    // A completed job of another type and a failed download
    let sync = queue.enqueue(JobType::MetadataSync, JobPayload::new()).await;
    queue.wait_for_job(sync, WAIT).await.unwrap();
    let mut payload = JobPayload::new();
    payload.insert("broken".to_string(), json!(true));
    let broken = queue.enqueue(JobType::Download, payload).await;
    assert_eq!(
        queue.wait_for_job(broken, WAIT).await.unwrap().status,
        JobStatus::Failed
    );

    let report = monitor.reconcile_once().await;
    assert_eq!(report.checked, 0);
    assert_eq!(source.polls.load(Ordering::SeqCst), 0);

    // Pointing the monitor at another type only considers jobs with progress
    let sync_monitor = DownloadMonitor::new(queue.clone(), source.clone(), Duration::from_secs(60))
        .with_job_type(JobType::MetadataSync);
    assert_eq!(sync_monitor.reconcile_once().await.checked, 0);
    queue.stop().await;
}

#[tokio::test]
async fn test_run_loop_reconciles_until_cancelled() {
    let queue = started_queue().await;
    let source = ScriptedSource::default();
    let id = completed_download(&queue, 99).await;
    source.set(id, ProgressUpdate::completed(Some(1_000)));

    let token = CancellationToken::new();
    let handle = DownloadMonitor::new(queue.clone(), source.clone(), Duration::from_millis(10))
        .spawn(token.clone());

    let mut finished = false;
    for _ in 0..200 {
        let job = queue.get_job(id).await.unwrap();
        if progress_of(&job).map(|p| p.state) == Some(ProgressState::Completed) {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(finished);

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("monitor did not stop after cancellation")
        .unwrap();
    queue.stop().await;
}

#[tokio::test]
async fn test_batch_limit_counts_only_in_flight_downloads() {
    let queue = started_queue().await;
    let source = ScriptedSource::default();
    let monitor = DownloadMonitor::new(queue.clone(), source.clone(), Duration::from_secs(60))
        .with_batch_limit(3);

    let oldest = completed_download(&queue, 1).await;
    for album_id in 2..=4 {
        let id = completed_download(&queue, album_id).await;
        source.set(id, ProgressUpdate::completed(Some(10)));
    }

    // Newest three fill the first pass and settle
    let report = monitor.reconcile_once().await;
    assert_eq!(report.checked, 3);
    assert_eq!(report.finished, 3);

    // Settled downloads no longer take up the batch
    source.set(oldest, ProgressUpdate::downloading(5, Some(10)));
    let report = monitor.reconcile_once().await;
    assert_eq!(report.checked, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(
        progress_of(&queue.get_job(oldest).await.unwrap()).unwrap().state,
        ProgressState::Downloading
    );
    queue.stop().await;
}

#[tokio::test]
async fn test_purge_keeps_downloads_still_in_flight() {
    let queue = started_queue().await;
    let source = ScriptedSource::default();
    let monitor = DownloadMonitor::new(queue.clone(), source.clone(), Duration::from_secs(60));

    let settled = completed_download(&queue, 1).await;
    let in_flight = completed_download(&queue, 2).await;
    source.set(settled, ProgressUpdate::completed(Some(10)));
    assert_eq!(monitor.reconcile_once().await.finished, 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queue.purge_finished(Duration::from_millis(1)).await, 1);
    assert!(queue.get_job(settled).await.is_none());
    assert!(queue.get_job(in_flight).await.is_some());

    // The monitor keeps following the survivor to the end
    source.set(in_flight, ProgressUpdate::completed(Some(20)));
    assert_eq!(monitor.reconcile_once().await.finished, 1);
    assert_eq!(queue.purge_finished(Duration::from_millis(1)).await, 1);
    assert!(queue.get_job(in_flight).await.is_none());
    queue.stop().await;
}
