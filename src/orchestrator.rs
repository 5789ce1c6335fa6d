//! The two-phase pipeline run and the scheduler that drives it.
//!
//! Each run first pushes pending jobs towards registration (uploading local
//! payloads where needed), then polls the jobs the remote service is working
//! on. A job is visited by at most one phase per run.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::dedup::DedupGuard;
use crate::error::RelayError;
use crate::materialize::TextMaterializer;
use crate::remote::{HttpProcessingClient, ProcessingApi, TargetDescriptor};
use crate::retry::RetryPolicy;
use crate::state_machine::{Event, Job, JobKind, JobStatus, JobUpdate, StateMachine, TargetType};
use crate::store::{JobStore, JsonFileStore};
use crate::upload::{BlobUploader, HttpBlobUploader};

/// Counts from one `run_once`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Jobs visited by the submit-or-retry phase.
    pub attempted: usize,
    /// Jobs that moved to `Processing` during the submit-or-retry phase.
    pub registered: usize,
    /// Jobs visited by the poll phase.
    pub polled: usize,
    /// Jobs the remote service reported as completed.
    pub completed: usize,
    /// Jobs that ended this run in `Error`.
    pub failed: usize,
}

/// Drives jobs through registration and completion polling.
///
/// One instance owns the in-flight flag and the chapter dedup guard; build it
/// once and share it behind an `Arc`.
pub struct JobOrchestrator {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) remote: Arc<dyn ProcessingApi>,
    pub(crate) uploader: Arc<dyn BlobUploader>,
    pub(crate) materializer: TextMaterializer,
    pub(crate) retry: RetryPolicy,
    pub(crate) guard: DedupGuard,
    /// Cap on registration sequences per job across ticks. `None` retries
    /// retryable errors on every tick forever.
    max_lifecycle_attempts: Option<u32>,
    in_flight: AtomicBool,
    stop_tx: watch::Sender<bool>,
    /// `Queued` records created before this instant were left behind by an
    /// earlier process and are resumed by the submit-or-retry phase.
    started_at: DateTime<Utc>,
}

/// Clears the in-flight flag when a run ends, including by panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        remote: Arc<dyn ProcessingApi>,
        uploader: Arc<dyn BlobUploader>,
        materializer: TextMaterializer,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            store,
            remote,
            uploader,
            materializer,
            retry: RetryPolicy::default(),
            guard: DedupGuard::default(),
            max_lifecycle_attempts: None,
            in_flight: AtomicBool::new(false),
            stop_tx,
            started_at: Utc::now(),
        }
    }

    /// Wire the HTTP client, blob uploader and JSON file store from config.
    pub async fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        let store = JsonFileStore::open(&config.store_path).await?;
        let remote = HttpProcessingClient::new(config.api_base_url.clone(), config.api_key.clone())?;
        let uploader =
            HttpBlobUploader::new(config.upload_base_url().to_string(), config.api_key.clone())?;

        Ok(Self::new(
            Arc::new(store),
            Arc::new(remote),
            Arc::new(uploader),
            TextMaterializer::new(&config.materialize_dir),
        )
        .with_retry_policy(config.retry_policy())
        .with_dedup_ttl(config.dedup_ttl())
        .with_max_lifecycle_attempts(config.max_lifecycle_attempts))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dedup_ttl(mut self, ttl: Duration) -> Self {
        self.guard = DedupGuard::new(ttl);
        self
    }

    pub fn with_max_lifecycle_attempts(mut self, max: Option<u32>) -> Self {
        self.max_lifecycle_attempts = max;
        self
    }

    /// Read access for observers.
    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one immediately, then every `interval` until [`stop`](Self::stop).
    ///
    /// Ticks that come due while a run is still executing are dropped.
    pub fn start(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        self.stop_tx.send_replace(false);
        let mut stop_rx = self.stop_tx.subscribe();
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = interval.as_secs(), "scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = stop_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                if *stop_rx.borrow() {
                    break;
                }
                if let Some(summary) = this.run_once().await {
                    info!(?summary, "tick finished");
                }
            }
            info!("scheduler stopped");
        })
    }

    /// Prevent further ticks. A run already in progress finishes normally.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Run once in the background and hand the result to `on_done`.
    /// `on_done` receives `None` if another run was already in flight.
    pub fn refresh<F>(self: &Arc<Self>, on_done: F) -> JoinHandle<()>
    where
        F: FnOnce(Option<RunSummary>) + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let summary = this.run_once().await;
            on_done(summary);
        })
    }

    /// Submit-or-retry every `Uploaded`/retryable `Error` job, then poll every
    /// `Processing` job the first phase did not touch. Returns `None` without touching anything when a run
    /// is already in flight.
    pub async fn run_once(&self) -> Option<RunSummary> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("run already in flight, dropping tick");
            return None;
        }
        let _in_flight = InFlight(&self.in_flight);

        let evicted = self.guard.evict_expired(Utc::now());
        if evicted > 0 {
            debug!(evicted, "expired dedup entries dropped");
        }

        let mut summary = RunSummary::default();
        let visited = self.submit_phase(&mut summary).await;
        self.poll_phase(&mut summary, &visited).await;
        Some(summary)
    }

    /// Returns the ids of the jobs it visited so the poll phase can leave
    /// them alone until the next run.
    async fn submit_phase(&self, summary: &mut RunSummary) -> HashSet<Uuid> {
        let mut visited = HashSet::new();
        let candidates = match self
            .store
            .list_by_status(&[JobStatus::Queued, JobStatus::Uploaded, JobStatus::Error])
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "failed to list jobs for submission");
                return visited;
            }
        };

        for job in candidates.into_iter().filter(|job| self.is_submit_candidate(job)) {
            let guarded = match &job.kind {
                JobKind::EpisodeChapters { episode_id } => {
                    if self.guard.should_skip(episode_id) {
                        continue;
                    }
                    Some(episode_id.clone())
                }
                JobKind::ContentItem => None,
            };
            summary.attempted += 1;
            let id = job.id;
            visited.insert(id);

            let result = match self.max_lifecycle_attempts {
                Some(max) if job.status == JobStatus::Error && job.lifecycle_attempts >= max => {
                    self.abandon(job).await
                }
                _ if job.status == JobStatus::Queued => self.resume_queued(job).await,
                _ => self.advance_registration(job).await,
            };

            match result {
                Ok(job) if job.status == JobStatus::Processing => summary.registered += 1,
                Ok(job) if job.status == JobStatus::Error => summary.failed += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(job_id = %id, error = %e, "submission step failed");
                    if let Some(episode_id) = guarded {
                        self.guard.clear(&episode_id);
                    }
                }
            }
        }
        visited
    }

    /// `Uploaded` and retryable `Error` jobs, plus `Queued` jobs an earlier
    /// process left mid-submission.
    fn is_submit_candidate(&self, job: &Job) -> bool {
        match job.status {
            JobStatus::Queued => job.created_at < self.started_at,
            _ => !job.is_terminal(),
        }
    }

    async fn poll_phase(&self, summary: &mut RunSummary, visited: &HashSet<Uuid>) {
        let candidates = match self.store.list_by_status(&[JobStatus::Processing]).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "failed to list jobs for polling");
                return;
            }
        };

        for job in candidates {
            let id = job.id;
            if visited.contains(&id) {
                debug!(job_id = %id, "registered this run, polling next run");
                continue;
            }
            let Some(reference_id) = job.reference_id.clone() else {
                warn!(job_id = %id, "processing job has no reference id, skipping");
                continue;
            };
            summary.polled += 1;

            match self.poll(job, &reference_id).await {
                Ok(job) if job.status == JobStatus::Success => summary.completed += 1,
                Ok(job) if job.status == JobStatus::Error => summary.failed += 1,
                Ok(_) => {}
                Err(e) => error!(job_id = %id, error = %e, "poll step failed"),
            }
        }
    }

    /// Upload if the payload is still local, then register. Used by both the
    /// submission path and the submit-or-retry phase.
    pub(crate) async fn advance_registration(&self, job: Job) -> Result<Job, RelayError> {
        let job = if job.pending_upload() {
            let job = self.upload(job).await?;
            if job.status != JobStatus::Uploaded {
                return Ok(job);
            }
            job
        } else {
            job
        };
        self.register(job).await
    }

    /// Pick up a record that never left `Queued`. Inline text whose file was
    /// never written is materialized again first.
    async fn resume_queued(&self, job: Job) -> Result<Job, RelayError> {
        info!(job_id = %job.id, identity = job.identity(), "resuming interrupted submission");

        let job = if job.target_type == TargetType::Text && job.source_path.is_none() {
            match self.materializer.materialize(job.id, &job.target).await {
                Ok(path) => {
                    let update = JobUpdate {
                        source_path: Some(Some(path)),
                        ..Default::default()
                    };
                    self.store.update(job.id, update).await?
                }
                Err(e) => {
                    let message = e.to_string();
                    return self.apply(&job, Event::MaterializationFailed { message }).await;
                }
            }
        } else {
            job
        };

        let job = if job.pending_upload() {
            job
        } else {
            self.apply(&job, Event::UploadNotRequired).await?
        };
        self.advance_registration(job).await
    }

    /// One upload attempt. Failure is persisted and is picked up again by the
    /// next tick.
    pub(crate) async fn upload(&self, job: Job) -> Result<Job, RelayError> {
        let Some(path) = job.source_path.clone() else {
            return Ok(job);
        };

        match self.uploader.upload(&path).await {
            Ok(url) => self.apply(&job, Event::UploadSucceeded { url }).await,
            Err(e) => {
                warn!(job_id = %job.id, path = %path.display(), error = %e, "upload failed");
                let message = format!("Upload failed: {e}");
                let job = self.apply(&job, Event::UploadFailed { message }).await?;
                self.release_guard(&job);
                Ok(job)
            }
        }
    }

    pub(crate) async fn register(&self, job: Job) -> Result<Job, RelayError> {
        let descriptor = TargetDescriptor::from(&job);
        let remote: &dyn ProcessingApi = self.remote.as_ref();
        let target = &descriptor;

        let outcome = match job.kind {
            JobKind::ContentItem => {
                self.retry
                    .run("register_job", move || remote.register_job(target))
                    .await
            }
            JobKind::EpisodeChapters { .. } => {
                self.retry
                    .run("register_chapters", move || async move {
                        match remote.check_job_exists(target).await? {
                            Some(existing) => {
                                debug!(job_id = %existing, "remote job already exists");
                                Ok(existing)
                            }
                            None => remote.register_job(target).await,
                        }
                    })
                    .await
            }
        };

        match outcome {
            Ok(job_id) => self.apply(&job, Event::Registered { job_id }).await,
            Err(exhausted) => {
                error!(
                    job_id = %job.id,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "registration failed"
                );
                let message = format!(
                    "Registration failed after {} attempts: {}",
                    exhausted.attempts, exhausted.last_error
                );
                let job = self
                    .apply(&job, Event::RegistrationFailed { message })
                    .await?;
                self.release_guard(&job);
                Ok(job)
            }
        }
    }

    async fn poll(&self, job: Job, reference_id: &str) -> Result<Job, RelayError> {
        let remote: &dyn ProcessingApi = self.remote.as_ref();
        let outcome = self
            .retry
            .run("check_job_status", move || remote.check_job_status(reference_id))
            .await;

        let event = match outcome {
            Ok(status) if status.completed => Event::PollCompleted {
                result_ref: status.result_ref,
            },
            Ok(status) if status.processing => Event::PollStillProcessing,
            Ok(_) => Event::PollFailedOnServer,
            Err(exhausted) => {
                error!(
                    job_id = %job.id,
                    reference_id,
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "status check failed"
                );
                Event::PollTransportFailed {
                    message: format!(
                        "Status check failed after {} attempts: {}",
                        exhausted.attempts, exhausted.last_error
                    ),
                }
            }
        };

        let job = self.apply(&job, event).await?;
        if job.is_terminal() {
            self.release_guard(&job);
        }
        Ok(job)
    }

    async fn abandon(&self, job: Job) -> Result<Job, RelayError> {
        warn!(
            job_id = %job.id,
            attempts = job.lifecycle_attempts,
            "lifecycle retry cap reached, giving up"
        );
        let attempts = job.lifecycle_attempts;
        let job = self.apply(&job, Event::Abandoned { attempts }).await?;
        self.release_guard(&job);
        Ok(job)
    }

    /// Run `event` through the state machine and persist the resulting patch.
    pub(crate) async fn apply(&self, job: &Job, event: Event) -> Result<Job, RelayError> {
        let label = event.to_string();
        let update = StateMachine::next(job, event)?;
        let updated = self.store.update(job.id, update).await?;

        if updated.status != job.status {
            info!(
                job_id = %job.id,
                identity = job.identity(),
                event = %label,
                from = %job.status,
                to = %updated.status,
                "job transition"
            );
        } else {
            debug!(job_id = %job.id, event = %label, status = %updated.status, "job updated");
        }
        Ok(updated)
    }

    /// Chapter jobs hold a dedup entry while their sequence is outstanding.
    fn release_guard(&self, job: &Job) {
        if let JobKind::EpisodeChapters { episode_id } = &job.kind {
            self.guard.clear(episode_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{RemoteError, StatusResponse};
    use crate::state_machine::{FailureKind, TargetType};
    use crate::store::MemoryStore;
    use crate::upload::UploadError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct MockApi {
        register: Mutex<VecDeque<Result<String, u16>>>,
        status: Mutex<VecDeque<Result<StatusResponse, u16>>>,
        register_calls: AtomicU32,
        status_calls: AtomicU32,
        // When set, register_job signals `entered` and waits for `release`.
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl MockApi {
        fn registers(self, results: Vec<Result<&str, u16>>) -> Self {
            *self.register.lock().unwrap() = results
                .into_iter()
                .map(|r| r.map(str::to_string))
                .collect();
            self
        }

        fn statuses(self, results: Vec<Result<StatusResponse, u16>>) -> Self {
            *self.status.lock().unwrap() = results.into_iter().collect();
            self
        }
    }

    fn api_error(status: u16) -> RemoteError {
        RemoteError::ApiError {
            status,
            message: "mock error".into(),
        }
    }

    fn status(processing: bool, completed: bool) -> StatusResponse {
        StatusResponse {
            processing,
            completed,
            result_ref: completed.then(|| "graph/1".to_string()),
        }
    }

    #[async_trait]
    impl ProcessingApi for MockApi {
        async fn register_job(&self, _target: &TargetDescriptor) -> Result<String, RemoteError> {
            self.register_calls.fetch_add(1, Ordering::SeqCst);
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            let next = self.register.lock().unwrap().pop_front();
            next.unwrap_or(Ok("job-default".into())).map_err(api_error)
        }

        async fn check_job_exists(
            &self,
            _target: &TargetDescriptor,
        ) -> Result<Option<String>, RemoteError> {
            Ok(None)
        }

        async fn check_job_status(&self, _job_id: &str) -> Result<StatusResponse, RemoteError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.status.lock().unwrap().pop_front();
            next.unwrap_or(Ok(status(true, false))).map_err(api_error)
        }
    }

    #[derive(Default)]
    struct MockUploader {
        results: Mutex<VecDeque<Result<String, String>>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl BlobUploader for MockUploader {
        async fn upload(&self, local_path: &Path) -> Result<String, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.results.lock().unwrap().pop_front() {
                Some(Ok(url)) => Ok(url),
                Some(Err(message)) => Err(UploadError::InvalidResponse(message)),
                None => Ok(format!("https://blobs/{}", local_path.display())),
            }
        }
    }

    fn orchestrator(
        jobs: Vec<Job>,
        api: Arc<MockApi>,
        uploader: Arc<MockUploader>,
    ) -> (Arc<JobOrchestrator>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_jobs(jobs));
        let orch = JobOrchestrator::new(
            store.clone(),
            api,
            uploader,
            TextMaterializer::new(std::env::temp_dir()),
        )
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(10)));
        (Arc::new(orch), store)
    }

    fn job_in(status: JobStatus, reference_id: Option<&str>) -> Job {
        let mut job = Job::content_item("https://example.com/post".into(), TargetType::ExternalUrl);
        job.status = status;
        job.reference_id = reference_id.map(str::to_string);
        job
    }

    #[tokio::test(start_paused = true)]
    async fn uploaded_job_gets_registered() {
        let api = Arc::new(MockApi::default().registers(vec![Ok("abc")]));
        let job = job_in(JobStatus::Uploaded, None);
        let id = job.id;
        let (orch, store) = orchestrator(vec![job], api.clone(), Default::default());

        let summary = orch.run_once().await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.reference_id.as_deref(), Some("abc"));
        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.registered, 1);
        // Left for the next run's poll phase.
        assert_eq!(summary.polled, 0);
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 0);

        let summary = orch.run_once().await.unwrap();
        assert_eq!(summary.attempted, 0);
        assert_eq!(summary.polled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn phases_only_visit_their_own_statuses() {
        let api = Arc::new(MockApi::default());
        let jobs = vec![
            job_in(JobStatus::Processing, Some("p1")),
            job_in(JobStatus::Success, Some("s1")),
        ];
        let (orch, store) = orchestrator(jobs, api.clone(), Default::default());
        // Submitted through this instance and still being worked on.
        let mut submitting = job_in(JobStatus::Queued, None);
        submitting.created_at = Utc::now() + chrono::Duration::minutes(1);
        store.insert(submitting).await.unwrap();

        let summary = orch.run_once().await.unwrap();

        assert_eq!(summary.attempted, 0);
        assert_eq!(api.register_calls.load(Ordering::SeqCst), 0);
        assert_eq!(summary.polled, 1);
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_and_terminal_errors_are_never_touched() {
        let api = Arc::new(MockApi::default());
        let success = job_in(JobStatus::Success, Some("s1"));
        let mut server_failed = job_in(JobStatus::Error, Some("e1"));
        server_failed.failure = Some(FailureKind::Server);
        let before = vec![success.clone(), server_failed.clone()];
        let (orch, store) = orchestrator(before.clone(), api.clone(), Default::default());

        for _ in 0..3 {
            orch.run_once().await.unwrap();
        }

        assert_eq!(store.get(success.id).await.unwrap().unwrap(), success);
        assert_eq!(store.get(server_failed.id).await.unwrap().unwrap(), server_failed);
        assert_eq!(api.register_calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn overlapping_run_is_dropped() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let api = Arc::new(MockApi {
            gate: Some((entered.clone(), release.clone())),
            ..Default::default()
        });
        let (orch, _store) = orchestrator(
            vec![job_in(JobStatus::Uploaded, None)],
            api.clone(),
            Default::default(),
        );

        let first = tokio::spawn({
            let orch = orch.clone();
            async move { orch.run_once().await }
        });
        entered.notified().await;
        assert!(orch.is_running());

        assert!(orch.run_once().await.is_none());
        assert_eq!(api.register_calls.load(Ordering::SeqCst), 1);

        release.notify_one();
        let summary = first.await.unwrap().unwrap();
        assert_eq!(summary.registered, 1);
        assert!(!orch.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_failure_keeps_processing() {
        let api = Arc::new(MockApi::default().statuses(vec![Err(503), Err(503), Err(503)]));
        let job = job_in(JobStatus::Processing, Some("abc"));
        let id = job.id;
        let (orch, store) = orchestrator(vec![job], api.clone(), Default::default());

        orch.run_once().await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Status check failed after 3 attempts"));
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 3);

        // Next tick polls again and the queue is empty, so it is still processing.
        orch.run_once().await.unwrap();
        let job = store.get(id).await.unwrap().unwrap();
        assert!(job.error_message.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_upload_is_retried_by_next_tick() {
        let uploader = Arc::new(MockUploader::default());
        uploader
            .results
            .lock()
            .unwrap()
            .push_back(Ok("https://blobs/cat.png".into()));
        let api = Arc::new(MockApi::default().registers(vec![Ok("img-1")]));

        let mut job = Job::content_item("/tmp/cat.png".into(), TargetType::Image);
        job.status = JobStatus::Error;
        job.failure = Some(FailureKind::Upload);
        let id = job.id;
        let (orch, store) = orchestrator(vec![job], api.clone(), uploader.clone());

        orch.run_once().await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(job.target, "https://blobs/cat.png");
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.reference_id.as_deref(), Some("img-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_job_left_by_earlier_process_is_resumed() {
        let api = Arc::new(MockApi::default().registers(vec![Ok("late")]));
        let mut job = job_in(JobStatus::Queued, None);
        job.created_at = Utc::now() - chrono::Duration::hours(1);
        let id = job.id;
        let (orch, store) = orchestrator(vec![job], api.clone(), Default::default());

        let summary = orch.run_once().await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(summary.attempted, 1);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.reference_id.as_deref(), Some("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_text_is_materialized_again() {
        let dir = tempfile::TempDir::new().unwrap();
        let uploader = Arc::new(MockUploader::default());
        uploader
            .results
            .lock()
            .unwrap()
            .push_back(Ok("https://blobs/notes.txt".into()));
        let api = Arc::new(MockApi::default());

        let mut job = Job::content_item("some notes".into(), TargetType::Text);
        job.created_at = Utc::now() - chrono::Duration::hours(1);
        let id = job.id;
        let store = Arc::new(MemoryStore::with_jobs([job]));
        let orch = JobOrchestrator::new(
            store.clone(),
            api.clone(),
            uploader.clone(),
            TextMaterializer::new(dir.path()),
        );

        orch.run_once().await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.target, "https://blobs/notes.txt");
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
        let written = dir.path().join(format!("{id}.txt"));
        assert_eq!(std::fs::read_to_string(written).unwrap(), "some notes");
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_cap_only_applies_to_errors() {
        let api = Arc::new(MockApi::default());
        let mut job = job_in(JobStatus::Uploaded, None);
        job.lifecycle_attempts = 5;
        let id = job.id;
        let store = Arc::new(MemoryStore::with_jobs([job]));
        let orch = JobOrchestrator::new(
            store.clone(),
            api.clone(),
            Arc::new(MockUploader::default()),
            TextMaterializer::new(std::env::temp_dir()),
        )
        .with_max_lifecycle_attempts(Some(3));

        orch.run_once().await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(api.register_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_cap_abandons_job() {
        let api = Arc::new(MockApi::default());
        let mut job = job_in(JobStatus::Error, None);
        job.failure = Some(FailureKind::Transport);
        job.error_message = Some("Registration failed after 3 attempts".into());
        job.lifecycle_attempts = 4;
        let id = job.id;

        let store = Arc::new(MemoryStore::with_jobs([job]));
        let orch = JobOrchestrator::new(
            store.clone(),
            api.clone(),
            Arc::new(MockUploader::default()),
            TextMaterializer::new(std::env::temp_dir()),
        )
        .with_max_lifecycle_attempts(Some(4));

        let summary = orch.run_once().await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.failure, Some(FailureKind::Abandoned));
        assert!(job.is_terminal());
        assert_eq!(summary.failed, 1);
        assert_eq!(api.register_calls.load(Ordering::SeqCst), 0);

        // Terminal now, so the next run leaves it alone.
        let summary = orch.run_once().await.unwrap();
        assert_eq!(summary.attempted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_immediately_then_on_interval() {
        let api = Arc::new(MockApi::default());
        let (orch, _store) = orchestrator(
            vec![job_in(JobStatus::Processing, Some("abc"))],
            api.clone(),
            Default::default(),
        );

        let handle = orch.start(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 2);

        orch.stop();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_invokes_callback_with_summary() {
        let api = Arc::new(MockApi::default().statuses(vec![Ok(status(false, true))]));
        let (orch, _store) = orchestrator(
            vec![job_in(JobStatus::Processing, Some("abc"))],
            api,
            Default::default(),
        );

        let (tx, rx) = tokio::sync::oneshot::channel();
        orch.refresh(move |summary| {
            let _ = tx.send(summary);
        })
        .await
        .unwrap();

        let summary = rx.await.unwrap().unwrap();
        assert_eq!(summary.completed, 1);
    }
}
