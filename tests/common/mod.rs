#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jobrelay::materialize::TextMaterializer;
use jobrelay::remote::{ProcessingApi, RemoteError, StatusResponse, TargetDescriptor};
use jobrelay::retry::RetryPolicy;
use jobrelay::store::{JobStore, MemoryStore};
use jobrelay::upload::{BlobUploader, UploadError};
use jobrelay::JobOrchestrator;
use tempfile::TempDir;

/// Remote API answering from per-call queues. An empty queue answers with a
/// healthy default.
#[derive(Default)]
pub struct ScriptedApi {
    register: Mutex<VecDeque<Result<String, u16>>>,
    exists: Mutex<VecDeque<Option<String>>>,
    status: Mutex<VecDeque<Result<StatusResponse, u16>>>,
    pub register_calls: AtomicU32,
    pub exists_calls: AtomicU32,
    pub status_calls: AtomicU32,
    pub registered_targets: Mutex<Vec<TargetDescriptor>>,
}

impl ScriptedApi {
    pub fn push_register(&self, result: Result<&str, u16>) -> &Self {
        self.register
            .lock()
            .unwrap()
            .push_back(result.map(str::to_string));
        self
    }

    pub fn push_exists(&self, job_id: Option<&str>) -> &Self {
        self.exists
            .lock()
            .unwrap()
            .push_back(job_id.map(str::to_string));
        self
    }

    pub fn push_status(&self, result: Result<StatusResponse, u16>) -> &Self {
        self.status.lock().unwrap().push_back(result);
        self
    }

    pub fn registers(&self) -> u32 {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn exists_checks(&self) -> u32 {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }
}

fn api_error(status: u16) -> RemoteError {
    RemoteError::ApiError {
        status,
        message: "scripted failure".into(),
    }
}

pub fn remote_status(processing: bool, completed: bool) -> StatusResponse {
    StatusResponse {
        processing,
        completed,
        result_ref: None,
    }
}

#[async_trait]
impl ProcessingApi for ScriptedApi {
    async fn register_job(&self, target: &TargetDescriptor) -> Result<String, RemoteError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.registered_targets.lock().unwrap().push(target.clone());
        let next = self.register.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(format!("job-{}", target.identity)))
            .map_err(api_error)
    }

    async fn check_job_exists(
        &self,
        _target: &TargetDescriptor,
    ) -> Result<Option<String>, RemoteError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.exists.lock().unwrap().pop_front().flatten())
    }

    async fn check_job_status(&self, _job_id: &str) -> Result<StatusResponse, RemoteError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.status.lock().unwrap().pop_front();
        next.unwrap_or(Ok(remote_status(true, false)))
            .map_err(api_error)
    }
}

/// Uploader answering from a queue; an empty queue succeeds.
#[derive(Default)]
pub struct ScriptedUploader {
    results: Mutex<VecDeque<Result<String, String>>>,
    pub calls: AtomicU32,
}

impl ScriptedUploader {
    pub fn push(&self, result: Result<&str, &str>) -> &Self {
        self.results
            .lock()
            .unwrap()
            .push_back(result.map(str::to_string).map_err(str::to_string));
        self
    }

    pub fn uploads(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobUploader for ScriptedUploader {
    async fn upload(&self, local_path: &Path) -> Result<String, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.results.lock().unwrap().pop_front() {
            Some(Ok(url)) => Ok(url),
            Some(Err(message)) => Err(UploadError::Rejected {
                status: 500,
                message,
            }),
            None => {
                let name = local_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("payload");
                Ok(format!("https://blobs.test/{name}"))
            }
        }
    }
}

pub struct Harness {
    pub orchestrator: Arc<JobOrchestrator>,
    pub store: Arc<MemoryStore>,
    pub api: Arc<ScriptedApi>,
    pub uploader: Arc<ScriptedUploader>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        let dir = TempDir::new().unwrap();
        let api = Arc::new(ScriptedApi::default());
        let uploader = Arc::new(ScriptedUploader::default());
        let orchestrator = JobOrchestrator::new(
            store.clone(),
            api.clone(),
            uploader.clone(),
            TextMaterializer::new(dir.path().join("text")),
        )
        .with_retry_policy(RetryPolicy::default());
        Self {
            orchestrator: Arc::new(orchestrator),
            store,
            api,
            uploader,
            dir,
        }
    }

    pub async fn job(&self, id: uuid::Uuid) -> jobrelay::state_machine::Job {
        self.store.get(id).await.unwrap().expect("job exists")
    }
}

pub const TEST_INTERVAL: Duration = Duration::from_secs(3600);
