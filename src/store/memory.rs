//! In-process [`JobStore`] used directly in tests and as the cache under the
//! file store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{JobStore, StoreError, sort_for_display};
use crate::state_machine::{Job, JobKind, JobStatus, JobUpdate};

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        Self {
            jobs: RwLock::new(jobs.into_iter().map(|job| (job.id, job)).collect()),
        }
    }

    /// Put `job` back exactly as given, replacing any record with its id.
    pub(crate) async fn restore(&self, job: Job) {
        self.jobs.write().await.insert(job.id, job);
    }

    pub(crate) async fn snapshot(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        sort_for_display(&mut jobs);
        jobs
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert(&self, job: Job) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        update.apply_to(job);
        Ok(job.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| statuses.contains(&job.status))
            .cloned()
            .collect();
        sort_for_display(&mut jobs);
        Ok(jobs)
    }

    async fn list_all(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.snapshot().await)
    }

    async fn find_chapters(&self, episode_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| {
                matches!(&job.kind, JobKind::EpisodeChapters { episode_id: id } if id == episode_id)
            })
            .max_by_key(|job| job.created_at)
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.jobs.write().await.remove(&id).is_some())
    }
}
