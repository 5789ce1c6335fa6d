//! [`JobStore`] persisted as a single JSON file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{JobStore, MemoryStore, StoreError};
use crate::state_machine::{Job, JobStatus, JobUpdate};

/// [`MemoryStore`] backed by a JSON file holding every record.
///
/// Mutations are written out before they return; the file is replaced via a
/// temporary sibling so a crash mid-write leaves the previous contents intact.
/// A mutation whose write fails is undone in memory as well, so the records
/// served never run ahead of the file.
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing records if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let jobs: Vec<Job> = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), jobs = jobs.len(), "opened job store");
        Ok(Self {
            path,
            inner: MemoryStore::with_jobs(jobs),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Callers hold `write_lock` across the in-memory change and this write.
    async fn flush(&self) -> Result<(), StoreError> {
        let jobs = self.inner.snapshot().await;
        let bytes = serde_json::to_vec_pretty(&jobs)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), jobs = jobs.len(), "job store flushed");
        Ok(())
    }
}

#[async_trait]
impl JobStore for JsonFileStore {
    async fn insert(&self, job: Job) -> Result<Job, StoreError> {
        let _guard = self.write_lock.lock().await;
        let job = self.inner.insert(job).await?;
        if let Err(e) = self.flush().await {
            warn!(job_id = %job.id, error = %e, "write failed, insert rolled back");
            self.inner.delete(job.id).await?;
            return Err(e);
        }
        Ok(job)
    }

    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<Job, StoreError> {
        let _guard = self.write_lock.lock().await;
        let previous = self.inner.get(id).await?.ok_or(StoreError::NotFound(id))?;
        let job = self.inner.update(id, update).await?;
        if let Err(e) = self.flush().await {
            warn!(job_id = %id, error = %e, "write failed, update rolled back");
            self.inner.restore(previous).await;
            return Err(e);
        }
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        self.inner.get(id).await
    }

    async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError> {
        self.inner.list_by_status(statuses).await
    }

    async fn list_all(&self) -> Result<Vec<Job>, StoreError> {
        self.inner.list_all().await
    }

    async fn find_chapters(&self, episode_id: &str) -> Result<Option<Job>, StoreError> {
        self.inner.find_chapters(episode_id).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let Some(previous) = self.inner.get(id).await? else {
            return Ok(false);
        };
        self.inner.delete(id).await?;
        if let Err(e) = self.flush().await {
            warn!(job_id = %id, error = %e, "write failed, delete rolled back");
            self.inner.restore(previous).await;
            return Err(e);
        }
        Ok(true)
    }
}
