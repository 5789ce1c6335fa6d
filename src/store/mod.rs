//! Durable job records.
//!
//! [`JobStore`] is the seam between the pipeline and whatever persists its
//! records. [`MemoryStore`] keeps them in process; [`JsonFileStore`] also
//! writes every mutation to a JSON file so a restart resumes from the last
//! persisted status.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::state_machine::{Job, JobStatus, JobUpdate};

/// Failure of a store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("job already exists: {0}")]
    Duplicate(Uuid),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Record store shared by the submission path, the orchestrator and readers.
///
/// Listing operations return records in display order (`order`, then
/// `created_at`), which is also the order the orchestrator visits them in.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Add a new record. Fails with [`StoreError::Duplicate`] if the id is
    /// already taken.
    async fn insert(&self, job: Job) -> Result<Job, StoreError>;

    /// Apply `update` field by field to the stored record and return the
    /// merged result. Fields the update leaves unset keep their stored value.
    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<Job, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Records whose status is any of `statuses`.
    async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError>;

    async fn list_all(&self) -> Result<Vec<Job>, StoreError>;

    /// Most recently created chapter-extraction record for `episode_id`.
    /// Content items are never returned, whatever their target.
    async fn find_chapters(&self, episode_id: &str) -> Result<Option<Job>, StoreError>;

    /// Remove a record; `false` if there was none.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

pub(crate) fn sort_for_display(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}
