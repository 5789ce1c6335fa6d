//! Entry points invoked when a user adds a target.
//!
//! Both paths persist a record first and then make one opportunistic attempt
//! so a healthy target does not wait for the next tick. Whatever is not
//! finished is left for [`JobOrchestrator::run_once`].

use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::orchestrator::JobOrchestrator;
use crate::state_machine::{Event, Job, JobStatus, TargetType};

/// Result of [`JobOrchestrator::request_chapters`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChapterRequest {
    /// A sequence for this episode started less than one TTL ago.
    Skipped,
    /// The episode already has a record that is in flight or done.
    Existing(Job),
    /// A registration attempt was made; the record as persisted afterwards.
    Submitted(Job),
}

impl JobOrchestrator {
    /// Track a new content item and try to get it registered right away.
    ///
    /// The returned record is only a snapshot; observers should read the
    /// store. Remote and upload failures are persisted on the record rather
    /// than returned.
    pub async fn submit(&self, target: String, target_type: TargetType) -> Result<Job, RelayError> {
        let mut job = Job::content_item(target, target_type);
        info!(job_id = %job.id, %target_type, "content item submitted");

        if target_type == TargetType::Text {
            match self.materializer.materialize(job.id, &job.target).await {
                Ok(path) => job.source_path = Some(path),
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "text materialization failed");
                    let job = self.store.insert(job).await?;
                    let message = e.to_string();
                    return self
                        .apply(&job, Event::MaterializationFailed { message })
                        .await;
                }
            }
        }

        let job = self.store.insert(job).await?;
        let job = if job.pending_upload() {
            self.upload(job).await?
        } else {
            self.apply(&job, Event::UploadNotRequired).await?
        };

        if job.status != JobStatus::Uploaded {
            debug!(job_id = %job.id, status = %job.status, "not registering this cycle");
            return Ok(job);
        }
        self.register(job).await
    }

    /// Request chapter extraction for an episode.
    ///
    /// Guarded per episode: a second request within the dedup TTL is skipped
    /// without touching the store or the remote service. A record that never
    /// got registered is resumed instead of duplicated.
    pub async fn request_chapters(
        &self,
        episode_id: &str,
        audio_url: &str,
    ) -> Result<ChapterRequest, RelayError> {
        if self.guard.should_skip(episode_id) {
            return Ok(ChapterRequest::Skipped);
        }

        let result = self.start_chapters(episode_id, audio_url).await;
        if result.is_err() {
            self.guard.clear(episode_id);
        }
        result
    }

    async fn start_chapters(
        &self,
        episode_id: &str,
        audio_url: &str,
    ) -> Result<ChapterRequest, RelayError> {
        let job = match self.store.find_chapters(episode_id).await? {
            Some(job) if matches!(job.status, JobStatus::Processing | JobStatus::Success) => {
                if job.status == JobStatus::Success {
                    self.guard.clear(episode_id);
                }
                debug!(job_id = %job.id, episode_id, status = %job.status, "chapters already tracked");
                return Ok(ChapterRequest::Existing(job));
            }
            Some(job) if !job.is_terminal() => {
                debug!(job_id = %job.id, episode_id, status = %job.status, "resuming chapter request");
                job
            }
            _ => {
                let job = Job::episode_chapters(episode_id.to_string(), audio_url.to_string());
                info!(job_id = %job.id, episode_id, "chapter extraction requested");
                self.store.insert(job).await?
            }
        };

        // Leave `Queued` before the retry sequence; `Uploaded` is resumed by the
        // next tick.
        let job = if job.status == JobStatus::Queued {
            self.apply(&job, Event::UploadNotRequired).await?
        } else {
            job
        };
        self.register(job).await.map(ChapterRequest::Submitted)
    }
}
