//! Request and response bodies for the processing API.

use serde::{Deserialize, Serialize};

use crate::state_machine::{Job, JobKind, TargetType};

/// What the remote service needs to know to create or locate a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    /// Stable identity of the target (episode id, or the target itself).
    pub identity: String,
    /// `content_item` or `episode_chapters`.
    pub pipeline: String,
    pub target_type: TargetType,
    /// URL or inline payload reference to process.
    pub target: String,
}

impl From<&Job> for TargetDescriptor {
    fn from(job: &Job) -> Self {
        let pipeline = match job.kind {
            JobKind::ContentItem => "content_item",
            JobKind::EpisodeChapters { .. } => "episode_chapters",
        };
        Self {
            identity: job.identity().to_string(),
            pipeline: pipeline.to_string(),
            target_type: job.target_type,
            target: job.target.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Remote view of a job. Neither `processing` nor `completed` means the
/// server gave up on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub processing: bool,
    pub completed: bool,
    #[serde(default)]
    pub result_ref: Option<String>,
}
