//! The persisted job record and its field-level patch type.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a job ended up in `Error`.
///
/// `Transport` and `Upload` failures are picked up again by the next tick;
/// everything else is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network/timeout failure on a remote call, retries exhausted.
    Transport,
    /// Blob upload failed before registration.
    Upload,
    /// The remote service reported the job as failed.
    Server,
    /// Inline text could not be written to a local file.
    Materialization,
    /// The lifecycle retry cap was reached.
    Abandoned,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Transport | FailureKind::Upload)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transport => write!(f, "transport"),
            FailureKind::Upload => write!(f, "upload"),
            FailureKind::Server => write!(f, "server"),
            FailureKind::Materialization => write!(f, "materialization"),
            FailureKind::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Lifecycle status of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Recorded, payload not hosted yet.
    Queued,
    /// Reachable by URL; waiting for registration.
    Uploaded,
    /// Registered; the remote service is working on it.
    Processing,
    /// The remote service finished. Terminal.
    Success,
    /// See [`FailureKind`] for whether it is retried.
    Error,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Uploaded => write!(f, "uploaded"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "uploaded" => Ok(JobStatus::Uploaded),
            "processing" => Ok(JobStatus::Processing),
            "success" => Ok(JobStatus::Success),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// What a job's target refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Image,
    Video,
    LocalFile,
    /// Already public; registered as is.
    ExternalUrl,
    /// Inline text, written to a file and uploaded.
    Text,
}

impl TargetType {
    /// Whether the target is a local payload that must be hosted before
    /// registration. Text counts once it has been written to a file.
    pub fn requires_upload(self, materialized: bool) -> bool {
        match self {
            TargetType::Image | TargetType::Video | TargetType::LocalFile => true,
            TargetType::Text => materialized,
            TargetType::ExternalUrl => false,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::Image => write!(f, "image"),
            TargetType::Video => write!(f, "video"),
            TargetType::LocalFile => write!(f, "local_file"),
            TargetType::ExternalUrl => write!(f, "external_url"),
            TargetType::Text => write!(f, "text"),
        }
    }
}

/// Which pipeline a job belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// A user-submitted item keyed by its target.
    ContentItem,
    /// Chapter extraction for a podcast episode, keyed by episode id.
    EpisodeChapters { episode_id: String },
}

/// One tracked target submitted for remote processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub target: String,
    pub target_type: TargetType,
    /// Local payload still waiting to be uploaded. Cleared once the blob
    /// uploader has returned a URL for it.
    pub source_path: Option<PathBuf>,
    pub status: JobStatus,
    /// Job id assigned by the remote service at registration.
    pub reference_id: Option<String>,
    /// Where the remote service put the result, when it says.
    pub result_ref: Option<String>,
    /// Last failure, shown to the user. Cleared on success.
    pub error_message: Option<String>,
    pub failure: Option<FailureKind>,
    /// Number of registration sequences started for this job across ticks.
    pub lifecycle_attempts: u32,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Display and processing order.
    pub order: i64,
}

impl Job {
    pub fn new(kind: JobKind, target: String, target_type: TargetType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            target,
            target_type,
            source_path: None,
            status: JobStatus::Queued,
            reference_id: None,
            result_ref: None,
            error_message: None,
            failure: None,
            lifecycle_attempts: 0,
            last_processed_at: None,
            created_at: now,
            order: now.timestamp_millis(),
        }
    }

    /// A content item for the given target. Local payload types remember their
    /// path so the upload can be (re)attempted.
    pub fn content_item(target: String, target_type: TargetType) -> Self {
        let mut job = Self::new(JobKind::ContentItem, target, target_type);
        if target_type.requires_upload(false) {
            job.source_path = Some(PathBuf::from(&job.target));
        }
        job
    }

    pub fn episode_chapters(episode_id: String, audio_url: String) -> Self {
        Self::new(
            JobKind::EpisodeChapters { episode_id },
            audio_url,
            TargetType::ExternalUrl,
        )
    }

    /// Identity used for deduplication and existence checks.
    pub fn identity(&self) -> &str {
        match &self.kind {
            JobKind::ContentItem => &self.target,
            JobKind::EpisodeChapters { episode_id } => episode_id,
        }
    }

    pub fn pending_upload(&self) -> bool {
        self.source_path.is_some()
    }

    /// `Success`, or an `Error` the scheduler will not retry.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            JobStatus::Success => true,
            JobStatus::Error => !self.failure.is_some_and(FailureKind::is_retryable),
            _ => false,
        }
    }
}

/// A per-field patch applied by the store. Unset fields keep whatever the
/// stored record currently holds, so concurrent writers touching different
/// fields do not clobber each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub target: Option<String>,
    pub source_path: Option<Option<PathBuf>>,
    pub reference_id: Option<Option<String>>,
    pub result_ref: Option<Option<String>>,
    pub error_message: Option<Option<String>>,
    pub failure: Option<Option<FailureKind>>,
    pub lifecycle_attempts: Option<u32>,
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn error(mut self, kind: FailureKind, message: impl Into<String>) -> Self {
        self.failure = Some(Some(kind));
        self.error_message = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.failure = Some(None);
        self.error_message = Some(None);
        self
    }

    pub fn touched(mut self, at: DateTime<Utc>) -> Self {
        self.last_processed_at = Some(at);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == JobUpdate::default()
    }

    pub fn apply_to(&self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(target) = &self.target {
            job.target = target.clone();
        }
        if let Some(source_path) = &self.source_path {
            job.source_path = source_path.clone();
        }
        if let Some(reference_id) = &self.reference_id {
            job.reference_id = reference_id.clone();
        }
        if let Some(result_ref) = &self.result_ref {
            job.result_ref = result_ref.clone();
        }
        if let Some(error_message) = &self.error_message {
            job.error_message = error_message.clone();
        }
        if let Some(failure) = self.failure {
            job.failure = failure;
        }
        if let Some(attempts) = self.lifecycle_attempts {
            job.lifecycle_attempts = attempts;
        }
        if let Some(at) = self.last_processed_at {
            job.last_processed_at = Some(at);
        }
    }
}
