//! Job lifecycle transitions.
//!
//! Every status change goes through [`StateMachine::next`], which turns an
//! [`Event`] into a [`JobUpdate`] or rejects it. Nothing else writes `status`.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::job::{FailureKind, Job, JobStatus, JobUpdate};

/// Message persisted when the remote service reports a job as neither
/// processing nor completed.
pub const SERVER_FAILURE_MESSAGE: &str = "Processing failed on server";

/// Something that happened to a job during submission or a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The target is already remotely reachable; nothing to host.
    UploadNotRequired,
    UploadSucceeded { url: String },
    UploadFailed { message: String },
    /// The remote service returned (or already had) a job id for the target.
    Registered { job_id: String },
    /// Registration failed on every attempt.
    RegistrationFailed { message: String },
    MaterializationFailed { message: String },
    PollCompleted { result_ref: Option<String> },
    /// The remote service is still working on the job.
    PollStillProcessing,
    /// The remote service reports the job as neither processing nor completed.
    PollFailedOnServer,
    /// The status check itself failed on every attempt.
    PollTransportFailed { message: String },
    /// The lifecycle retry cap was reached for a retryable error.
    Abandoned { attempts: u32 },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::UploadNotRequired => write!(f, "UPLOAD_NOT_REQUIRED"),
            Event::UploadSucceeded { .. } => write!(f, "UPLOAD_SUCCEEDED"),
            Event::UploadFailed { .. } => write!(f, "UPLOAD_FAILED"),
            Event::Registered { .. } => write!(f, "REGISTERED"),
            Event::RegistrationFailed { .. } => write!(f, "REGISTRATION_FAILED"),
            Event::MaterializationFailed { .. } => write!(f, "MATERIALIZATION_FAILED"),
            Event::PollCompleted { .. } => write!(f, "POLL_COMPLETED"),
            Event::PollStillProcessing => write!(f, "POLL_STILL_PROCESSING"),
            Event::PollFailedOnServer => write!(f, "POLL_FAILED_ON_SERVER"),
            Event::PollTransportFailed { .. } => write!(f, "POLL_TRANSPORT_FAILED"),
            Event::Abandoned { .. } => write!(f, "ABANDONED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition: {event} while {from}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub event: String,
}

/// The job lifecycle transition table.
pub struct StateMachine;

impl StateMachine {
    /// Compute the patch that moves `job` through `event`, stamped with the
    /// current time.
    pub fn next(job: &Job, event: Event) -> Result<JobUpdate, TransitionError> {
        Self::next_at(job, event, Utc::now())
    }

    /// Same as [`StateMachine::next`] with an explicit timestamp.
    ///
    /// - `Success` accepts nothing.
    /// - Upload and registration events apply to `Queued`, `Uploaded` and `Error`.
    /// - Poll events apply only to `Processing`.
    pub fn next_at(
        job: &Job,
        event: Event,
        now: DateTime<Utc>,
    ) -> Result<JobUpdate, TransitionError> {
        use JobStatus::*;

        let illegal = |event: &Event| TransitionError {
            from: job.status,
            event: event.to_string(),
        };
        let base = JobUpdate::default().touched(now);

        let update = match (&event, job.status) {
            (Event::UploadNotRequired, Queued) => base.status(Uploaded),

            (Event::UploadSucceeded { url }, Queued | Uploaded | Error) => {
                let mut update = base.status(Uploaded).clear_error();
                update.target = Some(url.clone());
                update.source_path = Some(None);
                update
            }

            (Event::UploadFailed { message }, Queued | Uploaded | Error) => base
                .status(Error)
                .error(FailureKind::Upload, message.clone())
                .attempted(job),

            (Event::Registered { job_id }, Queued | Uploaded | Error) => {
                let mut update = base.status(Processing).clear_error().attempted(job);
                update.reference_id = Some(Some(job_id.clone()));
                update
            }

            (Event::RegistrationFailed { message }, Queued | Uploaded | Error) => base
                .status(Error)
                .error(FailureKind::Transport, message.clone())
                .attempted(job),

            (Event::MaterializationFailed { message }, Queued) => base
                .status(Error)
                .error(FailureKind::Materialization, message.clone()),

            (Event::PollCompleted { result_ref }, Processing) => {
                let mut update = base.status(Success).clear_error();
                update.result_ref = Some(result_ref.clone());
                update
            }

            (Event::PollStillProcessing, Processing) => base.clear_error(),

            (Event::PollFailedOnServer, Processing) => base
                .status(Error)
                .error(FailureKind::Server, SERVER_FAILURE_MESSAGE),

            // Status is left alone so the next tick polls again.
            (Event::PollTransportFailed { message }, Processing) => {
                let mut update = base;
                update.error_message = Some(Some(message.clone()));
                update
            }

            (Event::Abandoned { attempts }, Error) if !job.is_terminal() => {
                let message = match &job.error_message {
                    Some(last) => format!("Gave up after {attempts} attempts: {last}"),
                    None => format!("Gave up after {attempts} attempts"),
                };
                base.error(FailureKind::Abandoned, message)
            }

            _ => return Err(illegal(&event)),
        };

        Ok(update)
    }
}

impl JobUpdate {
    fn attempted(mut self, job: &Job) -> Self {
        self.lifecycle_attempts = Some(job.lifecycle_attempts.saturating_add(1));
        self
    }
}
