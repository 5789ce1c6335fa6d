use thiserror::Error;

use crate::materialize::MaterializeError;
use crate::remote::RemoteError;
use crate::state_machine::TransitionError;
use crate::store::StoreError;
use crate::upload::UploadError;

/// Errors surfaced by the pipeline's public entry points.
///
/// Item-level remote and upload failures are normally persisted on the job
/// instead; these variants reach callers only from constructors and from
/// store failures that make persisting impossible.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Materialize error: {0}")]
    Materialize(#[from] MaterializeError),

    #[error("State machine error: {0}")]
    Transition(#[from] TransitionError),
}
