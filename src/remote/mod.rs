pub mod client;
pub mod error;
pub mod types;

pub use client::HttpProcessingClient;
pub use error::RemoteError;
pub use types::{ExistsResponse, RegisterResponse, StatusResponse, TargetDescriptor};

use async_trait::async_trait;

/// The remote graph-processing backend. All three calls are idempotent.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Create (or locate) a job for `target` and return its id.
    async fn register_job(&self, target: &TargetDescriptor) -> Result<String, RemoteError>;

    /// Id of an existing job for `target`, if any.
    async fn check_job_exists(&self, target: &TargetDescriptor)
    -> Result<Option<String>, RemoteError>;

    async fn check_job_status(&self, job_id: &str) -> Result<StatusResponse, RemoteError>;
}
