//! Hosting of local payloads before registration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid upload response: {0}")]
    InvalidResponse(String),

    #[error("invalid blob storage URL: {0}")]
    InvalidUrl(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Uploads a local file and returns a stable URL for it. Fails closed; there
/// is no partial-upload recovery.
#[async_trait]
pub trait BlobUploader: Send + Sync {
    async fn upload(&self, local_path: &Path) -> Result<String, UploadError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// `PUT {base}/blobs/{key}` with the raw file body; the server answers
/// `{"url": "..."}`.
pub struct HttpBlobUploader {
    api_key: String,
    client: Client,
    base_url: Url,
}

impl HttpBlobUploader {
    pub fn new(base_url: String, api_key: String) -> Result<Self, UploadError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()?;
        let base_url = Url::parse(&base_url)
            .map_err(|e| UploadError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(UploadError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            api_key,
            client,
            base_url,
        })
    }

    fn blob_key(local_path: &Path) -> String {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("payload");
        format!("{}-{name}", Uuid::new_v4())
    }

    fn blob_url(&self, key: &str) -> Result<Url, UploadError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| UploadError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["blobs", key]);
        Ok(url)
    }
}

#[async_trait]
impl BlobUploader for HttpBlobUploader {
    async fn upload(&self, local_path: &Path) -> Result<String, UploadError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|source| UploadError::Read {
                path: local_path.to_path_buf(),
                source,
            })?;
        let size = bytes.len();

        let url = self.blob_url(&Self::blob_key(local_path))?;
        let mut req = self.client.put(url).body(bytes);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: UploadResponse = response.json().await?;
        if body.url.is_empty() {
            return Err(UploadError::InvalidResponse("empty url".into()));
        }
        info!(path = %local_path.display(), bytes = size, url = %body.url, "payload uploaded");
        Ok(body.url)
    }
}
