//! HTTP implementation of [`ProcessingApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use super::ProcessingApi;
use super::error::RemoteError;
use super::types::{ExistsResponse, RegisterResponse, StatusResponse, TargetDescriptor};

/// [`ProcessingApi`] over HTTP/JSON.
///
/// - `POST {base}/jobs` registers a target.
/// - `POST {base}/jobs/lookup` checks whether one already exists.
/// - `GET {base}/jobs/{id}/status` reports progress.
pub struct HttpProcessingClient {
    api_key: String,
    client: Client,
    base_url: Url,
}

impl HttpProcessingClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        let base_url = Url::parse(&base_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            api_key,
            client,
            base_url,
        })
    }

    /// `{base}/{segments...}`, each segment percent-encoded on its own.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, RemoteError> {
        let response = self.authorized(req).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(RemoteError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(RemoteError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<T>().await?;
        Ok(body)
    }
}

#[async_trait]
impl ProcessingApi for HttpProcessingClient {
    async fn register_job(&self, target: &TargetDescriptor) -> Result<String, RemoteError> {
        let url = self.endpoint(&["jobs"])?;
        let body: RegisterResponse = self.send(self.client.post(url).json(target)).await?;
        if body.job_id.is_empty() {
            return Err(RemoteError::InvalidResponse("empty job_id".into()));
        }
        Ok(body.job_id)
    }

    async fn check_job_exists(
        &self,
        target: &TargetDescriptor,
    ) -> Result<Option<String>, RemoteError> {
        let url = self.endpoint(&["jobs", "lookup"])?;
        let body: ExistsResponse = self.send(self.client.post(url).json(target)).await?;
        match (body.exists, body.job_id) {
            (true, Some(id)) if !id.is_empty() => Ok(Some(id)),
            (true, _) => Err(RemoteError::InvalidResponse(
                "job reported as existing without a job_id".into(),
            )),
            (false, _) => Ok(None),
        }
    }

    async fn check_job_status(&self, job_id: &str) -> Result<StatusResponse, RemoteError> {
        let url = self.endpoint(&["jobs", job_id, "status"])?;
        self.send(self.client.get(url)).await
    }
}
