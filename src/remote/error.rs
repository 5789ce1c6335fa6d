//! Error types for the remote processing client.

use thiserror::Error;

/// Errors returned by a [`ProcessingApi`](super::ProcessingApi) call.
///
/// Every variant is treated as a transport failure by the orchestrator and
/// retried; the server's own verdict on a job arrives through
/// [`StatusResponse`](super::StatusResponse), not through this type.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP 429 from the server.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other non-success HTTP status, with the response body.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The server answered 2xx but the body did not make sense.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The configured base URL cannot have endpoint paths appended.
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    /// DNS, connection, TLS or timeout failure.
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}
