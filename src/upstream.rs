// Errors surfaced by the network collaborators (flight offer search, location lookup).
// Retry and backoff live in the collaborators themselves, never in this crate.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("API error: {status_code} - {message}")]
    ApiResponseError { status_code: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl UpstreamError {
    pub fn service_unavailable<S: Into<String>>(message: S) -> Self {
        UpstreamError::ApiResponseError {
            status_code: 503,
            message: message.into(),
        }
    }
}
