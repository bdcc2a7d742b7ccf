//! Model gateway error types.

use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    /// Invalid or rejected API key. Never retried.
    #[error("Model authentication failed: {0}")]
    Auth(String),

    /// External rate limit signal.
    #[error("Model rate limited: {0}")]
    RateLimited(String),

    /// Network failures, 5xx responses, empty responses.
    #[error("Transient model error: {0}")]
    Transient(String),

    /// Response violated the declared JSON shape after the corrective retry.
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

impl MlError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Auth failures fail immediately; rate limits and transients back off.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MlError::RateLimited(_) | MlError::Transient(_))
    }
}

impl From<reqwest::Error> for MlError {
    fn from(e: reqwest::Error) -> Self {
        MlError::Transient(e.to_string())
    }
}
