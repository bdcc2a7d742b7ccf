//! Artifact store error types.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Transient backend error: {0}")]
    TransientBackend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientBackend(msg.into())
    }

    /// Transient errors may be retried; the rest are permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::TransientBackend(_))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::TransientBackend(e.to_string())
    }
}
