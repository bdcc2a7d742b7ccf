//! Storage error types.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Transient storage error: {0}")]
    Transient(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify an SDK error string into our taxonomy.
    pub fn from_sdk(key: &str, message: String) -> Self {
        if message.contains("NoSuchKey") || message.contains("NotFound") {
            Self::NotFound(key.to_string())
        } else if message.contains("AccessDenied") || message.contains("InvalidAccessKeyId") {
            Self::Unauthorized(message)
        } else {
            Self::Transient(message)
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}
