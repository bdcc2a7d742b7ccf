//! Worker error types and the stage failure taxonomy.

use thiserror::Error;

use lclip_media::MediaError;
use lclip_ml_client::MlError;
use lclip_storage::StorageError;
use lclip_store::StoreError;

pub type WorkerResult<T> = Result<T, WorkerError>;
pub type StageResult<T> = Result<T, StageError>;

/// Failure class driving executor policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input, surfaced to the caller, never retried
    Validation,
    /// Missing/invalid model API key, fails the job immediately
    Credential,
    /// May be retried per stage policy
    Transient,
    /// Permanent stage failure
    Fatal,
    /// Cancellation signalled by the controller
    Canceled,
}

/// Errors raised inside a stage invocation.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("No audio track in source media")]
    NoAudioTrack,

    #[error("Stage cancelled")]
    Canceled,

    #[error("Stage timed out after {0} seconds")]
    Timeout(u64),

    #[error("Required predecessor output missing: {0}")]
    MissingInput(String),

    #[error("Stage failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("Media error: {0}")]
    Media(MediaError),

    #[error("Model error: {0}")]
    Model(#[from] MlError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<MediaError> for StageError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::NoAudioTrack => StageError::NoAudioTrack,
            MediaError::Cancelled => StageError::Canceled,
            other => StageError::Media(other),
        }
    }
}

impl StageError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Classify for executor policy decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            StageError::NoAudioTrack => ErrorClass::Fatal,
            StageError::Canceled => ErrorClass::Canceled,
            StageError::Timeout(_) => ErrorClass::Transient,
            StageError::MissingInput(_) => ErrorClass::Fatal,
            StageError::RetriesExhausted { .. } => ErrorClass::Fatal,
            StageError::Media(e) => {
                if e.is_retryable() {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Fatal
                }
            }
            StageError::Model(MlError::Auth(_)) => ErrorClass::Credential,
            StageError::Model(e) => {
                if e.is_retryable() {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Fatal
                }
            }
            StageError::Store(e) => {
                if e.is_retryable() {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Fatal
                }
            }
            StageError::Storage(e) => {
                if e.is_retryable() {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Fatal
                }
            }
            StageError::Io(_) => ErrorClass::Transient,
            StageError::Other(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Errors raised by the job controller and scheduler.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Missing model API key: add your Gemini API key in settings to process videos")]
    MissingCredential,

    #[error("Stored model API key could not be decrypted")]
    InvalidCredential,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Model error: {0}")]
    Model(#[from] MlError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(StageError::NoAudioTrack.class(), ErrorClass::Fatal);
        assert_eq!(StageError::Canceled.class(), ErrorClass::Canceled);
        assert_eq!(StageError::Timeout(60).class(), ErrorClass::Transient);
        assert_eq!(
            StageError::Model(MlError::Auth("bad".into())).class(),
            ErrorClass::Credential
        );
        assert_eq!(
            StageError::Model(MlError::transient("net")).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            StageError::Store(StoreError::invariant("overlap")).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            StageError::Store(StoreError::transient("redis down")).class(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_media_no_audio_converts() {
        let err: StageError = MediaError::NoAudioTrack.into();
        assert!(matches!(err, StageError::NoAudioTrack));

        let err: StageError = MediaError::Cancelled.into();
        assert!(matches!(err, StageError::Canceled));
    }
}
