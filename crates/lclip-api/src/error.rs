//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use lclip_worker::WorkerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{detail}")]
    RateLimited {
        limit: u32,
        retry_after_secs: u64,
        detail: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::Validation(msg) => ApiError::BadRequest(msg),
            // Missing credentials are an authorization problem for the
            // submission surface
            WorkerError::MissingCredential | WorkerError::InvalidCredential => {
                ApiError::Forbidden(e.to_string())
            }
            WorkerError::NotFound(msg) => ApiError::NotFound(msg),
            WorkerError::Forbidden(msg) => ApiError::Forbidden(msg),
            WorkerError::Conflict(msg) => ApiError::Conflict(msg),
            WorkerError::QuotaExceeded(msg) => ApiError::RateLimited {
                limit: 0,
                retry_after_secs: 60,
                detail: msg,
            },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<lclip_store::StoreError> for ApiError {
    fn from(e: lclip_store::StoreError) -> Self {
        match e {
            lclip_store::StoreError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<lclip_storage::StorageError> for ApiError {
    fn from(e: lclip_storage::StorageError) -> Self {
        match e {
            lclip_storage::StorageError::NotFound(key) => ApiError::NotFound(key),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay out of production responses
        let detail = match &self {
            ApiError::Internal(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let mut response = (status, Json(ErrorResponse { detail })).into_response();

        if let ApiError::RateLimited {
            limit,
            retry_after_secs,
            ..
        } = self
        {
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", limit.into());
            headers.insert("X-RateLimit-Remaining", 0.into());
            headers.insert("X-RateLimit-Reset", retry_after_secs.into());
            headers.insert("Retry-After", retry_after_secs.into());
        }

        response
    }
}
