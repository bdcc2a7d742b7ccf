//! Job lifecycle endpoints.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use lclip_models::{Job, JobId, JobSource, MediaDescriptor, ProcessingConfig};

use crate::auth::AuthPrincipal;
use crate::error::{ApiError, ApiResult};
use crate::quota::EndpointClass;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[validate(length(min = 1, max = 255))]
    pub filename: String,
    #[validate(range(min = 1))]
    pub file_size: u64,
    #[validate(length(min = 1, max = 100))]
    pub content_type: String,
    #[serde(default)]
    pub processing_config: Option<ProcessingConfig>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub upload_url: String,
    pub upload_fields: HashMap<String, String>,
    pub expires_in_seconds: i64,
    pub blob_key: String,
}

/// `POST /api/jobs`: validate, create the job row, issue the upload grant.
pub async fn create_job(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    state.quota.check(EndpointClass::Submit, &principal)?;
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let descriptor = MediaDescriptor {
        filename: request.filename,
        file_size: request.file_size,
        content_type: request.content_type,
        source: JobSource::Upload,
    };
    let config = request.processing_config.unwrap_or_default();

    let outcome = state.controller.submit(principal, descriptor, config).await?;
    let expires_in_seconds =
        (outcome.grant.expires_at - chrono::Utc::now()).num_seconds().max(0);

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            job_id: outcome.job.job_id.to_string(),
            upload_url: outcome.grant.url,
            upload_fields: outcome.grant.fields,
            expires_in_seconds,
            blob_key: outcome.job.original_blob_key,
        }),
    ))
}

/// `POST /api/jobs/{job_id}/process`: start the pipeline after upload.
pub async fn start_processing(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(job_id): Path<String>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    state.quota.check(EndpointClass::Status, &principal)?;
    let job_id = JobId::from_string(job_id);

    state.controller.begin_processing(&job_id, &principal).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": job_id, "status": "started" })),
    ))
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    pub current_stage: Option<String>,
    pub progress_percent: f32,
    pub progress_message: String,
    pub error: Option<String>,
    pub video_duration: Option<f64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.job_id.to_string(),
            status: job.status.as_str().to_string(),
            current_stage: job.current_stage.map(|s| s.as_str().to_string()),
            progress_percent: job.progress_percent,
            progress_message: job.progress_message,
            error: job.error,
            video_duration: job.video_duration,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// `GET /api/jobs/{job_id}`: job row with live progress fields.
pub async fn get_job(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    state.quota.check(EndpointClass::Status, &principal)?;
    let job_id = JobId::from_string(job_id);

    let job = state.controller.get_owned_job(&job_id, &principal).await?;
    Ok(Json(job.into()))
}

/// `POST /api/jobs/{job_id}/cancel`.
pub async fn cancel_job(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(job_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.quota.check(EndpointClass::Status, &principal)?;
    let job_id = JobId::from_string(job_id);

    state.controller.cancel(&job_id, &principal).await?;
    Ok(Json(json!({ "job_id": job_id, "status": "cancelling" })))
}

/// `DELETE /api/jobs/{job_id}`: remove the job and everything it owns.
pub async fn delete_job(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.quota.check(EndpointClass::Status, &principal)?;
    let job_id = JobId::from_string(job_id);

    state.controller.delete(&job_id, &principal).await?;
    Ok(StatusCode::NO_CONTENT)
}
