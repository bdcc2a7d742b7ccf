//! Results, summaries, and quizzes for completed jobs.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use lclip_models::{JobId, Quiz, Summary};
use lclip_store::ArtifactStore;
use lclip_worker::insights;

use crate::auth::AuthPrincipal;
use crate::error::ApiResult;
use crate::quota::EndpointClass;
use crate::state::AppState;

/// Validity of presigned result links.
const RESULT_URL_EXPIRY: Duration = Duration::from_secs(3600);

#[derive(Debug, Serialize)]
pub struct ClipResult {
    pub clip_id: String,
    pub title: String,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub order: u32,
    pub importance: f32,
    pub start_adjusted: bool,
    pub end_adjusted: bool,
    pub file_size: Option<u64>,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub subtitle_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub job_id: String,
    pub status: String,
    pub clips: Vec<ClipResult>,
}

/// `GET /api/jobs/{job_id}/results`: compiled clips with presigned URLs.
pub async fn get_results(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ResultsResponse>> {
    state.quota.check(EndpointClass::Results, &principal)?;
    let job_id = JobId::from_string(job_id);

    let job = state.controller.get_owned_job(&job_id, &principal).await?;
    let clips = state.controller.store().clips(&job_id).await?;

    let mut results = Vec::with_capacity(clips.len());
    for clip in clips {
        // Uncompiled clips (failed or still pending) surface without URLs
        let url = presign(&state, clip.blob_key.as_deref()).await;
        let thumbnail_url = presign(&state, clip.thumbnail_key.as_deref()).await;
        let subtitle_url = presign(&state, clip.subtitle_key.as_deref()).await;

        results.push(ClipResult {
            clip_id: clip.clip_id.to_string(),
            title: clip.title,
            start: clip.start,
            end: clip.end,
            duration: clip.duration,
            order: clip.order,
            importance: clip.importance,
            start_adjusted: clip.start_adjusted,
            end_adjusted: clip.end_adjusted,
            file_size: clip.file_size,
            url,
            thumbnail_url,
            subtitle_url,
        });
    }

    Ok(Json(ResultsResponse {
        job_id: job.job_id.to_string(),
        status: job.status.as_str().to_string(),
        clips: results,
    }))
}

async fn presign(state: &AppState, key: Option<&str>) -> Option<String> {
    let key = key?;
    state
        .controller
        .blobs()
        .presign_get(key, RESULT_URL_EXPIRY)
        .await
        .ok()
}

/// `POST /api/jobs/{job_id}/summary`: generate or fetch the cached
/// lecture summary.
pub async fn generate_summary(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Summary>> {
    state.quota.check(EndpointClass::Results, &principal)?;
    let job_id = JobId::from_string(job_id);

    // Ownership gate before any model spend
    state.controller.get_owned_job(&job_id, &principal).await?;

    let summary = insights::summary_for_job(
        state.controller.store(),
        &state.ml,
        state.controller.vault(),
        &job_id,
    )
    .await?;
    Ok(Json(summary))
}

/// `POST /api/jobs/{job_id}/quiz`: generate or fetch the cached quiz.
pub async fn generate_quiz(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Quiz>> {
    state.quota.check(EndpointClass::Results, &principal)?;
    let job_id = JobId::from_string(job_id);

    state.controller.get_owned_job(&job_id, &principal).await?;

    let quiz = insights::quiz_for_job(
        state.controller.store(),
        &state.ml,
        state.controller.vault(),
        &job_id,
    )
    .await?;
    Ok(Json(quiz))
}
