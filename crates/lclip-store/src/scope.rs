//! Job-scoped handle over the artifact store.
//!
//! Each stage invocation receives a `JobArtifacts` instead of the raw store,
//! so stage code cannot touch another job's rows and never passes the job id
//! explicitly.

use std::sync::Arc;

use lclip_models::{
    Clip, ClipId, ContentSegment, JobId, JobStatus, LayoutAnalysis, Quiz, SilenceRegion,
    SlideContent, Stage, Summary, TranscriptSegment,
};

use crate::error::StoreResult;
use crate::store::{ArtifactStore, ClipArtifacts, ProgressUpdate, StatusUpdate};

/// A handle exposing artifact operations scoped to one job.
#[derive(Clone)]
pub struct JobArtifacts {
    store: Arc<dyn ArtifactStore>,
    job_id: JobId,
}

impl JobArtifacts {
    pub fn new(store: Arc<dyn ArtifactStore>, job_id: JobId) -> Self {
        Self { store, job_id }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub async fn set_status(
        &self,
        status: JobStatus,
        error: Option<String>,
    ) -> StoreResult<StatusUpdate> {
        self.store.set_job_status(&self.job_id, status, error).await
    }

    pub async fn set_progress(
        &self,
        stage: Stage,
        percent: f32,
        message: &str,
    ) -> StoreResult<ProgressUpdate> {
        self.store
            .set_job_progress(&self.job_id, stage, percent, message)
            .await
    }

    pub async fn set_video_duration(&self, seconds: f64) -> StoreResult<()> {
        self.store.set_video_duration(&self.job_id, seconds).await
    }

    pub async fn replace_silence_regions(&self, records: Vec<SilenceRegion>) -> StoreResult<()> {
        self.store
            .replace_silence_regions(&self.job_id, records)
            .await
    }

    pub async fn silence_regions(&self) -> StoreResult<Vec<SilenceRegion>> {
        self.store.silence_regions(&self.job_id).await
    }

    pub async fn replace_transcript_segments(
        &self,
        records: Vec<TranscriptSegment>,
    ) -> StoreResult<()> {
        self.store
            .replace_transcript_segments(&self.job_id, records)
            .await
    }

    pub async fn transcript_segments(&self) -> StoreResult<Vec<TranscriptSegment>> {
        self.store.transcript_segments(&self.job_id).await
    }

    pub async fn put_layout(&self, layout: &LayoutAnalysis) -> StoreResult<()> {
        self.store.put_layout(&self.job_id, layout).await
    }

    pub async fn layout(&self) -> StoreResult<Option<LayoutAnalysis>> {
        self.store.layout(&self.job_id).await
    }

    pub async fn replace_slide_content(&self, records: Vec<SlideContent>) -> StoreResult<()> {
        self.store.replace_slide_content(&self.job_id, records).await
    }

    pub async fn slide_content(&self) -> StoreResult<Vec<SlideContent>> {
        self.store.slide_content(&self.job_id).await
    }

    pub async fn replace_content_segments(
        &self,
        records: Vec<ContentSegment>,
    ) -> StoreResult<()> {
        self.store
            .replace_content_segments(&self.job_id, records)
            .await
    }

    pub async fn content_segments(&self) -> StoreResult<Vec<ContentSegment>> {
        self.store.content_segments(&self.job_id).await
    }

    pub async fn replace_clips(&self, records: Vec<Clip>) -> StoreResult<()> {
        self.store.replace_clips(&self.job_id, records).await
    }

    pub async fn clips(&self) -> StoreResult<Vec<Clip>> {
        self.store.clips(&self.job_id).await
    }

    pub async fn update_clip_artifacts(
        &self,
        clip_id: &ClipId,
        artifacts: ClipArtifacts,
    ) -> StoreResult<()> {
        self.store
            .update_clip_artifacts(&self.job_id, clip_id, artifacts)
            .await
    }

    pub async fn put_summary(&self, summary: &Summary) -> StoreResult<()> {
        self.store.put_summary(&self.job_id, summary).await
    }

    pub async fn summary(&self) -> StoreResult<Option<Summary>> {
        self.store.summary(&self.job_id).await
    }

    pub async fn put_quiz(&self, quiz: &Quiz) -> StoreResult<()> {
        self.store.put_quiz(&self.job_id, quiz).await
    }

    pub async fn quiz(&self) -> StoreResult<Option<Quiz>> {
        self.store.quiz(&self.job_id).await
    }
}
