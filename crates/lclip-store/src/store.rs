//! The `ArtifactStore` trait and shared write-side validation.

use async_trait::async_trait;

use lclip_models::{
    validate_content_segments, Clip, ClipId, ContentSegment, Job, JobId, JobStatus,
    LayoutAnalysis, PrincipalId, Quiz, SilenceRegion, SlideContent, Stage, Summary,
    TranscriptSegment,
};

use crate::error::{StoreError, StoreResult};

/// Result of a status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Status before the write
    pub previous: JobStatus,
    /// Status after the write
    pub current: JobStatus,
    /// False when the write coalesced into an existing terminal state
    pub changed: bool,
}

/// Result of a progress write.
///
/// The store clamps regressions; `effective_percent` is what is now stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub effective_percent: f32,
}

/// Compilation outputs attached to a clip row.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipArtifacts {
    pub blob_key: String,
    pub thumbnail_key: String,
    pub subtitle_key: Option<String>,
    pub file_size: u64,
}

/// Typed, job-scoped persistence for jobs and derived artifacts.
///
/// Contract:
/// - Reads see only committed writes.
/// - Every `replace_*` call clears the prior collection for the job and
///   writes the new records in one transaction.
/// - Ordered reads come back pre-sorted (start time ascending; clips by
///   `order`); callers never sort.
/// - `set_job_progress` never regresses the stored percent.
/// - Terminal status writes coalesce: the first one wins, later ones
///   return `changed == false`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    // Jobs

    async fn create_job(&self, job: &Job) -> StoreResult<()>;
    async fn get_job(&self, job_id: &JobId) -> StoreResult<Job>;
    /// Delete the job row and every artifact collection it owns.
    async fn delete_job(&self, job_id: &JobId) -> StoreResult<()>;
    async fn set_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error: Option<String>,
    ) -> StoreResult<StatusUpdate>;
    async fn set_job_progress(
        &self,
        job_id: &JobId,
        stage: Stage,
        percent: f32,
        message: &str,
    ) -> StoreResult<ProgressUpdate>;
    async fn set_video_duration(&self, job_id: &JobId, seconds: f64) -> StoreResult<()>;
    /// Number of jobs currently running for a principal.
    async fn running_job_count(&self, principal: &PrincipalId) -> StoreResult<u64>;

    // Artifact collections

    async fn replace_silence_regions(
        &self,
        job_id: &JobId,
        records: Vec<SilenceRegion>,
    ) -> StoreResult<()>;
    async fn silence_regions(&self, job_id: &JobId) -> StoreResult<Vec<SilenceRegion>>;

    async fn replace_transcript_segments(
        &self,
        job_id: &JobId,
        records: Vec<TranscriptSegment>,
    ) -> StoreResult<()>;
    async fn transcript_segments(&self, job_id: &JobId) -> StoreResult<Vec<TranscriptSegment>>;

    async fn put_layout(&self, job_id: &JobId, layout: &LayoutAnalysis) -> StoreResult<()>;
    async fn layout(&self, job_id: &JobId) -> StoreResult<Option<LayoutAnalysis>>;

    async fn replace_slide_content(
        &self,
        job_id: &JobId,
        records: Vec<SlideContent>,
    ) -> StoreResult<()>;
    async fn slide_content(&self, job_id: &JobId) -> StoreResult<Vec<SlideContent>>;

    async fn replace_content_segments(
        &self,
        job_id: &JobId,
        records: Vec<ContentSegment>,
    ) -> StoreResult<()>;
    async fn content_segments(&self, job_id: &JobId) -> StoreResult<Vec<ContentSegment>>;

    async fn replace_clips(&self, job_id: &JobId, records: Vec<Clip>) -> StoreResult<()>;
    async fn clips(&self, job_id: &JobId) -> StoreResult<Vec<Clip>>;
    async fn update_clip_artifacts(
        &self,
        job_id: &JobId,
        clip_id: &ClipId,
        artifacts: ClipArtifacts,
    ) -> StoreResult<()>;

    // On-demand derived artifacts

    async fn put_summary(&self, job_id: &JobId, summary: &Summary) -> StoreResult<()>;
    async fn summary(&self, job_id: &JobId) -> StoreResult<Option<Summary>>;
    async fn put_quiz(&self, job_id: &JobId, quiz: &Quiz) -> StoreResult<()>;
    async fn quiz(&self, job_id: &JobId) -> StoreResult<Option<Quiz>>;

    // Encrypted model credentials, keyed by principal

    async fn put_credential(&self, principal: &PrincipalId, ciphertext: &str) -> StoreResult<()>;
    async fn get_credential(&self, principal: &PrincipalId) -> StoreResult<Option<String>>;
    async fn delete_credential(&self, principal: &PrincipalId) -> StoreResult<()>;
}

/// Sort silence regions by start and reject overlaps.
pub(crate) fn prepare_silence_regions(records: &mut [SilenceRegion]) -> StoreResult<()> {
    records.sort_by(|a, b| a.start.total_cmp(&b.start));
    for region in records.iter() {
        if region.start >= region.end {
            return Err(StoreError::invariant(format!(
                "silence region has start {:.3} >= end {:.3}",
                region.start, region.end
            )));
        }
    }
    for pair in records.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(StoreError::invariant(format!(
                "silence regions overlap at {:.3}",
                pair[1].start
            )));
        }
    }
    Ok(())
}

/// Sort transcript segments by start and validate their bounds.
pub(crate) fn prepare_transcript_segments(
    records: &mut [TranscriptSegment],
    video_duration: Option<f64>,
) -> StoreResult<()> {
    records.sort_by(|a, b| a.start.total_cmp(&b.start));
    for segment in records.iter() {
        if segment.start >= segment.end {
            return Err(StoreError::invariant(format!(
                "transcript segment has start {:.3} >= end {:.3}",
                segment.start, segment.end
            )));
        }
        if let Some(duration) = video_duration {
            // Tolerate sub-frame rounding from the remap arithmetic
            if segment.end > duration + 0.05 {
                return Err(StoreError::invariant(format!(
                    "transcript segment ends at {:.3} beyond video duration {:.3}",
                    segment.end, duration
                )));
            }
        }
    }
    Ok(())
}

/// Sort content segments chronologically and reject overlaps.
pub(crate) fn prepare_content_segments(records: &mut Vec<ContentSegment>) -> StoreResult<()> {
    records.sort_by(|a, b| a.start.total_cmp(&b.start));
    validate_content_segments(records).map_err(StoreError::invariant)
}

/// Sort clips by their importance rank.
pub(crate) fn prepare_clips(records: &mut [Clip]) {
    records.sort_by_key(|c| c.order);
}
