//! In-process artifact store.
//!
//! Implements the same contract as the Redis backend and is used as the
//! test double across the workspace, and for single-node development runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use lclip_models::{
    Clip, ClipId, ContentSegment, Job, JobId, JobStatus, LayoutAnalysis, PrincipalId, Quiz,
    SilenceRegion, SlideContent, Stage, Summary, TranscriptSegment,
};

use crate::error::{StoreError, StoreResult};
use crate::store::{
    prepare_clips, prepare_content_segments, prepare_silence_regions,
    prepare_transcript_segments, ArtifactStore, ClipArtifacts, ProgressUpdate, StatusUpdate,
};

#[derive(Debug)]
struct JobRecord {
    job: Job,
    silence: Vec<SilenceRegion>,
    transcripts: Vec<TranscriptSegment>,
    layout: Option<LayoutAnalysis>,
    slides: Vec<SlideContent>,
    content: Vec<ContentSegment>,
    clips: Vec<Clip>,
    summary: Option<Summary>,
    quiz: Option<Quiz>,
}

impl JobRecord {
    fn new(job: Job) -> Self {
        Self {
            job,
            silence: Vec::new(),
            transcripts: Vec::new(),
            layout: None,
            slides: Vec::new(),
            content: Vec::new(),
            clips: Vec::new(),
            summary: None,
            quiz: None,
        }
    }
}

/// In-memory `ArtifactStore`.
#[derive(Clone, Default)]
pub struct MemoryArtifactStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, JobRecord>,
    credentials: HashMap<String, String>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_job<T>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&JobRecord) -> T,
    ) -> StoreResult<T> {
        let inner = self.inner.read().await;
        let record = inner
            .jobs
            .get(job_id.as_str())
            .ok_or_else(|| StoreError::not_found(format!("job {}", job_id)))?;
        Ok(f(record))
    }

    async fn with_job_mut<T>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&mut JobRecord) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut inner = self.inner.write().await;
        let record = inner
            .jobs
            .get_mut(job_id.as_str())
            .ok_or_else(|| StoreError::not_found(format!("job {}", job_id)))?;
        f(record)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn create_job(&self, job: &Job) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(job.job_id.as_str()) {
            return Err(StoreError::invariant(format!(
                "job {} already exists",
                job.job_id
            )));
        }
        inner
            .jobs
            .insert(job.job_id.as_str().to_string(), JobRecord::new(job.clone()));
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> StoreResult<Job> {
        self.with_job(job_id, |record| record.job.clone()).await
    }

    async fn delete_job(&self, job_id: &JobId) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .jobs
            .remove(job_id.as_str())
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(format!("job {}", job_id)))
    }

    async fn set_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error: Option<String>,
    ) -> StoreResult<StatusUpdate> {
        self.with_job_mut(job_id, |record| {
            let previous = record.job.status;
            if previous.is_terminal() {
                // Double-terminal writes coalesce
                return Ok(StatusUpdate {
                    previous,
                    current: previous,
                    changed: false,
                });
            }
            if !previous.can_transition_to(status) {
                return Err(StoreError::invariant(format!(
                    "illegal status transition {} -> {}",
                    previous, status
                )));
            }
            record.job.status = status;
            if status == JobStatus::Failed {
                record.job.error = error;
            }
            if status.is_terminal() {
                record.job.completed_at = Some(Utc::now());
                if status == JobStatus::Completed {
                    record.job.progress_percent = 100.0;
                }
            }
            Ok(StatusUpdate {
                previous,
                current: status,
                changed: true,
            })
        })
        .await
    }

    async fn set_job_progress(
        &self,
        job_id: &JobId,
        stage: Stage,
        percent: f32,
        message: &str,
    ) -> StoreResult<ProgressUpdate> {
        self.with_job_mut(job_id, |record| {
            if record.job.status.is_terminal() {
                return Ok(ProgressUpdate {
                    effective_percent: record.job.progress_percent,
                });
            }
            let effective = percent.max(record.job.progress_percent);
            record.job.progress_percent = effective;
            record.job.current_stage = Some(stage);
            record.job.progress_message = message.to_string();
            Ok(ProgressUpdate {
                effective_percent: effective,
            })
        })
        .await
    }

    async fn set_video_duration(&self, job_id: &JobId, seconds: f64) -> StoreResult<()> {
        self.with_job_mut(job_id, |record| {
            record.job.video_duration = Some(seconds);
            Ok(())
        })
        .await
    }

    async fn running_job_count(&self, principal: &PrincipalId) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .jobs
            .values()
            .filter(|r| r.job.principal_id == *principal && r.job.status == JobStatus::Running)
            .count() as u64)
    }

    async fn replace_silence_regions(
        &self,
        job_id: &JobId,
        mut records: Vec<SilenceRegion>,
    ) -> StoreResult<()> {
        prepare_silence_regions(&mut records)?;
        self.with_job_mut(job_id, |record| {
            record.silence = records;
            Ok(())
        })
        .await
    }

    async fn silence_regions(&self, job_id: &JobId) -> StoreResult<Vec<SilenceRegion>> {
        self.with_job(job_id, |record| record.silence.clone()).await
    }

    async fn replace_transcript_segments(
        &self,
        job_id: &JobId,
        mut records: Vec<TranscriptSegment>,
    ) -> StoreResult<()> {
        let duration = self.get_job(job_id).await?.video_duration;
        prepare_transcript_segments(&mut records, duration)?;
        self.with_job_mut(job_id, |record| {
            record.transcripts = records;
            Ok(())
        })
        .await
    }

    async fn transcript_segments(&self, job_id: &JobId) -> StoreResult<Vec<TranscriptSegment>> {
        self.with_job(job_id, |record| record.transcripts.clone())
            .await
    }

    async fn put_layout(&self, job_id: &JobId, layout: &LayoutAnalysis) -> StoreResult<()> {
        let layout = layout.clone();
        self.with_job_mut(job_id, move |record| {
            record.layout = Some(layout);
            Ok(())
        })
        .await
    }

    async fn layout(&self, job_id: &JobId) -> StoreResult<Option<LayoutAnalysis>> {
        self.with_job(job_id, |record| record.layout.clone()).await
    }

    async fn replace_slide_content(
        &self,
        job_id: &JobId,
        mut records: Vec<SlideContent>,
    ) -> StoreResult<()> {
        records.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        self.with_job_mut(job_id, |record| {
            record.slides = records;
            Ok(())
        })
        .await
    }

    async fn slide_content(&self, job_id: &JobId) -> StoreResult<Vec<SlideContent>> {
        self.with_job(job_id, |record| record.slides.clone()).await
    }

    async fn replace_content_segments(
        &self,
        job_id: &JobId,
        mut records: Vec<ContentSegment>,
    ) -> StoreResult<()> {
        prepare_content_segments(&mut records)?;
        self.with_job_mut(job_id, |record| {
            record.content = records;
            Ok(())
        })
        .await
    }

    async fn content_segments(&self, job_id: &JobId) -> StoreResult<Vec<ContentSegment>> {
        self.with_job(job_id, |record| record.content.clone()).await
    }

    async fn replace_clips(&self, job_id: &JobId, mut records: Vec<Clip>) -> StoreResult<()> {
        prepare_clips(&mut records);
        self.with_job_mut(job_id, |record| {
            record.clips = records;
            Ok(())
        })
        .await
    }

    async fn clips(&self, job_id: &JobId) -> StoreResult<Vec<Clip>> {
        self.with_job(job_id, |record| record.clips.clone()).await
    }

    async fn update_clip_artifacts(
        &self,
        job_id: &JobId,
        clip_id: &ClipId,
        artifacts: ClipArtifacts,
    ) -> StoreResult<()> {
        self.with_job_mut(job_id, |record| {
            let clip = record
                .clips
                .iter_mut()
                .find(|c| c.clip_id == *clip_id)
                .ok_or_else(|| StoreError::not_found(format!("clip {}", clip_id)))?;
            clip.blob_key = Some(artifacts.blob_key);
            clip.thumbnail_key = Some(artifacts.thumbnail_key);
            clip.subtitle_key = artifacts.subtitle_key;
            clip.file_size = Some(artifacts.file_size);
            Ok(())
        })
        .await
    }

    async fn put_summary(&self, job_id: &JobId, summary: &Summary) -> StoreResult<()> {
        let summary = summary.clone();
        self.with_job_mut(job_id, move |record| {
            record.summary = Some(summary);
            Ok(())
        })
        .await
    }

    async fn summary(&self, job_id: &JobId) -> StoreResult<Option<Summary>> {
        self.with_job(job_id, |record| record.summary.clone()).await
    }

    async fn put_quiz(&self, job_id: &JobId, quiz: &Quiz) -> StoreResult<()> {
        let quiz = quiz.clone();
        self.with_job_mut(job_id, move |record| {
            record.quiz = Some(quiz);
            Ok(())
        })
        .await
    }

    async fn quiz(&self, job_id: &JobId) -> StoreResult<Option<Quiz>> {
        self.with_job(job_id, |record| record.quiz.clone()).await
    }

    async fn put_credential(&self, principal: &PrincipalId, ciphertext: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .credentials
            .insert(principal.as_str().to_string(), ciphertext.to_string());
        Ok(())
    }

    async fn get_credential(&self, principal: &PrincipalId) -> StoreResult<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner.credentials.get(principal.as_str()).cloned())
    }

    async fn delete_credential(&self, principal: &PrincipalId) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.credentials.remove(principal.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lclip_models::{JobSource, MediaDescriptor, ProcessingConfig};

    fn new_job() -> Job {
        Job::new(
            PrincipalId::new("user-1"),
            MediaDescriptor {
                filename: "lecture.mp4".to_string(),
                file_size: 1024,
                content_type: "video/mp4".to_string(),
                source: JobSource::Upload,
            },
            "uploads/x/original.mp4",
            ProcessingConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get_job() {
        let store = MemoryArtifactStore::new();
        let job = new_job();
        store.create_job(&job).await.unwrap();

        let loaded = store.get_job(&job.job_id).await.unwrap();
        assert_eq!(loaded.job_id, job.job_id);
        assert_eq!(loaded.status, JobStatus::Queued);

        // Duplicate creation is rejected
        assert!(store.create_job(&job).await.is_err());
    }

    #[tokio::test]
    async fn test_progress_never_regresses() {
        let store = MemoryArtifactStore::new();
        let job = new_job();
        store.create_job(&job).await.unwrap();

        let update = store
            .set_job_progress(&job.job_id, Stage::Transcribe, 40.0, "transcribing")
            .await
            .unwrap();
        assert_eq!(update.effective_percent, 40.0);

        // A regressing write is clamped to the stored value
        let update = store
            .set_job_progress(&job.job_id, Stage::Transcribe, 20.0, "late frame")
            .await
            .unwrap();
        assert_eq!(update.effective_percent, 40.0);

        let loaded = store.get_job(&job.job_id).await.unwrap();
        assert_eq!(loaded.progress_percent, 40.0);
    }

    #[tokio::test]
    async fn test_double_terminal_coalesces() {
        let store = MemoryArtifactStore::new();
        let job = new_job();
        store.create_job(&job).await.unwrap();

        store
            .set_job_status(&job.job_id, JobStatus::Running, None)
            .await
            .unwrap();
        let first = store
            .set_job_status(&job.job_id, JobStatus::Completed, None)
            .await
            .unwrap();
        assert!(first.changed);

        let second = store
            .set_job_status(&job.job_id, JobStatus::Completed, None)
            .await
            .unwrap();
        assert!(!second.changed);
        assert_eq!(second.current, JobStatus::Completed);

        // Failed after completed is also a no-op
        let third = store
            .set_job_status(&job.job_id, JobStatus::Failed, Some("late".into()))
            .await
            .unwrap();
        assert!(!third.changed);
        assert_eq!(third.current, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_progress_frozen_after_terminal() {
        let store = MemoryArtifactStore::new();
        let job = new_job();
        store.create_job(&job).await.unwrap();
        store
            .set_job_status(&job.job_id, JobStatus::Running, None)
            .await
            .unwrap();
        store
            .set_job_status(&job.job_id, JobStatus::Completed, None)
            .await
            .unwrap();

        let update = store
            .set_job_progress(&job.job_id, Stage::CompileClips, 55.0, "stale")
            .await
            .unwrap();
        assert_eq!(update.effective_percent, 100.0);
        let loaded = store.get_job(&job.job_id).await.unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_running_job_count() {
        let store = MemoryArtifactStore::new();
        let job_a = new_job();
        let job_b = new_job();
        store.create_job(&job_a).await.unwrap();
        store.create_job(&job_b).await.unwrap();
        let principal = job_a.principal_id.clone();

        assert_eq!(store.running_job_count(&principal).await.unwrap(), 0);
        store
            .set_job_status(&job_a.job_id, JobStatus::Running, None)
            .await
            .unwrap();
        store
            .set_job_status(&job_b.job_id, JobStatus::Running, None)
            .await
            .unwrap();
        assert_eq!(store.running_job_count(&principal).await.unwrap(), 2);

        store
            .set_job_status(&job_a.job_id, JobStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(store.running_job_count(&principal).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_content_segments_overlap_rejected() {
        let store = MemoryArtifactStore::new();
        let job = new_job();
        store.create_job(&job).await.unwrap();

        let make = |start: f64, end: f64| ContentSegment {
            start,
            end,
            topic: "t".to_string(),
            description: String::new(),
            importance: 0.5,
            keywords: vec![],
            concepts: vec![],
            order: 1,
        };

        let err = store
            .replace_content_segments(&job.job_id, vec![make(0.0, 100.0), make(50.0, 150.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));

        store
            .replace_content_segments(&job.job_id, vec![make(100.0, 200.0), make(0.0, 100.0)])
            .await
            .unwrap();
        // Reads come back chronologically sorted
        let segments = store.content_segments(&job.job_id).await.unwrap();
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[1].start, 100.0);
    }

    #[tokio::test]
    async fn test_replace_clears_prior_output() {
        let store = MemoryArtifactStore::new();
        let job = new_job();
        store.create_job(&job).await.unwrap();

        let region = |start: f64, end: f64| SilenceRegion {
            start,
            end,
            threshold_dbfs: -40.0,
        };
        store
            .replace_silence_regions(&job.job_id, vec![region(1.0, 2.0), region(3.0, 4.0)])
            .await
            .unwrap();
        store
            .replace_silence_regions(&job.job_id, vec![region(5.0, 6.0)])
            .await
            .unwrap();

        let regions = store.silence_regions(&job.job_id).await.unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].start, 5.0);
    }

    #[tokio::test]
    async fn test_update_clip_artifacts() {
        let store = MemoryArtifactStore::new();
        let job = new_job();
        store.create_job(&job).await.unwrap();

        let clip = Clip {
            clip_id: ClipId::new(),
            start: 10.0,
            end: 130.0,
            duration: 120.0,
            order: 1,
            title: "Intro".to_string(),
            importance: 0.9,
            start_adjusted: false,
            end_adjusted: false,
            blob_key: None,
            thumbnail_key: None,
            subtitle_key: None,
            file_size: None,
        };
        let clip_id = clip.clip_id.clone();
        store.replace_clips(&job.job_id, vec![clip]).await.unwrap();

        store
            .update_clip_artifacts(
                &job.job_id,
                &clip_id,
                ClipArtifacts {
                    blob_key: "clips/j/c.mp4".to_string(),
                    thumbnail_key: "thumbnails/j/c.jpg".to_string(),
                    subtitle_key: Some("subtitles/j/c.vtt".to_string()),
                    file_size: 42,
                },
            )
            .await
            .unwrap();

        let clips = store.clips(&job.job_id).await.unwrap();
        assert!(clips[0].is_compiled());
        assert_eq!(clips[0].file_size, Some(42));

        let missing = ClipId::new();
        let err = store
            .update_clip_artifacts(
                &job.job_id,
                &missing,
                ClipArtifacts {
                    blob_key: String::new(),
                    thumbnail_key: String::new(),
                    subtitle_key: None,
                    file_size: 0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
