//! Per-job execution context handed to stage invocations.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::watch;
use tracing::warn;

use lclip_bus::ProgressBus;
use lclip_media::{FfmpegRunner, VideoInfo};
use lclip_ml_client::GeminiClient;
use lclip_models::{Job, JobId, ProgressRecord, Stage};
use lclip_storage::BlobStore;
use lclip_store::JobArtifacts;

use crate::config::WorkerConfig;
use crate::credentials::ApiKey;
use crate::error::{StageError, StageResult};

/// Everything a stage invocation needs. Per-job state is carried here
/// explicitly; stages share no other mutable state.
pub struct StageContext {
    pub job: Job,
    pub artifacts: JobArtifacts,
    pub blobs: Arc<BlobStore>,
    pub ml: Arc<GeminiClient>,
    pub api_key: ApiKey,
    pub config: Arc<WorkerConfig>,
    pub bus: Arc<ProgressBus>,
    pub cancel: watch::Receiver<bool>,
    /// Local path of the downloaded original
    pub source_path: PathBuf,
    /// Probe result of the original
    pub video_info: VideoInfo,
    /// Job-scoped scratch dir holding the original; dropped when the
    /// pipeline ends
    pub(crate) _workdir: Arc<TempDir>,
}

impl StageContext {
    /// An FFmpeg runner wired to this job's cancel signal.
    pub fn runner(&self) -> FfmpegRunner {
        FfmpegRunner::new().with_cancel(self.cancel.clone())
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Early-out guard used at stage entry and between expensive steps.
    pub fn check_cancelled(&self) -> StageResult<()> {
        if self.is_cancelled() {
            Err(StageError::Canceled)
        } else {
            Ok(())
        }
    }

    /// A reporter that scales stage-local progress into the stage's global
    /// band.
    pub fn reporter(&self, stage: Stage) -> ProgressReporter {
        ProgressReporter {
            artifacts: self.artifacts.clone(),
            bus: Arc::clone(&self.bus),
            job_id: self.job.job_id.clone(),
            stage,
        }
    }
}

/// Publishes stage progress to the artifact store (clamped, persistent) and
/// the progress bus (live subscribers).
#[derive(Clone)]
pub struct ProgressReporter {
    artifacts: JobArtifacts,
    bus: Arc<ProgressBus>,
    job_id: JobId,
    stage: Stage,
}

impl ProgressReporter {
    /// Report stage-local progress (0-100 within the stage's band).
    ///
    /// The store clamps regressions; the clamped value is what goes out on
    /// the bus, so subscribers observe a non-decreasing sequence. Store
    /// failures degrade to a log line rather than failing the stage.
    pub async fn report(&self, stage_percent: f32, message: &str, eta_seconds: Option<u64>) {
        let global = self.stage.global_percent(stage_percent);

        let effective = match self
            .artifacts
            .set_progress(self.stage, global, message)
            .await
        {
            Ok(update) => update.effective_percent,
            Err(e) => {
                warn!(
                    job_id = %self.job_id,
                    stage = %self.stage,
                    "Failed to persist progress: {}",
                    e
                );
                global
            }
        };

        self.bus.publish(
            &self.job_id,
            ProgressRecord::progress(
                self.job_id.clone(),
                self.stage,
                effective,
                message,
                eta_seconds,
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lclip_models::{JobSource, JobStatus, MediaDescriptor, ProcessingConfig};
    use lclip_store::{ArtifactStore, MemoryArtifactStore};

    async fn reporter_fixture(stage: Stage) -> (ProgressReporter, Arc<ProgressBus>, JobId) {
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
        let job = Job::new(
            lclip_models::PrincipalId::new("u"),
            MediaDescriptor {
                filename: "lecture.mp4".to_string(),
                file_size: 1,
                content_type: "video/mp4".to_string(),
                source: JobSource::Upload,
            },
            "uploads/x",
            ProcessingConfig::default(),
        );
        store.create_job(&job).await.unwrap();
        store
            .set_job_status(&job.job_id, JobStatus::Running, None)
            .await
            .unwrap();

        let bus = Arc::new(ProgressBus::new());
        let artifacts = JobArtifacts::new(store, job.job_id.clone());
        let reporter = ProgressReporter {
            artifacts,
            bus: Arc::clone(&bus),
            job_id: job.job_id.clone(),
            stage,
        };
        (reporter, bus, job.job_id)
    }

    #[tokio::test]
    async fn test_reporter_scales_into_band() {
        let (reporter, bus, job_id) = reporter_fixture(Stage::Transcribe).await;
        let mut sub = bus.subscribe(&job_id);

        reporter.report(0.0, "start", None).await;
        reporter.report(50.0, "mid", None).await;
        reporter.report(100.0, "end", None).await;

        // Transcribe band is 15-45
        assert_eq!(sub.recv().await.unwrap().percent(), Some(15.0));
        assert_eq!(sub.recv().await.unwrap().percent(), Some(30.0));
        assert_eq!(sub.recv().await.unwrap().percent(), Some(45.0));
    }

    #[tokio::test]
    async fn test_reporter_never_regresses_on_the_bus() {
        let (reporter, bus, job_id) = reporter_fixture(Stage::Transcribe).await;
        let mut sub = bus.subscribe(&job_id);

        reporter.report(80.0, "ahead", None).await;
        // A stale lower report is clamped by the store before it reaches
        // any subscriber
        reporter.report(20.0, "stale", None).await;

        let first = sub.recv().await.unwrap().percent().unwrap();
        let second = sub.recv().await.unwrap().percent().unwrap();
        assert_eq!(first, 39.0);
        assert_eq!(second, 39.0);
    }
}
