//! In-process job scheduler.
//!
//! Bounds concurrent pipelines with a semaphore, owns the per-job cancel
//! registry, and drives each job from dispatch through its terminal state.

use std::collections::HashMap;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{error, info};

use lclip_bus::ProgressBus;
use lclip_media::probe::probe_video;
use lclip_ml_client::GeminiClient;
use lclip_models::{Job, JobId, JobStatus, ProgressRecord, Stage};
use lclip_storage::BlobStore;
use lclip_store::{ArtifactStore, JobArtifacts};

use crate::config::WorkerConfig;
use crate::context::StageContext;
use crate::credentials::ApiKey;
use crate::dag::run_pipeline;
use crate::error::{StageError, StageResult, WorkerError, WorkerResult};
use crate::notify::Notifier;

/// Shared scheduler state.
pub(crate) struct SchedulerInner {
    pub(crate) store: Arc<dyn ArtifactStore>,
    pub(crate) blobs: Arc<BlobStore>,
    pub(crate) ml: Arc<GeminiClient>,
    pub(crate) bus: Arc<ProgressBus>,
    pub(crate) config: Arc<WorkerConfig>,
    pub(crate) notifier: Arc<dyn Notifier>,
    semaphore: Arc<Semaphore>,
    cancels: Mutex<HashMap<String, watch::Sender<bool>>>,
}

/// Schedules pipelines onto the process.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

impl JobScheduler {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        blobs: Arc<BlobStore>,
        ml: Arc<GeminiClient>,
        bus: Arc<ProgressBus>,
        config: Arc<WorkerConfig>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                blobs,
                ml,
                bus,
                config,
                notifier,
                semaphore,
                cancels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Dispatch a job onto the pipeline. Returns once the job is tracked;
    /// execution proceeds in the background.
    pub async fn dispatch(&self, job: Job, api_key: ApiKey) -> WorkerResult<()> {
        let job_id = job.job_id.clone();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        {
            let mut cancels = self.inner.cancels.lock().await;
            if cancels.contains_key(job_id.as_str()) {
                return Err(WorkerError::conflict(format!(
                    "job {} is already dispatched",
                    job_id
                )));
            }
            cancels.insert(job_id.as_str().to_string(), cancel_tx);
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_one(inner, job, api_key, cancel_rx).await;
        });

        metrics::counter!("lclip_jobs_dispatched_total").increment(1);
        Ok(())
    }

    /// Signal cancellation for a running job. Returns whether the job was
    /// known to the scheduler.
    pub async fn cancel(&self, job_id: &JobId) -> bool {
        let cancels = self.inner.cancels.lock().await;
        match cancels.get(job_id.as_str()) {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    /// Number of jobs currently tracked.
    pub async fn active_jobs(&self) -> usize {
        self.inner.cancels.lock().await.len()
    }

    /// Signal every in-flight job and wait for them to drain.
    pub async fn shutdown(&self) {
        {
            let cancels = self.inner.cancels.lock().await;
            info!(jobs = cancels.len(), "Scheduler shutdown, cancelling jobs");
            for tx in cancels.values() {
                let _ = tx.send(true);
            }
        }

        // Grace period (10s) plus headroom for terminal bookkeeping
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(15);
        loop {
            if self.inner.cancels.lock().await.is_empty()
                || tokio::time::Instant::now() >= deadline
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
    }
}

/// Drive one job: acquire a slot, run the pipeline, persist the terminal
/// state, release tracking.
async fn run_one(
    inner: Arc<SchedulerInner>,
    job: Job,
    api_key: ApiKey,
    cancel_rx: watch::Receiver<bool>,
) {
    let job_id = job.job_id.clone();

    let permit = inner
        .semaphore
        .clone()
        .acquire_owned()
        .await
        .expect("scheduler semaphore closed");

    let result = execute_job(&inner, job, api_key, cancel_rx).await;
    drop(permit);

    let outcome = match result {
        Ok(()) => JobOutcome::Completed,
        Err(StageError::Canceled) => JobOutcome::Failed("Processing canceled".to_string()),
        Err(e) => JobOutcome::Failed(e.to_string()),
    };

    if let Err(e) = finalize_job(
        &inner.store,
        &inner.bus,
        inner.notifier.as_ref(),
        &job_id,
        outcome,
    )
    .await
    {
        error!(job_id = %job_id, "Failed to finalize job: {}", e);
    }

    inner.cancels.lock().await.remove(job_id.as_str());
}

/// Terminal outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
}

/// Persist the terminal state and publish the guaranteed terminal frame.
///
/// Idempotent: a second terminal for the same job coalesces in the store
/// and publishes nothing.
pub(crate) async fn finalize_job(
    store: &Arc<dyn ArtifactStore>,
    bus: &Arc<ProgressBus>,
    notifier: &dyn Notifier,
    job_id: &JobId,
    outcome: JobOutcome,
) -> WorkerResult<()> {
    let (status, error) = match &outcome {
        JobOutcome::Completed => (JobStatus::Completed, None),
        JobOutcome::Failed(message) => (JobStatus::Failed, Some(message.clone())),
    };

    let update = store.set_job_status(job_id, status, error.clone()).await?;
    if !update.changed {
        info!(job_id = %job_id, "Terminal state already recorded, coalescing");
        return Ok(());
    }

    let frame = match &outcome {
        JobOutcome::Completed => {
            metrics::counter!("lclip_jobs_completed_total").increment(1);
            ProgressRecord::complete(job_id.clone())
        }
        JobOutcome::Failed(message) => {
            metrics::counter!("lclip_jobs_failed_total").increment(1);
            ProgressRecord::error(job_id.clone(), message.clone())
        }
    };
    bus.publish_terminal(job_id, frame).await;

    match store.get_job(job_id).await {
        Ok(job) => notifier.job_finished(&job),
        Err(e) => error!(job_id = %job_id, "Terminal notify skipped: {}", e),
    }

    Ok(())
}

/// Download, probe, and run the DAG for one job.
async fn execute_job(
    inner: &SchedulerInner,
    mut job: Job,
    api_key: ApiKey,
    cancel_rx: watch::Receiver<bool>,
) -> StageResult<()> {
    let artifacts = JobArtifacts::new(Arc::clone(&inner.store), job.job_id.clone());

    artifacts.set_status(JobStatus::Running, None).await?;
    report_upload_band(inner, &artifacts, &job, "Starting processing pipeline").await;

    // The original is downloaded once per job; stages keep their own
    // scratch dirs for intermediates
    let workdir = TempDir::new()?;
    let ext = lclip_storage::object_ext(&job.descriptor.filename);
    let source_path = workdir.path().join(format!("original.{}", ext));
    inner
        .blobs
        .download(&job.original_blob_key, &source_path)
        .await?;

    let video_info = probe_video(&source_path).await?;
    artifacts.set_video_duration(video_info.duration).await?;
    job.video_duration = Some(video_info.duration);

    info!(
        job_id = %job.job_id,
        duration = video_info.duration,
        resolution = format!("{}x{}", video_info.width, video_info.height),
        "Source media ready"
    );

    let ctx = StageContext {
        artifacts,
        blobs: Arc::clone(&inner.blobs),
        ml: Arc::clone(&inner.ml),
        api_key,
        config: Arc::clone(&inner.config),
        bus: Arc::clone(&inner.bus),
        cancel: cancel_rx,
        source_path,
        video_info,
        job,
        _workdir: Arc::new(workdir),
    };

    run_pipeline(&ctx).await
}

/// Report the upload band's completion (global 5%) as the pipeline starts.
async fn report_upload_band(
    inner: &SchedulerInner,
    artifacts: &JobArtifacts,
    job: &Job,
    message: &str,
) {
    let percent = Stage::Upload.global_percent(100.0);
    let effective = match artifacts.set_progress(Stage::Upload, percent, message).await {
        Ok(update) => update.effective_percent,
        Err(_) => percent,
    };
    inner.bus.publish(
        &job.job_id,
        ProgressRecord::progress(job.job_id.clone(), Stage::Upload, effective, message, None),
    );
}
