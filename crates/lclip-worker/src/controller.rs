//! Job controller: submission validation, credential binding, dispatch,
//! cancellation, and terminal-state handling.

use std::sync::Arc;

use tracing::info;

use lclip_bus::ProgressBus;
use lclip_models::{Job, JobId, JobStatus, MediaDescriptor, PrincipalId, ProcessingConfig};
use lclip_storage::{upload_key, BlobStore, UploadGrant};
use lclip_store::ArtifactStore;

use crate::config::WorkerConfig;
use crate::credentials::CredentialVault;
use crate::error::{WorkerError, WorkerResult};
use crate::notify::Notifier;
use crate::scheduler::{finalize_job, JobOutcome, JobScheduler};

/// Result of a successful submission.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub job: Job,
    pub grant: UploadGrant,
}

/// Owns the job lifecycle from submission to terminal state.
#[derive(Clone)]
pub struct JobController {
    store: Arc<dyn ArtifactStore>,
    blobs: Arc<BlobStore>,
    bus: Arc<ProgressBus>,
    vault: CredentialVault,
    scheduler: JobScheduler,
    config: Arc<WorkerConfig>,
    notifier: Arc<dyn Notifier>,
}

impl JobController {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        blobs: Arc<BlobStore>,
        bus: Arc<ProgressBus>,
        vault: CredentialVault,
        scheduler: JobScheduler,
        config: Arc<WorkerConfig>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            blobs,
            bus,
            vault,
            scheduler,
            config,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.blobs
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    pub fn config(&self) -> &Arc<WorkerConfig> {
        &self.config
    }

    /// Validate a submission, bind the principal's stored credential, and
    /// create the queued job row plus its upload grant.
    ///
    /// A principal without a stored model API key fails here with
    /// `MissingCredential`, before any state is created.
    pub async fn submit(
        &self,
        principal: PrincipalId,
        descriptor: MediaDescriptor,
        config: ProcessingConfig,
    ) -> WorkerResult<SubmitOutcome> {
        validate_descriptor(&descriptor, &self.config)?;

        // Fail fast on missing credentials; the key itself is re-bound at
        // processing time
        self.vault.load_key(&principal).await?;

        let job = Job::new(principal, descriptor, "", config);
        let blob_key = upload_key(job.job_id.as_str(), &job.descriptor.filename);
        let job = Job {
            original_blob_key: blob_key.clone(),
            ..job
        };

        self.store.create_job(&job).await?;
        let grant = self
            .blobs
            .issue_upload_grant(&blob_key, &job.descriptor.content_type)
            .await?;

        info!(
            job_id = %job.job_id,
            principal = %job.principal_id,
            filename = %job.descriptor.filename,
            "Job submitted"
        );
        metrics::counter!("lclip_jobs_submitted_total").increment(1);

        Ok(SubmitOutcome { job, grant })
    }

    /// Start the pipeline for an uploaded job.
    ///
    /// Verifies the upload exists, enforces the per-principal running-job
    /// cap, decrypts the model credential, and dispatches to the scheduler.
    /// Re-processing a job that already ran is rejected.
    pub async fn begin_processing(
        &self,
        job_id: &JobId,
        principal: &PrincipalId,
    ) -> WorkerResult<()> {
        let job = self.get_owned_job(job_id, principal).await?;

        match job.status {
            JobStatus::Queued => {}
            JobStatus::Running => {
                return Err(WorkerError::conflict(format!(
                    "job {} is already processing",
                    job_id
                )))
            }
            JobStatus::Completed | JobStatus::Failed => {
                return Err(WorkerError::conflict(format!(
                    "job {} already finished; submit a new job instead",
                    job_id
                )))
            }
        }

        if !self.blobs.exists(&job.original_blob_key).await? {
            return Err(WorkerError::validation(format!(
                "upload not found at {}",
                job.original_blob_key
            )));
        }

        let running = self.store.running_job_count(principal).await?;
        if running >= self.config.concurrent_jobs_per_principal {
            return Err(WorkerError::QuotaExceeded(format!(
                "{} jobs already running (limit {})",
                running, self.config.concurrent_jobs_per_principal
            )));
        }

        let api_key = self.vault.load_key(principal).await?;
        self.scheduler.dispatch(job, api_key).await
    }

    /// Cancel a job. Running jobs get the cancel signal (and finalize
    /// through the pipeline); queued jobs are failed directly.
    pub async fn cancel(&self, job_id: &JobId, principal: &PrincipalId) -> WorkerResult<()> {
        let job = self.get_owned_job(job_id, principal).await?;

        match job.status {
            JobStatus::Running => {
                if self.scheduler.cancel(job_id).await {
                    info!(job_id = %job_id, "Cancellation signalled");
                    Ok(())
                } else {
                    // Running in the store but unknown here (e.g. process
                    // restart): finalize directly
                    self.terminal(job_id, JobOutcome::Failed("Processing canceled".into()))
                        .await
                }
            }
            JobStatus::Queued => {
                self.terminal(
                    job_id,
                    JobOutcome::Failed("Canceled before processing started".into()),
                )
                .await
            }
            JobStatus::Completed | JobStatus::Failed => Err(WorkerError::conflict(format!(
                "job {} already finished",
                job_id
            ))),
        }
    }

    /// Record a terminal outcome. Idempotent; double terminals coalesce.
    pub async fn terminal(&self, job_id: &JobId, outcome: JobOutcome) -> WorkerResult<()> {
        finalize_job(
            &self.store,
            &self.bus,
            self.notifier.as_ref(),
            job_id,
            outcome,
        )
        .await
    }

    /// Delete a job and everything it owns: artifact rows, blobs, and the
    /// progress topic.
    pub async fn delete(&self, job_id: &JobId, principal: &PrincipalId) -> WorkerResult<()> {
        let job = self.get_owned_job(job_id, principal).await?;
        if job.status == JobStatus::Running {
            return Err(WorkerError::conflict(format!(
                "job {} is processing; cancel it first",
                job_id
            )));
        }

        self.store.delete_job(job_id).await?;
        for prefix in [
            format!("uploads/{}/", job_id),
            format!("clips/{}/", job_id),
            format!("thumbnails/{}/", job_id),
            format!("subtitles/{}/", job_id),
        ] {
            self.blobs.delete_prefix(&prefix).await?;
        }
        self.bus.release(job_id);

        info!(job_id = %job_id, "Job deleted");
        Ok(())
    }

    /// Load a job and verify ownership.
    pub async fn get_owned_job(
        &self,
        job_id: &JobId,
        principal: &PrincipalId,
    ) -> WorkerResult<Job> {
        let job = self.store.get_job(job_id).await.map_err(|e| match e {
            lclip_store::StoreError::NotFound(_) => {
                WorkerError::not_found(format!("job {}", job_id))
            }
            other => WorkerError::Store(other),
        })?;
        if job.principal_id != *principal {
            // Indistinguishable from absent, by design
            return Err(WorkerError::not_found(format!("job {}", job_id)));
        }
        Ok(job)
    }
}

/// Validate the submitted media descriptor.
fn validate_descriptor(descriptor: &MediaDescriptor, config: &WorkerConfig) -> WorkerResult<()> {
    let filename = descriptor.filename.trim();
    if filename.is_empty() || filename.len() > 255 {
        return Err(WorkerError::validation(
            "filename must be 1-255 characters",
        ));
    }
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(WorkerError::validation(
            "filename must not contain path separators",
        ));
    }

    if descriptor.file_size == 0 {
        return Err(WorkerError::validation("file size must be greater than 0"));
    }
    if descriptor.file_size > config.max_upload_size_bytes {
        return Err(WorkerError::validation(format!(
            "file size {} exceeds the {} byte limit",
            descriptor.file_size, config.max_upload_size_bytes
        )));
    }

    if !config
        .allowed_content_types
        .iter()
        .any(|t| t.eq_ignore_ascii_case(&descriptor.content_type))
    {
        return Err(WorkerError::validation(format!(
            "content type {} is not allowed",
            descriptor.content_type
        )));
    }

    let lowered = filename.to_lowercase();
    if !config
        .allowed_extensions
        .iter()
        .any(|ext| lowered.ends_with(ext.as_str()))
    {
        return Err(WorkerError::validation(format!(
            "file extension of {} is not allowed",
            filename
        )));
    }

    Ok(())
}
