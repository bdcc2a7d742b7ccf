//! Notification hook for terminal jobs.
//!
//! The real notifier (email) lives outside the core; the controller calls
//! through this trait so deployments can plug one in.

use lclip_models::Job;
use tracing::info;

/// Called once per job when it reaches a terminal state.
pub trait Notifier: Send + Sync {
    fn job_finished(&self, job: &Job);
}

/// Default notifier: structured log line only.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn job_finished(&self, job: &Job) {
        info!(
            job_id = %job.job_id,
            status = %job.status,
            "Job reached terminal state"
        );
    }
}
