//! Pipeline execution for LectureClip.
//!
//! This crate owns:
//! - the seven stage workers (`stages`),
//! - the fixed-DAG executor with per-stage timeout/retry/degrade policy
//!   (`dag`),
//! - the job controller and in-process scheduler (`controller`,
//!   `scheduler`),
//! - the encrypted credential vault (`credentials`),
//! - on-demand summary/quiz generation (`insights`).

pub mod config;
pub mod context;
pub mod controller;
pub mod credentials;
pub mod dag;
pub mod error;
pub mod insights;
pub mod notify;
pub mod scheduler;
pub mod stages;

pub use config::WorkerConfig;
pub use context::StageContext;
pub use controller::{JobController, SubmitOutcome};
pub use credentials::{ApiKey, CredentialVault};
pub use error::{ErrorClass, StageError, StageResult, WorkerError, WorkerResult};
pub use dag::{run_pipeline, run_stage, Severity, StageOutcome, StagePolicy};
pub use notify::{LogNotifier, Notifier};
pub use scheduler::{JobOutcome, JobScheduler};
