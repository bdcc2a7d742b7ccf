//! Job definitions and lifecycle state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::ProcessingConfig;
use crate::stage::Stage;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new job ID of the form `job_{yyyymmddhhmmss}_{hex8}`.
    pub fn new() -> Self {
        let timestamp = Utc::now().format("%Y%m%d%H%M%S");
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("job_{}_{}", timestamp, &random[..8]))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity of the job owner, as issued by the auth surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job accepted, waiting for upload / dispatch
    #[default]
    Queued,
    /// Pipeline is executing
    Running,
    /// All stages finished
    Completed,
    /// Pipeline terminated with an error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal states are absorbing; no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Check whether `self -> next` is a legal transition.
    ///
    /// Legal transitions: queued -> running -> {completed, failed}.
    /// Queued jobs may also fail directly (e.g. missing credential).
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Running) => true,
            (JobStatus::Queued, JobStatus::Failed) => true,
            (JobStatus::Running, JobStatus::Completed) => true,
            (JobStatus::Running, JobStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the original media came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    #[default]
    Upload,
    Youtube,
}

/// Descriptor of the original media file as submitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MediaDescriptor {
    /// Original filename (1-255 chars, no path separators)
    pub filename: String,

    /// Declared size in bytes
    pub file_size: u64,

    /// Declared MIME type
    pub content_type: String,

    /// Media source
    #[serde(default)]
    pub source: JobSource,
}

/// A video processing job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub job_id: JobId,

    /// Owning principal
    pub principal_id: PrincipalId,

    /// Original media descriptor
    pub descriptor: MediaDescriptor,

    /// Blob key of the uploaded original
    pub original_blob_key: String,

    /// Processing configuration
    #[serde(default)]
    pub config: ProcessingConfig,

    /// Lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Stage currently executing (while running)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,

    /// Global progress, 0-100, non-decreasing while running
    #[serde(default)]
    pub progress_percent: f32,

    /// Human-readable progress message
    #[serde(default)]
    pub progress_message: String,

    /// Error message, present iff failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Video duration in seconds, populated by the first probing stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_duration: Option<f64>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Completion timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(
        principal_id: PrincipalId,
        descriptor: MediaDescriptor,
        original_blob_key: impl Into<String>,
        config: ProcessingConfig,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            principal_id,
            descriptor,
            original_blob_key: original_blob_key.into(),
            config,
            status: JobStatus::Queued,
            current_stage: None,
            progress_percent: 0.0,
            progress_message: String::new(),
            error: None,
            video_duration: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> MediaDescriptor {
        MediaDescriptor {
            filename: "lecture.mp4".to_string(),
            file_size: 1024,
            content_type: "video/mp4".to_string(),
            source: JobSource::Upload,
        }
    }

    #[test]
    fn test_job_id_format() {
        let id = JobId::new();
        assert!(id.as_str().starts_with("job_"));
        let parts: Vec<&str> = id.as_str().splitn(3, '_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 14);
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));

        // No transitions out of terminal states
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
        // And no skipping the running state forward
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = Job::new(
            PrincipalId::new("user-1"),
            descriptor(),
            "uploads/job_x/original.mp4",
            ProcessingConfig::default(),
        );
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.error.is_none());
        assert!(!job.is_terminal());
    }
}
