//! Progress frames streamed to live subscribers.
//!
//! These records travel over the progress bus and are forwarded verbatim as
//! JSON text frames by the WebSocket surface.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::stage::Stage;

/// The payload of an ordinary progress frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressPayload {
    pub stage: Stage,
    /// Global progress percentage, 0-100
    pub percent: f32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
}

/// A frame on the progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressRecord {
    /// Sent once by the subscriber surface immediately after connect
    Connected { job_id: JobId },

    /// Ordinary progress update; may be dropped for slow subscribers
    Progress {
        job_id: JobId,
        progress: ProgressPayload,
        timestamp: DateTime<Utc>,
    },

    /// Terminal frame: the job finished successfully
    Complete {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },

    /// Terminal frame: the job failed
    Error {
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Liveness reply to a client ping
    Pong,
}

impl ProgressRecord {
    /// Create a progress frame.
    pub fn progress(
        job_id: JobId,
        stage: Stage,
        percent: f32,
        message: impl Into<String>,
        eta_seconds: Option<u64>,
    ) -> Self {
        ProgressRecord::Progress {
            job_id,
            progress: ProgressPayload {
                stage,
                percent: percent.clamp(0.0, 100.0),
                message: message.into(),
                eta_seconds,
            },
            timestamp: Utc::now(),
        }
    }

    /// Create a completion frame.
    pub fn complete(job_id: JobId) -> Self {
        ProgressRecord::Complete {
            job_id,
            timestamp: Utc::now(),
        }
    }

    /// Create an error frame.
    pub fn error(job_id: JobId, message: impl Into<String>) -> Self {
        ProgressRecord::Error {
            job_id,
            error: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create the initial connected frame.
    pub fn connected(job_id: JobId) -> Self {
        ProgressRecord::Connected { job_id }
    }

    /// Terminal frames end the stream and are never dropped by the bus.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressRecord::Complete { .. } | ProgressRecord::Error { .. }
        )
    }

    /// The global percent carried by this frame, if any.
    pub fn percent(&self) -> Option<f32> {
        match self {
            ProgressRecord::Progress { progress, .. } => Some(progress.percent),
            _ => None,
        }
    }
}

/// Frames a client may send over the live progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_frame_shape() {
        let record = ProgressRecord::progress(
            JobId::from_string("job_1"),
            Stage::Transcribe,
            30.0,
            "Transcribing audio",
            Some(120),
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"type\":\"progress\""));
        assert!(json.contains("\"job_id\":\"job_1\""));
        assert!(json.contains("\"stage\":\"transcription\""));
        assert!(json.contains("\"percent\":30.0"));
        assert!(json.contains("\"eta_seconds\":120"));
    }

    #[test]
    fn test_error_frame_shape() {
        let record = ProgressRecord::error(JobId::from_string("job_1"), "boom");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("\"error\":\"boom\""));
        assert!(record.is_terminal());
    }

    #[test]
    fn test_connected_frame_shape() {
        let record = ProgressRecord::connected(JobId::from_string("job_1"));
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, "{\"type\":\"connected\",\"job_id\":\"job_1\"}");
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_percent_clamped() {
        let record = ProgressRecord::progress(
            JobId::from_string("job_1"),
            Stage::Upload,
            150.0,
            "",
            None,
        );
        assert_eq!(record.percent(), Some(100.0));
    }

    #[test]
    fn test_client_ping_parses() {
        let frame: ClientFrame = serde_json::from_str("{\"type\":\"ping\"}").unwrap();
        assert_eq!(frame, ClientFrame::Ping);
        let pong = serde_json::to_string(&ProgressRecord::Pong).unwrap();
        assert_eq!(pong, "{\"type\":\"pong\"}");
    }
}
