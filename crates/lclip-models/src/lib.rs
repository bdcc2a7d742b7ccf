//! Shared data models for the LectureClip backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their lifecycle state machine
//! - Pipeline stages and their global progress bands
//! - Derived artifacts (silence regions, transcripts, layout, slides,
//!   content segments, clips, summaries, quizzes)
//! - Processing configuration submitted with a job
//! - Progress frames streamed to live subscribers

pub mod artifact;
pub mod config;
pub mod job;
pub mod progress;
pub mod stage;

pub use artifact::{
    validate_content_segments, Clip, ClipId, ContentSegment, LayoutAnalysis, LayoutType, Quiz,
    QuizQuestion, Region, SilenceRegion, SlideContent, Summary, TopicSummary, TranscriptSegment,
};
pub use config::{ProcessingConfig, ProcessingMode, Resolution};
pub use job::{Job, JobId, JobSource, JobStatus, MediaDescriptor, PrincipalId};
pub use progress::{ClientFrame, ProgressPayload, ProgressRecord};
pub use stage::Stage;
