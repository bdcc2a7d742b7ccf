//! Gemini model gateway.
//!
//! Unified call surface to the three external model families used by the
//! pipeline: speech (audio transcription), vision (frame analysis), and
//! language (structured-JSON content operations). Every call binds the
//! per-job API key passed by the caller; the gateway itself never stores
//! credentials.
//!
//! Model responses are treated as untrusted: markdown fences are stripped,
//! JSON is parsed and shape-checked, and a shape failure is retried once
//! with an explicit corrective reminder before surfacing an error.

pub mod client;
pub mod error;
mod json;
pub mod language;
mod retry;
pub mod speech;
pub mod vision;

pub use client::{GeminiClient, DEFAULT_MODEL};
pub use error::{MlError, MlResult};
pub use language::{
    ContentAnalysis, QuizQuestionResponse, QuizResponse, RawContentSegment, SummaryResponse,
    TopicSummaryResponse,
};
pub use speech::{SpeechSegment, Transcription};
pub use vision::FrameAnalysis;
