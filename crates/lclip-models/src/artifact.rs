//! Derived artifacts produced by the pipeline stages.
//!
//! All timestamps are seconds on the original video timeline unless noted
//! otherwise. Every artifact carries no back-reference to its job; the
//! artifact store is the only linkage.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a compiled clip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl ClipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A detected span of audio silence.
///
/// Regions are non-overlapping and sorted by start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SilenceRegion {
    /// Start on the original timeline (seconds)
    pub start: f64,
    /// End on the original timeline (seconds)
    pub end: f64,
    /// Detection threshold that produced this region (dBFS)
    pub threshold_dbfs: f32,
}

impl SilenceRegion {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A transcribed span of speech on the original timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Model-reported confidence, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl TranscriptSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Rectangular pixel region in source coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            w: width,
            h: height,
        }
    }
}

/// Detected video layout class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutType {
    SideBySide,
    PictureInPicture,
    #[default]
    ScreenOnly,
    CameraOnly,
    Unknown,
}

impl LayoutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutType::SideBySide => "side_by_side",
            LayoutType::PictureInPicture => "picture_in_picture",
            LayoutType::ScreenOnly => "screen_only",
            LayoutType::CameraOnly => "camera_only",
            LayoutType::Unknown => "unknown",
        }
    }
}

/// One layout analysis record per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LayoutAnalysis {
    pub layout_type: LayoutType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_region: Option<Region>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_region: Option<Region>,
    /// Fraction of the frame occupied by screen content, in [0, 1]
    pub split_ratio: f32,
    /// Detection confidence in [0, 1]; 0 indicates the safe fallback
    pub confidence: f32,
}

impl LayoutAnalysis {
    /// Safe default: screen-only covering the full frame, confidence 0.
    pub fn safe_default(width: u32, height: u32) -> Self {
        Self {
            layout_type: LayoutType::ScreenOnly,
            screen_region: Some(Region::full_frame(width, height)),
            camera_region: None,
            split_ratio: 1.0,
            confidence: 0.0,
        }
    }
}

/// Per-frame slide extraction record (vision mode only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SlideContent {
    /// Sample timestamp on the original timeline (seconds)
    pub timestamp: f64,
    pub text_blocks: Vec<String>,
    pub visual_elements: Vec<String>,
    pub key_concepts: Vec<String>,
}

/// A topical span of the lecture.
///
/// Segments are chronological and non-overlapping within a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContentSegment {
    pub start: f64,
    pub end: f64,
    /// Concise title, at most 100 characters
    pub topic: String,
    pub description: String,
    /// Importance score in [0, 1]
    pub importance: f32,
    pub keywords: Vec<String>,
    pub concepts: Vec<String>,
    /// Sequential order assigned after filtering, 1-based
    pub order: u32,
}

impl ContentSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Validate that content segments are chronological and non-overlapping.
///
/// Returns a description of the first violation found.
pub fn validate_content_segments(segments: &[ContentSegment]) -> Result<(), String> {
    for segment in segments {
        if segment.start >= segment.end {
            return Err(format!(
                "segment '{}' has start {:.2} >= end {:.2}",
                segment.topic, segment.start, segment.end
            ));
        }
    }
    for pair in segments.windows(2) {
        if pair[1].start < pair[0].start {
            return Err(format!(
                "segments '{}' and '{}' are out of chronological order",
                pair[0].topic, pair[1].topic
            ));
        }
        if pair[1].start < pair[0].end {
            return Err(format!(
                "segments '{}' and '{}' overlap ({:.2} < {:.2})",
                pair[0].topic, pair[1].topic, pair[1].start, pair[0].end
            ));
        }
    }
    Ok(())
}

/// A selected highlight clip.
///
/// Created in two phases: segment selection fills the timing and ranking
/// fields; compilation fills the blob keys and file size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    pub clip_id: ClipId,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    /// Rank by importance, 1-based
    pub order: u32,
    pub title: String,
    pub importance: f32,
    /// True if the start boundary was snapped to a silence edge
    #[serde(default)]
    pub start_adjusted: bool,
    /// True if the end boundary was snapped to a silence edge
    #[serde(default)]
    pub end_adjusted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl Clip {
    pub fn is_compiled(&self) -> bool {
        self.blob_key.is_some()
    }
}

/// Per-topic summary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopicSummary {
    pub topic: String,
    pub summary: String,
}

/// One summary per job, generated on demand from the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Summary {
    pub overview: String,
    pub key_points: Vec<String>,
    #[serde(default)]
    pub topic_summaries: Vec<TopicSummary>,
}

/// Multiple-choice quiz question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuizQuestion {
    pub question: String,
    /// Exactly four answer options
    pub options: Vec<String>,
    /// Index of the correct option
    pub answer_index: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// One quiz per job, generated on demand from the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Quiz {
    pub questions: Vec<QuizQuestion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64, topic: &str) -> ContentSegment {
        ContentSegment {
            start,
            end,
            topic: topic.to_string(),
            description: String::new(),
            importance: 0.5,
            keywords: vec![],
            concepts: vec![],
            order: 0,
        }
    }

    #[test]
    fn test_validate_content_segments_ok() {
        let segments = vec![
            segment(0.0, 100.0, "intro"),
            segment(100.0, 250.0, "body"),
            segment(300.0, 400.0, "outro"),
        ];
        assert!(validate_content_segments(&segments).is_ok());
    }

    #[test]
    fn test_validate_content_segments_overlap() {
        let segments = vec![segment(0.0, 120.0, "intro"), segment(100.0, 250.0, "body")];
        let err = validate_content_segments(&segments).unwrap_err();
        assert!(err.contains("overlap"));
    }

    #[test]
    fn test_validate_content_segments_out_of_order() {
        let segments = vec![segment(200.0, 300.0, "late"), segment(0.0, 100.0, "early")];
        assert!(validate_content_segments(&segments).is_err());
    }

    #[test]
    fn test_validate_content_segments_inverted() {
        let segments = vec![segment(100.0, 50.0, "inverted")];
        assert!(validate_content_segments(&segments).is_err());
    }

    #[test]
    fn test_layout_safe_default() {
        let layout = LayoutAnalysis::safe_default(1920, 1080);
        assert_eq!(layout.layout_type, LayoutType::ScreenOnly);
        assert_eq!(layout.confidence, 0.0);
        assert_eq!(layout.screen_region.unwrap().w, 1920);
        assert!(layout.camera_region.is_none());
    }

    #[test]
    fn test_clip_compiled() {
        let mut clip = Clip {
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
        assert!(!clip.is_compiled());
        clip.blob_key = Some("clips/job/clip.mp4".to_string());
        assert!(clip.is_compiled());
    }
}
