//! Pipeline stages and their global progress bands.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A pipeline stage. The DAG over these stages is fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Stage {
    /// Client upload / dispatch, before the first worker stage
    #[serde(rename = "uploading")]
    Upload,
    /// Audio silence analysis
    #[serde(rename = "silence_detection")]
    SilenceDetect,
    /// Screen/camera layout heuristics
    #[serde(rename = "layout_detection")]
    LayoutDetect,
    /// Silence-aware transcription
    #[serde(rename = "transcription")]
    Transcribe,
    /// Slide content extraction (vision mode only)
    #[serde(rename = "image_extraction")]
    ImageExtract,
    /// Topical decomposition of the transcript
    #[serde(rename = "content_analysis")]
    ContentAnalyze,
    /// Highlight selection and boundary snapping
    #[serde(rename = "segmentation")]
    SegmentSelect,
    /// Per-clip compilation and upload
    #[serde(rename = "compilation")]
    CompileClips,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "uploading",
            Stage::SilenceDetect => "silence_detection",
            Stage::LayoutDetect => "layout_detection",
            Stage::Transcribe => "transcription",
            Stage::ImageExtract => "image_extraction",
            Stage::ContentAnalyze => "content_analysis",
            Stage::SegmentSelect => "segmentation",
            Stage::CompileClips => "compilation",
        }
    }

    /// The contiguous sub-range of overall job progress allocated to this
    /// stage. Parallel stages share a band.
    pub fn band(&self) -> (f32, f32) {
        match self {
            Stage::Upload => (0.0, 5.0),
            Stage::SilenceDetect => (5.0, 15.0),
            Stage::LayoutDetect => (5.0, 15.0),
            Stage::Transcribe => (15.0, 45.0),
            Stage::ImageExtract => (15.0, 45.0),
            Stage::ContentAnalyze => (45.0, 60.0),
            Stage::SegmentSelect => (60.0, 70.0),
            Stage::CompileClips => (70.0, 100.0),
        }
    }

    /// Map a stage-local percentage (0-100) into the global progress scale.
    pub fn global_percent(&self, stage_percent: f32) -> f32 {
        let (lo, hi) = self.band();
        let clamped = stage_percent.clamp(0.0, 100.0);
        lo + (hi - lo) * clamped / 100.0
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands_cover_zero_to_hundred() {
        assert_eq!(Stage::Upload.band().0, 0.0);
        assert_eq!(Stage::CompileClips.band().1, 100.0);
        // Sequential stages are contiguous
        assert_eq!(Stage::SilenceDetect.band().1, Stage::Transcribe.band().0);
        assert_eq!(Stage::Transcribe.band().1, Stage::ContentAnalyze.band().0);
        assert_eq!(Stage::ContentAnalyze.band().1, Stage::SegmentSelect.band().0);
        assert_eq!(Stage::SegmentSelect.band().1, Stage::CompileClips.band().0);
        // Parallel siblings share their band
        assert_eq!(Stage::SilenceDetect.band(), Stage::LayoutDetect.band());
        assert_eq!(Stage::Transcribe.band(), Stage::ImageExtract.band());
    }

    #[test]
    fn test_global_percent_scaling() {
        assert_eq!(Stage::Transcribe.global_percent(0.0), 15.0);
        assert_eq!(Stage::Transcribe.global_percent(50.0), 30.0);
        assert_eq!(Stage::Transcribe.global_percent(100.0), 45.0);
        // Out-of-range input is clamped
        assert_eq!(Stage::Transcribe.global_percent(150.0), 45.0);
        assert_eq!(Stage::Transcribe.global_percent(-10.0), 15.0);
    }

    #[test]
    fn test_stage_serialization() {
        let json = serde_json::to_string(&Stage::SilenceDetect).unwrap();
        assert_eq!(json, "\"silence_detection\"");
        let back: Stage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Stage::SilenceDetect);
    }
}
