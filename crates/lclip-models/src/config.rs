//! Processing configuration submitted with a job.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target output resolution for compiled clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum Resolution {
    #[serde(rename = "480p")]
    R480p,
    #[default]
    #[serde(rename = "720p")]
    R720p,
    #[serde(rename = "1080p")]
    R1080p,
    #[serde(rename = "4k")]
    R4k,
}

impl Resolution {
    /// Output dimensions (width, height) in landscape orientation.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::R480p => (854, 480),
            Resolution::R720p => (1280, 720),
            Resolution::R1080p => (1920, 1080),
            Resolution::R4k => (3840, 2160),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::R480p => "480p",
            Resolution::R720p => "720p",
            Resolution::R1080p => "1080p",
            Resolution::R4k => "4k",
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "480p" => Ok(Resolution::R480p),
            "720p" => Ok(Resolution::R720p),
            "1080p" => Ok(Resolution::R1080p),
            "4k" => Ok(Resolution::R4k),
            other => Err(format!("unknown resolution: {}", other)),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline processing mode.
///
/// Vision mode additionally runs slide-content extraction against the
/// detected screen region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    #[default]
    Audio,
    Vision,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Audio => "audio",
            ProcessingMode::Vision => "vision",
        }
    }
}

/// Per-job processing options.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ProcessingConfig {
    /// Target clip resolution
    #[serde(default)]
    pub resolution: Resolution,

    /// Audio-only or vision pipeline
    #[serde(default)]
    pub processing_mode: ProcessingMode,

    /// Throttle external model calls (shared keys on free tiers)
    #[serde(default)]
    pub rate_limit_mode: bool,

    /// Optional user prompt forwarded to content analysis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_serde_names() {
        assert_eq!(serde_json::to_string(&Resolution::R720p).unwrap(), "\"720p\"");
        assert_eq!(serde_json::to_string(&Resolution::R4k).unwrap(), "\"4k\"");
        let r: Resolution = serde_json::from_str("\"1080p\"").unwrap();
        assert_eq!(r, Resolution::R1080p);
    }

    #[test]
    fn test_resolution_dimensions() {
        assert_eq!(Resolution::R720p.dimensions(), (1280, 720));
        assert_eq!(Resolution::R1080p.dimensions(), (1920, 1080));
    }

    #[test]
    fn test_default_config() {
        let config = ProcessingConfig::default();
        assert_eq!(config.resolution, Resolution::R720p);
        assert_eq!(config.processing_mode, ProcessingMode::Audio);
        assert!(!config.rate_limit_mode);
        assert!(config.prompt.is_none());
    }

    #[test]
    fn test_config_from_empty_json() {
        let config: ProcessingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.resolution, Resolution::R720p);
    }
}
