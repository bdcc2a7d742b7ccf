//! Vision capability: per-frame slide analysis.

use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::client::{GeminiClient, Part, DEFAULT_MODEL};
use crate::error::{MlError, MlResult};

const FRAME_PROMPT: &str = r#"Analyze this lecture slide frame. Identify the visible text, any
visual elements (diagrams, charts, code blocks, equations, images), and the key concepts being
presented.

Return ONLY a JSON object with this exact shape (no markdown):
{
  "text_blocks": ["visible text block", "..."],
  "visual_elements": ["diagram", "chart", "..."],
  "key_concepts": ["concept", "..."]
}"#;

/// Structured analysis of one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub text_blocks: Vec<String>,
    pub visual_elements: Vec<String>,
    pub key_concepts: Vec<String>,
}

impl GeminiClient {
    /// Analyze a single frame image (JPEG).
    pub async fn analyze_frame(&self, image_path: &Path, api_key: &str) -> MlResult<FrameAnalysis> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| MlError::transient(format!("failed to read frame: {}", e)))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

        let parts = [
            Part::InlineData {
                mime_type: "image/jpeg".to_string(),
                data: encoded,
            },
            Part::text(FRAME_PROMPT),
        ];

        self.generate_shaped("vision.analyze_frame", DEFAULT_MODEL, api_key, &parts)
            .await
    }
}
