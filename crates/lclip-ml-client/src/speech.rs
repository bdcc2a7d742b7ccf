//! Speech capability: audio transcription.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::{GeminiClient, Part, DEFAULT_MODEL};
use crate::error::MlResult;
use crate::retry::with_retry;

const TRANSCRIPTION_PROMPT: &str = "Transcribe this audio file. Provide the transcription as \
plain text only, without any formatting, timestamps, or additional commentary. Just return the \
spoken words.";

/// One transcribed span on the *input audio* timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub confidence: Option<f32>,
}

/// A transcription result for one audio input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub segments: Vec<SpeechSegment>,
    /// Duration of the transcribed audio in seconds
    pub duration: f64,
    /// Best-effort advisory language tag; nothing downstream depends on it
    pub language: String,
}

impl GeminiClient {
    /// Transcribe an audio file.
    ///
    /// The model returns plain text; segment boundaries are estimated by
    /// sentence with length-proportional timestamps. Callers re-time the
    /// segments onto the original video timeline, so boundary precision is
    /// best-effort by design.
    pub async fn transcribe(
        &self,
        audio_path: &Path,
        audio_duration: f64,
        api_key: &str,
    ) -> MlResult<Transcription> {
        let (file_uri, file_name) = with_retry("speech.upload", || {
            self.upload_file(audio_path, "audio/mpeg", api_key)
        })
        .await?;

        let parts = [
            Part::FileData {
                mime_type: "audio/mpeg".to_string(),
                file_uri: file_uri.clone(),
            },
            Part::text(TRANSCRIPTION_PROMPT),
        ];

        let result = with_retry("speech.transcribe", || {
            self.generate(DEFAULT_MODEL, api_key, &parts, false)
        })
        .await;

        // The uploaded blob is no longer needed either way
        self.delete_file(&file_name, api_key).await;

        let text = result?;
        let segments = segments_from_text(&text, audio_duration);

        info!(
            segments = segments.len(),
            duration = audio_duration,
            "Transcription complete"
        );

        Ok(Transcription {
            text: text.trim().to_string(),
            segments,
            duration: audio_duration,
            language: "en".to_string(),
        })
    }
}

/// Split plain text into sentences and estimate timestamps proportional
/// to sentence length.
fn segments_from_text(text: &str, duration: f64) -> Vec<SpeechSegment> {
    let text = text.trim();
    if text.is_empty() || duration <= 0.0 {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    let total_chars: usize = text.chars().count();
    let mut segments = Vec::with_capacity(sentences.len());
    let mut cursor = 0.0;

    for sentence in sentences {
        let share = sentence.chars().count() as f64 / total_chars as f64;
        let end = (cursor + share * duration).min(duration);
        if end > cursor {
            segments.push(SpeechSegment {
                start: cursor,
                end,
                text: sentence,
                confidence: None,
            });
            cursor = end;
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_from_text_proportional() {
        let segments = segments_from_text("One. Two two. Three three three.", 10.0);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].start, 0.0);
        // Segments are contiguous and ordered
        for pair in segments.windows(2) {
            assert!((pair[0].end - pair[1].start).abs() < 1e-9);
        }
        // Longer sentences get longer spans
        assert!(segments[2].end - segments[2].start > segments[0].end - segments[0].start);
        assert!(segments.last().unwrap().end <= 10.0);
    }

    #[test]
    fn test_segments_from_text_no_terminator() {
        let segments = segments_from_text("no punctuation at all", 5.0);
        assert_eq!(segments.len(), 1);
        assert!((segments[0].end - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_segments_from_empty_text() {
        assert!(segments_from_text("   ", 5.0).is_empty());
        assert!(segments_from_text("hi.", 0.0).is_empty());
    }
}
