//! Language capability: structured-JSON content operations.

use serde::{Deserialize, Serialize};

use crate::client::{GeminiClient, Part, DEFAULT_MODEL};
use crate::error::MlResult;

/// A topical segment as returned by content analysis, before filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContentSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub topic: String,
    #[serde(default)]
    pub description: String,
    pub importance_score: f32,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
}

/// Declared shape of the content-analysis response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub segments: Vec<RawContentSegment>,
}

/// Declared shape of the summary response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub overview: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub topic_summaries: Vec<TopicSummaryResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummaryResponse {
    pub topic: String,
    pub summary: String,
}

/// Declared shape of the quiz response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResponse {
    pub questions: Vec<QuizQuestionResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestionResponse {
    pub question: String,
    pub options: Vec<String>,
    pub answer_index: u8,
    #[serde(default)]
    pub explanation: Option<String>,
}

fn content_prompt(
    transcript: &str,
    min_duration: u64,
    max_duration: u64,
    user_prompt: Option<&str>,
) -> String {
    let focus = user_prompt
        .filter(|p| !p.trim().is_empty())
        .map(|p| format!("\nADDITIONAL FOCUS FROM THE USER:\n{}\n", p.trim()))
        .unwrap_or_default();

    format!(
        r#"You are analyzing an educational lecture transcript to identify key content segments
for highlight extraction.

TRANSCRIPT (time-stamped):
{transcript}
{focus}
TASK:
Identify 5-15 distinct educational segments. For each segment provide:

1. "start_time" and "end_time" (in seconds, from the transcript timestamps)
2. "topic" (concise title, maximum 100 characters)
3. "description" (2-3 sentence summary of what's covered)
4. "importance_score" (float 0.0-1.0):
   - 0.9-1.0: Core concepts, critical explanations, fundamental principles
   - 0.7-0.8: Important examples, key details, significant demonstrations
   - 0.5-0.6: Supporting content, additional context, review material
   - 0.3-0.4: Minor topics, tangential discussions
   - 0.0-0.2: Off-topic content, administrative notes, digressions
5. "keywords" (list of 5-10 key terms)
6. "concepts" (list of 2-5 academic concepts or learning objectives)

RULES:
- Segments should be {min_duration} seconds to {max_duration} seconds long
- No overlapping segments
- Segments must be in chronological order
- Focus on educational value and learning outcomes
- Use exact timestamps from the transcript

OUTPUT FORMAT (return ONLY valid JSON, no markdown):
{{
  "segments": [
    {{
      "start_time": 0.0,
      "end_time": 125.5,
      "topic": "Introduction to Neural Networks",
      "description": "Overview of artificial neural networks...",
      "importance_score": 0.85,
      "keywords": ["neural networks", "AI", "machine learning"],
      "concepts": ["supervised learning", "backpropagation"]
    }}
  ]
}}"#
    )
}

fn summary_prompt(transcript: &str) -> String {
    format!(
        r#"Summarize this educational lecture transcript for a student reviewing the material.

TRANSCRIPT:
{transcript}

Return ONLY a JSON object with this exact shape (no markdown):
{{
  "overview": "2-4 sentence overview of the whole lecture",
  "key_points": ["most important takeaway", "..."],
  "topic_summaries": [
    {{ "topic": "Topic title", "summary": "2-3 sentence summary of this topic" }}
  ]
}}"#
    )
}

fn quiz_prompt(transcript: &str, question_count: u32) -> String {
    format!(
        r#"Create a multiple-choice quiz from this educational lecture transcript.

TRANSCRIPT:
{transcript}

Write {question_count} questions testing understanding of the material, each with exactly four
options and one correct answer.

Return ONLY a JSON object with this exact shape (no markdown):
{{
  "questions": [
    {{
      "question": "What is ...?",
      "options": ["A", "B", "C", "D"],
      "answer_index": 0,
      "explanation": "Why this answer is correct"
    }}
  ]
}}"#
    )
}

impl GeminiClient {
    /// Decompose a transcript into topical segments with importance scores.
    pub async fn analyze_content(
        &self,
        transcript: &str,
        min_segment_seconds: u64,
        max_segment_seconds: u64,
        user_prompt: Option<&str>,
        api_key: &str,
    ) -> MlResult<ContentAnalysis> {
        let prompt = content_prompt(
            transcript,
            min_segment_seconds,
            max_segment_seconds,
            user_prompt,
        );
        self.generate_shaped(
            "language.analyze_content",
            DEFAULT_MODEL,
            api_key,
            &[Part::text(prompt)],
        )
        .await
    }

    /// Generate a lecture summary.
    pub async fn generate_summary(
        &self,
        transcript: &str,
        api_key: &str,
    ) -> MlResult<SummaryResponse> {
        self.generate_shaped(
            "language.generate_summary",
            DEFAULT_MODEL,
            api_key,
            &[Part::text(summary_prompt(transcript))],
        )
        .await
    }

    /// Generate a multiple-choice quiz.
    pub async fn generate_quiz(
        &self,
        transcript: &str,
        question_count: u32,
        api_key: &str,
    ) -> MlResult<QuizResponse> {
        self.generate_shaped(
            "language.generate_quiz",
            DEFAULT_MODEL,
            api_key,
            &[Part::text(quiz_prompt(transcript, question_count))],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generation_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [
                { "content": { "parts": [ { "text": text } ] } }
            ]
        })
    }

    #[test]
    fn test_content_prompt_includes_user_focus() {
        let prompt = content_prompt("[0.0s - 5.0s]: \"hi\"", 30, 300, Some("focus on proofs"));
        assert!(prompt.contains("focus on proofs"));
        assert!(prompt.contains("30 seconds to 300 seconds"));

        let prompt = content_prompt("t", 30, 300, None);
        assert!(!prompt.contains("ADDITIONAL FOCUS"));
    }

    #[tokio::test]
    async fn test_analyze_content_parses_fenced_json() {
        let server = MockServer::start().await;
        let payload = "```json\n{\"segments\": [{\"start_time\": 0.0, \"end_time\": 60.0, \
            \"topic\": \"Intro\", \"description\": \"d\", \"importance_score\": 0.9, \
            \"keywords\": [], \"concepts\": []}]}\n```";
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generation_body(payload)))
            .mount(&server)
            .await;

        let client = GeminiClient::new().with_base_url(server.uri());
        let analysis = client
            .analyze_content("transcript", 30, 300, None, "key")
            .await
            .unwrap();
        assert_eq!(analysis.segments.len(), 1);
        assert_eq!(analysis.segments[0].topic, "Intro");
    }

    #[tokio::test]
    async fn test_shape_failure_triggers_corrective_retry() {
        let server = MockServer::start().await;

        // First call: prose instead of JSON. Corrective call (identified by
        // the appended reminder) returns the valid shape.
        Mock::given(method("POST"))
            .and(body_string_contains("previous reply was not valid JSON"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generation_body(
                "{\"segments\": []}",
            )))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(generation_body(
                "Here are your segments! They look great.",
            )))
            .mount(&server)
            .await;

        let client = GeminiClient::new().with_base_url(server.uri());
        let analysis = client
            .analyze_content("transcript", 30, 300, None, "key")
            .await
            .unwrap();
        assert!(analysis.segments.is_empty());
    }
}
