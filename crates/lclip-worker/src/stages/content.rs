//! ContentAnalyze: topical decomposition of the transcript.

use tracing::info;

use lclip_ml_client::RawContentSegment;
use lclip_models::{ContentSegment, SlideContent, Stage, TranscriptSegment};

use crate::config::WorkerConfig;
use crate::context::StageContext;
use crate::error::{StageError, StageResult};

pub async fn run(ctx: &StageContext) -> StageResult<()> {
    ctx.check_cancelled()?;
    let reporter = ctx.reporter(Stage::ContentAnalyze);
    reporter
        .report(0.0, "Analyzing content with AI", Some(180))
        .await;

    let transcripts = ctx.artifacts.transcript_segments().await?;
    if transcripts.is_empty() {
        return Err(StageError::MissingInput(
            "no transcript segments; transcription must complete first".to_string(),
        ));
    }
    let slides = ctx.artifacts.slide_content().await?;

    let transcript_text = format_transcript(&transcripts, &slides);
    reporter
        .report(25.0, "Requesting topic decomposition", Some(120))
        .await;

    let analysis = ctx
        .ml
        .analyze_content(
            &transcript_text,
            ctx.config.segment_min_seconds,
            ctx.config.segment_max_seconds,
            ctx.job.config.prompt.as_deref(),
            ctx.api_key.expose(),
        )
        .await?;
    ctx.check_cancelled()?;

    reporter.report(75.0, "Filtering segments", None).await;
    let raw_count = analysis.segments.len();
    let segments = filter_segments(analysis.segments, &ctx.config);
    let kept = segments.len();

    ctx.artifacts.replace_content_segments(segments).await?;

    info!(
        job_id = %ctx.job.job_id,
        raw_segments = raw_count,
        kept_segments = kept,
        "Content analysis completed"
    );
    reporter
        .report(100.0, &format!("Identified {} content segments", kept), None)
        .await;
    Ok(())
}

/// Render transcripts (and optional slide concepts) for the model prompt.
fn format_transcript(transcripts: &[TranscriptSegment], slides: &[SlideContent]) -> String {
    let mut lines: Vec<String> = transcripts
        .iter()
        .map(|t| format!("[{:.1}s - {:.1}s]: \"{}\"", t.start, t.end, t.text))
        .collect();

    if !slides.is_empty() {
        let mut concepts: Vec<&str> = Vec::new();
        for slide in slides {
            for concept in &slide.key_concepts {
                if !concepts.contains(&concept.as_str()) {
                    concepts.push(concept);
                }
            }
        }
        if !concepts.is_empty() {
            lines.push(String::new());
            lines.push(format!(
                "KEY CONCEPTS VISIBLE ON SLIDES: {}",
                concepts.join(", ")
            ));
        }
    }

    lines.join("\n")
}

/// Apply the importance and duration filters, enforce chronology, and
/// assign sequential order.
fn filter_segments(raw: Vec<RawContentSegment>, config: &WorkerConfig) -> Vec<ContentSegment> {
    let min_duration = config.segment_min_seconds as f64;
    let max_duration = config.segment_max_seconds as f64;

    let mut candidates: Vec<RawContentSegment> = raw
        .into_iter()
        .filter(|s| s.importance_score >= config.min_importance_score)
        .filter(|s| {
            let duration = s.end_time - s.start_time;
            duration >= min_duration && duration <= max_duration
        })
        .collect();

    candidates.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    // Drop anything overlapping its predecessor; the store rejects
    // overlapping writes outright
    let mut segments: Vec<ContentSegment> = Vec::with_capacity(candidates.len());
    let mut last_end = f64::NEG_INFINITY;
    for candidate in candidates {
        if candidate.start_time < last_end {
            continue;
        }
        last_end = candidate.end_time;

        let order = segments.len() as u32 + 1;
        let description = if candidate.description.trim().is_empty() {
            format!("Educational content about {}", candidate.topic)
        } else {
            candidate.description
        };
        segments.push(ContentSegment {
            start: candidate.start_time,
            end: candidate.end_time,
            topic: candidate.topic.chars().take(100).collect(),
            description,
            importance: candidate.importance_score.clamp(0.0, 1.0),
            keywords: candidate.keywords,
            concepts: candidate.concepts,
            order,
        });
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(start: f64, end: f64, importance: f32) -> RawContentSegment {
        RawContentSegment {
            start_time: start,
            end_time: end,
            topic: "Topic".to_string(),
            description: "About the topic".to_string(),
            importance_score: importance,
            keywords: vec![],
            concepts: vec![],
        }
    }

    #[test]
    fn test_importance_filter() {
        let config = WorkerConfig::default();
        let segments = filter_segments(
            vec![raw(0.0, 60.0, 0.9), raw(60.0, 120.0, 0.2), raw(120.0, 180.0, 0.3)],
            &config,
        );
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].order, 1);
        assert_eq!(segments[1].order, 2);
    }

    #[test]
    fn test_duration_filter() {
        let config = WorkerConfig::default();
        // 10s too short, 600s too long, 120s fine
        let segments = filter_segments(
            vec![
                raw(0.0, 10.0, 0.9),
                raw(10.0, 610.0, 0.9),
                raw(610.0, 730.0, 0.9),
            ],
            &config,
        );
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 610.0);
    }

    #[test]
    fn test_overlaps_dropped_after_sort() {
        let config = WorkerConfig::default();
        let segments = filter_segments(
            vec![raw(100.0, 200.0, 0.9), raw(0.0, 150.0, 0.8)],
            &config,
        );
        // Sorted chronologically; the overlapping later segment is dropped
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 0.0);
    }

    #[test]
    fn test_topic_truncated_to_100_chars() {
        let config = WorkerConfig::default();
        let mut long = raw(0.0, 60.0, 0.9);
        long.topic = "x".repeat(150);
        let segments = filter_segments(vec![long], &config);
        assert_eq!(segments[0].topic.chars().count(), 100);
    }

    #[test]
    fn test_blank_description_filled() {
        let config = WorkerConfig::default();
        let mut blank = raw(0.0, 60.0, 0.9);
        blank.description = "  ".to_string();
        let segments = filter_segments(vec![blank], &config);
        assert!(segments[0].description.contains("Topic"));
    }

    #[test]
    fn test_format_transcript_with_slides() {
        let transcripts = vec![TranscriptSegment {
            start: 0.0,
            end: 5.0,
            text: "hello".to_string(),
            confidence: None,
        }];
        let slides = vec![SlideContent {
            timestamp: 2.5,
            text_blocks: vec![],
            visual_elements: vec![],
            key_concepts: vec!["recursion".to_string()],
        }];
        let text = format_transcript(&transcripts, &slides);
        assert!(text.contains("[0.0s - 5.0s]: \"hello\""));
        assert!(text.contains("KEY CONCEPTS VISIBLE ON SLIDES: recursion"));
    }
}
