//! Transcribe: silence-aware compression, chunked transcription, and
//! timestamp remapping onto the original timeline.

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tempfile::TempDir;
use tracing::{info, warn};

use lclip_media::audio::{concat_keep_intervals, slice_audio};
use lclip_media::timeline::{keep_intervals, plan_chunks, ChunkPlan, TimestampMap};
use lclip_ml_client::SpeechSegment;
use lclip_models::{Stage, TranscriptSegment};

use crate::context::StageContext;
use crate::error::StageResult;

/// Compressed audio above this size is chunked.
const MAX_AUDIO_BYTES: u64 = 10 * 1024 * 1024;

/// Compressed audio longer than this is chunked, and each chunk is at most
/// this long.
const MAX_CHUNK_SECONDS: f64 = 300.0;

/// Below this much kept audio the stage succeeds with an empty transcript.
const MIN_KEPT_SECONDS: f64 = 3.0;

/// Chunks transcribed concurrently.
const PARALLEL_CHUNKS: usize = 3;

pub async fn run(ctx: &StageContext) -> StageResult<()> {
    ctx.check_cancelled()?;
    let reporter = ctx.reporter(Stage::Transcribe);
    reporter
        .report(0.0, "Preparing audio for transcription", Some(300))
        .await;

    let silence = ctx.artifacts.silence_regions().await?;
    let duration = ctx.video_info.duration;

    // Keep-intervals: the complement of the silence regions
    let keeps = keep_intervals(&silence, duration);
    let kept_seconds: f64 = keeps.iter().map(|k| k.duration()).sum();

    if kept_seconds < MIN_KEPT_SECONDS {
        // Entirely (or nearly) silent video: success with no output
        info!(
            job_id = %ctx.job.job_id,
            kept_seconds = format!("{:.2}", kept_seconds),
            "Not enough non-silent audio to transcribe"
        );
        ctx.artifacts.replace_transcript_segments(Vec::new()).await?;
        reporter
            .report(100.0, "No non-silent audio to transcribe", None)
            .await;
        return Ok(());
    }

    let map = TimestampMap::build(&keeps);
    let workdir = TempDir::new()?;
    let compressed = workdir.path().join("compressed.mp3");

    concat_keep_intervals(&ctx.source_path, &compressed, &keeps, &ctx.runner()).await?;
    ctx.check_cancelled()?;

    let compressed_bytes = tokio::fs::metadata(&compressed).await?.len();
    let compressed_seconds = map.compressed_duration();
    reporter
        .report(25.0, "Transcribing audio", Some(240))
        .await;

    let needs_chunking =
        compressed_bytes > MAX_AUDIO_BYTES || compressed_seconds > MAX_CHUNK_SECONDS;

    let speech_segments = if needs_chunking {
        info!(
            job_id = %ctx.job.job_id,
            compressed_mb = format!("{:.2}", compressed_bytes as f64 / (1024.0 * 1024.0)),
            compressed_seconds = format!("{:.1}", compressed_seconds),
            "Compressed audio exceeds single-request limits, chunking"
        );
        transcribe_chunked(ctx, &workdir, &compressed, compressed_seconds).await?
    } else {
        ctx.ml
            .transcribe(&compressed, compressed_seconds, ctx.api_key.expose())
            .await?
            .segments
    };
    ctx.check_cancelled()?;

    reporter
        .report(75.0, "Aligning transcript to video timeline", None)
        .await;

    let (segments, dropped) = remap_segments(&speech_segments, &map, duration);
    if dropped > 0 {
        warn!(
            job_id = %ctx.job.job_id,
            dropped,
            "Dropped transcript segments outside the timestamp map"
        );
    }

    let count = segments.len();
    ctx.artifacts.replace_transcript_segments(segments).await?;

    info!(job_id = %ctx.job.job_id, segments = count, "Transcription completed");
    reporter
        .report(100.0, &format!("Transcribed {} segments", count), None)
        .await;
    Ok(())
}

/// Split the compressed stream into ≤300-second chunks and transcribe up to
/// three concurrently, shifting each chunk's timestamps by its offset.
async fn transcribe_chunked(
    ctx: &StageContext,
    workdir: &TempDir,
    compressed: &std::path::Path,
    compressed_seconds: f64,
) -> StageResult<Vec<SpeechSegment>> {
    let chunks = plan_chunks(compressed_seconds, MAX_CHUNK_SECONDS);
    info!(
        job_id = %ctx.job.job_id,
        chunks = chunks.len(),
        "Starting parallel chunked transcription"
    );

    let results: Vec<Vec<SpeechSegment>> = stream::iter(chunks.into_iter().map(|chunk| {
        let chunk_path = workdir.path().join(format!("chunk_{}.mp3", chunk.index));
        async move { transcribe_chunk(ctx, chunk, compressed, &chunk_path).await }
    }))
    .buffered(PARALLEL_CHUNKS)
    .try_collect()
    .await?;

    Ok(results.into_iter().flatten().collect())
}

async fn transcribe_chunk(
    ctx: &StageContext,
    chunk: ChunkPlan,
    compressed: &std::path::Path,
    chunk_path: &std::path::Path,
) -> StageResult<Vec<SpeechSegment>> {
    ctx.check_cancelled()?;
    slice_audio(
        compressed,
        chunk_path,
        chunk.offset,
        chunk.duration,
        &ctx.runner(),
    )
    .await?;

    let transcription = ctx
        .ml
        .transcribe(chunk_path, chunk.duration, ctx.api_key.expose())
        .await?;

    Ok(transcription
        .segments
        .into_iter()
        .map(|mut segment| {
            segment.start += chunk.offset;
            segment.end += chunk.offset;
            segment
        })
        .collect())
}

/// Translate compressed-timeline segments onto the original timeline,
/// dropping any whose endpoints fall outside the map.
fn remap_segments(
    speech: &[SpeechSegment],
    map: &TimestampMap,
    video_duration: f64,
) -> (Vec<TranscriptSegment>, usize) {
    let mut segments = Vec::with_capacity(speech.len());
    let mut dropped = 0usize;

    for segment in speech {
        match map.remap_segment(segment.start, segment.end) {
            Some((start, end)) => {
                let start = round2(start);
                let end = round2(end.min(video_duration));
                if end > start {
                    segments.push(TranscriptSegment {
                        start,
                        end,
                        text: segment.text.trim().to_string(),
                        confidence: segment.confidence,
                    });
                } else {
                    dropped += 1;
                }
            }
            None => dropped += 1,
        }
    }

    (segments, dropped)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use lclip_media::timeline::keep_intervals;
    use lclip_models::SilenceRegion;

    fn region(start: f64, end: f64) -> SilenceRegion {
        SilenceRegion {
            start,
            end,
            threshold_dbfs: -40.0,
        }
    }

    fn speech(start: f64, end: f64, text: &str) -> SpeechSegment {
        SpeechSegment {
            start,
            end,
            text: text.to_string(),
            confidence: None,
        }
    }

    #[test]
    fn test_remap_matches_scenario() {
        // S2: compressed (5.0, 5.5) remaps to original (6.0, 6.5)
        let silence = vec![region(2.0, 3.0), region(7.0, 8.0)];
        let map = TimestampMap::build(&keep_intervals(&silence, 10.0));

        let (segments, dropped) = remap_segments(&[speech(5.0, 5.5, "hi")], &map, 10.0);
        assert_eq!(dropped, 0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, 6.0);
        assert_eq!(segments[0].end, 6.5);
        assert_eq!(segments[0].text, "hi");
    }

    #[test]
    fn test_remap_drops_unmappable() {
        let silence = vec![region(2.0, 3.0)];
        let map = TimestampMap::build(&keep_intervals(&silence, 10.0));
        // Compressed stream is 9s long; 9.5 cannot be located
        let (segments, dropped) = remap_segments(&[speech(9.2, 9.5, "late")], &map, 10.0);
        assert!(segments.is_empty());
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_remap_clamps_to_video_duration() {
        let map = TimestampMap::build(&keep_intervals(&[], 10.0));
        let (segments, _) = remap_segments(&[speech(9.0, 10.0, "tail")], &map, 9.9);
        assert_eq!(segments[0].end, 9.9);
    }

    #[test]
    fn test_chunk_offsets_applied() {
        // A segment at (10, 12) in a chunk offset by 300 lands at (310, 312)
        let mut segment = speech(10.0, 12.0, "x");
        let chunk = ChunkPlan {
            index: 1,
            offset: 300.0,
            duration: 300.0,
        };
        segment.start += chunk.offset;
        segment.end += chunk.offset;
        assert_eq!(segment.start, 310.0);
        assert_eq!(segment.end, 312.0);
    }
}
