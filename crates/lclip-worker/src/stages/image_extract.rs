//! ImageExtract: slide content extraction (vision mode only).
//!
//! Samples frames at ~5-second intervals (capped at 10), crops each to the
//! detected screen region, and sends them to the vision model. The stage is
//! non-fatal: repeated failure records an empty result and the pipeline
//! continues.

use tempfile::TempDir;
use tracing::{info, warn};

use lclip_media::frames::extract_frame;
use lclip_models::{SlideContent, Stage};

use crate::context::StageContext;
use crate::error::StageResult;

/// Seconds between samples.
const SAMPLE_INTERVAL_SECONDS: f64 = 5.0;

/// Maximum frames analyzed per job.
const MAX_SAMPLES: usize = 10;

pub async fn run(ctx: &StageContext) -> StageResult<()> {
    ctx.check_cancelled()?;
    let reporter = ctx.reporter(Stage::ImageExtract);
    reporter.report(0.0, "Extracting slide content", None).await;

    let screen_region = ctx
        .artifacts
        .layout()
        .await?
        .and_then(|layout| layout.screen_region);

    let duration = ctx.video_info.duration;
    let sample_count = ((duration / SAMPLE_INTERVAL_SECONDS) as usize)
        .max(1)
        .min(MAX_SAMPLES);

    let workdir = TempDir::new()?;
    let mut records = Vec::new();
    let mut failures = 0usize;

    for i in 0..sample_count {
        ctx.check_cancelled()?;
        // Sample mid-interval so the first frame is not the title card
        let timestamp =
            (i as f64 * SAMPLE_INTERVAL_SECONDS + SAMPLE_INTERVAL_SECONDS / 2.0).min(duration);
        let frame_path = workdir.path().join(format!("slide_{}.jpg", i));

        let extracted = extract_frame(
            &ctx.source_path,
            &frame_path,
            timestamp,
            screen_region,
            &ctx.runner(),
        )
        .await;
        if let Err(e) = extracted {
            warn!(job_id = %ctx.job.job_id, timestamp, "Frame extraction failed: {}", e);
            failures += 1;
            continue;
        }

        match ctx.ml.analyze_frame(&frame_path, ctx.api_key.expose()).await {
            Ok(analysis) => {
                records.push(SlideContent {
                    timestamp,
                    text_blocks: analysis.text_blocks,
                    visual_elements: dedup(analysis.visual_elements),
                    key_concepts: dedup(analysis.key_concepts),
                });
            }
            Err(e) => {
                warn!(job_id = %ctx.job.job_id, timestamp, "Frame analysis failed: {}", e);
                failures += 1;
            }
        }

        let percent = ((i + 1) as f32 / sample_count as f32) * 90.0;
        reporter
            .report(
                percent,
                &format!("Analyzed {}/{} slide frames", i + 1, sample_count),
                None,
            )
            .await;
    }

    if records.is_empty() && failures > 0 {
        warn!(
            job_id = %ctx.job.job_id,
            failures,
            "All slide extractions failed, recording empty result"
        );
    }

    let count = records.len();
    ctx.artifacts.replace_slide_content(records).await?;

    info!(job_id = %ctx.job.job_id, slides = count, "Slide extraction completed");
    reporter
        .report(100.0, &format!("Extracted {} slide records", count), None)
        .await;
    Ok(())
}

/// Case-insensitive de-duplication preserving first-seen order.
fn dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for value in values {
        let key = value.trim().to_lowercase();
        if key.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(value.trim().to_string());
    }
    out
}
