//! CompileClips: per-clip extraction, encoding, thumbnailing, subtitles,
//! and upload, under bounded parallelism.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tracing::{error, info};

use lclip_media::clip::{extract_segment, set_metadata, transcode_to_resolution};
use lclip_media::subtitle::{cues_for_clip, write_webvtt};
use lclip_media::thumbnail::generate_thumbnail;
use lclip_models::{Clip, Stage, TranscriptSegment};
use lclip_storage::{clip_key, subtitle_key, thumbnail_key};
use lclip_store::ClipArtifacts;

use crate::context::StageContext;
use crate::error::{StageError, StageResult};

/// Thumbnail dimensions.
const THUMBNAIL_SIZE: (u32, u32) = (1280, 720);

/// Video bitrate for re-encoded clips.
const CLIP_BITRATE: &str = "4M";

pub async fn run(ctx: &StageContext) -> StageResult<()> {
    ctx.check_cancelled()?;
    let reporter = ctx.reporter(Stage::CompileClips);
    reporter
        .report(0.0, "Compiling highlight clips", Some(120))
        .await;

    let clips = ctx.artifacts.clips().await?;
    if clips.is_empty() {
        info!(job_id = %ctx.job.job_id, "No qualifying clips to compile");
        reporter.report(100.0, "No clips to compile", None).await;
        return Ok(());
    }

    let transcripts = Arc::new(ctx.artifacts.transcript_segments().await?);
    let total = clips.len();
    let workers = ctx.config.compile_max_workers.clamp(1, 4);
    let semaphore = Arc::new(Semaphore::new(workers));

    info!(
        job_id = %ctx.job.job_id,
        clips = total,
        workers,
        "Starting clip compilation"
    );

    // Every clip future is driven concurrently; the semaphore bounds how
    // many are past the permit gate at once.
    let mut in_flight = FuturesUnordered::new();
    for clip in clips {
        let semaphore = Arc::clone(&semaphore);
        let transcripts = Arc::clone(&transcripts);
        let title = clip.title.clone();
        in_flight.push(async move {
            let permit = semaphore.acquire_owned().await;
            let result = match permit {
                Ok(_permit) => compile_one(ctx, clip, transcripts).await,
                Err(_) => Err(StageError::other("compile worker pool closed")),
            };
            (title, result)
        });
    }

    let mut completed = 0usize;
    let mut finished = 0usize;
    while let Some((title, result)) = in_flight.next().await {
        finished += 1;
        match result {
            Ok(clip_id) => {
                completed += 1;
                info!(job_id = %ctx.job.job_id, clip_id = %clip_id, "Clip compiled");
            }
            Err(e) => {
                // One bad clip is logged and skipped; the stage survives
                error!(
                    job_id = %ctx.job.job_id,
                    clip_title = %title,
                    "Clip compilation failed: {}",
                    e
                );
            }
        }
        let percent = (finished as f32 / total as f32) * 100.0;
        reporter
            .report(
                percent,
                &format!("Compiled {}/{} clips", completed, total),
                None,
            )
            .await;
    }

    if completed == 0 {
        return Err(StageError::other(format!(
            "all {} clips failed to compile",
            total
        )));
    }

    reporter
        .report(
            100.0,
            &format!("Compiled {}/{} clips", completed, total),
            None,
        )
        .await;
    Ok(())
}

/// The per-clip pipeline: extract → re-encode if needed → metadata →
/// thumbnail → subtitles → upload → record artifacts.
async fn compile_one(
    ctx: &StageContext,
    clip: Clip,
    transcripts: Arc<Vec<TranscriptSegment>>,
) -> StageResult<lclip_models::ClipId> {
    ctx.check_cancelled()?;
    let job_id = ctx.job.job_id.as_str();
    let clip_id = clip.clip_id.clone();
    let workdir = TempDir::new()?;
    let runner = ctx.runner();

    // Extract the segment with stream copy
    let segment_path = workdir.path().join("segment.mp4");
    extract_segment(&ctx.source_path, &segment_path, clip.start, clip.end, &runner).await?;

    // Re-encode only when the source geometry differs from the target
    let (target_w, target_h) = ctx.job.config.resolution.dimensions();
    let encoded_path = if (ctx.video_info.width, ctx.video_info.height) == (target_w, target_h) {
        segment_path.clone()
    } else {
        let path = workdir.path().join("encoded.mp4");
        transcode_to_resolution(&segment_path, &path, target_w, target_h, CLIP_BITRATE, &runner)
            .await?;
        path
    };

    // Attach title metadata
    let final_path = workdir.path().join("final.mp4");
    set_metadata(
        &encoded_path,
        &final_path,
        &[
            ("title", clip.title.as_str()),
            ("comment", &format!("Highlight from job {}", job_id)),
            ("creation_time", &Utc::now().to_rfc3339()),
        ],
        &runner,
    )
    .await?;

    // Thumbnail from the clip midpoint
    let thumbnail_path = workdir.path().join("thumbnail.jpg");
    generate_thumbnail(&final_path, &thumbnail_path, None, THUMBNAIL_SIZE, &runner).await?;

    // Subtitles only when transcript overlaps the clip window
    let cues = cues_for_clip(&transcripts, clip.start, clip.end);
    let subtitle_path = if cues.is_empty() {
        None
    } else {
        let path = workdir.path().join("subtitles.vtt");
        tokio::fs::write(&path, write_webvtt(&cues)).await?;
        Some(path)
    };

    // Upload everything, then record the artifact keys on the clip row
    let blob_key = clip_key(job_id, clip_id.as_str());
    let thumb_key = thumbnail_key(job_id, clip_id.as_str());
    ctx.blobs.upload(&final_path, &blob_key, "video/mp4").await?;
    ctx.blobs
        .upload(&thumbnail_path, &thumb_key, "image/jpeg")
        .await?;

    let sub_key = match &subtitle_path {
        Some(path) => {
            let key = subtitle_key(job_id, clip_id.as_str());
            ctx.blobs.upload(path, &key, "text/vtt").await?;
            Some(key)
        }
        None => None,
    };

    let file_size = file_size_of(&final_path).await?;
    ctx.artifacts
        .update_clip_artifacts(
            &clip_id,
            ClipArtifacts {
                blob_key,
                thumbnail_key: thumb_key,
                subtitle_key: sub_key,
                file_size,
            },
        )
        .await?;

    Ok(clip_id)
}

async fn file_size_of(path: &Path) -> StageResult<u64> {
    Ok(tokio::fs::metadata(path).await?.len())
}
