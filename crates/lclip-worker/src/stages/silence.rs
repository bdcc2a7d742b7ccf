//! SilenceDetect: audio silence analysis.

use tracing::info;

use lclip_media::silence::detect_silence;
use lclip_models::Stage;

use crate::context::StageContext;
use crate::error::StageResult;

/// Detect silence regions in the original audio and persist them.
///
/// A missing audio track fails the stage with `NoAudioTrack` (fatal); any
/// other failure is absorbed by the executor's degrade path, which treats
/// the job as having no silence.
pub async fn run(ctx: &StageContext) -> StageResult<()> {
    ctx.check_cancelled()?;
    let reporter = ctx.reporter(Stage::SilenceDetect);
    reporter
        .report(0.0, "Analyzing audio for silence", None)
        .await;

    let regions = detect_silence(
        &ctx.source_path,
        ctx.config.silence_threshold_dbfs,
        ctx.config.min_silence_ms,
        &ctx.runner(),
    )
    .await?;

    reporter.report(50.0, "Storing silence regions", None).await;

    let total_silence: f64 = regions.iter().map(|r| r.duration()).sum();
    let count = regions.len();
    ctx.artifacts.replace_silence_regions(regions).await?;

    info!(
        job_id = %ctx.job.job_id,
        regions = count,
        total_silence_seconds = format!("{:.1}", total_silence),
        "Silence detection completed"
    );
    reporter
        .report(
            100.0,
            &format!("Found {} silence regions", count),
            None,
        )
        .await;

    Ok(())
}
