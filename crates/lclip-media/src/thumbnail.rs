//! Thumbnail generation.

use std::path::Path;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::get_duration;

/// Generate a JPEG thumbnail.
///
/// Defaults to the middle of the video when `at_time` is not given. The
/// frame is letterboxed into `size`.
pub async fn generate_thumbnail(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    at_time: Option<f64>,
    size: (u32, u32),
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let video_path = video_path.as_ref();

    let timestamp = match at_time {
        Some(t) => t.max(0.0),
        None => get_duration(video_path).await? / 2.0,
    };

    let (width, height) = size;
    let filter = format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = width,
        h = height
    );

    let cmd = FfmpegCommand::new(video_path, output_path.as_ref())
        .seek(timestamp)
        .single_frame()
        .video_filter(filter);

    runner.run(&cmd).await?;
    Ok(())
}
