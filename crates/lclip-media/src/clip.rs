//! Clip extraction, transcoding, and metadata tagging.

use std::path::Path;

use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Extract `[start, end]` from a video with stream copy.
///
/// Seeking before the input snaps to the nearest keyframe;
/// `-avoid_negative_ts make_zero` keeps the copied timestamps sane.
pub async fn extract_segment(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start: f64,
    end: f64,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();
    let duration = end - start;

    info!(
        "Extracting segment {:.2}-{:.2}s: {} -> {}",
        start,
        end,
        input.display(),
        output.display()
    );

    let cmd = FfmpegCommand::new(input, output)
        .seek(start)
        .duration(duration)
        .stream_copy()
        .output_arg("-avoid_negative_ts")
        .output_arg("make_zero");

    runner.run(&cmd).await?;
    Ok(())
}

/// Re-encode a video to the target resolution, letterboxing to preserve
/// aspect ratio.
pub async fn transcode_to_resolution(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    width: u32,
    height: u32,
    bitrate: &str,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let filter = format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1",
        w = width,
        h = height
    );

    let cmd = FfmpegCommand::new(input.as_ref(), output.as_ref())
        .video_filter(filter)
        .video_codec("libx264")
        .preset("medium")
        .crf(23)
        .output_arg("-b:v")
        .output_arg(bitrate)
        .audio_codec("aac")
        .audio_bitrate("192k")
        .output_arg("-movflags")
        .output_arg("+faststart");

    runner.run(&cmd).await?;
    Ok(())
}

/// Copy streams while attaching metadata tags.
pub async fn set_metadata(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    tags: &[(&str, &str)],
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let mut cmd = FfmpegCommand::new(input.as_ref(), output.as_ref()).stream_copy();
    for (key, value) in tags {
        cmd = cmd.metadata(key, value);
    }
    runner.run(&cmd).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_filter_shape() {
        // The transcode filter scales down, pads to center, and resets SAR
        let filter = format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1",
            w = 1280,
            h = 720
        );
        assert!(filter.starts_with("scale=1280:720"));
        assert!(filter.contains("pad=1280:720"));
    }
}
