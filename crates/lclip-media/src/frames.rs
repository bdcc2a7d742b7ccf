//! Single-frame extraction for layout and slide analysis.

use std::path::Path;

use lclip_models::Region;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Extract one frame at `at_time` as a JPEG, optionally cropped to a
/// source-pixel region.
pub async fn extract_frame(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    at_time: f64,
    crop: Option<Region>,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let mut cmd = FfmpegCommand::new(input.as_ref(), output.as_ref())
        .seek(at_time.max(0.0))
        .single_frame();

    if let Some(region) = crop {
        cmd = cmd.video_filter(format!(
            "crop={}:{}:{}:{}",
            region.w, region.h, region.x, region.y
        ));
    }

    runner.run(&cmd).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_filter() {
        let region = Region {
            x: 10,
            y: 20,
            w: 640,
            h: 360,
        };
        let filter = format!("crop={}:{}:{}:{}", region.w, region.h, region.x, region.y);
        assert_eq!(filter, "crop=640:360:10:20");
    }
}
