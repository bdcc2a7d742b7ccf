//! Audio silence detection via FFmpeg's `silencedetect` filter.

use std::path::Path;

use tracing::debug;

use lclip_models::SilenceRegion;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Detect silence regions in the audio track of a media file.
///
/// Fails with [`MediaError::NoAudioTrack`] when the input carries no audio
/// stream. Returned regions are non-overlapping and sorted by start.
pub async fn detect_silence(
    input: impl AsRef<Path>,
    threshold_dbfs: f32,
    min_silence_ms: u64,
    runner: &FfmpegRunner,
) -> MediaResult<Vec<SilenceRegion>> {
    let input = input.as_ref();

    let info = probe_video(input).await?;
    if !info.has_audio {
        return Err(MediaError::NoAudioTrack);
    }

    let filter = format!(
        "silencedetect=noise={}dB:d={:.3}",
        threshold_dbfs,
        min_silence_ms as f64 / 1000.0
    );

    // Decode audio only, discard output; the filter reports on stderr.
    let cmd = FfmpegCommand::new(input, "-")
        .no_video()
        .audio_filter(filter)
        .output_arg("-f")
        .output_arg("null")
        .log_level("info");

    let stderr = runner.run(&cmd).await?;
    let regions = parse_silencedetect(&stderr, threshold_dbfs, info.duration);

    debug!(
        input = %input.display(),
        regions = regions.len(),
        "Silence detection complete"
    );

    Ok(regions)
}

/// Parse `silencedetect` stderr lines into regions.
///
/// The filter logs `silence_start: <t>` and `silence_end: <t> |
/// silence_duration: <d>` pairs. An unterminated start extends to the end
/// of the stream.
fn parse_silencedetect(stderr: &str, threshold_dbfs: f32, duration: f64) -> Vec<SilenceRegion> {
    let mut regions = Vec::new();
    let mut open_start: Option<f64> = None;

    for line in stderr.lines() {
        if let Some(value) = field_after(line, "silence_start:") {
            if let Ok(start) = value.parse::<f64>() {
                open_start = Some(start.max(0.0));
            }
        } else if let Some(value) = field_after(line, "silence_end:") {
            if let (Some(start), Ok(end)) = (open_start.take(), value.parse::<f64>()) {
                if end > start {
                    regions.push(SilenceRegion {
                        start,
                        end,
                        threshold_dbfs,
                    });
                }
            }
        }
    }

    // Silence running into the end of the stream has no end marker
    if let Some(start) = open_start {
        if duration > start {
            regions.push(SilenceRegion {
                start,
                end: duration,
                threshold_dbfs,
            });
        }
    }

    regions.sort_by(|a, b| a.start.total_cmp(&b.start));
    regions
}

/// Extract the whitespace-delimited token following `marker` in a line.
fn field_after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let idx = line.find(marker)?;
    line[idx + marker.len()..].split_whitespace().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_STDERR: &str = "\
[silencedetect @ 0x55d] silence_start: 2
[silencedetect @ 0x55d] silence_end: 3.012 | silence_duration: 1.012
[silencedetect @ 0x55d] silence_start: 7.5
[silencedetect @ 0x55d] silence_end: 8.25 | silence_duration: 0.75
size=N/A time=00:00:10.00 bitrate=N/A speed= 312x
";

    #[test]
    fn test_parse_silencedetect() {
        let regions = parse_silencedetect(SAMPLE_STDERR, -40.0, 10.0);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].start, 2.0);
        assert!((regions[0].end - 3.012).abs() < 1e-9);
        assert_eq!(regions[1].start, 7.5);
        assert_eq!(regions[0].threshold_dbfs, -40.0);
    }

    #[test]
    fn test_parse_silencedetect_trailing_silence() {
        let stderr = "[silencedetect @ 0x1] silence_start: 8.5\n";
        let regions = parse_silencedetect(stderr, -40.0, 10.0);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].start, 8.5);
        assert_eq!(regions[0].end, 10.0);
    }

    #[test]
    fn test_parse_silencedetect_no_silence() {
        let stderr = "size=N/A time=00:00:10.00 bitrate=N/A\n";
        assert!(parse_silencedetect(stderr, -40.0, 10.0).is_empty());
    }

    #[test]
    fn test_parse_silencedetect_negative_start_clamped() {
        let stderr = "[silencedetect @ 0x1] silence_start: -0.011609\n\
                      [silencedetect @ 0x1] silence_end: 1.5 | silence_duration: 1.51\n";
        let regions = parse_silencedetect(stderr, -40.0, 10.0);
        assert_eq!(regions[0].start, 0.0);
    }
}
