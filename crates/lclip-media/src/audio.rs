//! Compressed-audio assembly for silence-aware transcription.

use std::path::Path;

use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::timeline::KeepInterval;

/// Audio bitrate for the compressed stream and its chunks.
const AUDIO_BITRATE: &str = "128k";

/// Concatenate the keep-intervals of a media file into a single mono MP3.
///
/// The filter graph trims each interval from the source audio, resets its
/// PTS, and concatenates in order, so the output duration equals the sum of
/// the interval durations (the compressed stream the timestamp map is built
/// against).
pub async fn concat_keep_intervals(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    intervals: &[KeepInterval],
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    let filter = build_keep_filter(intervals);
    debug!(
        input = %input.display(),
        intervals = intervals.len(),
        "Assembling compressed audio stream"
    );

    let cmd = FfmpegCommand::new(input, output)
        .no_video()
        .filter_complex(filter)
        .output_arg("-map")
        .output_arg("[aout]")
        .audio_channels(1)
        .audio_bitrate(AUDIO_BITRATE);

    runner.run(&cmd).await?;
    Ok(())
}

/// Export a time slice of an audio file (used for transcription chunks).
pub async fn slice_audio(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start: f64,
    duration: f64,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(input.as_ref(), output.as_ref())
        .seek(start)
        .duration(duration)
        .no_video()
        .audio_channels(1)
        .audio_bitrate(AUDIO_BITRATE);

    runner.run(&cmd).await?;
    Ok(())
}

/// Build the atrim/concat filter graph for the keep-intervals.
fn build_keep_filter(intervals: &[KeepInterval]) -> String {
    let mut parts = Vec::with_capacity(intervals.len() + 1);
    for (i, interval) in intervals.iter().enumerate() {
        parts.push(format!(
            "[0:a]atrim=start={:.3}:end={:.3},asetpts=PTS-STARTPTS[a{}]",
            interval.start, interval.end, i
        ));
    }
    let inputs: String = (0..intervals.len()).map(|i| format!("[a{}]", i)).collect();
    parts.push(format!(
        "{}concat=n={}:v=0:a=1[aout]",
        inputs,
        intervals.len()
    ));
    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_keep_filter_single() {
        let filter = build_keep_filter(&[KeepInterval {
            start: 0.0,
            end: 10.0,
        }]);
        assert_eq!(
            filter,
            "[0:a]atrim=start=0.000:end=10.000,asetpts=PTS-STARTPTS[a0];[a0]concat=n=1:v=0:a=1[aout]"
        );
    }

    #[test]
    fn test_build_keep_filter_multiple() {
        let intervals = [
            KeepInterval {
                start: 0.0,
                end: 2.0,
            },
            KeepInterval {
                start: 3.0,
                end: 7.0,
            },
        ];
        let filter = build_keep_filter(&intervals);
        assert!(filter.contains("atrim=start=0.000:end=2.000"));
        assert!(filter.contains("atrim=start=3.000:end=7.000"));
        assert!(filter.ends_with("[a0][a1]concat=n=2:v=0:a=1[aout]"));
    }
}
