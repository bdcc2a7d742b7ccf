//! Concatenation with audio/video cross-fades.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::command::FfmpegRunner;
use crate::error::{MediaError, MediaResult};
use crate::probe::get_duration;

/// Concatenate video segments with cross-fade transitions.
///
/// Each input is normalized to `resolution` at 30 fps with letterbox
/// padding; transitions are chained `xfade`/`acrossfade` filters whose
/// offsets accumulate from the probed real duration of each preceding
/// segment (`offset_i = Σ d_k for k < i − i·transition`).
pub async fn concat_with_crossfade(
    inputs: &[PathBuf],
    output: impl AsRef<Path>,
    transition_seconds: f64,
    resolution: (u32, u32),
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let output = output.as_ref();

    if inputs.is_empty() {
        return Err(MediaError::InvalidVideo(
            "no segments to concatenate".to_string(),
        ));
    }

    // A single input degenerates to a copy
    if inputs.len() == 1 {
        tokio::fs::copy(&inputs[0], output).await?;
        return Ok(());
    }

    let mut durations = Vec::with_capacity(inputs.len());
    for input in inputs {
        durations.push(get_duration(input).await?);
    }

    let filter = build_crossfade_filter(inputs.len(), &durations, transition_seconds, resolution);

    let mut args = vec!["-y".to_string(), "-v".to_string(), "error".to_string()];
    for input in inputs {
        args.push("-i".to_string());
        args.push(input.to_string_lossy().to_string());
    }
    args.extend([
        "-filter_complex".to_string(),
        filter,
        "-map".to_string(),
        "[vout]".to_string(),
        "-map".to_string(),
        "[aout]".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-crf".to_string(),
        "23".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        output.to_string_lossy().to_string(),
    ]);

    runner.run_args(&args).await?;
    info!(
        segments = inputs.len(),
        output = %output.display(),
        "Concatenated segments with cross-fades"
    );
    Ok(())
}

/// Build the normalize + chained-crossfade filter graph.
fn build_crossfade_filter(
    count: usize,
    durations: &[f64],
    transition: f64,
    resolution: (u32, u32),
) -> String {
    let (width, height) = resolution;
    let mut parts = Vec::new();

    // Normalize every stream to the same geometry, SAR, and frame rate
    for i in 0..count {
        parts.push(format!(
            "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps=30[v{i}]",
            i = i,
            w = width,
            h = height
        ));
        parts.push(format!(
            "[{i}:a]aformat=sample_fmts=fltp:sample_rates=44100:channel_layouts=stereo[a{i}]",
            i = i
        ));
    }

    // Chain crossfades; offsets track the cumulative real durations
    let mut v_last = "v0".to_string();
    let mut a_last = "a0".to_string();
    let mut offset = 0.0;

    for i in 1..count {
        offset += durations[i - 1] - transition;

        let v_out = if i < count - 1 {
            format!("vx{}", i)
        } else {
            "vout".to_string()
        };
        let a_out = if i < count - 1 {
            format!("ax{}", i)
        } else {
            "aout".to_string()
        };

        parts.push(format!(
            "[{v_last}][v{i}]xfade=transition=fade:duration={transition}:offset={offset:.3}[{v_out}]"
        ));
        parts.push(format!(
            "[{a_last}][a{i}]acrossfade=d={transition}[{a_out}]"
        ));

        v_last = v_out;
        a_last = a_out;
    }

    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crossfade_offsets_from_durations() {
        let filter = build_crossfade_filter(3, &[10.0, 8.0, 5.0], 0.5, (1280, 720));

        // offset_1 = 10.0 - 0.5; offset_2 = offset_1 + 8.0 - 0.5
        assert!(filter.contains("offset=9.500"));
        assert!(filter.contains("offset=17.000"));
        // Final labels map the output streams
        assert!(filter.contains("[vout]"));
        assert!(filter.contains("[aout]"));
    }

    #[test]
    fn test_crossfade_normalizes_inputs() {
        let filter = build_crossfade_filter(2, &[10.0, 8.0], 0.5, (1920, 1080));
        assert!(filter.contains("scale=1920:1080:force_original_aspect_ratio=decrease"));
        assert!(filter.contains("fps=30"));
        assert!(filter.contains("acrossfade=d=0.5"));
    }
}
