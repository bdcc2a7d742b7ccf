//! Subtitle file generation.
//!
//! WebVTT emission is bit-exact: header `WEBVTT\n\n`, then per cue a cue
//! number, a `HH:MM:SS.mmm --> HH:MM:SS.mmm` line with millisecond
//! precision, the cue text, and a blank line. The substring `-->` inside
//! cue text is replaced with `→` before emission; timestamps are clamped
//! to zero and cues with `end <= start` are rejected.

use lclip_models::TranscriptSegment;

/// A subtitle cue on the clip-local timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Format a timestamp as `HH:MM:SS.mmm`.
pub fn format_webvtt_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hours = (seconds / 3600.0) as u64;
    let minutes = ((seconds % 3600.0) / 60.0) as u64;
    let secs = seconds % 60.0;
    format!("{:02}:{:02}:{:06.3}", hours, minutes, secs)
}

/// Format a timestamp as `HH:MM:SS,mmm` (SRT flavor).
fn format_srt_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hours = (seconds / 3600.0) as u64;
    let minutes = ((seconds % 3600.0) / 60.0) as u64;
    let secs = (seconds % 60.0) as u64;
    let millis = ((seconds % 1.0) * 1000.0).round() as u64;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Sanitize cue text: the arrow token would terminate a cue line early.
fn sanitize_cue_text(text: &str) -> String {
    text.trim().replace("-->", "→")
}

/// Render cues as a WebVTT document.
pub fn write_webvtt(cues: &[Cue]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    let mut number = 0;

    for cue in cues {
        let start = cue.start.max(0.0);
        let end = cue.end.max(0.0);
        if end <= start {
            continue;
        }
        number += 1;
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            number,
            format_webvtt_timestamp(start),
            format_webvtt_timestamp(end),
            sanitize_cue_text(&cue.text)
        ));
    }

    out
}

/// Render cues as an SRT document.
pub fn write_srt(cues: &[Cue]) -> String {
    let mut out = String::new();
    let mut number = 0;

    for cue in cues {
        let start = cue.start.max(0.0);
        let end = cue.end.max(0.0);
        if end <= start {
            continue;
        }
        number += 1;
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            number,
            format_srt_timestamp(start),
            format_srt_timestamp(end),
            sanitize_cue_text(&cue.text)
        ));
    }

    out
}

/// Parse a WebVTT document back into cues.
pub fn parse_webvtt(document: &str) -> Vec<Cue> {
    let mut cues = Vec::new();

    for block in document.split("\n\n") {
        let lines: Vec<&str> = block.lines().collect();
        if lines.is_empty() || lines[0].trim() == "WEBVTT" {
            continue;
        }

        // Cue number line is optional per the format
        let timing_idx = lines.iter().position(|l| l.contains(" --> "));
        let Some(timing_idx) = timing_idx else {
            continue;
        };
        let Some((start_str, end_str)) = lines[timing_idx].split_once(" --> ") else {
            continue;
        };
        let (Some(start), Some(end)) = (
            parse_webvtt_timestamp(start_str.trim()),
            parse_webvtt_timestamp(end_str.trim()),
        ) else {
            continue;
        };

        let text = lines[timing_idx + 1..].join("\n");
        cues.push(Cue { start, end, text });
    }

    cues
}

fn parse_webvtt_timestamp(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Select the transcript segments overlapping a clip window and rebase
/// them onto the clip-local timeline.
pub fn cues_for_clip(
    transcripts: &[TranscriptSegment],
    clip_start: f64,
    clip_end: f64,
) -> Vec<Cue> {
    let clip_duration = clip_end - clip_start;
    let mut cues = Vec::new();

    for segment in transcripts {
        if segment.end < clip_start || segment.start > clip_end {
            continue;
        }
        let start = (segment.start - clip_start).max(0.0);
        let end = (segment.end - clip_start).min(clip_duration);
        if end <= start {
            continue;
        }
        cues.push(Cue {
            start,
            end,
            text: segment.text.clone(),
        });
    }

    cues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start: f64, end: f64, text: &str) -> Cue {
        Cue {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_webvtt_timestamp(0.0), "00:00:00.000");
        assert_eq!(format_webvtt_timestamp(5.2), "00:00:05.200");
        assert_eq!(format_webvtt_timestamp(65.025), "00:01:05.025");
        assert_eq!(format_webvtt_timestamp(3661.5), "01:01:01.500");
        // Negative inputs clamp to zero
        assert_eq!(format_webvtt_timestamp(-1.0), "00:00:00.000");
    }

    #[test]
    fn test_webvtt_emission_exact_bytes() {
        // S5: two cues, exact byte expectations
        let cues = vec![cue(0.0, 5.2, "Hello"), cue(5.2, 10.5, "World")];
        let document = write_webvtt(&cues);
        assert_eq!(
            document,
            "WEBVTT\n\n1\n00:00:00.000 --> 00:00:05.200\nHello\n\n2\n00:00:05.200 --> 00:00:10.500\nWorld\n\n"
        );
    }

    #[test]
    fn test_webvtt_rejects_inverted_cue() {
        let cues = vec![cue(5.0, 5.0, "zero"), cue(6.0, 5.0, "inverted"), cue(0.0, 1.0, "ok")];
        let document = write_webvtt(&cues);
        assert!(!document.contains("zero"));
        assert!(!document.contains("inverted"));
        // Numbering skips rejected cues
        assert!(document.contains("1\n00:00:00.000"));
    }

    #[test]
    fn test_webvtt_arrow_substitution() {
        let cues = vec![cue(0.0, 1.0, "a --> b")];
        let document = write_webvtt(&cues);
        assert!(document.contains("a → b"));
        // Only the timing line carries the arrow token
        assert_eq!(document.matches("-->").count(), 1);
    }

    #[test]
    fn test_webvtt_round_trip() {
        let cues = vec![
            cue(0.0, 5.2, "Hello"),
            cue(5.2, 10.5, "World"),
            cue(12.0, 15.125, "Multi word cue"),
        ];
        let parsed = parse_webvtt(&write_webvtt(&cues));
        assert_eq!(parsed.len(), cues.len());
        for (original, round_tripped) in cues.iter().zip(&parsed) {
            assert!((original.start - round_tripped.start).abs() < 1e-9);
            assert!((original.end - round_tripped.end).abs() < 1e-9);
            assert_eq!(original.text, round_tripped.text);
        }
    }

    #[test]
    fn test_srt_emission() {
        let cues = vec![cue(0.0, 5.2, "Hello")];
        let document = write_srt(&cues);
        assert_eq!(document, "1\n00:00:00,000 --> 00:00:05,200\nHello\n\n");
    }

    #[test]
    fn test_cues_for_clip_rebasing() {
        let transcripts = vec![
            TranscriptSegment {
                start: 95.0,
                end: 102.0,
                text: "partially before".to_string(),
                confidence: None,
            },
            TranscriptSegment {
                start: 110.0,
                end: 115.0,
                text: "inside".to_string(),
                confidence: None,
            },
            TranscriptSegment {
                start: 200.0,
                end: 210.0,
                text: "after".to_string(),
                confidence: None,
            },
        ];

        let cues = cues_for_clip(&transcripts, 100.0, 150.0);
        assert_eq!(cues.len(), 2);
        // Overlapping-at-the-front cue clamps to the clip start
        assert_eq!(cues[0].start, 0.0);
        assert_eq!(cues[0].end, 2.0);
        assert_eq!(cues[1].start, 10.0);
        assert_eq!(cues[1].end, 15.0);
    }

    #[test]
    fn test_cues_for_clip_no_overlap() {
        let transcripts = vec![TranscriptSegment {
            start: 0.0,
            end: 5.0,
            text: "early".to_string(),
            confidence: None,
        }];
        assert!(cues_for_clip(&transcripts, 100.0, 150.0).is_empty());
    }
}
