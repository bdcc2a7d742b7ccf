//! SegmentSelect: highlight selection with silence-edge boundary snapping.

use tracing::info;

use lclip_models::{Clip, ClipId, ContentSegment, SilenceRegion, Stage};

use crate::config::WorkerConfig;
use crate::context::StageContext;
use crate::error::StageResult;

/// Search window around a candidate boundary for a silence edge.
const SNAP_WINDOW_SECONDS: f64 = 5.0;

/// A snap leaving less than this much clip is rejected.
const MIN_SNAPPED_SECONDS: f64 = 1.0;

pub async fn run(ctx: &StageContext) -> StageResult<()> {
    ctx.check_cancelled()?;
    let reporter = ctx.reporter(Stage::SegmentSelect);
    reporter
        .report(0.0, "Selecting highlight segments", None)
        .await;

    let segments = ctx.artifacts.content_segments().await?;
    let silence = ctx.artifacts.silence_regions().await?;

    reporter.report(50.0, "Snapping clip boundaries", None).await;
    let clips = select_clips(&segments, &silence, &ctx.config);
    let count = clips.len();

    ctx.artifacts.replace_clips(clips).await?;

    info!(job_id = %ctx.job.job_id, clips = count, "Segment selection completed");
    reporter
        .report(100.0, &format!("Selected {} highlight clips", count), None)
        .await;
    Ok(())
}

/// Result of snapping one boundary pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnappedBounds {
    pub start: f64,
    pub end: f64,
    pub start_adjusted: bool,
    pub end_adjusted: bool,
}

/// Snap a content segment's boundaries to nearby silence edges.
///
/// The start moves to the end of the closest silence region within ±5 s
/// (preferring one ending at or before the boundary); the end moves
/// symmetrically to a silence start (preferring at-or-after). A snap that
/// would leave `end <= start + 1 s` is rejected and the original
/// boundaries kept.
pub fn snap_boundaries(segment: &ContentSegment, silence: &[SilenceRegion]) -> SnappedBounds {
    let original = SnappedBounds {
        start: segment.start,
        end: segment.end,
        start_adjusted: false,
        end_adjusted: false,
    };

    let snapped_start = snap_edge(
        segment.start,
        silence.iter().map(|r| r.end),
        |edge, bound| edge <= bound,
    );
    let snapped_end = snap_edge(
        segment.end,
        silence.iter().map(|r| r.start),
        |edge, bound| edge >= bound,
    );

    let start = snapped_start.unwrap_or(segment.start);
    let end = snapped_end.unwrap_or(segment.end);

    if end <= start + MIN_SNAPPED_SECONDS {
        return original;
    }

    SnappedBounds {
        start,
        end,
        start_adjusted: snapped_start.is_some(),
        end_adjusted: snapped_end.is_some(),
    }
}

/// Pick the best silence edge within the window around `boundary`.
///
/// Edges on the preferred side win outright; otherwise the closest edge in
/// the window is taken.
fn snap_edge(
    boundary: f64,
    edges: impl Iterator<Item = f64>,
    preferred: impl Fn(f64, f64) -> bool,
) -> Option<f64> {
    let mut best_preferred: Option<f64> = None;
    let mut best_any: Option<f64> = None;

    for edge in edges {
        let distance = (edge - boundary).abs();
        if distance > SNAP_WINDOW_SECONDS {
            continue;
        }
        if preferred(edge, boundary) {
            if best_preferred
                .map(|b| distance < (b - boundary).abs())
                .unwrap_or(true)
            {
                best_preferred = Some(edge);
            }
        }
        if best_any
            .map(|b| distance < (b - boundary).abs())
            .unwrap_or(true)
        {
            best_any = Some(edge);
        }
    }

    best_preferred.or(best_any)
}

/// Select up to `max_clips_per_job` clips ordered by importance.
///
/// Boundaries are snapped first, then candidates outside the admissible
/// clip duration are dropped, then the top clips by importance are kept
/// (ties resolve chronologically via the stable sort).
pub fn select_clips(
    segments: &[ContentSegment],
    silence: &[SilenceRegion],
    config: &WorkerConfig,
) -> Vec<Clip> {
    let mut candidates: Vec<(SnappedBounds, &ContentSegment)> = segments
        .iter()
        .map(|segment| (snap_boundaries(segment, silence), segment))
        .filter(|(bounds, _)| {
            let duration = bounds.end - bounds.start;
            duration >= config.clip_min_duration_seconds
                && duration <= config.clip_max_duration_seconds
        })
        .collect();

    candidates.sort_by(|a, b| b.1.importance.total_cmp(&a.1.importance));
    candidates.truncate(config.max_clips_per_job);

    candidates
        .into_iter()
        .enumerate()
        .map(|(idx, (bounds, segment))| Clip {
            clip_id: ClipId::new(),
            start: bounds.start,
            end: bounds.end,
            duration: bounds.end - bounds.start,
            order: idx as u32 + 1,
            title: segment.topic.clone(),
            importance: segment.importance,
            start_adjusted: bounds.start_adjusted,
            end_adjusted: bounds.end_adjusted,
            blob_key: None,
            thumbnail_key: None,
            subtitle_key: None,
            file_size: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64, importance: f32, topic: &str) -> ContentSegment {
        ContentSegment {
            start,
            end,
            topic: topic.to_string(),
            description: String::new(),
            importance,
            keywords: vec![],
            concepts: vec![],
            order: 0,
        }
    }

    fn region(start: f64, end: f64) -> SilenceRegion {
        SilenceRegion {
            start,
            end,
            threshold_dbfs: -40.0,
        }
    }

    #[test]
    fn test_boundary_snap_scenario() {
        // S3: segment [100, 250], silence [(98,99), (252,253.5)]
        // -> clip [99, 252], duration 153, both boundaries adjusted
        let silence = vec![region(98.0, 99.0), region(252.0, 253.5)];
        let bounds = snap_boundaries(&segment(100.0, 250.0, 0.9, "t"), &silence);

        assert_eq!(bounds.start, 99.0);
        assert_eq!(bounds.end, 252.0);
        assert!((bounds.end - bounds.start - 153.0).abs() < 1e-9);
        assert!(bounds.start_adjusted);
        assert!(bounds.end_adjusted);
    }

    #[test]
    fn test_snap_prefers_at_or_before_start() {
        // Both edges are within the window; the one at-or-before wins even
        // though the other is closer
        let silence = vec![region(95.0, 97.0), region(100.5, 102.0)];
        let bounds = snap_boundaries(&segment(100.0, 250.0, 0.9, "t"), &silence);
        assert_eq!(bounds.start, 97.0);
    }

    #[test]
    fn test_snap_falls_back_to_closest_in_window() {
        // Only an edge after the start exists; it is still taken
        let silence = vec![region(101.0, 103.0)];
        let bounds = snap_boundaries(&segment(100.0, 250.0, 0.9, "t"), &silence);
        assert_eq!(bounds.start, 103.0);
        assert!(bounds.start_adjusted);
        assert!(!bounds.end_adjusted);
    }

    #[test]
    fn test_snap_outside_window_ignored() {
        let silence = vec![region(80.0, 90.0), region(260.0, 270.0)];
        let bounds = snap_boundaries(&segment(100.0, 250.0, 0.9, "t"), &silence);
        assert_eq!(bounds.start, 100.0);
        assert_eq!(bounds.end, 250.0);
        assert!(!bounds.start_adjusted);
        assert!(!bounds.end_adjusted);
    }

    #[test]
    fn test_degenerate_snap_rejected() {
        // Snapping would collapse the clip below one second; originals kept
        let silence = vec![region(99.0, 104.0), region(104.5, 110.0)];
        let short = segment(100.0, 105.0, 0.9, "t");
        let bounds = snap_boundaries(&short, &silence);
        assert_eq!(bounds.start, 100.0);
        assert_eq!(bounds.end, 105.0);
        assert!(!bounds.start_adjusted);
        assert!(!bounds.end_adjusted);
    }

    #[test]
    fn test_duration_filter_and_importance_order() {
        // S4: durations [60, 180, 600, 240], importances [.95, .90, .85, .80]
        // -> only the 180s and 240s candidates survive, in that order
        let config = WorkerConfig::default();
        let segments = vec![
            segment(0.0, 60.0, 0.95, "a"),
            segment(100.0, 280.0, 0.90, "b"),
            segment(300.0, 900.0, 0.85, "c"),
            segment(1000.0, 1240.0, 0.80, "d"),
        ];

        let clips = select_clips(&segments, &[], &config);
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].title, "b");
        assert_eq!(clips[0].order, 1);
        assert_eq!(clips[1].title, "d");
        assert_eq!(clips[1].order, 2);
    }

    #[test]
    fn test_top_five_by_importance() {
        let config = WorkerConfig::default();
        let segments: Vec<ContentSegment> = (0..8)
            .map(|i| {
                segment(
                    i as f64 * 300.0,
                    i as f64 * 300.0 + 120.0,
                    0.5 + i as f32 * 0.05,
                    &format!("s{}", i),
                )
            })
            .collect();

        let clips = select_clips(&segments, &[], &config);
        assert_eq!(clips.len(), 5);
        // Highest importance ranks first
        assert_eq!(clips[0].title, "s7");
        assert_eq!(clips[4].title, "s3");
        for (idx, clip) in clips.iter().enumerate() {
            assert_eq!(clip.order, idx as u32 + 1);
            assert!(clip.duration >= config.clip_min_duration_seconds);
            assert!(clip.duration <= config.clip_max_duration_seconds);
        }
    }

    #[test]
    fn test_fewer_qualifying_than_max() {
        let config = WorkerConfig::default();
        let segments = vec![segment(0.0, 150.0, 0.9, "only")];
        let clips = select_clips(&segments, &[], &config);
        assert_eq!(clips.len(), 1);
        assert!(!clips[0].is_compiled());
    }
}
