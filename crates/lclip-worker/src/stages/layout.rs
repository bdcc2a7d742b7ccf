//! LayoutDetect: screen/camera layout heuristics.
//!
//! Samples three frames (10/50/90% of duration), runs Canny edge detection,
//! and classifies the frame geometry from edge-density distribution.
//! This stage never fails the job: any error falls back to the safe
//! default (screen-only, full frame, confidence 0).

use image::GrayImage;
use tempfile::TempDir;
use tracing::{info, warn};

use lclip_media::frames::extract_frame;
use lclip_models::{LayoutAnalysis, LayoutType, Region, Stage};

use crate::config::WorkerConfig;
use crate::context::StageContext;
use crate::error::StageResult;

/// Fractions of the duration at which frames are sampled.
const SAMPLE_POSITIONS: [f64; 3] = [0.1, 0.5, 0.9];

/// Minimum total density for the picture-in-picture classification.
const PIP_TOTAL_DENSITY_FLOOR: f32 = 0.03;

/// Aggregated confidence below this falls back to the safe default.
const MIN_AGGREGATE_CONFIDENCE: f32 = 0.6;

pub async fn run(ctx: &StageContext) -> StageResult<()> {
    ctx.check_cancelled()?;
    let reporter = ctx.reporter(Stage::LayoutDetect);
    reporter.report(0.0, "Detecting video layout", None).await;

    let width = ctx.video_info.width;
    let height = ctx.video_info.height;

    let layout = match analyze(ctx).await {
        Ok(layout) => layout,
        Err(e) => {
            warn!(
                job_id = %ctx.job.job_id,
                "Layout detection failed, using safe default: {}",
                e
            );
            LayoutAnalysis::safe_default(width, height)
        }
    };

    reporter.report(50.0, "Storing layout analysis", None).await;
    let layout_type = layout.layout_type;
    let confidence = layout.confidence;
    ctx.artifacts.put_layout(&layout).await?;

    info!(
        job_id = %ctx.job.job_id,
        layout = layout_type.as_str(),
        confidence,
        "Layout detection completed"
    );
    reporter
        .report(
            100.0,
            &format!("Detected layout: {}", layout_type.as_str()),
            None,
        )
        .await;
    Ok(())
}

async fn analyze(ctx: &StageContext) -> StageResult<LayoutAnalysis> {
    let duration = ctx.video_info.duration;
    let workdir = TempDir::new()?;
    let mut detections = Vec::new();

    for (i, fraction) in SAMPLE_POSITIONS.iter().enumerate() {
        ctx.check_cancelled()?;
        let frame_path = workdir.path().join(format!("frame_{}.jpg", i));
        extract_frame(
            &ctx.source_path,
            &frame_path,
            duration * fraction,
            None,
            &ctx.runner(),
        )
        .await?;

        let config = ctx.config.clone();
        let detection = tokio::task::spawn_blocking(move || {
            let gray = image::open(&frame_path)
                .map_err(|e| format!("failed to decode frame: {}", e))?
                .to_luma8();
            Ok::<_, String>(classify_frame(&gray, &config))
        })
        .await
        .map_err(|e| crate::error::StageError::other(e.to_string()))?
        .map_err(crate::error::StageError::Other)?;

        detections.push(detection);
    }

    Ok(aggregate_detections(
        detections,
        ctx.video_info.width,
        ctx.video_info.height,
    ))
}

/// Edge-detect a frame and classify its layout.
fn classify_frame(gray: &GrayImage, config: &WorkerConfig) -> LayoutAnalysis {
    let edges = imageproc::edges::canny(gray, 50.0, 150.0);
    classify_edges(&edges, config)
}

/// Classify an edge map by density heuristics.
fn classify_edges(edges: &GrayImage, config: &WorkerConfig) -> LayoutAnalysis {
    let (width, height) = edges.dimensions();
    let half = width / 2;

    let left_density = region_density(edges, 0, 0, half, height);
    let right_density = region_density(edges, half, 0, width - half, height);
    let total_density = region_density(edges, 0, 0, width, height);

    // Both halves dense and similar: screen left, camera right
    if left_density > config.layout_half_density_floor
        && right_density > config.layout_half_density_floor
        && (left_density - right_density).abs() < config.layout_half_density_delta
    {
        return LayoutAnalysis {
            layout_type: LayoutType::SideBySide,
            screen_region: Some(Region {
                x: 0,
                y: 0,
                w: half,
                h: height,
            }),
            camera_region: Some(Region {
                x: half as i32,
                y: 0,
                w: width - half,
                h: height,
            }),
            split_ratio: 0.5,
            confidence: 0.75,
        };
    }

    // One corner significantly denser than the rest: camera overlay
    let corner = width.min(height) / 4;
    let corners = [
        (0u32, 0u32),
        (width - corner, 0),
        (0, height - corner),
        (width - corner, height - corner),
    ];
    let corner_densities: Vec<f32> = corners
        .iter()
        .map(|&(x, y)| region_density(edges, x, y, corner, corner))
        .collect();
    let (max_idx, max_corner_density) = corner_densities
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, d)| (i, *d))
        .unwrap_or((0, 0.0));

    if max_corner_density > config.layout_corner_density_floor
        && total_density > PIP_TOTAL_DENSITY_FLOOR
    {
        let (camera_x, camera_y) = corners[max_idx];
        return LayoutAnalysis {
            layout_type: LayoutType::PictureInPicture,
            screen_region: Some(Region::full_frame(width, height)),
            camera_region: Some(Region {
                x: camera_x as i32,
                y: camera_y as i32,
                w: corner,
                h: corner,
            }),
            split_ratio: 0.9,
            confidence: 0.65,
        };
    }

    // High uniform density reads as slides/screen; low as a camera feed
    if total_density > config.layout_screen_density_floor {
        LayoutAnalysis {
            layout_type: LayoutType::ScreenOnly,
            screen_region: Some(Region::full_frame(width, height)),
            camera_region: None,
            split_ratio: 1.0,
            confidence: 0.7,
        }
    } else {
        LayoutAnalysis {
            layout_type: LayoutType::CameraOnly,
            screen_region: None,
            camera_region: Some(Region::full_frame(width, height)),
            split_ratio: 0.0,
            confidence: 0.6,
        }
    }
}

/// Fraction of edge pixels in a rectangle of the edge map.
fn region_density(edges: &GrayImage, x0: u32, y0: u32, w: u32, h: u32) -> f32 {
    if w == 0 || h == 0 {
        return 0.0;
    }
    let mut count = 0u32;
    for y in y0..(y0 + h).min(edges.height()) {
        for x in x0..(x0 + w).min(edges.width()) {
            if edges.get_pixel(x, y).0[0] > 0 {
                count += 1;
            }
        }
    }
    count as f32 / (w * h) as f32
}

/// Majority vote over per-frame detections with averaged confidence.
fn aggregate_detections(
    detections: Vec<LayoutAnalysis>,
    width: u32,
    height: u32,
) -> LayoutAnalysis {
    if detections.is_empty() {
        return LayoutAnalysis::safe_default(width, height);
    }

    let mut best: Option<(LayoutType, usize)> = None;
    for detection in &detections {
        let count = detections
            .iter()
            .filter(|d| d.layout_type == detection.layout_type)
            .count();
        if best.map(|(_, c)| count > c).unwrap_or(true) {
            best = Some((detection.layout_type, count));
        }
    }
    let winner = best.expect("non-empty detections").0;

    let matching: Vec<&LayoutAnalysis> = detections
        .iter()
        .filter(|d| d.layout_type == winner)
        .collect();
    let avg_confidence: f32 =
        matching.iter().map(|d| d.confidence).sum::<f32>() / matching.len() as f32;

    if avg_confidence < MIN_AGGREGATE_CONFIDENCE {
        warn!(
            confidence = avg_confidence,
            detected = winner.as_str(),
            "Low-confidence layout detection, using safe default"
        );
        return LayoutAnalysis::safe_default(width, height);
    }

    let mut layout = matching[0].clone();
    layout.confidence = (avg_confidence * 100.0).round() / 100.0;
    layout
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkerConfig {
        WorkerConfig::default()
    }

    /// Build an edge map with roughly `density` of pixels set in the given
    /// rectangle.
    fn edge_map(width: u32, height: u32, regions: &[(u32, u32, u32, u32, f32)]) -> GrayImage {
        let mut img = GrayImage::new(width, height);
        for &(x0, y0, w, h, density) in regions {
            let step = (1.0 / density).max(1.0) as u32;
            let mut i = 0u32;
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    if i % step == 0 {
                        img.put_pixel(x, y, image::Luma([255u8]));
                    }
                    i += 1;
                }
            }
        }
        img
    }

    #[test]
    fn test_side_by_side_detection() {
        // Dense, similar halves
        let edges = edge_map(200, 100, &[(0, 0, 100, 100, 0.1), (100, 0, 100, 100, 0.1)]);
        let layout = classify_edges(&edges, &config());
        assert_eq!(layout.layout_type, LayoutType::SideBySide);
        assert_eq!(layout.split_ratio, 0.5);
        let screen = layout.screen_region.unwrap();
        assert_eq!((screen.x, screen.w), (0, 100));
        let camera = layout.camera_region.unwrap();
        assert_eq!((camera.x, camera.w), (100, 100));
    }

    #[test]
    fn test_picture_in_picture_detection() {
        // Sparse frame with one dense corner (corner size = 25)
        let edges = edge_map(200, 100, &[(0, 0, 200, 100, 0.035), (175, 0, 25, 25, 0.3)]);
        let layout = classify_edges(&edges, &config());
        assert_eq!(layout.layout_type, LayoutType::PictureInPicture);
        let camera = layout.camera_region.unwrap();
        // Top-right corner
        assert_eq!((camera.x, camera.y), (175, 0));
        assert_eq!(layout.screen_region.unwrap().w, 200);
    }

    #[test]
    fn test_screen_only_detection() {
        // Moderate uniform density, below the half-density floor
        let edges = edge_map(200, 100, &[(0, 0, 200, 100, 0.045)]);
        let layout = classify_edges(&edges, &config());
        assert_eq!(layout.layout_type, LayoutType::ScreenOnly);
        assert_eq!(layout.split_ratio, 1.0);
        assert!(layout.camera_region.is_none());
    }

    #[test]
    fn test_camera_only_detection() {
        // Very sparse edges
        let edges = edge_map(200, 100, &[(0, 0, 200, 100, 0.005)]);
        let layout = classify_edges(&edges, &config());
        assert_eq!(layout.layout_type, LayoutType::CameraOnly);
        assert_eq!(layout.split_ratio, 0.0);
        assert!(layout.screen_region.is_none());
    }

    #[test]
    fn test_aggregate_majority_vote() {
        let screen = LayoutAnalysis {
            layout_type: LayoutType::ScreenOnly,
            screen_region: Some(Region::full_frame(1920, 1080)),
            camera_region: None,
            split_ratio: 1.0,
            confidence: 0.7,
        };
        let camera = LayoutAnalysis {
            layout_type: LayoutType::CameraOnly,
            screen_region: None,
            camera_region: Some(Region::full_frame(1920, 1080)),
            split_ratio: 0.0,
            confidence: 0.6,
        };

        let layout =
            aggregate_detections(vec![screen.clone(), screen.clone(), camera], 1920, 1080);
        assert_eq!(layout.layout_type, LayoutType::ScreenOnly);
        assert!((layout.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_aggregate_low_confidence_falls_back() {
        let shaky = LayoutAnalysis {
            layout_type: LayoutType::PictureInPicture,
            screen_region: Some(Region::full_frame(1920, 1080)),
            camera_region: Some(Region {
                x: 0,
                y: 0,
                w: 100,
                h: 100,
            }),
            split_ratio: 0.9,
            confidence: 0.4,
        };
        let layout = aggregate_detections(vec![shaky.clone(), shaky], 1920, 1080);
        assert_eq!(layout.layout_type, LayoutType::ScreenOnly);
        assert_eq!(layout.confidence, 0.0);
        assert_eq!(layout.screen_region.unwrap().w, 1920);
    }

    #[test]
    fn test_aggregate_empty_is_safe_default() {
        let layout = aggregate_detections(vec![], 1280, 720);
        assert_eq!(layout.layout_type, LayoutType::ScreenOnly);
        assert_eq!(layout.confidence, 0.0);
    }
}
