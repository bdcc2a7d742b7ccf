//! Keep-interval timeline math for silence-aware transcription.
//!
//! Silence removal compresses the audio timeline: the keep-intervals (the
//! complement of the silence regions) are concatenated into one stream, and
//! model timestamps on that compressed stream must be translated back onto
//! the original timeline. Compression preserves duration within each
//! keep-interval, so the translation is piecewise identity-scale.

use lclip_models::SilenceRegion;

/// A span of the original timeline that survives silence removal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeepInterval {
    pub start: f64,
    pub end: f64,
}

impl KeepInterval {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Compute the keep-intervals: the complement of the silence regions
/// against `[0, duration]`.
///
/// Regions must be sorted by start (the artifact store guarantees this).
/// No silence yields a single interval covering the whole timeline; a fully
/// silent video yields an empty list.
pub fn keep_intervals(silence: &[SilenceRegion], duration: f64) -> Vec<KeepInterval> {
    if duration <= 0.0 {
        return Vec::new();
    }
    if silence.is_empty() {
        return vec![KeepInterval {
            start: 0.0,
            end: duration,
        }];
    }

    let mut intervals = Vec::new();
    let mut cursor = 0.0;

    for region in silence {
        if cursor < region.start {
            intervals.push(KeepInterval {
                start: cursor,
                end: region.start.min(duration),
            });
        }
        cursor = cursor.max(region.end);
        if cursor >= duration {
            break;
        }
    }

    if cursor < duration {
        intervals.push(KeepInterval {
            start: cursor,
            end: duration,
        });
    }

    intervals.retain(|k| k.duration() > 0.0);
    intervals
}

/// One entry of the compressed-to-original mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapEntry {
    pub compressed_start: f64,
    pub compressed_end: f64,
    pub original_start: f64,
    pub original_end: f64,
}

/// Piecewise mapping from the compressed timeline back to the original.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampMap {
    entries: Vec<MapEntry>,
}

impl TimestampMap {
    /// Build the mapping for an ordered list of keep-intervals.
    pub fn build(intervals: &[KeepInterval]) -> Self {
        let mut entries = Vec::with_capacity(intervals.len());
        let mut compressed = 0.0;

        for interval in intervals {
            let duration = interval.duration();
            entries.push(MapEntry {
                compressed_start: compressed,
                compressed_end: compressed + duration,
                original_start: interval.start,
                original_end: interval.end,
            });
            compressed += duration;
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    /// Total length of the compressed stream.
    pub fn compressed_duration(&self) -> f64 {
        self.entries
            .last()
            .map(|e| e.compressed_end)
            .unwrap_or(0.0)
    }

    /// Translate a point on the compressed timeline to the original
    /// timeline. Returns `None` when the point lies outside every entry.
    ///
    /// Within an entry the mapping is distance-preserving:
    /// `remap(p) - original_start == p - compressed_start`.
    pub fn remap(&self, point: f64) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| point >= e.compressed_start && point <= e.compressed_end)
            .map(|e| e.original_start + (point - e.compressed_start))
    }

    /// Translate a segment. Returns `None` when either endpoint cannot be
    /// located; such segments are dropped by the caller.
    pub fn remap_segment(&self, start: f64, end: f64) -> Option<(f64, f64)> {
        Some((self.remap(start)?, self.remap(end)?))
    }
}

/// A chunk of the compressed stream scheduled for transcription.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkPlan {
    /// Chunk index, 0-based
    pub index: usize,
    /// Offset of the chunk on the compressed timeline
    pub offset: f64,
    /// Chunk length in seconds
    pub duration: f64,
}

/// Split a compressed stream into chunks of at most `chunk_seconds`.
pub fn plan_chunks(total_seconds: f64, chunk_seconds: f64) -> Vec<ChunkPlan> {
    if total_seconds <= 0.0 || chunk_seconds <= 0.0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut offset = 0.0;
    let mut index = 0;

    while offset < total_seconds {
        let duration = chunk_seconds.min(total_seconds - offset);
        chunks.push(ChunkPlan {
            index,
            offset,
            duration,
        });
        offset += duration;
        index += 1;
    }

    chunks
}
