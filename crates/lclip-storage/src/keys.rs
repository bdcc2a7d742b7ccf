//! Deterministic object key construction.
//!
//! Layout:
//! - `uploads/{job_id}/{timestamp}_original.{ext}`
//! - `clips/{job_id}/{clip_id}.mp4`
//! - `thumbnails/{job_id}/{clip_id}.jpg`
//! - `subtitles/{job_id}/{clip_id}.vtt`

use chrono::Utc;

/// Extract a lowercase extension from a filename, defaulting to `mp4`.
pub fn object_ext(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "mp4".to_string())
}

/// Key for an uploaded original.
pub fn upload_key(job_id: &str, filename: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    format!("uploads/{}/{}_original.{}", job_id, timestamp, object_ext(filename))
}

/// Key for a compiled clip.
pub fn clip_key(job_id: &str, clip_id: &str) -> String {
    format!("clips/{}/{}.mp4", job_id, clip_id)
}

/// Key for a clip thumbnail.
pub fn thumbnail_key(job_id: &str, clip_id: &str) -> String {
    format!("thumbnails/{}/{}.jpg", job_id, clip_id)
}

/// Key for a clip subtitle file.
pub fn subtitle_key(job_id: &str, clip_id: &str) -> String {
    format!("subtitles/{}/{}.vtt", job_id, clip_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ext() {
        assert_eq!(object_ext("lecture.MP4"), "mp4");
        assert_eq!(object_ext("lecture.webm"), "webm");
        assert_eq!(object_ext("noext"), "mp4");
        assert_eq!(object_ext("trailing."), "mp4");
    }

    #[test]
    fn test_upload_key_shape() {
        let key = upload_key("job_1", "lecture.mov");
        assert!(key.starts_with("uploads/job_1/"));
        assert!(key.ends_with("_original.mov"));
    }

    #[test]
    fn test_artifact_keys() {
        assert_eq!(clip_key("j", "c"), "clips/j/c.mp4");
        assert_eq!(thumbnail_key("j", "c"), "thumbnails/j/c.jpg");
        assert_eq!(subtitle_key("j", "c"), "subtitles/j/c.vtt");
    }
}
