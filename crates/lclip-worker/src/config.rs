//! Worker configuration from environment variables.

use std::time::Duration;

use lclip_models::Stage;

/// Pipeline configuration. Constructed once at startup and threaded into
/// every component; there is no process-wide settings global.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    // Upload validation
    pub max_upload_size_bytes: u64,
    pub allowed_content_types: Vec<String>,
    pub allowed_extensions: Vec<String>,

    // Silence detection
    pub silence_threshold_dbfs: f32,
    pub min_silence_ms: u64,

    // Content analysis
    pub segment_min_seconds: u64,
    pub segment_max_seconds: u64,
    pub min_importance_score: f32,

    // Clip selection
    pub clip_min_duration_seconds: f64,
    pub clip_max_duration_seconds: f64,
    pub max_clips_per_job: usize,

    // Compilation
    pub compile_max_workers: usize,

    // Executor policy
    pub stage_timeout_seconds: u64,
    pub compile_timeout_seconds: u64,
    pub stage_max_retries: u32,
    pub stage_retry_backoff_base_seconds: u64,

    // Scheduling
    pub max_concurrent_jobs: usize,
    pub concurrent_jobs_per_principal: u64,

    // Layout heuristic thresholds (empirically tuned defaults)
    pub layout_half_density_floor: f32,
    pub layout_half_density_delta: f32,
    pub layout_corner_density_floor: f32,
    pub layout_screen_density_floor: f32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_upload_size_bytes: 500 * 1024 * 1024,
            allowed_content_types: vec![
                "video/mp4".to_string(),
                "video/quicktime".to_string(),
                "video/x-msvideo".to_string(),
                "video/x-matroska".to_string(),
                "video/webm".to_string(),
            ],
            allowed_extensions: vec![
                ".mp4".to_string(),
                ".mov".to_string(),
                ".avi".to_string(),
                ".mkv".to_string(),
                ".webm".to_string(),
            ],
            silence_threshold_dbfs: -40.0,
            min_silence_ms: 500,
            segment_min_seconds: 30,
            segment_max_seconds: 300,
            min_importance_score: 0.3,
            clip_min_duration_seconds: 105.0,
            clip_max_duration_seconds: 330.0,
            max_clips_per_job: 5,
            compile_max_workers: 2,
            stage_timeout_seconds: 1800,
            compile_timeout_seconds: 3600,
            stage_max_retries: 2,
            stage_retry_backoff_base_seconds: 60,
            max_concurrent_jobs: 4,
            concurrent_jobs_per_principal: 3,
            layout_half_density_floor: 0.05,
            layout_half_density_delta: 0.1,
            layout_corner_density_floor: 0.08,
            layout_screen_density_floor: 0.04,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_list(name: &str, default: Vec<String>) -> Vec<String> {
    std::env::var(name)
        .map(|s| {
            s.split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        })
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_upload_size_bytes: env_parse(
                "MAX_UPLOAD_SIZE_BYTES",
                defaults.max_upload_size_bytes,
            ),
            allowed_content_types: env_list(
                "ALLOWED_CONTENT_TYPES",
                defaults.allowed_content_types,
            ),
            allowed_extensions: env_list("ALLOWED_EXTENSIONS", defaults.allowed_extensions),
            silence_threshold_dbfs: env_parse(
                "SILENCE_THRESHOLD_DBFS",
                defaults.silence_threshold_dbfs,
            ),
            min_silence_ms: env_parse("MIN_SILENCE_MS", defaults.min_silence_ms),
            segment_min_seconds: env_parse("SEGMENT_MIN_SECONDS", defaults.segment_min_seconds),
            segment_max_seconds: env_parse("SEGMENT_MAX_SECONDS", defaults.segment_max_seconds),
            min_importance_score: env_parse("MIN_IMPORTANCE_SCORE", defaults.min_importance_score),
            clip_min_duration_seconds: env_parse(
                "CLIP_MIN_DURATION_SECONDS",
                defaults.clip_min_duration_seconds,
            ),
            clip_max_duration_seconds: env_parse(
                "CLIP_MAX_DURATION_SECONDS",
                defaults.clip_max_duration_seconds,
            ),
            max_clips_per_job: env_parse("MAX_CLIPS_PER_JOB", defaults.max_clips_per_job),
            compile_max_workers: env_parse("COMPILE_MAX_WORKERS", defaults.compile_max_workers)
                .clamp(1, 4),
            stage_timeout_seconds: env_parse(
                "STAGE_TIMEOUT_SECONDS",
                defaults.stage_timeout_seconds,
            ),
            compile_timeout_seconds: env_parse(
                "COMPILE_STAGE_TIMEOUT_SECONDS",
                defaults.compile_timeout_seconds,
            ),
            stage_max_retries: env_parse("STAGE_MAX_RETRIES", defaults.stage_max_retries),
            stage_retry_backoff_base_seconds: env_parse(
                "STAGE_RETRY_BACKOFF_BASE_SECONDS",
                defaults.stage_retry_backoff_base_seconds,
            ),
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs),
            concurrent_jobs_per_principal: env_parse(
                "CONCURRENT_JOBS_PER_PRINCIPAL",
                defaults.concurrent_jobs_per_principal,
            ),
            layout_half_density_floor: env_parse(
                "LAYOUT_HALF_DENSITY_FLOOR",
                defaults.layout_half_density_floor,
            ),
            layout_half_density_delta: env_parse(
                "LAYOUT_HALF_DENSITY_DELTA",
                defaults.layout_half_density_delta,
            ),
            layout_corner_density_floor: env_parse(
                "LAYOUT_CORNER_DENSITY_FLOOR",
                defaults.layout_corner_density_floor,
            ),
            layout_screen_density_floor: env_parse(
                "LAYOUT_SCREEN_DENSITY_FLOOR",
                defaults.layout_screen_density_floor,
            ),
        }
    }

    /// Timeout for one attempt of a stage.
    pub fn stage_timeout(&self, stage: Stage) -> Duration {
        let secs = match stage {
            Stage::CompileClips => self.compile_timeout_seconds,
            _ => self.stage_timeout_seconds,
        };
        Duration::from_secs(secs)
    }

    /// Backoff before retry `attempt` (1-based): base * 2^(attempt-1).
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let base = self.stage_retry_backoff_base_seconds;
        Duration::from_secs(base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1))))
    }
}
