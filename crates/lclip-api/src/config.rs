//! API server configuration.

use std::time::Duration;

/// HTTP surface configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max JSON request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,

    // Per-endpoint-class rate limits (requests per minute per principal)
    pub rate_limit_submit_per_minute: u32,
    pub rate_limit_progress_per_minute: u32,
    pub rate_limit_status_per_minute: u32,
    pub rate_limit_results_per_minute: u32,
    pub rate_limit_admin_per_minute: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
            environment: "development".to_string(),
            rate_limit_submit_per_minute: 10,
            rate_limit_progress_per_minute: 60,
            rate_limit_status_per_minute: 120,
            rate_limit_results_per_minute: 60,
            rate_limit_admin_per_minute: 30,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT", defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|o| o.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            request_timeout: Duration::from_secs(env_parse("REQUEST_TIMEOUT", 30)),
            max_body_size: env_parse("MAX_BODY_SIZE", defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            rate_limit_submit_per_minute: env_parse(
                "RATE_LIMIT_SUBMIT_PER_MINUTE",
                defaults.rate_limit_submit_per_minute,
            ),
            rate_limit_progress_per_minute: env_parse(
                "RATE_LIMIT_PROGRESS_PER_MINUTE",
                defaults.rate_limit_progress_per_minute,
            ),
            rate_limit_status_per_minute: env_parse(
                "RATE_LIMIT_STATUS_PER_MINUTE",
                defaults.rate_limit_status_per_minute,
            ),
            rate_limit_results_per_minute: env_parse(
                "RATE_LIMIT_RESULTS_PER_MINUTE",
                defaults.rate_limit_results_per_minute,
            ),
            rate_limit_admin_per_minute: env_parse(
                "RATE_LIMIT_ADMIN_PER_MINUTE",
                defaults.rate_limit_admin_per_minute,
            ),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
