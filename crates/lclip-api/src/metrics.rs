//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus recorder and return the render handle.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "lclip_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "lclip_http_request_duration_seconds";
    pub const WS_CONNECTIONS_ACTIVE: &str = "lclip_ws_connections_active";
    pub const WS_FRAMES_SENT: &str = "lclip_ws_frames_sent_total";
    pub const RATE_LIMIT_HITS_TOTAL: &str = "lclip_rate_limit_hits_total";
}

/// Record one HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Adjust the live WebSocket connection gauge.
pub fn adjust_ws_connections(delta: f64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).increment(delta);
}

/// Record a WebSocket frame sent to a client.
pub fn record_ws_frame(frame_type: &str) {
    let labels = [("type", frame_type.to_string())];
    counter!(names::WS_FRAMES_SENT, &labels).increment(1);
}

/// Record a rate-limit rejection.
pub fn record_rate_limit_hit(class: &'static str) {
    counter!(names::RATE_LIMIT_HITS_TOTAL, "class" => class).increment(1);
}

/// Collapse job ids out of paths so metric cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(|part| {
            if part.starts_with("job_") {
                ":job_id"
            } else {
                part
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// HTTP metrics middleware.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/jobs/job_20260801120000_ab12cd34/results"),
            "/api/jobs/:job_id/results"
        );
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
