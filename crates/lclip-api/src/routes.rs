//! API routes.

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::handlers::credentials::{delete_credential, store_credential};
use crate::handlers::health::health;
use crate::handlers::jobs::{cancel_job, create_job, delete_job, get_job, start_processing};
use crate::handlers::results::{generate_quiz, generate_summary, get_results};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;
use crate::ws::ws_job_progress;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id", delete(delete_job))
        .route("/jobs/:job_id/process", post(start_processing))
        .route("/jobs/:job_id/cancel", post(cancel_job))
        .route("/jobs/:job_id/results", get(get_results))
        .route("/jobs/:job_id/summary", post(generate_summary))
        .route("/jobs/:job_id/quiz", post(generate_quiz));

    let credential_routes = Router::new()
        .route("/credentials", put(store_credential))
        .route("/credentials", delete(delete_credential));

    let ws_routes = Router::new().route("/ws/jobs/:job_id", get(ws_job_progress));

    let health_routes = Router::new().route("/health", get(health));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", job_routes.merge(credential_routes))
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
