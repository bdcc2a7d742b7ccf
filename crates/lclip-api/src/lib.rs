//! Axum HTTP/WS surface for LectureClip.
//!
//! Exposes job submission and lifecycle endpoints, the live progress
//! WebSocket, results with presigned URLs, on-demand summaries/quizzes,
//! and credential management, behind bearer-token auth and per-principal
//! keyed rate limits.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod quota;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
