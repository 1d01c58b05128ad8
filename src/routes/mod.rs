//! HTTP router for the diagnostic engine API.

mod admin;
mod health;
mod learn;
mod test;

use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::response::AppError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/test/start", post(test::start_test))
        .route("/api/v1/test/:session_id/respond", post(test::respond))
        .route("/api/v1/test/:session_id/results", get(test::results))
        .route("/api/v1/user/:user_id/history", get(test::history))
        .route("/api/v1/learn/:session_id/plan", get(test::study_plan))
        .route("/api/v1/learn/:session_id/matrix", get(test::knowledge_matrix))
        .route("/api/v1/learn/goal/start", post(learn::start_goal))
        .route("/api/v1/learn/goal/:session_id/submit", post(learn::submit_card))
        .route("/api/v1/learn/goal/:session_id/progress", get(learn::progress))
        .route("/api/v1/admin/stats", get(admin::stats))
        .route("/api/v1/admin/exposure", get(admin::exposure))
        .route("/api/v1/admin/exposure/expansion", get(admin::exposure_expansion))
        .route("/api/v1/admin/recalibrate", post(admin::recalibrate))
        .route("/api/v1/admin/cleanup", post(admin::cleanup))
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(health::metrics))
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    AppError::not_found("no such endpoint").into_response()
}
