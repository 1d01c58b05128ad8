//! Liveness, readiness, and metrics exposition.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.uptime_seconds(),
    })
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub bank_size: usize,
    pub bank_version: u32,
    pub database: bool,
}

pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let bank = state.bank();
    Json(ReadyResponse {
        ready: !bank.is_empty(),
        bank_size: bank.len(),
        bank_version: bank.version(),
        database: state.store().is_some(),
    })
}

pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics().render_prometheus()
}
