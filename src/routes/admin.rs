//! Operational endpoints: aggregate statistics, exposure health, manual
//! recalibration and cleanup.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::bank::calibrate::{self, CalibrationSummary};
use crate::report::pool::{self, ExpansionAnalysis, PoolHealth};
use crate::response::AppError;
use crate::state::AppState;
use crate::workers;

#[derive(Debug, Serialize)]
pub struct BankStats {
    pub size: usize,
    pub version: u32,
    pub model: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AdminStats {
    pub uptime_seconds: u64,
    pub bank: BankStats,
    pub active_test_sessions: usize,
    pub active_learning_sessions: usize,
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub responses_total: u64,
    pub learning_sessions_started: u64,
    pub cards_reviewed: u64,
    pub exposure_sessions: u64,
}

pub async fn stats(State(state): State<AppState>) -> Json<AdminStats> {
    let bank = state.bank();
    let metrics = state.metrics();
    Json(AdminStats {
        uptime_seconds: state.uptime_seconds(),
        bank: BankStats {
            size: bank.len(),
            version: bank.version(),
            model: if bank.uses_3pl() { "3PL" } else { "2PL" },
        },
        active_test_sessions: state.sessions().len(),
        active_learning_sessions: state.learning().len(),
        sessions_started: metrics.sessions_started.load(Ordering::Relaxed),
        sessions_completed: metrics.sessions_completed.load(Ordering::Relaxed),
        responses_total: metrics.responses_total.load(Ordering::Relaxed),
        learning_sessions_started: metrics.learning_sessions_started.load(Ordering::Relaxed),
        cards_reviewed: metrics.cards_reviewed.load(Ordering::Relaxed),
        exposure_sessions: state.exposure().sessions_started(),
    })
}

pub async fn exposure(State(state): State<AppState>) -> Json<PoolHealth> {
    let bank = state.bank();
    Json(pool::analyze(&bank, &state.exposure()))
}

pub async fn exposure_expansion(State(state): State<AppState>) -> Json<ExpansionAnalysis> {
    let bank = state.bank();
    Json(pool::expansion_needs(&bank, &state.exposure()))
}

/// Offline Bayesian recalibration: pull archived responses, update item
/// parameters under the guard bounds, publish the new bank version.
pub async fn recalibrate(
    State(state): State<AppState>,
) -> Result<Json<CalibrationSummary>, AppError> {
    let store = state
        .store()
        .ok_or_else(|| AppError::persistence_unavailable("recalibration requires a database"))?;

    let grouped = store.responses_grouped_by_item().await?;
    let total_sessions = store.total_completed_sessions().await?;
    let bank = state.bank();
    let (next, summary) = calibrate::recalibrate(
        &bank,
        &grouped,
        state.engine().calibration_threshold,
        total_sessions,
    );
    state.publish_bank(next);
    tracing::info!(
        considered = summary.items_considered,
        updated = summary.items_updated,
        rejected = summary.items_rejected,
        "recalibration finished"
    );
    Ok(Json(summary))
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub evicted_test_sessions: usize,
    pub evicted_learning_sessions: usize,
}

pub async fn cleanup(State(state): State<AppState>) -> Json<CleanupResponse> {
    let (tests, learning) = workers::sweep_expired(&state).await;
    Json(CleanupResponse {
        evicted_test_sessions: tests,
        evicted_learning_sessions: learning,
    })
}
