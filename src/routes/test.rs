//! Handlers for adaptive test sessions and their post-test read side.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::bank::render::RenderedItem;
use crate::bank::QuestionType;
use crate::cat::session::ResponseRecord;
use crate::cat::{CatSession, Phase, Profile, Progress, SessionError, TerminationReason};
use crate::report::{self, matrix, plan, DiagnosticReport};
use crate::response::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartTestRequest {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub grade: String,
    pub self_assess: String,
    pub exam_experience: String,
    /// 1-6 for a fixed question type, 0 for mixed mode.
    #[serde(default)]
    pub question_type: u8,
}

#[derive(Debug, Serialize)]
pub struct StartTestResponse {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub initial_theta: f64,
    pub first_item: RenderedItem,
    pub progress: Progress,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub item_id: u32,
    pub is_correct: bool,
    #[serde(default)]
    pub is_dont_know: bool,
    #[serde(default)]
    pub response_time_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct RespondResponse {
    pub is_complete: bool,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_item: Option<RenderedItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsResponse>,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub report: DiagnosticReport,
}

pub async fn start_test(
    State(state): State<AppState>,
    Json(req): Json<StartTestRequest>,
) -> Result<Json<StartTestResponse>, AppError> {
    if req.grade.trim().is_empty() {
        return Err(AppError::bad_request("grade is required"));
    }
    let preferred_type = match req.question_type {
        0 => None,
        code => Some(
            QuestionType::try_from(code)
                .map_err(|_| AppError::bad_request("question_type must be 0-6"))?,
        ),
    };

    let user_id = match state.store() {
        Some(store) => store
            .ensure_user(req.user_id, req.nickname.as_deref())
            .await
            .map_err(|err| match err {
                crate::db::StoreError::Sqlx(sqlx::Error::RowNotFound) => {
                    AppError::not_found("unknown user")
                }
                other => other.into(),
            })?,
        None => req.user_id.unwrap_or_else(Uuid::new_v4),
    };

    let profile = Profile {
        grade: req.grade,
        self_assess: req.self_assess,
        exam_experience: req.exam_experience,
        preferred_type,
    };

    let session_id = Uuid::new_v4();
    let mut session = CatSession::new(session_id, user_id, profile);
    let bank = state.bank();
    let exposure = state.exposure();
    exposure.record_session_start();
    state.metrics().sessions_started.fetch_add(1, Ordering::Relaxed);

    let first_item = session.begin(&bank, &exposure).map_err(|err| match err {
        SessionError::PoolExhausted => {
            AppError::pool_exhausted("no eligible item for this profile")
        }
        other => AppError::internal(other.to_string()),
    })?;
    let initial_theta = session.initial_theta();
    let progress = session.progress();

    if let Some(store) = state.store() {
        store.create_test_session(&session).await?;
    }
    state.sessions().insert(session_id, session);

    Ok(Json(StartTestResponse {
        session_id,
        user_id,
        initial_theta,
        first_item,
        progress,
    }))
}

pub async fn respond(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, AppError> {
    let handle = live_session(&state, session_id).await?;
    let mut session = handle.lock().await;

    // The sweeper may not have run yet; an idle-expired session is gone.
    if session.phase() != Phase::Terminated
        && state.sessions().is_expired(&session, Utc::now())
    {
        session.expire();
        archive(&state, &session).await;
        return Err(AppError::gone("session expired"));
    }

    let bank = state.bank();
    let exposure = state.exposure();
    let outcome = session
        .submit(
            &bank,
            &exposure,
            req.item_id,
            req.is_correct,
            req.is_dont_know,
            req.response_time_ms,
        )
        .map_err(session_error_to_app)?;

    state.metrics().responses_total.fetch_add(1, Ordering::Relaxed);

    // Durable append; a failed write surfaces as 503 and the client's retry
    // lands on the duplicate path, which echoes the committed response.
    if let Some(store) = state.store() {
        let record = session
            .responses()
            .last()
            .expect("submit appended a response");
        store.append_response(session_id, record).await?;
    }

    let results = if let Some(reason) = outcome.terminated {
        state
            .metrics()
            .sessions_completed
            .fetch_add(1, Ordering::Relaxed);
        archive(&state, &session).await;
        let report = report::generate(
            &bank,
            session.theta(),
            session.se(),
            session.responses(),
            Some(reason),
        );
        Some(ResultsResponse { session_id, report })
    } else {
        None
    };

    Ok(Json(RespondResponse {
        is_complete: outcome.terminated.is_some(),
        progress: outcome.progress,
        next_item: outcome.next_item,
        results,
    }))
}

pub async fn results(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ResultsResponse>, AppError> {
    let report = terminal_report(&state, session_id).await?;
    Ok(Json(ResultsResponse { session_id, report }))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub user_id: Uuid,
    pub total_sessions: usize,
    pub sessions: Vec<crate::db::records::SessionSummary>,
}

pub async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, AppError> {
    let store = state
        .store()
        .ok_or_else(|| AppError::persistence_unavailable("history requires a database"))?;
    // Distinguish "no user" from "a user with no sessions".
    store
        .ensure_user(Some(user_id), None)
        .await
        .map_err(|_| AppError::not_found("unknown user"))?;
    let sessions = store.load_history(user_id).await?;
    Ok(Json(HistoryResponse {
        user_id,
        total_sessions: sessions.len(),
        sessions,
    }))
}

pub async fn study_plan(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<plan::StudyPlan>, AppError> {
    let report = terminal_report(&state, session_id).await?;
    let bank = state.bank();
    let seed = u64::from_le_bytes(
        session_id.as_bytes()[..8]
            .try_into()
            .expect("uuid has 16 bytes"),
    );
    let plan = plan::generate(&bank, &report.dimension_scores, report.theta, seed);
    Ok(Json(plan))
}

pub async fn knowledge_matrix(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<matrix::KnowledgeMatrix>, AppError> {
    let report = terminal_report(&state, session_id).await?;
    let bank = state.bank();
    let matrix = matrix::compute(
        &bank,
        report.theta,
        report.cefr_band(),
        state.engine().matrix_sample_size,
    );
    Ok(Json(matrix))
}

async fn live_session(
    state: &AppState,
    session_id: Uuid,
) -> Result<Arc<Mutex<CatSession>>, AppError> {
    state
        .sessions()
        .get(&session_id)
        .ok_or_else(|| AppError::not_found("session not found or expired"))
}

/// Terminal report for a session, from memory when still resident and
/// otherwise by replaying the archived responses through the estimator.
async fn terminal_report(
    state: &AppState,
    session_id: Uuid,
) -> Result<DiagnosticReport, AppError> {
    let bank = state.bank();

    if let Some(handle) = state.sessions().get(&session_id) {
        let session = handle.lock().await;
        if session.phase() != Phase::Terminated {
            return Err(AppError::bad_request("session is not complete yet"));
        }
        return Ok(report::generate(
            &bank,
            session.theta(),
            session.se(),
            session.responses(),
            session.termination_reason(),
        ));
    }

    let store = state
        .store()
        .ok_or_else(|| AppError::not_found("session not found or expired"))?;
    let row = store
        .load_session_row(session_id)
        .await?
        .ok_or_else(|| AppError::not_found("session not found"))?;
    let rows = store.load_responses(session_id).await?;

    let records: Vec<(u32, QuestionType, bool, bool)> = rows
        .iter()
        .filter_map(|r| {
            QuestionType::try_from(r.question_type as u8)
                .ok()
                .map(|qtype| (r.item_id as u32, qtype, r.is_correct, r.is_dont_know))
        })
        .collect();
    let posterior = CatSession::replay_posterior(&bank, &records)
        .map_err(|err| AppError::invariant_violation(err.to_string()))?;

    let response_records: Vec<ResponseRecord> = rows
        .iter()
        .filter_map(|r| {
            QuestionType::try_from(r.question_type as u8)
                .ok()
                .map(|qtype| ResponseRecord {
                    item_id: r.item_id as u32,
                    question_type: qtype,
                    is_correct: r.is_correct,
                    is_dont_know: r.is_dont_know,
                    response_time_ms: r.response_time_ms,
                    theta_after: r.theta_after,
                    se_after: r.se_after,
                    sequence: r.sequence_idx as u32,
                    answered_at: row.started_at,
                })
        })
        .collect();

    let reason = row
        .termination_reason
        .as_deref()
        .and_then(|raw| raw.parse::<TerminationReason>().ok());
    Ok(report::generate(
        &bank,
        posterior.theta_hat(),
        posterior.se(),
        &response_records,
        reason,
    ))
}

async fn archive(state: &AppState, session: &CatSession) {
    crate::workers::archive_session(state, session).await;
}

fn session_error_to_app(err: SessionError) -> AppError {
    match err {
        SessionError::AlreadyTerminated => AppError::gone("session already terminated"),
        SessionError::DuplicateResponse { item_id, committed } => {
            AppError::conflict(format!("item {item_id} was already answered"))
                .with_detail(*committed)
        }
        SessionError::NotLastIssued { item_id } => AppError::bad_request(format!(
            "item {item_id} is not the item awaiting a response"
        )),
        SessionError::PoolExhausted => AppError::pool_exhausted("no eligible item remains"),
        SessionError::RenderFailed { item_id } => {
            AppError::internal(format!("item {item_id} could not be rendered"))
        }
        SessionError::Invariant(err) => AppError::invariant_violation(err.to_string()),
    }
}

