//! Handlers for the goal-based learning loop.

use std::sync::atomic::Ordering;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bank::render::RenderedItem;
use crate::bank::QuestionType;
use crate::learn::{Goal, LearningProgress, LearningSession, SelfRating, Stage};
use crate::response::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartGoalRequest {
    pub goal_id: String,
    #[serde(default)]
    pub goal_name: Option<String>,
    #[serde(default)]
    pub target_word_count: Option<u32>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CardResponse {
    #[serde(flatten)]
    pub item: RenderedItem,
    pub stage: Stage,
    pub is_first_exposure: bool,
}

#[derive(Debug, Serialize)]
pub struct StartGoalResponse {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub goal_name: String,
    pub target_word_count: u32,
    pub first_card: CardResponse,
}

#[derive(Debug, Deserialize)]
pub struct SubmitCardRequest {
    pub word: String,
    pub question_type: u8,
    pub self_rating: u8,
    pub is_correct: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitCardResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_card: Option<CardResponse>,
    pub session_progress: LearningProgress,
}

pub async fn start_goal(
    State(state): State<AppState>,
    Json(req): Json<StartGoalRequest>,
) -> Result<Json<StartGoalResponse>, AppError> {
    let goal = Goal::from_id(&req.goal_id)
        .ok_or_else(|| AppError::bad_request("goal_id must be elementary|middle|high|csat"))?;
    if let Some(target) = req.target_word_count {
        if target == 0 {
            return Err(AppError::bad_request("target_word_count must be positive"));
        }
    }

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

    let bank = state.bank();
    let session_id = Uuid::new_v4();
    let mut session = LearningSession::new(
        session_id,
        user_id,
        goal,
        req.goal_name,
        req.target_word_count,
        &bank,
    );
    if session.pool_size() == 0 {
        return Err(AppError::pool_exhausted("no bank items match this goal"));
    }

    let card = session
        .next_card(&bank, Utc::now())
        .ok_or_else(|| AppError::pool_exhausted("goal already complete"))?;
    let first_card = render_card(&state, &session, &card)?;
    let goal_name = session.goal_name.clone();
    let target_word_count = session.target_word_count;

    state
        .metrics()
        .learning_sessions_started
        .fetch_add(1, Ordering::Relaxed);
    if let Some(store) = state.store() {
        store.save_learning_session(&session).await?;
    }
    state.learning().insert(session_id, session);

    Ok(Json(StartGoalResponse {
        session_id,
        user_id,
        goal_name,
        target_word_count,
        first_card,
    }))
}

pub async fn submit_card(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SubmitCardRequest>,
) -> Result<Json<SubmitCardResponse>, AppError> {
    let question_type = QuestionType::try_from(req.question_type)
        .map_err(|_| AppError::bad_request("question_type must be 1-6"))?;
    let self_rating = SelfRating::try_from(req.self_rating)
        .map_err(|_| AppError::bad_request("self_rating must be 0-3"))?;

    let handle = state
        .learning()
        .get(&session_id)
        .ok_or_else(|| AppError::not_found("learning session not found or expired"))?;
    let mut session = handle.lock().await;

    // Learning state is durable; a session still resident in memory keeps
    // serving even past its idle TTL until the sweeper evicts it.
    let now = Utc::now();
    let bank = state.bank();
    let learned = session
        .submit(
            &bank,
            &req.word,
            question_type,
            self_rating,
            req.is_correct,
            now,
        )
        .map_err(|err| AppError::bad_request(err.to_string()))?
        .clone();
    state.metrics().cards_reviewed.fetch_add(1, Ordering::Relaxed);

    if let Some(store) = state.store() {
        store.save_learned_word(session_id, &learned).await?;
        store.save_learning_session(&session).await?;
    }

    let next_card = match session.next_card(&bank, now) {
        Some(card) => Some(render_card(&state, &session, &card)?),
        None => None,
    };

    Ok(Json(SubmitCardResponse {
        next_card,
        session_progress: session.progress(),
    }))
}

pub async fn progress(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<LearningProgress>, AppError> {
    let handle = state
        .learning()
        .get(&session_id)
        .ok_or_else(|| AppError::not_found("learning session not found or expired"))?;
    let session = handle.lock().await;
    Ok(Json(session.progress()))
}

fn render_card(
    state: &AppState,
    session: &LearningSession,
    card: &crate::learn::NextCard,
) -> Result<CardResponse, AppError> {
    let bank = state.bank();
    let rendered = bank
        .render(
            card.word_id,
            card.question_type,
            session.render_seed(card.word_id),
        )
        .ok_or_else(|| {
            AppError::internal(format!("card for item {} could not be rendered", card.word_id))
        })?;
    Ok(CardResponse {
        item: rendered,
        stage: card.stage,
        is_first_exposure: card.is_first_exposure,
    })
}
