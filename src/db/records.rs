//! Row types for the persistence port.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TestSessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub final_theta: Option<f64>,
    pub final_se: Option<f64>,
    pub termination_reason: Option<String>,
    pub profile_json: serde_json::Value,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ResponseRow {
    pub id: i64,
    pub session_id: Uuid,
    pub item_id: i32,
    pub question_type: i16,
    pub is_correct: bool,
    pub is_dont_know: bool,
    pub response_time_ms: i64,
    pub theta_after: f64,
    pub se_after: f64,
    pub sequence_idx: i32,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub final_theta: Option<f64>,
    pub final_se: Option<f64>,
    pub termination_reason: Option<String>,
    pub item_count: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct CalibrationRow {
    pub item_id: i32,
    pub theta_after: f64,
    pub is_correct: bool,
}
