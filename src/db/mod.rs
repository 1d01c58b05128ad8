//! Typed persistence port backed by Postgres.
//!
//! The store is optional: without `DATABASE_URL` the service runs fully in
//! memory and every write becomes a no-op at the call sites. Writes for one
//! session always flow through that session's serialized handler, so rows
//! are strictly ordered per session.

pub mod records;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::bank::calibrate::ResponseObs;
use crate::cat::session::ResponseRecord;
use crate::cat::{CatSession, Phase};
use crate::learn::LearningSession;

use records::{CalibrationRow, ResponseRow, SessionSummary, TestSessionRow};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 50;
const RETRY_MAX_DELAY_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("DATABASE_URL is not set")]
    NotConfigured,
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn from_env() -> Result<Arc<Self>, StoreError> {
        let url = std::env::var("DATABASE_URL").map_err(|_| StoreError::NotConfigured)?;
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&url)
            .await?;
        let store = Arc::new(Self { pool });
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                nickname TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                last_active_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS test_sessions (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id),
                started_at TIMESTAMPTZ NOT NULL,
                last_activity_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                final_theta DOUBLE PRECISION,
                final_se DOUBLE PRECISION,
                termination_reason TEXT,
                profile_json JSONB NOT NULL DEFAULT '{}'::jsonb
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                id BIGSERIAL PRIMARY KEY,
                session_id UUID NOT NULL REFERENCES test_sessions(id),
                item_id INTEGER NOT NULL,
                question_type SMALLINT NOT NULL,
                is_correct BOOLEAN NOT NULL,
                is_dont_know BOOLEAN NOT NULL DEFAULT FALSE,
                response_time_ms BIGINT NOT NULL DEFAULT 0,
                theta_after DOUBLE PRECISION NOT NULL,
                se_after DOUBLE PRECISION NOT NULL,
                sequence_idx INTEGER NOT NULL,
                UNIQUE (session_id, item_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS goal_learning_sessions (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES users(id),
                goal_id TEXT NOT NULL,
                target_word_count INTEGER NOT NULL,
                words_studied INTEGER NOT NULL DEFAULT 0,
                words_mastered INTEGER NOT NULL DEFAULT 0,
                total_reviews INTEGER NOT NULL DEFAULT 0,
                started_at TIMESTAMPTZ NOT NULL,
                last_activity_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS learned_words (
                id BIGSERIAL PRIMARY KEY,
                session_id UUID NOT NULL REFERENCES goal_learning_sessions(id),
                word TEXT NOT NULL,
                review_count INTEGER NOT NULL DEFAULT 0,
                correct_count INTEGER NOT NULL DEFAULT 0,
                next_review_at TIMESTAMPTZ,
                ease_factor DOUBLE PRECISION NOT NULL DEFAULT 2.5,
                interval_days INTEGER NOT NULL DEFAULT 0,
                is_mastered BOOLEAN NOT NULL DEFAULT FALSE,
                mastered_at TIMESTAMPTZ,
                assessment_history_json JSONB NOT NULL DEFAULT '[]'::jsonb,
                dvk_level SMALLINT NOT NULL DEFAULT 0,
                UNIQUE (session_id, word)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Retry a write with capped exponential backoff; exhaustion surfaces to
    /// the caller as `persistence_unavailable`.
    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        let mut delay = RETRY_BASE_DELAY_MS;
        let mut last_err = None;
        for attempt in 0..RETRY_ATTEMPTS {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::warn!(op, attempt, error = %err, "persistence write failed");
                    last_err = Some(err);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    delay = (delay * 2).min(RETRY_MAX_DELAY_MS);
                }
            }
        }
        Err(StoreError::Sqlx(last_err.expect("at least one attempt ran")))
    }

    pub async fn ensure_user(
        &self,
        user_id: Option<Uuid>,
        nickname: Option<&str>,
    ) -> Result<Uuid, StoreError> {
        if let Some(id) = user_id {
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                return Err(StoreError::Sqlx(sqlx::Error::RowNotFound));
            }
            sqlx::query("UPDATE users SET last_active_at = now() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            return Ok(id);
        }
        let id = Uuid::new_v4();
        self.with_retry("ensure_user", || {
            let nickname = nickname.map(str::to_string);
            async move {
                sqlx::query("INSERT INTO users (id, nickname) VALUES ($1, $2)")
                    .bind(id)
                    .bind(nickname)
                    .execute(&self.pool)
                    .await
                    .map(|_| ())
            }
        })
        .await?;
        Ok(id)
    }

    pub async fn create_test_session(&self, session: &CatSession) -> Result<(), StoreError> {
        let profile = serde_json::to_value(session.profile()).unwrap_or_default();
        let (id, user_id, started_at, last_activity) = (
            session.id,
            session.user_id,
            session.started_at,
            session.last_activity,
        );
        self.with_retry("create_test_session", || {
            let profile = profile.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO test_sessions (id, user_id, started_at, last_activity_at, profile_json)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (id) DO NOTHING
                    "#,
                )
                .bind(id)
                .bind(user_id)
                .bind(started_at)
                .bind(last_activity)
                .bind(profile)
                .execute(&self.pool)
                .await
                .map(|_| ())
            }
        })
        .await
    }

    pub async fn append_response(
        &self,
        session_id: Uuid,
        record: &ResponseRecord,
    ) -> Result<(), StoreError> {
        let record = record.clone();
        self.with_retry("append_response", || {
            let record = record.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO responses
                        (session_id, item_id, question_type, is_correct, is_dont_know,
                         response_time_ms, theta_after, se_after, sequence_idx)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    ON CONFLICT (session_id, item_id) DO NOTHING
                    "#,
                )
                .bind(session_id)
                .bind(record.item_id as i32)
                .bind(record.question_type.code() as i16)
                .bind(record.is_correct)
                .bind(record.is_dont_know)
                .bind(record.response_time_ms)
                .bind(record.theta_after)
                .bind(record.se_after)
                .bind(record.sequence as i32)
                .execute(&self.pool)
                .await
                .map(|_| ())
            }
        })
        .await
    }

    /// Archive a terminated session. Prior responses stay untouched even for
    /// corrupted sessions.
    pub async fn archive_session(&self, session: &CatSession) -> Result<(), StoreError> {
        let completed_at = if session.phase() == Phase::Terminated {
            Some(Utc::now())
        } else {
            None
        };
        let reason = session.termination_reason().map(|r| r.as_str().to_string());
        let (id, theta, se, last_activity) = (
            session.id,
            session.theta(),
            session.se(),
            session.last_activity,
        );
        self.with_retry("archive_session", || {
            let reason = reason.clone();
            async move {
                sqlx::query(
                    r#"
                    UPDATE test_sessions
                    SET completed_at = $2, final_theta = $3, final_se = $4,
                        termination_reason = $5, last_activity_at = $6
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(completed_at)
                .bind(theta)
                .bind(se)
                .bind(reason)
                .bind(last_activity)
                .execute(&self.pool)
                .await
                .map(|_| ())
            }
        })
        .await
    }

    pub async fn load_session_row(
        &self,
        session_id: Uuid,
    ) -> Result<Option<TestSessionRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, TestSessionRow>("SELECT * FROM test_sessions WHERE id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn load_responses(&self, session_id: Uuid) -> Result<Vec<ResponseRow>, StoreError> {
        Ok(sqlx::query_as::<_, ResponseRow>(
            "SELECT * FROM responses WHERE session_id = $1 ORDER BY sequence_idx",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn load_history(&self, user_id: Uuid) -> Result<Vec<SessionSummary>, StoreError> {
        Ok(sqlx::query_as::<_, SessionSummary>(
            r#"
            SELECT s.id, s.started_at, s.completed_at, s.final_theta, s.final_se,
                   s.termination_reason,
                   (SELECT COUNT(*) FROM responses r WHERE r.session_id = s.id) AS item_count
            FROM test_sessions s
            WHERE s.user_id = $1
            ORDER BY s.started_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Responses grouped per item for offline calibration, keyed by the
    /// learner ability recorded at response time.
    pub async fn responses_grouped_by_item(
        &self,
    ) -> Result<HashMap<u32, Vec<ResponseObs>>, StoreError> {
        let rows = sqlx::query_as::<_, CalibrationRow>(
            "SELECT item_id, theta_after, is_correct FROM responses",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut grouped: HashMap<u32, Vec<ResponseObs>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.item_id as u32)
                .or_default()
                .push(ResponseObs {
                    theta: row.theta_after,
                    correct: row.is_correct,
                });
        }
        Ok(grouped)
    }

    pub async fn total_completed_sessions(&self) -> Result<u64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM test_sessions WHERE completed_at IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    pub async fn save_learning_session(&self, session: &LearningSession) -> Result<(), StoreError> {
        let (id, user_id, goal_id, target, studied, mastered, reviews, started_at, last_activity) = (
            session.id,
            session.user_id,
            session.goal.id(),
            session.target_word_count as i32,
            session.words_studied as i32,
            session.words_mastered as i32,
            session.total_reviews as i32,
            session.started_at,
            session.last_activity,
        );
        self.with_retry("save_learning_session", || async move {
            sqlx::query(
                r#"
                INSERT INTO goal_learning_sessions
                    (id, user_id, goal_id, target_word_count, words_studied,
                     words_mastered, total_reviews, started_at, last_activity_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (id) DO UPDATE SET
                    words_studied = EXCLUDED.words_studied,
                    words_mastered = EXCLUDED.words_mastered,
                    total_reviews = EXCLUDED.total_reviews,
                    last_activity_at = EXCLUDED.last_activity_at
                "#,
            )
            .bind(id)
            .bind(user_id)
            .bind(goal_id)
            .bind(target)
            .bind(studied)
            .bind(mastered)
            .bind(reviews)
            .bind(started_at)
            .bind(last_activity)
            .execute(&self.pool)
            .await
            .map(|_| ())
        })
        .await
    }

    pub async fn save_learned_word(
        &self,
        session_id: Uuid,
        word: &crate::learn::LearnedWord,
    ) -> Result<(), StoreError> {
        let history = serde_json::to_value(&word.assessment_history).unwrap_or_default();
        let word = word.clone();
        self.with_retry("save_learned_word", || {
            let history = history.clone();
            let word = word.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO learned_words
                        (session_id, word, review_count, correct_count, next_review_at,
                         ease_factor, interval_days, is_mastered, mastered_at,
                         assessment_history_json, dvk_level)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    ON CONFLICT (session_id, word) DO UPDATE SET
                        review_count = EXCLUDED.review_count,
                        correct_count = EXCLUDED.correct_count,
                        next_review_at = EXCLUDED.next_review_at,
                        ease_factor = EXCLUDED.ease_factor,
                        interval_days = EXCLUDED.interval_days,
                        is_mastered = EXCLUDED.is_mastered,
                        mastered_at = EXCLUDED.mastered_at,
                        assessment_history_json = EXCLUDED.assessment_history_json,
                        dvk_level = EXCLUDED.dvk_level
                    "#,
                )
                .bind(session_id)
                .bind(&word.word)
                .bind(word.review_count as i32)
                .bind(word.correct_count as i32)
                .bind(word.next_review_at)
                .bind(word.ease_factor)
                .bind(word.interval_days as i32)
                .bind(word.is_mastered)
                .bind(word.mastered_at)
                .bind(history)
                .bind(word.dvk_level as i16)
                .execute(&self.pool)
                .await
                .map(|_| ())
            }
        })
        .await
    }
}
