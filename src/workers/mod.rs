//! Background jobs: the periodic TTL sweeper for idle sessions.

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::cat::{CatSession, Phase};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
}

pub struct WorkerManager {
    scheduler: JobScheduler,
}

impl WorkerManager {
    pub async fn new(state: AppState) -> Result<Self, WorkerError> {
        let scheduler = JobScheduler::new().await?;

        let interval = state.engine().sweep_interval_minutes;
        let cron = format!("0 */{interval} * * * *");
        let sweep_state = state.clone();
        let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
            let state = sweep_state.clone();
            Box::pin(async move {
                let (tests, learning) = sweep_expired(&state).await;
                if tests > 0 || learning > 0 {
                    info!(tests, learning, "expired sessions swept");
                }
            })
        })?;
        scheduler.add(job).await?;
        info!(interval_minutes = interval, "session sweeper scheduled");

        Ok(Self { scheduler })
    }

    pub async fn start(&mut self) -> Result<(), WorkerError> {
        self.scheduler.start().await?;
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Err(err) = self.scheduler.shutdown().await {
            error!(error = %err, "scheduler shutdown failed");
        }
    }
}

/// Archive a session to the store when one is configured.
pub async fn archive_session(state: &AppState, session: &CatSession) {
    if let Some(store) = state.store() {
        if let Err(err) = store.archive_session(session).await {
            tracing::warn!(session_id = %session.id, error = %err, "failed to archive session");
        }
    }
}

/// Evict idle sessions past their TTL. Expiring test sessions are archived
/// first; learning state is durable, so its eviction only drops the
/// in-memory copy. A handler that holds the session lock wins the race and
/// the eviction sees the refreshed activity timestamp.
pub async fn sweep_expired(state: &AppState) -> (usize, usize) {
    let now = Utc::now();
    let mut evicted_tests = 0;

    let sessions = state.sessions();
    for (id, handle) in sessions.snapshot() {
        let mut session = handle.lock().await;
        if !sessions.is_expired(&session, now) {
            continue;
        }
        if session.phase() != Phase::Terminated {
            session.expire();
            archive_session(state, &session).await;
        }
        drop(session);
        sessions.remove(&id);
        evicted_tests += 1;
    }

    let mut evicted_learning = 0;
    let learning = state.learning();
    for (id, handle) in learning.snapshot() {
        let session = handle.lock().await;
        if !learning.is_expired(&session, now) {
            continue;
        }
        if let Some(store) = state.store() {
            if let Err(err) = store.save_learning_session(&session).await {
                tracing::warn!(session_id = %id, error = %err, "failed to persist learning session");
            }
        }
        drop(session);
        learning.remove(&id);
        evicted_learning += 1;
    }

    (evicted_tests, evicted_learning)
}
