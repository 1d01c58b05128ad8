//! Shared application state handed to every request handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use parking_lot::RwLock;

use crate::bank::ItemBank;
use crate::cat::{CatSession, ExposureController};
use crate::config::EngineConfig;
use crate::db::Store;
use crate::learn::LearningSession;
use crate::sessions::Registry;

#[derive(Debug, Default)]
pub struct Metrics {
    pub sessions_started: AtomicU64,
    pub sessions_completed: AtomicU64,
    pub responses_total: AtomicU64,
    pub learning_sessions_started: AtomicU64,
    pub cards_reviewed: AtomicU64,
}

impl Metrics {
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        for (name, value) in [
            ("lexicat_sessions_started_total", &self.sessions_started),
            ("lexicat_sessions_completed_total", &self.sessions_completed),
            ("lexicat_responses_total", &self.responses_total),
            (
                "lexicat_learning_sessions_started_total",
                &self.learning_sessions_started,
            ),
            ("lexicat_cards_reviewed_total", &self.cards_reviewed),
        ] {
            out.push_str(&format!(
                "# TYPE {name} counter\n{name} {}\n",
                value.load(Ordering::Relaxed)
            ));
        }
        out
    }
}

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    // Swap-and-publish: calibration installs a new Arc, readers clone the
    // current one and keep a consistent bank for the whole request.
    bank: Arc<RwLock<Arc<ItemBank>>>,
    sessions: Arc<Registry<CatSession>>,
    learning: Arc<Registry<LearningSession>>,
    exposure: Arc<ExposureController>,
    store: Option<Arc<Store>>,
    engine: Arc<EngineConfig>,
    metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(bank: ItemBank, store: Option<Arc<Store>>, engine: EngineConfig) -> Self {
        let ttl = Duration::hours(engine.session_ttl_hours);
        let exposure = ExposureController::new(bank.len(), engine.max_exposure_rate);
        Self {
            started_at: Instant::now(),
            bank: Arc::new(RwLock::new(Arc::new(bank))),
            sessions: Arc::new(Registry::new(ttl)),
            learning: Arc::new(Registry::new(ttl)),
            exposure: Arc::new(exposure),
            store,
            engine: Arc::new(engine),
            metrics: Arc::new(Metrics::default()),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn bank(&self) -> Arc<ItemBank> {
        Arc::clone(&self.bank.read())
    }

    pub fn publish_bank(&self, next: ItemBank) {
        let version = next.version();
        *self.bank.write() = Arc::new(next);
        tracing::info!(version, "item bank version published");
    }

    pub fn sessions(&self) -> Arc<Registry<CatSession>> {
        Arc::clone(&self.sessions)
    }

    pub fn learning(&self) -> Arc<Registry<LearningSession>> {
        Arc::clone(&self.learning)
    }

    pub fn exposure(&self) -> Arc<ExposureController> {
        Arc::clone(&self.exposure)
    }

    pub fn store(&self) -> Option<Arc<Store>> {
        self.store.clone()
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }
}
