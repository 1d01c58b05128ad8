#![allow(clippy::too_many_arguments)]

pub mod bank;
pub mod cat;
pub mod config;
pub mod db;
pub mod irt;
pub mod learn;
pub mod logging;
pub mod report;
pub mod response;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod workers;

use std::time::Duration;

use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::bank::ItemBank;
use crate::config::Config;
use crate::state::AppState;

/// Handler deadline; an exceeded deadline returns before any batch of
/// session mutations is committed by a later await.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Size of the synthetic fallback bank used when no vocabulary file is
/// configured; large enough for full-length adaptive sessions.
const FALLBACK_BANK_SIZE: usize = 2000;

/// Load the vocabulary bank from the configured path, falling back to a
/// synthetic bank so the service stays usable without data on disk.
pub fn load_bank(config: &Config) -> ItemBank {
    match &config.vocab_path {
        Some(path) => match ItemBank::load_from_path(path) {
            Ok(bank) => {
                tracing::info!(path, size = bank.len(), "vocabulary bank loaded");
                bank
            }
            Err(err) => {
                tracing::warn!(path, error = %err, "vocabulary file unusable, using synthetic bank");
                ItemBank::synthetic(FALLBACK_BANK_SIZE, 0)
            }
        },
        None => {
            tracing::warn!("VOCAB_PATH not set, using synthetic bank");
            ItemBank::synthetic(FALLBACK_BANK_SIZE, 0)
        }
    }
}

/// Build the full application router; used by main and by integration
/// tests.
pub async fn create_app() -> axum::Router {
    let config = Config::from_env();
    let bank = load_bank(&config);
    let store = (db::Store::from_env().await).ok();
    let state = AppState::new(bank, store, config.engine.clone());

    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive())
}
