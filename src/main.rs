use std::net::SocketAddr;

use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use lexicat::config::Config;
use lexicat::db::Store;
use lexicat::state::AppState;
use lexicat::workers::WorkerManager;
use lexicat::{load_bank, logging, routes};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config.log_level);

    let bank = load_bank(&config);

    let store = match Store::from_env().await {
        Ok(store) => Some(store),
        Err(err) => {
            tracing::warn!(error = %err, "persistence not initialized, running in memory");
            None
        }
    };

    let state = AppState::new(bank, store, config.engine.clone());

    let worker_manager = match WorkerManager::new(state.clone()).await {
        Ok(mut manager) => {
            if let Err(err) = manager.start().await {
                tracing::error!(error = %err, "failed to start workers");
            }
            Some(manager)
        }
        Err(err) => {
            tracing::warn!(error = %err, "worker manager not initialized");
            None
        }
    };

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(lexicat::REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive());

    let addr = config.bind_addr();
    tracing::info!(%addr, "lexicat listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind listener failed");

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        tracing::error!(error = %err, "server error");
    }

    tracing::info!("HTTP server stopped, shutting down");

    if let Some(mut manager) = worker_manager {
        manager.stop().await;
    }

    tracing::info!("shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
