//! Tracing setup: stdout always, optional daily-rolling file output.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer alive for the process lifetime.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

fn build_filter(log_level: &str) -> EnvFilter {
    // Connection-pool chatter drowns the selection/estimation logs at debug.
    let directives = format!("{log_level},sqlx=warn,hyper=warn");
    EnvFilter::try_new(&directives)
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    let env_filter = build_filter(log_level);
    let stdout_layer = fmt::layer().with_target(true);

    let file_logs = std::env::var("ENABLE_FILE_LOGS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);
    if file_logs {
        let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
        match std::fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "lexicat.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(stdout_layer)
                    .with(fmt::layer().with_writer(writer).with_ansi(false))
                    .init();
                return Some(FileLogGuard { _guard: guard });
            }
            Err(err) => eprintln!("failed to create log directory {log_dir}: {err}"),
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
    None
}
