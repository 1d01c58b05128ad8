//! Environment-driven process configuration and the typed engine settings.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::bank::calibrate::DEFAULT_CALIBRATION_THRESHOLD;
use crate::cat::exposure::DEFAULT_MAX_EXPOSURE_RATE;
use crate::sessions::DEFAULT_SESSION_TTL_HOURS;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub vocab_path: Option<String>,
    pub engine: EngineConfig,
}

/// Every tunable of the diagnostic engine in one typed record.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_exposure_rate: f64,
    pub session_ttl_hours: i64,
    pub sweep_interval_minutes: u32,
    pub calibration_threshold: usize,
    pub matrix_sample_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_exposure_rate: DEFAULT_MAX_EXPOSURE_RATE,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            sweep_interval_minutes: 5,
            calibration_threshold: DEFAULT_CALIBRATION_THRESHOLD,
            matrix_sample_size: crate::report::matrix::DEFAULT_SAMPLE_SIZE,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let vocab_path = std::env::var("VOCAB_PATH").ok();

        let mut engine = EngineConfig::default();
        if let Some(rate) = env_f64("MAX_EXPOSURE_RATE") {
            engine.max_exposure_rate = rate.clamp(0.01, 1.0);
        }
        if let Some(hours) = env_i64("SESSION_TTL_HOURS") {
            engine.session_ttl_hours = hours.max(1);
        }
        if let Some(minutes) = env_i64("SWEEP_INTERVAL_MINUTES") {
            engine.sweep_interval_minutes = minutes.clamp(1, 60) as u32;
        }
        if let Some(threshold) = env_i64("CALIBRATION_THRESHOLD") {
            engine.calibration_threshold = threshold.max(1) as usize;
        }

        Self {
            host,
            port,
            log_level,
            vocab_path,
            engine,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok()?.parse().ok()
}
