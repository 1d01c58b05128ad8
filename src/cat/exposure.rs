//! Process-wide item exposure tracking (Sympson-Hetter style rate gate).
//!
//! Counters are plain atomics keyed by item id; the bank is immutable after
//! load so the vectors are sized once and never reallocated.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;

pub const DEFAULT_MAX_EXPOSURE_RATE: f64 = 0.25;
pub const UNDERUSED_RATE: f64 = 0.05;

#[derive(Debug)]
pub struct ExposureController {
    administered: Vec<AtomicU64>,
    last_administered_ms: Vec<AtomicI64>,
    sessions_started: AtomicU64,
    max_rate: f64,
}

impl ExposureController {
    pub fn new(item_count: usize, max_rate: f64) -> Self {
        Self {
            administered: (0..item_count).map(|_| AtomicU64::new(0)).collect(),
            last_administered_ms: (0..item_count).map(|_| AtomicI64::new(0)).collect(),
            sessions_started: AtomicU64::new(0),
            max_rate,
        }
    }

    pub fn max_rate(&self) -> f64 {
        self.max_rate
    }

    pub fn record_session_start(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_administration(&self, item_id: u32) {
        if let Some(counter) = self.administered.get(item_id as usize) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(stamp) = self.last_administered_ms.get(item_id as usize) {
            stamp.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        }
    }

    pub fn sessions_started(&self) -> u64 {
        self.sessions_started.load(Ordering::Relaxed)
    }

    pub fn administered_count(&self, item_id: u32) -> u64 {
        self.administered
            .get(item_id as usize)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Current exposure rate: administrations / sessions started. Zero until
    /// the first session exists.
    pub fn rate(&self, item_id: u32) -> f64 {
        let sessions = self.sessions_started();
        if sessions == 0 {
            return 0.0;
        }
        self.administered_count(item_id) as f64 / sessions as f64
    }

    /// Whether the item passes the exposure gate at the given cap.
    pub fn is_eligible(&self, item_id: u32, cap: f64) -> bool {
        self.rate(item_id) < cap
    }

    pub fn stats(&self) -> ExposureStats {
        let sessions = self.sessions_started();
        let mut overused = Vec::new();
        let mut underused = Vec::new();
        let mut unused = Vec::new();
        let mut rate_sum = 0.0;
        let mut max_rate_seen: f64 = 0.0;

        for item_id in 0..self.administered.len() as u32 {
            let count = self.administered_count(item_id);
            let rate = if sessions == 0 {
                0.0
            } else {
                count as f64 / sessions as f64
            };
            rate_sum += rate;
            max_rate_seen = max_rate_seen.max(rate);

            if count == 0 {
                unused.push(item_id);
            } else if rate > self.max_rate {
                overused.push(ItemExposure {
                    item_id,
                    count,
                    rate,
                });
            } else if rate < UNDERUSED_RATE {
                underused.push(item_id);
            }
        }

        overused.sort_by(|lhs, rhs| {
            rhs.rate
                .partial_cmp(&lhs.rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let pool_size = self.administered.len();
        ExposureStats {
            total_sessions: sessions,
            pool_size,
            items_used: pool_size - unused.len(),
            mean_rate: if pool_size == 0 {
                0.0
            } else {
                rate_sum / pool_size as f64
            },
            max_rate: max_rate_seen,
            overused,
            underused_count: underused.len(),
            unused_count: unused.len(),
            unused,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemExposure {
    pub item_id: u32,
    pub count: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExposureStats {
    pub total_sessions: u64,
    pub pool_size: usize,
    pub items_used: usize,
    pub mean_rate: f64,
    pub max_rate: f64,
    pub overused: Vec<ItemExposure>,
    pub underused_count: usize,
    pub unused_count: usize,
    #[serde(skip)]
    pub unused: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_tracks_counts() {
        let exposure = ExposureController::new(10, 0.25);
        assert_eq!(exposure.rate(3), 0.0);

        for _ in 0..4 {
            exposure.record_session_start();
        }
        exposure.record_administration(3);
        assert!((exposure.rate(3) - 0.25).abs() < 1e-12);
        assert!(!exposure.is_eligible(3, 0.25));
        assert!(exposure.is_eligible(3, 0.35));
    }

    #[test]
    fn stats_partition_items() {
        let exposure = ExposureController::new(4, 0.25);
        for _ in 0..100 {
            exposure.record_session_start();
        }
        for _ in 0..30 {
            exposure.record_administration(0); // overused: 0.30
        }
        for _ in 0..10 {
            exposure.record_administration(1); // in band
        }
        exposure.record_administration(2); // underused: 0.01

        let stats = exposure.stats();
        assert_eq!(stats.total_sessions, 100);
        assert_eq!(stats.overused.len(), 1);
        assert_eq!(stats.overused[0].item_id, 0);
        assert_eq!(stats.underused_count, 1);
        assert_eq!(stats.unused_count, 1);
        assert_eq!(stats.items_used, 3);
    }
}
