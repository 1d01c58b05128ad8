//! Item pool health: exposure distribution and expansion analysis for the
//! admin read side.

use serde::Serialize;

use crate::bank::ItemBank;
use crate::cat::exposure::{ExposureController, ExposureStats};

#[derive(Debug, Clone, Serialize)]
pub struct PoolHealth {
    #[serde(flatten)]
    pub exposure: ExposureStats,
    pub utilization_pct: f64,
    pub recommendations: Vec<String>,
}

pub fn analyze(bank: &ItemBank, exposure: &ExposureController) -> PoolHealth {
    let stats = exposure.stats();
    let utilization = if stats.pool_size == 0 {
        0.0
    } else {
        stats.items_used as f64 / stats.pool_size as f64
    };

    let mut recommendations = Vec::new();
    if utilization < 0.3 && stats.total_sessions >= 100 {
        recommendations.push(format!(
            "Low pool utilization ({:.0}%). Consider loosening content-balance constraints.",
            utilization * 100.0
        ));
    }
    if stats.overused.len() > stats.pool_size / 20 {
        recommendations.push(format!(
            "{} items exceed the target exposure rate. Tighten exposure control.",
            stats.overused.len()
        ));
    }
    if stats.unused_count > stats.pool_size / 2 && stats.total_sessions >= 500 {
        recommendations.push(format!(
            "{} items never used. Some difficulty ranges may be unreachable.",
            stats.unused_count
        ));
    }
    if recommendations.is_empty() {
        recommendations.push("Pool health is good. No immediate action needed.".to_string());
    }

    let _ = bank;
    PoolHealth {
        exposure: stats,
        utilization_pct: utilization * 100.0,
        recommendations,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BandDemand {
    pub difficulty_range: String,
    pub item_count: usize,
    pub mean_exposure: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CefrNeed {
    pub cefr: String,
    pub current_items: usize,
    pub mean_exposure: f64,
    pub suggested_additional: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpansionAnalysis {
    pub total_sessions: u64,
    pub high_demand_difficulty_bands: Vec<BandDemand>,
    pub cefr_expansion_needs: Vec<CefrNeed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

const MIN_SESSIONS_FOR_EXPANSION: u64 = 100;
const BAND_DEMAND_THRESHOLD: f64 = 0.15;
const CEFR_DEMAND_THRESHOLD: f64 = 0.10;

/// Where does the pool need more items: difficulty half-bands and CEFR
/// levels whose items carry disproportionate exposure.
pub fn expansion_needs(bank: &ItemBank, exposure: &ExposureController) -> ExpansionAnalysis {
    let sessions = exposure.sessions_started();
    if sessions < MIN_SESSIONS_FOR_EXPANSION {
        return ExpansionAnalysis {
            total_sessions: sessions,
            high_demand_difficulty_bands: Vec::new(),
            cefr_expansion_needs: Vec::new(),
            message: Some("Insufficient data for expansion analysis"),
        };
    }

    // Group exposure rates into 0.5-wide difficulty bands.
    let mut bands: std::collections::BTreeMap<i32, Vec<f64>> = std::collections::BTreeMap::new();
    let mut by_cefr: std::collections::BTreeMap<&'static str, Vec<f64>> =
        std::collections::BTreeMap::new();
    for id in 0..bank.len() as u32 {
        let rate = exposure.rate(id);
        let b = bank.params(id).expect("id in range").b;
        let band = (b * 2.0).round() as i32;
        bands.entry(band).or_default().push(rate);
        let cefr = bank.entry(id).expect("id in range").cefr.as_str();
        by_cefr.entry(cefr).or_default().push(rate);
    }

    let high_demand_difficulty_bands = bands
        .into_iter()
        .filter_map(|(band, rates)| {
            let mean = rates.iter().sum::<f64>() / rates.len() as f64;
            if mean > BAND_DEMAND_THRESHOLD {
                let lower = band as f64 / 2.0;
                Some(BandDemand {
                    difficulty_range: format!("{lower:.1} to {:.1}", lower + 0.5),
                    item_count: rates.len(),
                    mean_exposure: mean,
                })
            } else {
                None
            }
        })
        .collect();

    let cefr_expansion_needs = by_cefr
        .into_iter()
        .filter_map(|(cefr, rates)| {
            let mean = rates.iter().sum::<f64>() / rates.len() as f64;
            if mean > CEFR_DEMAND_THRESHOLD {
                Some(CefrNeed {
                    cefr: cefr.to_string(),
                    current_items: rates.len(),
                    mean_exposure: mean,
                    suggested_additional: (rates.len() * 3 / 10).max(10),
                })
            } else {
                None
            }
        })
        .collect();

    ExpansionAnalysis {
        total_sessions: sessions,
        high_demand_difficulty_bands,
        cefr_expansion_needs,
        message: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_needs_data() {
        let bank = ItemBank::synthetic(100, 3);
        let exposure = ExposureController::new(bank.len(), 0.25);
        let analysis = expansion_needs(&bank, &exposure);
        assert!(analysis.message.is_some());
    }

    #[test]
    fn heavy_exposure_flags_bands() {
        let bank = ItemBank::synthetic(100, 3);
        let exposure = ExposureController::new(bank.len(), 0.25);
        for _ in 0..200 {
            exposure.record_session_start();
        }
        for id in 0..bank.len() as u32 {
            for _ in 0..40 {
                exposure.record_administration(id);
            }
        }
        let analysis = expansion_needs(&bank, &exposure);
        assert!(analysis.message.is_none());
        assert!(!analysis.high_demand_difficulty_bands.is_empty());
        assert!(!analysis.cefr_expansion_needs.is_empty());
    }

    #[test]
    fn healthy_pool_reports_ok() {
        let bank = ItemBank::synthetic(100, 3);
        let exposure = ExposureController::new(bank.len(), 0.25);
        let health = analyze(&bank, &exposure);
        assert_eq!(health.recommendations.len(), 1);
        assert!(health.recommendations[0].contains("good"));
    }
}
