//! Diagnostic reporting: pure functions from terminal session state plus the
//! bank to every derived result the API exposes.

pub mod dimensions;
pub mod matrix;
pub mod plan;
pub mod pool;

use std::collections::HashMap;

use serde::Serialize;

use crate::bank::{primary_topic, CefrBand, ItemBank};
use crate::cat::session::ResponseRecord;
use crate::cat::TerminationReason;
use crate::irt;

use dimensions::DimensionScore;

/// Fewer responses than this and the report is flagged rather than trusted.
pub const MIN_ITEMS_FOR_REPORT: usize = 5;

const TOPIC_MIN_ITEMS: usize = 3;
const STRENGTH_RATE: f64 = 0.75;
const WEAKNESS_RATE: f64 = 0.50;
const TOP_TOPICS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct CefrProbabilities {
    #[serde(rename = "A1")]
    pub a1: f64,
    #[serde(rename = "A2")]
    pub a2: f64,
    #[serde(rename = "B1")]
    pub b1: f64,
    #[serde(rename = "B2")]
    pub b2: f64,
    #[serde(rename = "C1")]
    pub c1: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicAnalysis {
    pub topic: String,
    pub correct: usize,
    pub total: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CefrDetail {
    pub cefr: String,
    pub correct: usize,
    pub total: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub theta: f64,
    pub se: f64,
    pub reliability: f64,
    pub cefr_level: String,
    pub cefr_probabilities: CefrProbabilities,
    pub curriculum_level: String,
    pub vocab_size_estimate: u32,
    pub total_items: usize,
    pub total_correct: usize,
    pub dont_know_count: usize,
    pub accuracy: f64,
    pub termination_reason: Option<TerminationReason>,
    pub topic_strengths: Vec<TopicAnalysis>,
    pub topic_weaknesses: Vec<TopicAnalysis>,
    pub cefr_detail: Vec<CefrDetail>,
    pub dimension_scores: Vec<DimensionScore>,
    pub oxford_coverage: f64,
    pub insufficient_data: bool,
}

impl DiagnosticReport {
    pub fn cefr_band(&self) -> CefrBand {
        CefrBand::from(self.cefr_level.clone())
    }
}

/// CEFR band containing theta, by the fixed report bins.
pub fn cefr_level(theta: f64) -> CefrBand {
    if theta < -1.5 {
        CefrBand::A1
    } else if theta < -0.5 {
        CefrBand::A2
    } else if theta < 0.5 {
        CefrBand::B1
    } else if theta < 1.5 {
        CefrBand::B2
    } else {
        CefrBand::C1
    }
}

/// Soft assignment over bands: softmax of -|theta - center| / se, so a tight
/// posterior concentrates the mass and a wide one spreads it.
pub fn cefr_probabilities(theta: f64, se: f64) -> CefrProbabilities {
    let se = se.max(1e-6);
    let scores: Vec<f64> = CefrBand::ALL
        .iter()
        .map(|band| -(theta - band.theta_center()).abs() / se)
        .collect();
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    CefrProbabilities {
        a1: exps[0] / total,
        a2: exps[1] / total,
        b1: exps[2] / total,
        b2: exps[3] / total,
        c1: exps[4] / total,
    }
}

pub fn curriculum_level(theta: f64) -> &'static str {
    if theta < -0.8 {
        "elementary"
    } else if theta < 0.3 {
        "middle"
    } else if theta < 1.2 {
        "high"
    } else {
        "beyond_high"
    }
}

/// Expected number of known words: sum of 2PL P(correct | theta) over the
/// whole bank, guessing ignored.
pub fn vocab_size_estimate(bank: &ItemBank, theta: f64) -> u32 {
    let total: f64 = bank
        .all_params()
        .iter()
        .map(|params| irt::probability(theta, params.a, params.b, 0.0))
        .sum();
    total.round() as u32
}

/// Mean P(correct | theta) over the core vocabulary (CEFR A1-B1).
pub fn oxford_coverage(bank: &ItemBank, theta: f64) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for id in 0..bank.len() as u32 {
        let entry = bank.entry(id).expect("id in range");
        if entry.cefr <= CefrBand::B1 {
            let params = bank.params(id).expect("id in range");
            sum += irt::probability(theta, params.a, params.b, 0.0);
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn generate(
    bank: &ItemBank,
    theta: f64,
    se: f64,
    responses: &[ResponseRecord],
    termination_reason: Option<TerminationReason>,
) -> DiagnosticReport {
    let band = cefr_level(theta);

    let mut topic_tallies: HashMap<String, (usize, usize)> = HashMap::new();
    let mut cefr_tallies: HashMap<&'static str, (usize, usize)> = HashMap::new();
    for record in responses {
        if let Some(entry) = bank.entry(record.item_id) {
            let topic = primary_topic(&entry.topic);
            if !topic.is_empty() {
                let tally = topic_tallies.entry(topic.to_string()).or_insert((0, 0));
                tally.1 += 1;
                if record.is_correct {
                    tally.0 += 1;
                }
            }
            let tally = cefr_tallies.entry(entry.cefr.as_str()).or_insert((0, 0));
            tally.1 += 1;
            if record.is_correct {
                tally.0 += 1;
            }
        }
    }

    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    for (topic, (correct, total)) in &topic_tallies {
        if *total < TOPIC_MIN_ITEMS {
            continue;
        }
        let rate = *correct as f64 / *total as f64;
        let analysis = TopicAnalysis {
            topic: topic.clone(),
            correct: *correct,
            total: *total,
            rate,
        };
        if rate >= STRENGTH_RATE {
            strengths.push(analysis);
        } else if rate <= WEAKNESS_RATE {
            weaknesses.push(analysis);
        }
    }
    strengths.sort_by(|lhs, rhs| {
        rhs.rate
            .partial_cmp(&lhs.rate)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(lhs.topic.cmp(&rhs.topic))
    });
    strengths.truncate(TOP_TOPICS);
    weaknesses.sort_by(|lhs, rhs| {
        lhs.rate
            .partial_cmp(&rhs.rate)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(lhs.topic.cmp(&rhs.topic))
    });
    weaknesses.truncate(TOP_TOPICS);

    let mut cefr_detail: Vec<CefrDetail> = cefr_tallies
        .into_iter()
        .map(|(cefr, (correct, total))| CefrDetail {
            cefr: cefr.to_string(),
            correct,
            total,
            rate: if total == 0 {
                0.0
            } else {
                correct as f64 / total as f64
            },
        })
        .collect();
    cefr_detail.sort_by(|lhs, rhs| lhs.cefr.cmp(&rhs.cefr));

    let total_items = responses.len();
    let total_correct = responses.iter().filter(|r| r.is_correct).count();
    let dont_know_count = responses.iter().filter(|r| r.is_dont_know).count();

    DiagnosticReport {
        theta,
        se,
        reliability: irt::reliability(se),
        cefr_level: band.as_str().to_string(),
        cefr_probabilities: cefr_probabilities(theta, se),
        curriculum_level: curriculum_level(theta).to_string(),
        vocab_size_estimate: vocab_size_estimate(bank, theta),
        total_items,
        total_correct,
        dont_know_count,
        accuracy: if total_items == 0 {
            0.0
        } else {
            total_correct as f64 / total_items as f64
        },
        termination_reason,
        topic_strengths: strengths,
        topic_weaknesses: weaknesses,
        cefr_detail,
        dimension_scores: dimensions::compute_scores(responses),
        oxford_coverage: oxford_coverage(bank, theta),
        insufficient_data: total_items < MIN_ITEMS_FOR_REPORT,
    }
}
