//! Knowledge matrix: projected knowledge states for a representative sample
//! of the bank, at the current ability and at the next CEFR goal.

use serde::Serialize;

use crate::bank::{CefrBand, ItemBank};
use crate::irt;

pub const DEFAULT_SAMPLE_SIZE: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeState {
    NotKnown,
    Emerging,
    Developing,
    Comfortable,
    Mastered,
}

impl KnowledgeState {
    pub const ALL: [KnowledgeState; 5] = [
        Self::NotKnown,
        Self::Emerging,
        Self::Developing,
        Self::Comfortable,
        Self::Mastered,
    ];

    pub fn classify(p: f64) -> Self {
        if p < 0.25 {
            Self::NotKnown
        } else if p < 0.5 {
            Self::Emerging
        } else if p < 0.7 {
            Self::Developing
        } else if p < 0.85 {
            Self::Comfortable
        } else {
            Self::Mastered
        }
    }

    pub fn label_ko(&self) -> &'static str {
        match self {
            Self::NotKnown => "미학습",
            Self::Emerging => "인식",
            Self::Developing => "발전",
            Self::Comfortable => "익숙",
            Self::Mastered => "완전 습득",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatrixWord {
    pub word: String,
    pub meaning_ko: String,
    pub cefr: String,
    pub pos: String,
    pub freq_rank: u32,
    pub current_state: KnowledgeState,
    pub current_probability: f64,
    pub goal_state: KnowledgeState,
    pub goal_probability: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateCounts {
    pub not_known: usize,
    pub emerging: usize,
    pub developing: usize,
    pub comfortable: usize,
    pub mastered: usize,
    pub total: usize,
}

impl StateCounts {
    fn tally(states: impl Iterator<Item = KnowledgeState>) -> Self {
        let mut counts = Self {
            not_known: 0,
            emerging: 0,
            developing: 0,
            comfortable: 0,
            mastered: 0,
            total: 0,
        };
        for state in states {
            counts.total += 1;
            match state {
                KnowledgeState::NotKnown => counts.not_known += 1,
                KnowledgeState::Emerging => counts.emerging += 1,
                KnowledgeState::Developing => counts.developing += 1,
                KnowledgeState::Comfortable => counts.comfortable += 1,
                KnowledgeState::Mastered => counts.mastered += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateInfo {
    pub key: KnowledgeState,
    pub label_ko: &'static str,
    pub min_p: f64,
    pub max_p: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeMatrix {
    pub words: Vec<MatrixWord>,
    pub total_sampled: usize,
    pub current_theta: f64,
    pub goal_theta: f64,
    pub goal_cefr: String,
    pub summary: StateCounts,
    pub goal_summary: StateCounts,
    pub words_changed: usize,
    pub states: Vec<StateInfo>,
}

/// Goal theta: the midpoint of the next CEFR band above the learner's
/// current band, nudged upward when the learner already sits past it.
pub fn goal_theta(theta: f64, current_band: CefrBand) -> (f64, CefrBand) {
    let next = current_band.next();
    let goal = next.theta_center();
    if goal <= theta + 0.1 {
        (theta + 0.5, next)
    } else {
        (goal, next)
    }
}

pub fn compute(
    bank: &ItemBank,
    theta: f64,
    current_band: CefrBand,
    sample_size: usize,
) -> KnowledgeMatrix {
    let (goal, goal_band) = goal_theta(theta, current_band);

    // Uniform sample across the id space: deterministic stride, no RNG.
    let total = bank.len();
    let sample_size = sample_size.min(total).max(1);
    let stride = total as f64 / sample_size as f64;
    let ids: Vec<u32> = (0..sample_size).map(|i| (i as f64 * stride) as u32).collect();

    let mut words = Vec::with_capacity(ids.len());
    let mut changed = 0;
    for id in ids {
        let entry = bank.entry(id).expect("sampled id in range");
        let params = bank.params(id).expect("sampled id in range");
        let current_p = irt::probability(theta, params.a, params.b, 0.0);
        let goal_p = irt::probability(goal, params.a, params.b, 0.0);
        let current_state = KnowledgeState::classify(current_p);
        let goal_state = KnowledgeState::classify(goal_p);
        if current_state != goal_state {
            changed += 1;
        }
        words.push(MatrixWord {
            word: entry.lemma.clone(),
            meaning_ko: entry.meaning_ko.clone(),
            cefr: entry.cefr.as_str().to_string(),
            pos: entry.pos.as_str().to_string(),
            freq_rank: entry.freq_rank,
            current_state,
            current_probability: current_p,
            goal_state,
            goal_probability: goal_p,
        });
    }

    let summary = StateCounts::tally(words.iter().map(|w| w.current_state));
    let goal_summary = StateCounts::tally(words.iter().map(|w| w.goal_state));

    let states = KnowledgeState::ALL
        .iter()
        .map(|&key| {
            let (min_p, max_p) = match key {
                KnowledgeState::NotKnown => (0.0, 0.25),
                KnowledgeState::Emerging => (0.25, 0.5),
                KnowledgeState::Developing => (0.5, 0.7),
                KnowledgeState::Comfortable => (0.7, 0.85),
                KnowledgeState::Mastered => (0.85, 1.0),
            };
            StateInfo {
                key,
                label_ko: key.label_ko(),
                min_p,
                max_p,
            }
        })
        .collect();

    KnowledgeMatrix {
        total_sampled: words.len(),
        words,
        current_theta: theta,
        goal_theta: goal,
        goal_cefr: goal_band.as_str().to_string(),
        summary,
        goal_summary,
        words_changed: changed,
        states,
    }
}
