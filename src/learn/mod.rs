//! Goal-based learning loop: per-goal pools, DVK-staged question-type
//! distributions, SM-2 scheduling, and mastery tracking.

pub mod scheduler;
pub mod sm2;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::bank::{CurriculumBand, QuestionType};

pub use scheduler::{LearnedWord, LearningProgress, LearningSession, NextCard};
pub use sm2::SelfRating;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    Elementary,
    Middle,
    High,
    Csat,
}

impl Goal {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "elementary" => Some(Self::Elementary),
            "middle" => Some(Self::Middle),
            "high" => Some(Self::High),
            "csat" | "suneung" => Some(Self::Csat),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Elementary => "elementary",
            Self::Middle => "middle",
            Self::High => "high",
            Self::Csat => "csat",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Elementary => "초등 어휘",
            Self::Middle => "중학교과 어휘",
            Self::High => "고등학교 어휘",
            Self::Csat => "수능 어휘",
        }
    }

    /// Bank items whose curriculum band matches the goal form its pool.
    pub fn curriculum(&self) -> CurriculumBand {
        match self {
            Self::Elementary => CurriculumBand::Elementary,
            Self::Middle => CurriculumBand::Middle,
            Self::High => CurriculumBand::High,
            Self::Csat => CurriculumBand::Csat,
        }
    }

    pub fn default_target(&self) -> u32 {
        match self {
            Self::Elementary => 800,
            Self::Middle => 1200,
            Self::High => 1000,
            Self::Csat => 5000,
        }
    }

    /// Question-type probabilities (types 1..6) for a learning stage.
    pub fn distribution(&self, stage: Stage) -> [f64; 6] {
        match (self, stage) {
            (Self::Elementary, Stage::FirstExposure) => [0.60, 0.0, 0.20, 0.0, 0.20, 0.0],
            (Self::Elementary, Stage::Review) => [0.40, 0.0, 0.30, 0.20, 0.10, 0.0],
            (Self::Elementary, Stage::MasteryCheck) => [0.0, 0.0, 0.40, 0.30, 0.30, 0.0],
            (Self::Middle, Stage::FirstExposure) => [0.40, 0.0, 0.30, 0.0, 0.20, 0.10],
            (Self::Middle, Stage::Review) => [0.30, 0.0, 0.25, 0.20, 0.15, 0.10],
            (Self::Middle, Stage::MasteryCheck) => [0.0, 0.20, 0.20, 0.20, 0.20, 0.20],
            (Self::High, Stage::FirstExposure) => [0.30, 0.0, 0.30, 0.0, 0.30, 0.10],
            (Self::High, Stage::Review) => [0.20, 0.20, 0.20, 0.20, 0.20, 0.0],
            (Self::High, Stage::MasteryCheck) => [0.0, 0.25, 0.15, 0.15, 0.25, 0.20],
            (Self::Csat, Stage::FirstExposure) => [0.30, 0.10, 0.20, 0.0, 0.30, 0.10],
            (Self::Csat, Stage::Review) => [0.20, 0.20, 0.20, 0.20, 0.20, 0.0],
            (Self::Csat, Stage::MasteryCheck) => [0.0, 0.30, 0.10, 0.10, 0.30, 0.20],
        }
    }
}

/// Learning stage of a word, derived from its review history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FirstExposure,
    Review,
    MasteryCheck,
}

pub fn stage_for(review_count: u32) -> Stage {
    if review_count == 0 {
        Stage::FirstExposure
    } else if review_count >= 5 {
        Stage::MasteryCheck
    } else {
        Stage::Review
    }
}

/// Sample a question type from a stage distribution. When the sampled type
/// is not supported by the item, the caller falls back through
/// `fallback_order`.
pub fn sample_question_type(distribution: &[f64; 6], rng: &mut StdRng) -> QuestionType {
    let total: f64 = distribution.iter().sum();
    let mut draw = rng.gen_range(0.0..total.max(f64::MIN_POSITIVE));
    for (idx, &weight) in distribution.iter().enumerate() {
        if weight <= 0.0 {
            continue;
        }
        if draw < weight {
            return QuestionType::ALL[idx];
        }
        draw -= weight;
    }
    QuestionType::KoreanMeaning
}

/// Types of a distribution in descending probability, zero-weight types
/// excluded. Ties keep the lower type code first.
pub fn fallback_order(distribution: &[f64; 6]) -> Vec<QuestionType> {
    let mut indexed: Vec<(usize, f64)> = distribution
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, weight)| *weight > 0.0)
        .collect();
    indexed.sort_by(|lhs, rhs| {
        rhs.1
            .partial_cmp(&lhs.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(lhs.0.cmp(&rhs.0))
    });
    indexed
        .into_iter()
        .map(|(idx, _)| QuestionType::ALL[idx])
        .collect()
}
