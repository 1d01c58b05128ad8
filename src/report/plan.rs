//! Personalized study plan generated from post-test dimension scores.

use serde::Serialize;

use crate::bank::render::RenderedItem;
use crate::bank::{ItemBank, QuestionType};

use super::dimensions::{Dimension, DimensionScore};

/// Dimensions scoring below this (or unmeasured) get a recommendation.
pub const FOCUS_THRESHOLD: u32 = 75;
pub const HIGH_PRIORITY_BELOW: u32 = 40;
pub const MEDIUM_PRIORITY_BELOW: u32 = 60;

/// Exercises target items slightly above the learner's ability.
const EXERCISE_THETA_OFFSET: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Review,
}

impl Priority {
    fn for_score(score: Option<u32>) -> Self {
        match score {
            Some(score) if score < HIGH_PRIORITY_BELOW => Self::High,
            Some(score) if score < MEDIUM_PRIORITY_BELOW => Self::Medium,
            Some(_) => Self::Review,
            // Unmeasured dimension: worth attention, not alarming.
            None => Self::Medium,
        }
    }

    fn exercise_count(&self) -> usize {
        match self {
            Self::High => 5,
            Self::Medium => 4,
            Self::Review => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub dimension: Dimension,
    pub label: &'static str,
    pub label_ko: &'static str,
    pub score: Option<u32>,
    pub priority: Priority,
    pub tip_ko: &'static str,
    pub tip_en: &'static str,
    pub exercises: Vec<RenderedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyFocus {
    pub week: u8,
    pub focus: Vec<Dimension>,
    pub daily_target: u8,
    pub description_ko: &'static str,
    pub description_en: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudyPlan {
    pub recommendations: Vec<Recommendation>,
    pub total_exercises: usize,
    pub weak_dimensions: Vec<Dimension>,
    pub weekly_plan: Vec<WeeklyFocus>,
}

fn tip(dimension: Dimension) -> (&'static str, &'static str) {
    match dimension {
        Dimension::Semantic => (
            "단어의 정확한 의미와 유사 단어 간 미묘한 차이에 집중하세요.",
            "Focus on exact meanings and subtle differences between similar words.",
        ),
        Dimension::Contextual => (
            "문장 속에서 단어를 사용하는 연습을 하세요. 연어에 주의하세요.",
            "Practice using words in sentences. Pay attention to collocations.",
        ),
        Dimension::Form => (
            "같은 어근에서 파생된 명사, 동사, 형용사를 함께 학습하세요.",
            "Study word families: learn nouns, verbs, adjectives from the same root together.",
        ),
        Dimension::Relational => (
            "동의어, 반의어, 관련 단어를 함께 학습하여 어휘 네트워크를 확장하세요.",
            "Build your word network by learning synonyms, antonyms, and related words together.",
        ),
        Dimension::Pragmatic => (
            "격식체와 비격식체 단어를 구분하는 연습을 하세요.",
            "Notice when words are formal vs. informal.",
        ),
    }
}

/// Exercises for a dimension: items renderable under one of its question
/// types, ranked by closeness of effective difficulty to theta + 0.2.
fn build_exercises(
    bank: &ItemBank,
    dimension: Dimension,
    theta: f64,
    count: usize,
    seed: u64,
) -> Vec<RenderedItem> {
    let target = theta + EXERCISE_THETA_OFFSET;
    let types = dimension.question_types();
    if types.is_empty() {
        return Vec::new();
    }

    let mut candidates: Vec<(u32, QuestionType, f64)> = Vec::new();
    for id in 0..bank.len() as u32 {
        for &qtype in types {
            if bank.renderable(id, qtype) {
                let distance = (bank.effective_b(id, qtype) - target).abs();
                candidates.push((id, qtype, distance));
            }
        }
    }
    candidates.sort_by(|lhs, rhs| {
        lhs.2
            .partial_cmp(&rhs.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(lhs.0.cmp(&rhs.0))
    });

    let mut exercises = Vec::with_capacity(count);
    let mut used_ids = Vec::new();
    for (id, qtype, _) in candidates {
        if exercises.len() >= count {
            break;
        }
        if used_ids.contains(&id) {
            continue;
        }
        let item_seed = seed ^ (id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        if let Some(rendered) = bank.render(id, qtype, item_seed) {
            used_ids.push(id);
            exercises.push(rendered);
        }
    }
    exercises
}

pub fn generate(
    bank: &ItemBank,
    scores: &[DimensionScore],
    theta: f64,
    seed: u64,
) -> StudyPlan {
    let mut weak: Vec<&DimensionScore> = scores
        .iter()
        .filter(|score| {
            // Reserved dimensions with no question types can't produce
            // exercises, so they stay out of the plan.
            !score.dimension.question_types().is_empty()
                && score.score.map_or(true, |value| value < FOCUS_THRESHOLD)
        })
        .collect();
    weak.sort_by_key(|score| score.score.unwrap_or(0));

    let mut recommendations = Vec::new();
    for dim_score in &weak {
        let priority = Priority::for_score(dim_score.score);
        let (tip_ko, tip_en) = tip(dim_score.dimension);
        let exercises = build_exercises(
            bank,
            dim_score.dimension,
            theta,
            priority.exercise_count(),
            seed,
        );
        recommendations.push(Recommendation {
            dimension: dim_score.dimension,
            label: dim_score.label,
            label_ko: dim_score.label_ko,
            score: dim_score.score,
            priority,
            tip_ko,
            tip_en,
            exercises,
        });
    }

    let total_exercises = recommendations.iter().map(|r| r.exercises.len()).sum();
    let weak_dimensions: Vec<Dimension> = recommendations.iter().map(|r| r.dimension).collect();
    let weekly_plan = build_weekly_plan(&recommendations);

    StudyPlan {
        recommendations,
        total_exercises,
        weak_dimensions,
        weekly_plan,
    }
}

/// Four-week roadmap: weak dimensions first, then reinforcement, then a
/// comprehensive review with a retest.
fn build_weekly_plan(recommendations: &[Recommendation]) -> Vec<WeeklyFocus> {
    let high: Vec<Dimension> = recommendations
        .iter()
        .filter(|r| r.priority == Priority::High)
        .map(|r| r.dimension)
        .collect();
    let medium: Vec<Dimension> = recommendations
        .iter()
        .filter(|r| r.priority == Priority::Medium)
        .map(|r| r.dimension)
        .collect();
    let all: Vec<Dimension> = recommendations.iter().map(|r| r.dimension).collect();

    let week1: Vec<Dimension> = high
        .first()
        .or(medium.first())
        .or(all.first())
        .into_iter()
        .copied()
        .collect();
    let week2: Vec<Dimension> = if high.len() > 1 {
        high[1..].to_vec()
    } else if !medium.is_empty() && medium.first() != week1.first() {
        vec![medium[0]]
    } else {
        week1.clone()
    };
    let week3: Vec<Dimension> = if medium.is_empty() {
        all.iter().take(2).copied().collect()
    } else {
        medium.iter().take(2).copied().collect()
    };

    let mut weeks = Vec::new();
    if !week1.is_empty() {
        weeks.push(WeeklyFocus {
            week: 1,
            focus: week1,
            daily_target: 5,
            description_ko: "약점 차원 집중 학습",
            description_en: "Focus on weakest dimension",
        });
    }
    if !week2.is_empty() {
        weeks.push(WeeklyFocus {
            week: 2,
            focus: week2,
            daily_target: 5,
            description_ko: "약점 보강 학습",
            description_en: "Reinforce weak areas",
        });
    }
    if !week3.is_empty() {
        weeks.push(WeeklyFocus {
            week: 3,
            focus: week3,
            daily_target: 4,
            description_ko: "중간 영역 보강",
            description_en: "Strengthen moderate areas",
        });
    }
    weeks.push(WeeklyFocus {
        week: 4,
        focus: all.into_iter().take(3).collect(),
        daily_target: 3,
        description_ko: "종합 복습 + 재테스트",
        description_en: "Comprehensive review + retest",
    });
    weeks
}
