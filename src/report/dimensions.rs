//! 5-dimension vocabulary knowledge scores.
//!
//! Question types map onto three of the five dimensions; form and pragmatic
//! stay reserved until dedicated question types exist. Dimension scores are
//! post-hoc: item selection keeps following Fisher information.

use serde::Serialize;

use crate::bank::QuestionType;
use crate::cat::session::ResponseRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Semantic,
    Contextual,
    Form,
    Relational,
    Pragmatic,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Self::Semantic,
        Self::Contextual,
        Self::Form,
        Self::Relational,
        Self::Pragmatic,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Semantic => "Semantic",
            Self::Contextual => "Contextual",
            Self::Form => "Form",
            Self::Relational => "Relational",
            Self::Pragmatic => "Pragmatic",
        }
    }

    pub fn label_ko(&self) -> &'static str {
        match self {
            Self::Semantic => "의미 이해",
            Self::Contextual => "문맥 사용",
            Self::Form => "형태 변환",
            Self::Relational => "관계어",
            Self::Pragmatic => "화용 맥락",
        }
    }

    pub fn of(qtype: QuestionType) -> Dimension {
        match qtype {
            QuestionType::KoreanMeaning | QuestionType::EnglishDefinition => Self::Semantic,
            QuestionType::Synonym | QuestionType::Antonym => Self::Relational,
            QuestionType::Cloze | QuestionType::Collocation => Self::Contextual,
        }
    }

    /// Question types that exercise this dimension, for study-plan exercise
    /// generation. Reserved dimensions have none yet.
    pub fn question_types(&self) -> &'static [QuestionType] {
        match self {
            Self::Semantic => &[QuestionType::KoreanMeaning, QuestionType::EnglishDefinition],
            Self::Relational => &[QuestionType::Synonym, QuestionType::Antonym],
            Self::Contextual => &[QuestionType::Cloze, QuestionType::Collocation],
            Self::Form | Self::Pragmatic => &[],
        }
    }
}

/// Minimum answered items in a dimension before a score is reported.
pub const MIN_ITEMS_FOR_SCORE: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct DimensionScore {
    pub dimension: Dimension,
    pub label: &'static str,
    pub label_ko: &'static str,
    pub correct: usize,
    pub total: usize,
    /// Percentage 0-100, or None with fewer than three items.
    pub score: Option<u32>,
}

pub fn compute_scores(responses: &[ResponseRecord]) -> Vec<DimensionScore> {
    let mut tallies: [(usize, usize); 5] = [(0, 0); 5];
    for record in responses {
        let dim = Dimension::of(record.question_type);
        let idx = Dimension::ALL.iter().position(|d| *d == dim).expect("dimension listed");
        tallies[idx].1 += 1;
        if record.is_correct {
            tallies[idx].0 += 1;
        }
    }

    Dimension::ALL
        .iter()
        .zip(tallies)
        .map(|(dim, (correct, total))| DimensionScore {
            dimension: *dim,
            label: dim.label(),
            label_ko: dim.label_ko(),
            correct,
            total,
            score: if total >= MIN_ITEMS_FOR_SCORE {
                Some((correct as f64 / total as f64 * 100.0).round() as u32)
            } else {
                None
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(qtype: QuestionType, correct: bool) -> ResponseRecord {
        ResponseRecord {
            item_id: 0,
            question_type: qtype,
            is_correct: correct,
            is_dont_know: false,
            response_time_ms: 1000,
            theta_after: 0.0,
            se_after: 1.0,
            sequence: 0,
            answered_at: Utc::now(),
        }
    }

    #[test]
    fn type_to_dimension_mapping() {
        assert_eq!(Dimension::of(QuestionType::KoreanMeaning), Dimension::Semantic);
        assert_eq!(Dimension::of(QuestionType::EnglishDefinition), Dimension::Semantic);
        assert_eq!(Dimension::of(QuestionType::Synonym), Dimension::Relational);
        assert_eq!(Dimension::of(QuestionType::Antonym), Dimension::Relational);
        assert_eq!(Dimension::of(QuestionType::Cloze), Dimension::Contextual);
        assert_eq!(Dimension::of(QuestionType::Collocation), Dimension::Contextual);
    }

    #[test]
    fn few_items_give_null_score() {
        let responses = vec![
            record(QuestionType::KoreanMeaning, true),
            record(QuestionType::KoreanMeaning, false),
        ];
        let scores = compute_scores(&responses);
        let semantic = &scores[0];
        assert_eq!(semantic.total, 2);
        assert_eq!(semantic.score, None);
    }

    #[test]
    fn score_is_percentage() {
        let responses = vec![
            record(QuestionType::Synonym, true),
            record(QuestionType::Synonym, true),
            record(QuestionType::Antonym, false),
            record(QuestionType::Antonym, true),
        ];
        let scores = compute_scores(&responses);
        let relational = scores
            .iter()
            .find(|s| s.dimension == Dimension::Relational)
            .unwrap();
        assert_eq!(relational.total, 4);
        assert_eq!(relational.score, Some(75));
    }

    #[test]
    fn reserved_dimensions_stay_empty() {
        let responses = vec![record(QuestionType::Cloze, true); 5];
        let scores = compute_scores(&responses);
        for score in scores {
            if matches!(score.dimension, Dimension::Form | Dimension::Pragmatic) {
                assert_eq!(score.total, 0);
                assert_eq!(score.score, None);
            }
        }
    }
}
