//! Per-learner learning session: study queue, due-queue, SM-2 state, and
//! the mastery rule.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use uuid::Uuid;

use crate::bank::{ItemBank, ItemFilter, QuestionType};

use super::sm2::{self, SelfRating, INITIAL_EASE};
use super::{fallback_order, sample_question_type, stage_for, Goal, Stage};

pub const MASTERY_MIN_REVIEWS: u32 = 5;
pub const MASTERY_MIN_ACCURACY: f64 = 0.80;
pub const MASTERY_MIN_INTERVAL_DAYS: u32 = 7;

#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub at: DateTime<Utc>,
    pub self_rating: SelfRating,
    pub question_type: QuestionType,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearnedWord {
    pub word_id: u32,
    pub word: String,
    pub interval_days: u32,
    pub ease_factor: f64,
    pub review_count: u32,
    pub correct_count: u32,
    pub next_review_at: Option<DateTime<Utc>>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub is_mastered: bool,
    pub mastered_at: Option<DateTime<Utc>>,
    /// Highest question type answered correctly, a rough depth-of-knowledge
    /// marker.
    pub dvk_level: u8,
    pub assessment_history: Vec<Assessment>,
}

impl LearnedWord {
    fn new(word_id: u32, word: String) -> Self {
        Self {
            word_id,
            word,
            interval_days: 0,
            ease_factor: INITIAL_EASE,
            review_count: 0,
            correct_count: 0,
            next_review_at: None,
            last_reviewed_at: None,
            is_mastered: false,
            mastered_at: None,
            dvk_level: 0,
            assessment_history: Vec::new(),
        }
    }

    fn had_successful_review(&self) -> bool {
        self.assessment_history
            .iter()
            .any(|a| a.self_rating.is_successful())
    }

    fn accuracy(&self) -> f64 {
        if self.review_count == 0 {
            0.0
        } else {
            self.correct_count as f64 / self.review_count as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LearningProgress {
    pub words_studied: u32,
    pub words_mastered: u32,
    pub total_reviews: u32,
    pub target_word_count: u32,
    pub completion_percentage: f64,
}

#[derive(Debug, Clone)]
pub struct NextCard {
    pub word_id: u32,
    pub question_type: QuestionType,
    pub stage: Stage,
    pub is_first_exposure: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LearnError {
    #[error("word '{0}' is not in the goal pool")]
    UnknownWord(String),
    #[error("every word in the goal has been mastered")]
    GoalComplete,
}

#[derive(Debug)]
pub struct LearningSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub goal: Goal,
    pub goal_name: String,
    pub target_word_count: u32,
    pool: Vec<u32>,
    words: HashMap<u32, LearnedWord>,
    pub words_studied: u32,
    pub words_mastered: u32,
    pub total_reviews: u32,
    rng: StdRng,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl LearningSession {
    pub fn new(
        id: Uuid,
        user_id: Uuid,
        goal: Goal,
        goal_name: Option<String>,
        target_word_count: Option<u32>,
        bank: &ItemBank,
    ) -> Self {
        let filter = ItemFilter {
            curriculum: Some(goal.curriculum()),
            ..Default::default()
        };
        let pool: Vec<u32> = bank
            .filtered(&filter)
            .into_iter()
            .filter(|&item_id| bank.renderable_any(item_id))
            .collect();
        let seed = u64::from_le_bytes(id.as_bytes()[..8].try_into().expect("uuid has 16 bytes"));
        let now = Utc::now();
        Self {
            id,
            user_id,
            goal,
            goal_name: goal_name.unwrap_or_else(|| goal.display_name().to_string()),
            target_word_count: target_word_count.unwrap_or_else(|| goal.default_target()),
            pool,
            words: HashMap::new(),
            words_studied: 0,
            words_mastered: 0,
            total_reviews: 0,
            rng: StdRng::seed_from_u64(seed),
            started_at: now,
            last_activity: now,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn word(&self, word_id: u32) -> Option<&LearnedWord> {
        self.words.get(&word_id)
    }

    pub fn words(&self) -> impl Iterator<Item = &LearnedWord> {
        self.words.values()
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn progress(&self) -> LearningProgress {
        let completion = if self.target_word_count == 0 {
            0.0
        } else {
            (self.words_mastered as f64 / self.target_word_count as f64 * 100.0).min(100.0)
        };
        LearningProgress {
            words_studied: self.words_studied,
            words_mastered: self.words_mastered,
            total_reviews: self.total_reviews,
            target_word_count: self.target_word_count,
            completion_percentage: completion,
        }
    }

    /// Deterministic render seed for a card within this session.
    pub fn render_seed(&self, word_id: u32) -> u64 {
        let session_bits =
            u64::from_le_bytes(self.id.as_bytes()[..8].try_into().expect("uuid has 16 bytes"));
        session_bits ^ (word_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    /// Pick the next card:
    /// 1. earliest due review (ties: lowest ease factor, hardest first),
    /// 2. a random unstudied word from the goal pool,
    /// 3. the least recently reviewed unmastered word,
    /// 4. none left: the goal is complete.
    pub fn next_card(&mut self, bank: &ItemBank, now: DateTime<Utc>) -> Option<NextCard> {
        if let Some(word_id) = self.earliest_due(now) {
            return Some(self.card_for(bank, word_id, false));
        }

        let unstudied: Vec<u32> = self
            .pool
            .iter()
            .copied()
            .filter(|word_id| !self.words.contains_key(word_id))
            .collect();
        if !unstudied.is_empty() {
            let word_id = unstudied[self.rng.gen_range(0..unstudied.len())];
            return Some(self.card_for(bank, word_id, true));
        }

        let oldest = self
            .words
            .values()
            .filter(|word| !word.is_mastered)
            .min_by_key(|word| word.last_reviewed_at)
            .map(|word| word.word_id);
        oldest.map(|word_id| self.card_for(bank, word_id, false))
    }

    fn earliest_due(&self, now: DateTime<Utc>) -> Option<u32> {
        self.words
            .values()
            .filter(|word| !word.is_mastered)
            .filter(|word| word.next_review_at.is_some_and(|due| due <= now))
            .min_by(|lhs, rhs| {
                let lhs_key = (lhs.next_review_at, lhs.ease_factor);
                let rhs_key = (rhs.next_review_at, rhs.ease_factor);
                lhs_key
                    .0
                    .cmp(&rhs_key.0)
                    .then(lhs_key.1.partial_cmp(&rhs_key.1).unwrap_or(std::cmp::Ordering::Equal))
                    .then(lhs.word_id.cmp(&rhs.word_id))
            })
            .map(|word| word.word_id)
    }

    fn card_for(&mut self, bank: &ItemBank, word_id: u32, is_first_exposure: bool) -> NextCard {
        let review_count = self.words.get(&word_id).map_or(0, |w| w.review_count);
        let stage = stage_for(review_count);
        let distribution = self.goal.distribution(stage);

        let sampled = sample_question_type(&distribution, &mut self.rng);
        let question_type = if bank.renderable(word_id, sampled) {
            sampled
        } else {
            // Unsupported type: walk the distribution by descending
            // probability, then anything the item can carry.
            fallback_order(&distribution)
                .into_iter()
                .find(|&qtype| bank.renderable(word_id, qtype))
                .or_else(|| {
                    QuestionType::ALL
                        .into_iter()
                        .find(|&qtype| bank.renderable(word_id, qtype))
                })
                .unwrap_or(QuestionType::KoreanMeaning)
        };

        NextCard {
            word_id,
            question_type,
            stage,
            is_first_exposure,
        }
    }

    /// Record a card rating: SM-2 update, history append, mastery check.
    pub fn submit(
        &mut self,
        bank: &ItemBank,
        word: &str,
        question_type: QuestionType,
        self_rating: SelfRating,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> Result<&LearnedWord, LearnError> {
        let word_id = bank
            .id_by_lemma(word)
            .filter(|id| self.pool.contains(id))
            .ok_or_else(|| LearnError::UnknownWord(word.to_string()))?;

        let is_new = !self.words.contains_key(&word_id);
        let entry = self
            .words
            .entry(word_id)
            .or_insert_with(|| LearnedWord::new(word_id, word.to_string()));
        if is_new {
            self.words_studied += 1;
        }

        let update = sm2::apply(
            entry.interval_days,
            entry.ease_factor,
            !entry.had_successful_review(),
            self_rating,
        );
        entry.interval_days = update.interval_days;
        entry.ease_factor = update.ease_factor;
        entry.next_review_at = Some(now + Duration::hours(update.interval_days as i64 * 24));
        entry.last_reviewed_at = Some(now);

        entry.review_count += 1;
        if is_correct {
            entry.correct_count += 1;
        }
        if is_correct && question_type.code() > entry.dvk_level {
            entry.dvk_level = question_type.code();
        }
        entry.assessment_history.push(Assessment {
            at: now,
            self_rating,
            question_type,
            is_correct,
        });

        if !entry.is_mastered
            && entry.review_count >= MASTERY_MIN_REVIEWS
            && entry.accuracy() >= MASTERY_MIN_ACCURACY
            && entry.interval_days >= MASTERY_MIN_INTERVAL_DAYS
        {
            entry.is_mastered = true;
            entry.mastered_at = Some(now);
            self.words_mastered += 1;
        }

        self.total_reviews += 1;
        self.last_activity = now;
        Ok(self.words.get(&word_id).expect("entry inserted above"))
    }
}
