//! Modified SM-2 interval scheduling driven by learner self-ratings.

use serde::{Deserialize, Serialize};

pub const EASE_FLOOR: f64 = 1.3;
pub const INITIAL_EASE: f64 = 2.5;

/// Self-assessment of a card: 0 forgot, 1 hard, 2 good, 3 easy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SelfRating {
    Forgot = 0,
    Hard = 1,
    Good = 2,
    Easy = 3,
}

impl SelfRating {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// A rating of good or better counts toward the word's accuracy.
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Good | Self::Easy)
    }
}

impl TryFrom<u8> for SelfRating {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Forgot),
            1 => Ok(Self::Hard),
            2 => Ok(Self::Good),
            3 => Ok(Self::Easy),
            other => Err(format!("self rating out of range: {other}")),
        }
    }
}

impl From<SelfRating> for u8 {
    fn from(value: SelfRating) -> Self {
        value.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sm2Update {
    pub interval_days: u32,
    pub ease_factor: f64,
}

/// Apply one review. `is_first_review` is true when the word has no
/// successful (good or easy) review yet, so interval growth starts from the
/// first rating that actually stuck.
pub fn apply(
    interval_days: u32,
    ease_factor: f64,
    is_first_review: bool,
    rating: SelfRating,
) -> Sm2Update {
    match rating {
        SelfRating::Forgot => Sm2Update {
            // Immediate repeat.
            interval_days: 0,
            ease_factor: (ease_factor - 0.20).max(EASE_FLOOR),
        },
        SelfRating::Hard => Sm2Update {
            interval_days: ((interval_days as f64 * 1.2).round() as u32).max(1),
            ease_factor: (ease_factor - 0.15).max(EASE_FLOOR),
        },
        // A zero interval (fresh word or just forgotten) restarts growth,
        // matching the first-review case.
        SelfRating::Good => Sm2Update {
            interval_days: if is_first_review || interval_days == 0 {
                1
            } else {
                (interval_days as f64 * ease_factor).round() as u32
            },
            ease_factor,
        },
        SelfRating::Easy => Sm2Update {
            interval_days: if is_first_review || interval_days == 0 {
                4
            } else {
                (interval_days as f64 * ease_factor * 1.3).round() as u32
            },
            // Uncapped above.
            ease_factor: ease_factor + 0.15,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forgot_resets_interval_and_floors_ease() {
        let update = apply(10, 1.4, false, SelfRating::Forgot);
        assert_eq!(update.interval_days, 0);
        assert_eq!(update.ease_factor, EASE_FLOOR);
    }

    #[test]
    fn hard_grows_interval_slowly() {
        let update = apply(10, 2.5, false, SelfRating::Hard);
        assert_eq!(update.interval_days, 12);
        assert!((update.ease_factor - 2.35).abs() < 1e-12);

        // From an immediate-repeat state the interval still reaches 1 day.
        let from_zero = apply(0, 2.5, false, SelfRating::Hard);
        assert_eq!(from_zero.interval_days, 1);
    }

    #[test]
    fn good_first_review_is_one_day() {
        let update = apply(0, 2.5, true, SelfRating::Good);
        assert_eq!(update.interval_days, 1);
        assert_eq!(update.ease_factor, 2.5);
    }

    #[test]
    fn easy_first_review_is_four_days() {
        let update = apply(0, 2.5, true, SelfRating::Easy);
        assert_eq!(update.interval_days, 4);
        assert!((update.ease_factor - 2.65).abs() < 1e-12);
    }

    #[test]
    fn rating_progression_masters_after_six_reviews() {
        // Ratings [0, 1, 2, 2, 3, 3] starting fresh.
        let mut interval = 0u32;
        let mut ease = INITIAL_EASE;
        let mut any_success = false;
        let mut intervals = Vec::new();
        for rating in [
            SelfRating::Forgot,
            SelfRating::Hard,
            SelfRating::Good,
            SelfRating::Good,
            SelfRating::Easy,
            SelfRating::Easy,
        ] {
            let update = apply(interval, ease, !any_success, rating);
            interval = update.interval_days;
            ease = update.ease_factor;
            any_success |= rating.is_successful();
            intervals.push(interval);
        }
        // 0 -> 1 -> 1 (first Good) -> ~2 -> ~5 -> >= 7
        assert_eq!(intervals[0], 0);
        assert_eq!(intervals[1], 1);
        assert_eq!(intervals[2], 1);
        assert_eq!(intervals[3], 2);
        assert!(intervals[4] >= 4);
        assert!(intervals[5] >= 7, "final interval {}", intervals[5]);
        assert!(ease >= INITIAL_EASE - 0.35 + 0.30 - 1e-9);
    }
}
