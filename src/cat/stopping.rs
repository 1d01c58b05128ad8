//! Termination rules for an adaptive test session.

use serde::Serialize;

pub const MIN_ITEMS: usize = 15;
pub const MAX_ITEMS: usize = 40;
pub const SE_THRESHOLD: f64 = 0.30;
pub const CONVERGENCE_MIN_ITEMS: usize = 20;
pub const CONVERGENCE_WINDOW: usize = 5;
pub const CONVERGENCE_EPSILON: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    MaxItems,
    SeThreshold,
    Convergence,
    PoolExhausted,
    Expired,
    Corrupted,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxItems => "max_items",
            Self::SeThreshold => "se_threshold",
            Self::Convergence => "convergence",
            Self::PoolExhausted => "pool_exhausted",
            Self::Expired => "expired",
            Self::Corrupted => "corrupted",
        }
    }
}

impl std::str::FromStr for TerminationReason {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "max_items" => Ok(Self::MaxItems),
            "se_threshold" => Ok(Self::SeThreshold),
            "convergence" => Ok(Self::Convergence),
            "pool_exhausted" => Ok(Self::PoolExhausted),
            "expired" => Ok(Self::Expired),
            "corrupted" => Ok(Self::Corrupted),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoppingRules {
    pub min_items: usize,
    pub max_items: usize,
    pub se_threshold: f64,
    pub convergence_min_items: usize,
    pub convergence_window: usize,
    pub convergence_epsilon: f64,
}

impl Default for StoppingRules {
    fn default() -> Self {
        Self {
            min_items: MIN_ITEMS,
            max_items: MAX_ITEMS,
            se_threshold: SE_THRESHOLD,
            convergence_min_items: CONVERGENCE_MIN_ITEMS,
            convergence_window: CONVERGENCE_WINDOW,
            convergence_epsilon: CONVERGENCE_EPSILON,
        }
    }
}

impl StoppingRules {
    /// Evaluate after a response. `theta_history` includes the initial
    /// estimate followed by one entry per response.
    pub fn evaluate(
        &self,
        items_completed: usize,
        current_se: f64,
        theta_history: &[f64],
    ) -> Option<TerminationReason> {
        if items_completed >= self.max_items {
            return Some(TerminationReason::MaxItems);
        }
        if items_completed < self.min_items {
            return None;
        }
        if current_se < self.se_threshold {
            return Some(TerminationReason::SeThreshold);
        }
        if items_completed >= self.convergence_min_items
            && theta_history.len() > self.convergence_window
        {
            let recent = &theta_history[theta_history.len() - (self.convergence_window + 1)..];
            let converged = recent
                .windows(2)
                .all(|pair| (pair[1] - pair[0]).abs() < self.convergence_epsilon);
            if converged {
                return Some(TerminationReason::Convergence);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_stops_below_minimum() {
        let rules = StoppingRules::default();
        assert_eq!(rules.evaluate(14, 0.01, &[0.0; 15]), None);
    }

    #[test]
    fn stops_on_se_after_minimum() {
        let rules = StoppingRules::default();
        assert_eq!(
            rules.evaluate(15, 0.29, &[0.0; 16]),
            Some(TerminationReason::SeThreshold)
        );
        assert_eq!(rules.evaluate(15, 0.31, &[0.0; 16]), None);
    }

    #[test]
    fn stops_on_hard_cap() {
        let rules = StoppingRules::default();
        assert_eq!(
            rules.evaluate(40, 0.9, &[0.0; 41]),
            Some(TerminationReason::MaxItems)
        );
    }

    #[test]
    fn convergence_needs_twenty_items_and_stable_window() {
        let rules = StoppingRules::default();
        let mut history = vec![0.0; 16];
        history.extend([1.00, 1.01, 1.02, 1.01, 1.00]);
        // 20 responses, last five deltas all < 0.05
        assert_eq!(
            rules.evaluate(20, 0.5, &history),
            Some(TerminationReason::Convergence)
        );

        let mut jumpy = vec![0.0; 16];
        jumpy.extend([1.0, 1.2, 1.0, 1.2, 1.0]);
        assert_eq!(rules.evaluate(20, 0.5, &jumpy), None);

        // Same stable window but only 19 items: keep going.
        assert_eq!(rules.evaluate(19, 0.5, &history[1..]), None);
    }
}
