//! Next-item selection: maximum Fisher information under content-balance and
//! exposure constraints, with randomized top-K to spread administrations.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::Rng;

use crate::bank::{primary_topic, ItemBank, PartOfSpeech, QuestionType};
use crate::irt;

use super::exposure::ExposureController;

pub const MAX_SAME_TOPIC: u32 = 3;
pub const POS_TOLERANCE: f64 = 0.10;
pub const TOP_K: usize = 5;
pub const EXPOSURE_RELAXATION: f64 = 0.10;

#[derive(Debug, Clone)]
pub struct SelectionInputs<'a> {
    pub theta: f64,
    pub administered: &'a HashSet<u32>,
    pub topic_counts: &'a HashMap<String, u32>,
    pub pos_counts: &'a [u32; PartOfSpeech::COUNT],
    pub items_completed: usize,
    pub preferred_type: Option<QuestionType>,
}

#[derive(Debug, Clone, Copy)]
pub struct Selected {
    pub item_id: u32,
    pub question_type: QuestionType,
    pub information: f64,
}

/// Pick the next item, or None when the pool is exhausted under every
/// relaxation (fatal for the session).
pub fn select_next(
    bank: &ItemBank,
    exposure: &ExposureController,
    inputs: &SelectionInputs<'_>,
    rng: &mut StdRng,
) -> Option<Selected> {
    let available: Vec<u32> = (0..bank.len() as u32)
        .filter(|id| !inputs.administered.contains(id))
        .filter(|&id| match inputs.preferred_type {
            Some(qtype) => bank.renderable(id, qtype),
            None => bank.renderable_any(id),
        })
        .collect();
    if available.is_empty() {
        return None;
    }

    // 1. Content constraints: topic saturation and running POS balance.
    let mut candidates: Vec<u32> = available
        .iter()
        .copied()
        .filter(|&id| topic_ok(bank, inputs, id) && pos_ok(bank, inputs, id))
        .collect();

    // If the joint constraints strangle the pool, relax to topic-only and
    // then to the raw available set, mirroring the balance targets being
    // advisory rather than absolute.
    if candidates.len() < TOP_K {
        candidates = available
            .iter()
            .copied()
            .filter(|&id| topic_ok(bank, inputs, id))
            .collect();
    }
    if candidates.len() < TOP_K {
        candidates = available.clone();
    }

    // 2. Exposure gate, one relaxation step, then ungated.
    let cap = exposure.max_rate();
    let mut gated: Vec<u32> = candidates
        .iter()
        .copied()
        .filter(|&id| exposure.is_eligible(id, cap))
        .collect();
    if gated.is_empty() {
        let relaxed_cap = cap + EXPOSURE_RELAXATION;
        gated = candidates
            .iter()
            .copied()
            .filter(|&id| exposure.is_eligible(id, relaxed_cap))
            .collect();
        if !gated.is_empty() {
            tracing::info!(
                cap,
                relaxed_cap,
                remaining = gated.len(),
                "exposure gate relaxed"
            );
        }
    }
    if gated.is_empty() {
        tracing::warn!(cap, "exposure gate fully bypassed, proceeding ungated");
        gated = candidates;
    }

    // 3-4. Information ranking, uniform draw from the top K.
    let mut scored: Vec<(u32, f64)> = gated
        .into_iter()
        .map(|id| {
            let params = bank.params(id).expect("candidate id is in range");
            (id, irt::fisher_information(inputs.theta, params.a, params.b, 0.0))
        })
        .collect();
    scored.sort_by(|lhs, rhs| {
        rhs.1
            .partial_cmp(&lhs.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(lhs.0.cmp(&rhs.0))
    });
    scored.truncate(TOP_K);

    let (item_id, information) = scored[rng.gen_range(0..scored.len())];

    // 5. Type assignment.
    let question_type = assign_type(bank, item_id, inputs.theta, inputs.preferred_type);

    Some(Selected {
        item_id,
        question_type,
        information,
    })
}

fn topic_ok(bank: &ItemBank, inputs: &SelectionInputs<'_>, id: u32) -> bool {
    let entry = bank.entry(id).expect("id in range");
    let topic = primary_topic(&entry.topic);
    if topic.is_empty() {
        return true;
    }
    inputs.topic_counts.get(topic).copied().unwrap_or(0) < MAX_SAME_TOPIC
}

/// Would administering this item push its POS share more than the tolerance
/// above target? The running ratio is evaluated as-if-administered so the
/// bound holds at every prefix.
fn pos_ok(bank: &ItemBank, inputs: &SelectionInputs<'_>, id: u32) -> bool {
    let entry = bank.entry(id).expect("id in range");
    let slot = entry.pos.slot();
    let next_total = inputs.items_completed as f64 + 1.0;
    let next_share = (inputs.pos_counts[slot] as f64 + 1.0) / next_total;
    next_share <= PartOfSpeech::RATIO_TARGET[slot] + POS_TOLERANCE
}

/// Preferred type when the item supports it; otherwise the supported type
/// whose effective difficulty sits closest to the current ability estimate.
/// Ties break toward the lowest type code.
fn assign_type(
    bank: &ItemBank,
    item_id: u32,
    theta: f64,
    preferred: Option<QuestionType>,
) -> QuestionType {
    if let Some(qtype) = preferred {
        if bank.renderable(item_id, qtype) {
            return qtype;
        }
    }

    let mut best = QuestionType::KoreanMeaning;
    let mut best_distance = f64::INFINITY;
    for qtype in QuestionType::ALL {
        if !bank.renderable(item_id, qtype) {
            continue;
        }
        let distance = (bank.effective_b(item_id, qtype) - theta).abs();
        if distance < best_distance {
            best_distance = distance;
            best = qtype;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::ItemBank;
    use rand::SeedableRng;

    fn empty_inputs<'a>(
        administered: &'a HashSet<u32>,
        topic_counts: &'a HashMap<String, u32>,
        pos_counts: &'a [u32; PartOfSpeech::COUNT],
    ) -> SelectionInputs<'a> {
        SelectionInputs {
            theta: 0.0,
            administered,
            topic_counts,
            pos_counts,
            items_completed: 0,
            preferred_type: Some(QuestionType::KoreanMeaning),
        }
    }

    #[test]
    fn selects_from_top_information() {
        let bank = ItemBank::synthetic(300, 7);
        let exposure = ExposureController::new(bank.len(), 0.25);
        let administered = HashSet::new();
        let topics = HashMap::new();
        let pos = [0; PartOfSpeech::COUNT];
        let inputs = empty_inputs(&administered, &topics, &pos);
        let mut rng = StdRng::seed_from_u64(1);

        let selected = select_next(&bank, &exposure, &inputs, &mut rng).unwrap();
        assert!(bank.renderable(selected.item_id, selected.question_type));
        assert!(selected.information > 0.0);
    }

    #[test]
    fn never_repeats_administered_items() {
        let bank = ItemBank::synthetic(300, 7);
        let exposure = ExposureController::new(bank.len(), 0.25);
        let mut administered = HashSet::new();
        let topics = HashMap::new();
        let pos = [0; PartOfSpeech::COUNT];
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..50 {
            let inputs = SelectionInputs {
                items_completed: administered.len(),
                ..empty_inputs(&administered, &topics, &pos)
            };
            let selected = select_next(&bank, &exposure, &inputs, &mut rng).unwrap();
            assert!(administered.insert(selected.item_id), "item repeated");
        }
    }

    #[test]
    fn saturated_topic_is_skipped() {
        let bank = ItemBank::synthetic(300, 7);
        let exposure = ExposureController::new(bank.len(), 0.25);
        let administered = HashSet::new();
        let mut topics = HashMap::new();
        // Saturate every topic except one.
        let keep = "nature".to_string();
        for topic in bank.topics() {
            if topic != keep {
                topics.insert(topic.to_string(), MAX_SAME_TOPIC);
            }
        }
        let pos = [2u32, 1, 1, 0, 0];
        let inputs = SelectionInputs {
            items_completed: 4,
            ..empty_inputs(&administered, &topics, &pos)
        };
        let mut rng = StdRng::seed_from_u64(3);

        let selected = select_next(&bank, &exposure, &inputs, &mut rng).unwrap();
        let entry = bank.entry(selected.item_id).unwrap();
        assert_eq!(primary_topic(&entry.topic), keep);
    }

    #[test]
    fn exposure_gate_relaxes_when_empty() {
        let bank = ItemBank::synthetic(60, 7);
        let exposure = ExposureController::new(bank.len(), 0.25);
        // Every item over the base cap but under cap + 0.10.
        for _ in 0..100 {
            exposure.record_session_start();
        }
        for id in 0..bank.len() as u32 {
            for _ in 0..30 {
                exposure.record_administration(id);
            }
        }
        let administered = HashSet::new();
        let topics = HashMap::new();
        let pos = [0; PartOfSpeech::COUNT];
        let inputs = empty_inputs(&administered, &topics, &pos);
        let mut rng = StdRng::seed_from_u64(4);

        assert!(select_next(&bank, &exposure, &inputs, &mut rng).is_some());
    }

    #[test]
    fn pool_exhaustion_returns_none() {
        let bank = ItemBank::synthetic(30, 7);
        let exposure = ExposureController::new(bank.len(), 0.25);
        let administered: HashSet<u32> = (0..bank.len() as u32).collect();
        let topics = HashMap::new();
        let pos = [0; PartOfSpeech::COUNT];
        let inputs = SelectionInputs {
            items_completed: administered.len(),
            ..empty_inputs(&administered, &topics, &pos)
        };
        let mut rng = StdRng::seed_from_u64(5);

        assert!(select_next(&bank, &exposure, &inputs, &mut rng).is_none());
    }

    #[test]
    fn mixed_mode_assigns_type_near_theta() {
        let bank = ItemBank::synthetic(300, 7);
        let exposure = ExposureController::new(bank.len(), 0.25);
        let administered = HashSet::new();
        let topics = HashMap::new();
        let pos = [0; PartOfSpeech::COUNT];
        let inputs = SelectionInputs {
            preferred_type: None,
            theta: 1.5,
            ..empty_inputs(&administered, &topics, &pos)
        };
        let mut rng = StdRng::seed_from_u64(6);

        let selected = select_next(&bank, &exposure, &inputs, &mut rng).unwrap();
        // The assigned type must be the renderable one with effective b
        // closest to theta.
        let chosen_distance =
            (bank.effective_b(selected.item_id, selected.question_type) - 1.5).abs();
        for qtype in QuestionType::ALL {
            if bank.renderable(selected.item_id, qtype) {
                let distance = (bank.effective_b(selected.item_id, qtype) - 1.5).abs();
                assert!(chosen_distance <= distance + 1e-12);
            }
        }
    }
}
