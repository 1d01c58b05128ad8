//! Deterministic IRT parameter initialization from vocabulary metadata.
//!
//! Recomputed from metadata on every cold start; calibration later refines
//! the values from response data.

use super::{ItemParams, PartOfSpeech, VocabEntry};

const B_WEIGHT_CEFR: f64 = 0.10;
const B_WEIGHT_FREQ: f64 = 0.40;
const B_WEIGHT_GSE: f64 = 0.10;
const B_WEIGHT_CURRICULUM: f64 = 0.40;
const B_WEIGHT_LEXILE: f64 = 0.00;

const B_SCALE: f64 = 2.5;

const A_BASE: f64 = 1.0;
const A_MIN: f64 = 0.5;
const A_MAX: f64 = 2.0;

pub fn initialize(entries: &[VocabEntry]) -> Vec<ItemParams> {
    let total = entries.len().max(1);
    entries
        .iter()
        .map(|entry| ItemParams {
            a: discrimination(entry),
            b: difficulty(entry, total),
        })
        .collect()
}

/// Difficulty as a weighted average of five ordinal encodings, scaled
/// linearly onto [-2.5, +2.5]. Missing signals drop out and the remaining
/// weights renormalize.
pub fn difficulty(entry: &VocabEntry, total_entries: usize) -> f64 {
    let cefr_val = match entry.cefr.ordinal() {
        0 => 0.0,
        1 => 0.2,
        2 => 0.45,
        3 => 0.7,
        _ => 0.95,
    };

    let freq_val = if entry.freq_rank > 0 {
        // Frequency decile: rank position within the bank.
        (entry.freq_rank as f64 / total_entries as f64).clamp(0.0, 1.0)
    } else {
        0.5
    };

    let gse_val = entry
        .gse
        .filter(|gse| *gse > 0.0)
        .map(|gse| ((gse - 10.0) / 60.0).clamp(0.0, 1.0));

    let curriculum_val = match entry.curriculum.ordinal() {
        0 => 0.1,
        1 => 0.45,
        2 => 0.75,
        _ => 0.95,
    };

    let lexile_val = entry
        .lexile
        .map(|lexile| ((lexile as f64 - 200.0) / 1200.0).clamp(0.0, 1.0));

    let mut weight_sum = B_WEIGHT_CEFR + B_WEIGHT_FREQ + B_WEIGHT_CURRICULUM;
    let mut composite =
        B_WEIGHT_CEFR * cefr_val + B_WEIGHT_FREQ * freq_val + B_WEIGHT_CURRICULUM * curriculum_val;
    if let Some(gse) = gse_val {
        weight_sum += B_WEIGHT_GSE;
        composite += B_WEIGHT_GSE * gse;
    }
    if let Some(lexile) = lexile_val {
        weight_sum += B_WEIGHT_LEXILE;
        composite += B_WEIGHT_LEXILE * lexile;
    }

    let composite = if weight_sum > 0.0 {
        composite / weight_sum
    } else {
        0.5
    };

    // [0, 1] -> [-2.5, +2.5]
    (composite - 0.5) * 2.0 * B_SCALE
}

/// Discrimination starts at 1.0 and earns small increments for words with
/// a specific topic, a rich synonym neighborhood, or a rare POS.
pub fn discrimination(entry: &VocabEntry) -> f64 {
    let mut a = A_BASE;

    let topic = entry.topic.to_lowercase();
    let is_general = topic.is_empty() || topic.contains("general") || topic.contains("grammar");
    if !is_general {
        a += 0.15;
    }

    if entry.synonyms.len() >= 3 {
        a += 0.10;
    }

    if entry.pos == PartOfSpeech::Other {
        a += 0.10;
    }

    if entry.is_core {
        // Very common words separate learners poorly.
        a -= 0.10;
    }

    a.clamp(A_MIN, A_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{CefrBand, CurriculumBand, ItemBank};

    fn entry(cefr: CefrBand, curriculum: CurriculumBand, rank: u32) -> VocabEntry {
        VocabEntry {
            lemma: "sample".into(),
            pos: PartOfSpeech::Noun,
            topic: "science".into(),
            cefr,
            curriculum,
            freq_rank: rank,
            meaning_ko: "표본".into(),
            definition_en: "a small part".into(),
            gse: None,
            lexile: None,
            synonyms: vec![],
            antonyms: vec![],
            hypernyms: vec![],
            word_family: vec![],
            collocations: vec![],
            sentences: vec![],
            is_core: false,
            is_loanword: false,
        }
    }

    #[test]
    fn difficulty_orders_by_level() {
        let easy = difficulty(&entry(CefrBand::A1, CurriculumBand::Elementary, 100), 9000);
        let hard = difficulty(&entry(CefrBand::C1, CurriculumBand::Csat, 8900), 9000);
        assert!(easy < hard);
        assert!((-2.5..=2.5).contains(&easy));
        assert!((-2.5..=2.5).contains(&hard));
    }

    #[test]
    fn discrimination_stays_in_bounds() {
        let bank = ItemBank::synthetic(500, 3);
        for params in bank.all_params() {
            assert!((A_MIN..=A_MAX).contains(&params.a), "a = {}", params.a);
        }
    }

    #[test]
    fn initializer_is_deterministic() {
        let bank_a = ItemBank::synthetic(100, 11);
        let bank_b = ItemBank::synthetic(100, 11);
        for (lhs, rhs) in bank_a.all_params().iter().zip(bank_b.all_params()) {
            assert_eq!(lhs.a, rhs.a);
            assert_eq!(lhs.b, rhs.b);
        }
    }
}
