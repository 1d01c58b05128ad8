//! Item rendering: projecting a bank item into a concrete question with a
//! stem, correct answer, and distractors.
//!
//! Rendering is deterministic for a given seed so a question can be
//! regenerated byte-identically from (session id, item id).

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use super::graph::WordGraph;
use super::{primary_topic, ItemBank, QuestionType, VocabEntry};

pub const DISTRACTOR_COUNT: usize = 3;

/// Korean label pair for binary collocation judgment.
const COLLOCATION_TRUE: &str = "올바름";
const COLLOCATION_FALSE: &str = "올바르지 않음";

#[derive(Debug, Clone, Serialize)]
pub struct RenderedItem {
    pub item_id: u32,
    pub word: String,
    pub question_type: QuestionType,
    pub stem: String,
    pub correct_answer: String,
    pub distractors: Vec<String>,
    pub options: Vec<String>,
    pub pos: String,
    pub cefr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Distractor sourcing strategies, applied in the fallback order A, D, B, C
/// when the primary strategy for a question type comes up short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// Same POS, adjacent CEFR, same topic preferred, synonyms excluded.
    MetadataNeighbors,
    /// Non-synonyms sharing POS.
    NonSynonyms,
    /// Graph siblings via antonym exclusion, falling back to A.
    GraphAntonymPool,
    /// Hypernym siblings from the graph.
    HypernymSiblings,
}

const FALLBACK_ORDER: [Strategy; 4] = [
    Strategy::MetadataNeighbors,
    Strategy::HypernymSiblings,
    Strategy::NonSynonyms,
    Strategy::GraphAntonymPool,
];

fn primary_strategy(qtype: QuestionType) -> Strategy {
    match qtype {
        QuestionType::KoreanMeaning | QuestionType::EnglishDefinition => {
            Strategy::MetadataNeighbors
        }
        QuestionType::Synonym => Strategy::NonSynonyms,
        QuestionType::Antonym => Strategy::GraphAntonymPool,
        QuestionType::Cloze | QuestionType::Collocation => Strategy::HypernymSiblings,
    }
}

/// What a candidate item contributes as distractor text for a question type.
fn distractor_text(entry: &VocabEntry, qtype: QuestionType) -> Option<String> {
    let text = match qtype {
        QuestionType::KoreanMeaning => entry.meaning_ko.clone(),
        QuestionType::EnglishDefinition => entry.definition_en.clone(),
        _ => entry.lemma.clone(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub fn render(bank: &ItemBank, id: u32, qtype: QuestionType, seed: u64) -> Option<RenderedItem> {
    let entry = bank.entry(id)?;

    // Transparent loanwords give the answer away on meaning-recognition
    // types; redirect them to a relational or contextual rendering.
    if entry.is_loanword
        && matches!(
            qtype,
            QuestionType::KoreanMeaning | QuestionType::EnglishDefinition
        )
    {
        if bank.renderable(id, QuestionType::Synonym) {
            return render(bank, id, QuestionType::Synonym, seed);
        }
        if bank.renderable(id, QuestionType::Cloze) {
            return render(bank, id, QuestionType::Cloze, seed);
        }
        return None;
    }

    if !entry.supports(qtype) {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(seed);

    if qtype == QuestionType::Collocation {
        return render_collocation(id, entry, &mut rng);
    }

    let (stem, correct_answer) = stem_and_answer(entry, qtype, &mut rng)?;
    let distractors = collect_distractors(bank, id, qtype, &correct_answer, &mut rng)?;

    let mut options: Vec<String> = Vec::with_capacity(DISTRACTOR_COUNT + 1);
    options.push(correct_answer.clone());
    options.extend(distractors.iter().cloned());
    options.shuffle(&mut rng);

    Some(RenderedItem {
        item_id: id,
        word: entry.lemma.clone(),
        question_type: qtype,
        stem,
        correct_answer,
        distractors,
        options,
        pos: entry.pos.as_str().to_string(),
        cefr: entry.cefr.as_str().to_string(),
        explanation: Some(explanation(entry, qtype)),
    })
}

fn render_collocation(id: u32, entry: &VocabEntry, rng: &mut StdRng) -> Option<RenderedItem> {
    let collocation = entry.collocations.choose(rng)?;
    let options = vec![COLLOCATION_TRUE.to_string(), COLLOCATION_FALSE.to_string()];
    Some(RenderedItem {
        item_id: id,
        word: entry.lemma.clone(),
        question_type: QuestionType::Collocation,
        stem: format!("다음 연어 표현이 올바른지 판단하세요: '{collocation}'"),
        correct_answer: COLLOCATION_TRUE.to_string(),
        distractors: vec![COLLOCATION_FALSE.to_string()],
        options,
        pos: entry.pos.as_str().to_string(),
        cefr: entry.cefr.as_str().to_string(),
        explanation: Some(explanation(entry, QuestionType::Collocation)),
    })
}

fn stem_and_answer(
    entry: &VocabEntry,
    qtype: QuestionType,
    rng: &mut StdRng,
) -> Option<(String, String)> {
    let lemma = &entry.lemma;
    match qtype {
        QuestionType::KoreanMeaning => Some((
            format!("다음 단어 '{lemma}'의 뜻으로 가장 알맞은 것을 고르세요."),
            entry.meaning_ko.clone(),
        )),
        QuestionType::EnglishDefinition => Some((
            format!("Choose the correct English definition of '{lemma}'."),
            entry.definition_en.clone(),
        )),
        QuestionType::Synonym => {
            let correct = entry.synonyms.choose(rng)?.clone();
            Some((
                format!("다음 단어 '{lemma}'와 의미가 가장 비슷한 유의어를 고르세요."),
                correct,
            ))
        }
        QuestionType::Antonym => {
            let correct = entry.antonyms.choose(rng)?.clone();
            Some((
                format!("다음 단어 '{lemma}'와 의미가 반대인 반의어를 고르세요."),
                correct,
            ))
        }
        QuestionType::Cloze => {
            let sentence = entry
                .sentences
                .iter()
                .find(|s| s.to_lowercase().contains(&lemma.to_lowercase()))?;
            let blanked = blank_out(sentence, lemma)?;
            Some((
                format!("문맥상 빈칸에 들어갈 가장 적절한 단어를 고르세요.\n\n{blanked}"),
                lemma.clone(),
            ))
        }
        QuestionType::Collocation => None,
    }
}

fn blank_out(sentence: &str, lemma: &str) -> Option<String> {
    let lower = sentence.to_lowercase();
    let idx = lower.find(&lemma.to_lowercase())?;
    let mut blanked = String::with_capacity(sentence.len());
    blanked.push_str(&sentence[..idx]);
    blanked.push_str("______");
    blanked.push_str(&sentence[idx + lemma.len()..]);
    Some(blanked)
}

fn explanation(entry: &VocabEntry, qtype: QuestionType) -> String {
    let lemma = &entry.lemma;
    let ko = &entry.meaning_ko;
    match qtype {
        QuestionType::KoreanMeaning => format!("'{lemma}'의 뜻: {ko}"),
        QuestionType::EnglishDefinition => {
            let definition = if entry.definition_en.is_empty() {
                ko.clone()
            } else {
                entry.definition_en.clone()
            };
            format!("'{lemma}' means: {definition} ({ko})")
        }
        QuestionType::Synonym => format!("'{lemma}'의 동의어를 묻는 문제입니다 ({ko})"),
        QuestionType::Antonym => format!("'{lemma}'의 반의어를 묻는 문제입니다 ({ko})"),
        QuestionType::Cloze => format!("'{lemma}'가 빈칸에 적합한 단어입니다. ({ko})"),
        QuestionType::Collocation => format!("'{lemma}': {ko}"),
    }
}

/// Gather three distinct distractor texts, starting from the type's primary
/// strategy and walking the fallback chain A -> D -> B -> C.
fn collect_distractors(
    bank: &ItemBank,
    target: u32,
    qtype: QuestionType,
    correct_answer: &str,
    rng: &mut StdRng,
) -> Option<Vec<String>> {
    let mut chosen: Vec<String> = Vec::with_capacity(DISTRACTOR_COUNT);
    let mut chosen_ids: Vec<u32> = Vec::new();

    let mut order: Vec<Strategy> = vec![primary_strategy(qtype)];
    for strategy in FALLBACK_ORDER {
        if !order.contains(&strategy) {
            order.push(strategy);
        }
    }

    for strategy in order {
        if chosen.len() >= DISTRACTOR_COUNT {
            break;
        }
        let mut pool = candidate_pool(bank, target, strategy);
        pool.retain(|id| !chosen_ids.contains(id));
        pool.shuffle(rng);

        for id in pool {
            if chosen.len() >= DISTRACTOR_COUNT {
                break;
            }
            let entry = &bank.entries()[id as usize];
            let Some(text) = distractor_text(entry, qtype) else {
                continue;
            };
            if text == correct_answer || chosen.contains(&text) {
                continue;
            }
            // Distractors must not be synonyms of each other.
            if chosen_ids
                .iter()
                .any(|&existing| bank.graph().is_synonym_pair(id, existing))
            {
                continue;
            }
            chosen.push(text);
            chosen_ids.push(id);
        }
    }

    if chosen.len() < DISTRACTOR_COUNT {
        return None;
    }
    Some(chosen)
}

fn candidate_pool(bank: &ItemBank, target: u32, strategy: Strategy) -> Vec<u32> {
    let entry = &bank.entries()[target as usize];
    let graph = bank.graph();
    let target_topic = primary_topic(&entry.topic);
    let adjacent = entry.cefr.adjacent();

    let base_ok = |id: u32| -> bool {
        if id == target {
            return false;
        }
        let candidate = &bank.entries()[id as usize];
        if candidate.pos != entry.pos {
            return false;
        }
        if graph.is_synonym_pair(target, id) {
            return false;
        }
        if entry
            .word_family
            .iter()
            .any(|family| family.eq_ignore_ascii_case(&candidate.lemma))
        {
            return false;
        }
        true
    };

    match strategy {
        Strategy::MetadataNeighbors => {
            let mut same_topic = Vec::new();
            let mut other_topic = Vec::new();
            for id in 0..bank.len() as u32 {
                if !base_ok(id) {
                    continue;
                }
                let candidate = &bank.entries()[id as usize];
                if !adjacent.contains(&candidate.cefr) {
                    continue;
                }
                if !target_topic.is_empty() && primary_topic(&candidate.topic) == target_topic {
                    same_topic.push(id);
                } else {
                    other_topic.push(id);
                }
            }
            same_topic.extend(other_topic);
            same_topic
        }
        Strategy::NonSynonyms => (0..bank.len() as u32)
            .filter(|&id| base_ok(id))
            .filter(|&id| {
                let candidate = &bank.entries()[id as usize];
                adjacent.contains(&candidate.cefr)
                    && !entry
                        .synonyms
                        .iter()
                        .any(|syn| syn.eq_ignore_ascii_case(&candidate.lemma))
            })
            .collect(),
        Strategy::GraphAntonymPool => {
            let mut pool: Vec<u32> = graph
                .siblings_of(target)
                .iter()
                .copied()
                .filter(|&id| base_ok(id) && !graph.antonyms_of(target).contains(&id))
                .collect();
            if pool.len() < DISTRACTOR_COUNT {
                pool.extend(candidate_pool(bank, target, Strategy::MetadataNeighbors));
                pool.dedup();
            }
            pool
        }
        Strategy::HypernymSiblings => graph
            .siblings_of(target)
            .iter()
            .copied()
            .filter(|&id| base_ok(id))
            .collect(),
    }
}

/// Renderability bitmask per item (bit i set = question type i+1 can be
/// produced). Checked once at bank build so selection never hands out an
/// item it cannot render.
pub fn renderability(entries: &[VocabEntry], graph: &WordGraph) -> Vec<u8> {
    // Per-(POS, CEFR-window) pool sizes as a cheap feasibility proxy for the
    // metadata strategy, which every fallback chain ends in.
    let mut mask = vec![0u8; entries.len()];
    for (id, entry) in entries.iter().enumerate() {
        let adjacent = entry.cefr.adjacent();
        let mut pool = 0usize;
        for (other_id, other) in entries.iter().enumerate() {
            if other_id == id || other.pos != entry.pos {
                continue;
            }
            if !adjacent.contains(&other.cefr) {
                continue;
            }
            if graph.is_synonym_pair(id as u32, other_id as u32) {
                continue;
            }
            pool += 1;
            if pool > DISTRACTOR_COUNT * 2 {
                break;
            }
        }
        let has_pool = pool >= DISTRACTOR_COUNT;

        for qtype in QuestionType::ALL {
            let feasible = match qtype {
                QuestionType::Collocation => entry.supports(qtype),
                _ => entry.supports(qtype) && has_pool,
            };
            // Loanwords are redirected away from meaning types at render
            // time, so they must not be offered as types 1-2.
            let feasible = feasible
                && !(entry.is_loanword
                    && matches!(
                        qtype,
                        QuestionType::KoreanMeaning | QuestionType::EnglishDefinition
                    ));
            if feasible {
                mask[id] |= 1 << qtype.index();
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::ItemBank;

    #[test]
    fn rendering_is_deterministic_per_seed() {
        let bank = ItemBank::synthetic(200, 7);
        let first = bank.render(10, QuestionType::KoreanMeaning, 42).unwrap();
        let second = bank.render(10, QuestionType::KoreanMeaning, 42).unwrap();
        assert_eq!(first.options, second.options);
        assert_eq!(first.stem, second.stem);
        assert_eq!(first.correct_answer, second.correct_answer);
    }

    #[test]
    fn different_seed_reshuffles_options() {
        let bank = ItemBank::synthetic(200, 7);
        let first = bank.render(10, QuestionType::KoreanMeaning, 1).unwrap();
        let mut any_different = false;
        for seed in 2..10 {
            let other = bank.render(10, QuestionType::KoreanMeaning, seed).unwrap();
            if other.options != first.options {
                any_different = true;
                break;
            }
        }
        assert!(any_different);
    }

    #[test]
    fn four_option_item_has_three_distractors() {
        let bank = ItemBank::synthetic(200, 7);
        let rendered = bank.render(20, QuestionType::Synonym, 9).unwrap();
        assert_eq!(rendered.distractors.len(), 3);
        assert_eq!(rendered.options.len(), 4);
        assert!(rendered.options.contains(&rendered.correct_answer));
        for distractor in &rendered.distractors {
            assert_ne!(distractor, &rendered.correct_answer);
        }
    }

    #[test]
    fn collocation_renders_binary() {
        let bank = ItemBank::synthetic(200, 7);
        let id = (0..bank.len() as u32)
            .find(|&id| bank.renderable(id, QuestionType::Collocation))
            .unwrap();
        let rendered = bank.render(id, QuestionType::Collocation, 3).unwrap();
        assert_eq!(rendered.options.len(), 2);
        assert_eq!(rendered.distractors.len(), 1);
    }

    #[test]
    fn cloze_stem_contains_blank() {
        let bank = ItemBank::synthetic(200, 7);
        let id = (0..bank.len() as u32)
            .find(|&id| bank.renderable(id, QuestionType::Cloze))
            .unwrap();
        let rendered = bank.render(id, QuestionType::Cloze, 3).unwrap();
        assert!(rendered.stem.contains("______"));
        assert!(!rendered.stem.contains(&rendered.correct_answer));
    }

    #[test]
    fn loanword_redirects_away_from_meaning_types() {
        let bank = ItemBank::synthetic(200, 7);
        let loanword = (0..bank.len() as u32)
            .find(|&id| bank.entry(id).unwrap().is_loanword)
            .unwrap();
        assert!(!bank.renderable(loanword, QuestionType::KoreanMeaning));
        if let Some(rendered) = bank.render(loanword, QuestionType::KoreanMeaning, 5) {
            assert_ne!(rendered.question_type, QuestionType::KoreanMeaning);
        }
    }
}
