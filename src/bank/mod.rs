//! In-memory vocabulary item bank.
//!
//! Loaded once at startup, immutable afterwards. Calibration produces a new
//! bank value that the app state publishes with a single swap, so readers
//! always observe a consistent version.

pub mod calibrate;
pub mod graph;
pub mod params;
pub mod render;

use std::collections::HashMap;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::irt;
use graph::WordGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Adverb,
    Other,
}

impl PartOfSpeech {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Noun => "noun",
            Self::Verb => "verb",
            Self::Adjective => "adjective",
            Self::Adverb => "adverb",
            Self::Other => "other",
        }
    }

    /// Index into the POS ratio tally used by content balancing.
    pub fn slot(&self) -> usize {
        match self {
            Self::Noun => 0,
            Self::Verb => 1,
            Self::Adjective => 2,
            Self::Adverb => 3,
            Self::Other => 4,
        }
    }

    pub const COUNT: usize = 5;

    /// Target share per POS slot for a balanced test.
    pub const RATIO_TARGET: [f64; Self::COUNT] = [0.50, 0.25, 0.15, 0.05, 0.05];
}

impl From<String> for PartOfSpeech {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "noun" | "n" => Self::Noun,
            "verb" | "v" => Self::Verb,
            "adjective" | "adj" | "a" => Self::Adjective,
            "adverb" | "adv" => Self::Adverb,
            _ => Self::Other,
        }
    }
}

impl From<PartOfSpeech> for String {
    fn from(value: PartOfSpeech) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CefrBand {
    A1,
    A2,
    B1,
    B2,
    C1,
}

impl CefrBand {
    pub const ALL: [CefrBand; 5] = [Self::A1, Self::A2, Self::B1, Self::B2, Self::C1];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
        }
    }

    pub fn ordinal(&self) -> usize {
        match self {
            Self::A1 => 0,
            Self::A2 => 1,
            Self::B1 => 2,
            Self::B2 => 3,
            Self::C1 => 4,
        }
    }

    /// Theta interval mapped to this band in diagnostic reports.
    pub fn theta_bounds(&self) -> (f64, f64) {
        match self {
            Self::A1 => (-3.0, -1.5),
            Self::A2 => (-1.5, -0.5),
            Self::B1 => (-0.5, 0.5),
            Self::B2 => (0.5, 1.5),
            Self::C1 => (1.5, 3.0),
        }
    }

    pub fn theta_center(&self) -> f64 {
        let (low, high) = self.theta_bounds();
        (low + high) / 2.0
    }

    pub fn next(&self) -> CefrBand {
        Self::ALL[(self.ordinal() + 1).min(Self::ALL.len() - 1)]
    }

    /// Bands within one step of this one, used by distractor strategy A.
    pub fn adjacent(&self) -> Vec<CefrBand> {
        let idx = self.ordinal() as isize;
        Self::ALL
            .iter()
            .copied()
            .filter(|band| (band.ordinal() as isize - idx).abs() <= 1)
            .collect()
    }
}

impl From<String> for CefrBand {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "A1" => Self::A1,
            "A2" => Self::A2,
            "B2" => Self::B2,
            "C1" | "C2" => Self::C1,
            _ => Self::B1,
        }
    }
}

impl From<CefrBand> for String {
    fn from(value: CefrBand) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CurriculumBand {
    Elementary,
    Middle,
    High,
    Csat,
}

impl CurriculumBand {
    pub const ALL: [CurriculumBand; 4] = [Self::Elementary, Self::Middle, Self::High, Self::Csat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Elementary => "elementary",
            Self::Middle => "middle",
            Self::High => "high",
            Self::Csat => "csat",
        }
    }

    pub fn ordinal(&self) -> usize {
        match self {
            Self::Elementary => 0,
            Self::Middle => 1,
            Self::High => 2,
            Self::Csat => 3,
        }
    }
}

impl From<String> for CurriculumBand {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "elementary" => Self::Elementary,
            "high" => Self::High,
            "csat" | "suneung" => Self::Csat,
            _ => Self::Middle,
        }
    }
}

impl From<CurriculumBand> for String {
    fn from(value: CurriculumBand) -> Self {
        value.as_str().to_string()
    }
}

/// The six question types a bank item can be projected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QuestionType {
    KoreanMeaning = 1,
    EnglishDefinition = 2,
    Synonym = 3,
    Antonym = 4,
    Cloze = 5,
    Collocation = 6,
}

impl QuestionType {
    pub const ALL: [QuestionType; 6] = [
        Self::KoreanMeaning,
        Self::EnglishDefinition,
        Self::Synonym,
        Self::Antonym,
        Self::Cloze,
        Self::Collocation,
    ];

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn index(&self) -> usize {
        self.code() as usize - 1
    }

    /// Additive difficulty offset applied at render time, never stored.
    pub fn b_offset(&self) -> f64 {
        match self {
            Self::KoreanMeaning => 0.0,
            Self::EnglishDefinition => 0.6,
            Self::Synonym => 0.2,
            Self::Antonym => 0.3,
            Self::Cloze => 0.5,
            Self::Collocation => 0.2,
        }
    }

    /// Collocation judgment renders as a binary choice; everything else is
    /// four-option MCQ.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Collocation)
    }
}

impl TryFrom<u8> for QuestionType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::KoreanMeaning),
            2 => Ok(Self::EnglishDefinition),
            3 => Ok(Self::Synonym),
            4 => Ok(Self::Antonym),
            5 => Ok(Self::Cloze),
            6 => Ok(Self::Collocation),
            other => Err(format!("question type out of range: {other}")),
        }
    }
}

impl From<QuestionType> for u8 {
    fn from(value: QuestionType) -> Self {
        value.code()
    }
}

/// Raw vocabulary metadata for one lemma, as loaded from the bank file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabEntry {
    pub lemma: String,
    pub pos: PartOfSpeech,
    #[serde(default)]
    pub topic: String,
    pub cefr: CefrBand,
    pub curriculum: CurriculumBand,
    #[serde(default)]
    pub freq_rank: u32,
    #[serde(default)]
    pub meaning_ko: String,
    #[serde(default)]
    pub definition_en: String,
    #[serde(default)]
    pub gse: Option<f64>,
    #[serde(default)]
    pub lexile: Option<i32>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub antonyms: Vec<String>,
    #[serde(default)]
    pub hypernyms: Vec<String>,
    #[serde(default)]
    pub word_family: Vec<String>,
    #[serde(default)]
    pub collocations: Vec<String>,
    #[serde(default)]
    pub sentences: Vec<String>,
    #[serde(default)]
    pub is_core: bool,
    #[serde(default)]
    pub is_loanword: bool,
}

impl VocabEntry {
    /// Whether the raw metadata can carry this question type at all.
    pub fn supports(&self, qtype: QuestionType) -> bool {
        match qtype {
            QuestionType::KoreanMeaning => !self.meaning_ko.is_empty(),
            QuestionType::EnglishDefinition => !self.definition_en.is_empty(),
            QuestionType::Synonym => !self.synonyms.is_empty(),
            QuestionType::Antonym => !self.antonyms.is_empty(),
            QuestionType::Cloze => self
                .sentences
                .iter()
                .any(|s| s.to_lowercase().contains(&self.lemma.to_lowercase())),
            QuestionType::Collocation => !self.collocations.is_empty(),
        }
    }
}

/// IRT parameters held per item; `c` is a property of the rendering mode,
/// not the item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ItemParams {
    pub a: f64,
    pub b: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("failed to read vocabulary file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse vocabulary file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("vocabulary file contains no entries")]
    Empty,
}

/// Immutable in-memory index over the vocabulary bank.
#[derive(Debug, Clone)]
pub struct ItemBank {
    entries: Vec<VocabEntry>,
    params: Vec<ItemParams>,
    graph: WordGraph,
    renderable: Vec<u8>,
    by_topic: HashMap<String, Vec<u32>>,
    by_lemma: HashMap<String, u32>,
    version: u32,
    use_3pl: bool,
}

impl ItemBank {
    pub fn build(entries: Vec<VocabEntry>) -> Result<Self, BankError> {
        if entries.is_empty() {
            return Err(BankError::Empty);
        }
        let params = params::initialize(&entries);
        let graph = WordGraph::build(&entries);

        let mut by_topic: HashMap<String, Vec<u32>> = HashMap::new();
        let mut by_lemma = HashMap::new();
        for (id, entry) in entries.iter().enumerate() {
            let topic = primary_topic(&entry.topic);
            if !topic.is_empty() {
                by_topic.entry(topic.to_string()).or_default().push(id as u32);
            }
            by_lemma.insert(entry.lemma.to_lowercase(), id as u32);
        }

        let renderable = render::renderability(&entries, &graph);

        Ok(Self {
            entries,
            params,
            graph,
            renderable,
            by_topic,
            by_lemma,
            version: 1,
            use_3pl: false,
        })
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, BankError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<VocabEntry> = serde_json::from_str(&raw)?;
        Self::build(entries)
    }

    /// New bank version with replaced parameters; used by calibration
    /// swap-and-publish.
    pub fn with_params(&self, params: Vec<ItemParams>, use_3pl: bool) -> Self {
        let mut next = self.clone();
        debug_assert_eq!(params.len(), next.params.len());
        next.params = params;
        next.use_3pl = use_3pl;
        next.version += 1;
        next
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn uses_3pl(&self) -> bool {
        self.use_3pl
    }

    pub fn entry(&self, id: u32) -> Option<&VocabEntry> {
        self.entries.get(id as usize)
    }

    pub fn entries(&self) -> &[VocabEntry] {
        &self.entries
    }

    pub fn params(&self, id: u32) -> Option<ItemParams> {
        self.params.get(id as usize).copied()
    }

    pub fn all_params(&self) -> &[ItemParams] {
        &self.params
    }

    pub fn id_by_lemma(&self, lemma: &str) -> Option<u32> {
        self.by_lemma.get(&lemma.to_lowercase()).copied()
    }

    pub fn graph(&self) -> &WordGraph {
        &self.graph
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.by_topic.keys().map(String::as_str)
    }

    /// Effective difficulty of an item under a question type.
    pub fn effective_b(&self, id: u32, qtype: QuestionType) -> f64 {
        self.params[id as usize].b + qtype.b_offset()
    }

    /// Discrimination of an item under a question type. Transparent
    /// loanwords carry almost no signal on meaning-recognition types, so
    /// their slope is halved there.
    pub fn discrimination(&self, id: u32, qtype: QuestionType) -> f64 {
        let a = self.params[id as usize].a;
        let entry = &self.entries[id as usize];
        if entry.is_loanword
            && matches!(
                qtype,
                QuestionType::KoreanMeaning | QuestionType::EnglishDefinition
            )
        {
            a * 0.5
        } else {
            a
        }
    }

    /// Guessing floor under the current model. 0 until 3PL is activated.
    pub fn guessing(&self, qtype: QuestionType) -> f64 {
        if !self.use_3pl {
            return 0.0;
        }
        if qtype.is_binary() {
            0.40
        } else {
            0.20
        }
    }

    /// Whether the item can actually be rendered as this question type,
    /// i.e. it has the data and enough distractor material.
    pub fn renderable(&self, id: u32, qtype: QuestionType) -> bool {
        self.renderable[id as usize] & (1 << qtype.index()) != 0
    }

    pub fn renderable_any(&self, id: u32) -> bool {
        self.renderable[id as usize] != 0
    }

    /// Ids matching the filter, ascending.
    pub fn filtered(&self, filter: &ItemFilter<'_>) -> Vec<u32> {
        (0..self.entries.len() as u32)
            .filter(|&id| self.matches(id, filter))
            .collect()
    }

    pub fn matches(&self, id: u32, filter: &ItemFilter<'_>) -> bool {
        let entry = &self.entries[id as usize];
        if let Some(topic) = filter.topic {
            if primary_topic(&entry.topic) != topic {
                return false;
            }
        }
        if let Some(pos) = filter.pos {
            if entry.pos != pos {
                return false;
            }
        }
        if let Some(cefr) = filter.cefr {
            if entry.cefr != cefr {
                return false;
            }
        }
        if let Some(curriculum) = filter.curriculum {
            if entry.curriculum != curriculum {
                return false;
            }
        }
        if let Some(qtype) = filter.question_type {
            if !self.renderable(id, qtype) {
                return false;
            }
        }
        true
    }

    /// Top-`n` items by 2PL Fisher information at theta, subject to the
    /// filter. Ties break by ascending id for reproducibility.
    pub fn information_shortlist(
        &self,
        theta: f64,
        filter: &ItemFilter<'_>,
        n: usize,
    ) -> Vec<(u32, f64)> {
        let mut scored: Vec<(u32, f64)> = self
            .filtered(filter)
            .into_iter()
            .map(|id| {
                let p = self.params[id as usize];
                (id, irt::fisher_information(theta, p.a, p.b, 0.0))
            })
            .collect();
        scored.sort_by(|lhs, rhs| {
            rhs.1
                .partial_cmp(&lhs.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(lhs.0.cmp(&rhs.0))
        });
        scored.truncate(n);
        scored
    }

    /// Render an item into a concrete question. Deterministic for a given
    /// seed, so regeneration reproduces identical options.
    pub fn render(&self, id: u32, qtype: QuestionType, seed: u64) -> Option<render::RenderedItem> {
        render::render(self, id, qtype, seed)
    }

    /// Synthetic bank for tests and for running without a vocabulary file.
    pub fn synthetic(count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let topics = [
            "nature", "school", "science", "society", "emotion", "travel", "food", "art",
        ];
        let pos_cycle = [
            PartOfSpeech::Noun,
            PartOfSpeech::Noun,
            PartOfSpeech::Verb,
            PartOfSpeech::Adjective,
            PartOfSpeech::Adverb,
        ];
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let cefr = CefrBand::ALL[i % 5];
            let curriculum = CurriculumBand::ALL[i % 4];
            let pos = pos_cycle[i % pos_cycle.len()];
            let lemma = format!("word{i:04}");
            let neighbor = |offset: usize| format!("word{:04}", (i + offset * 5) % count);
            entries.push(VocabEntry {
                lemma: lemma.clone(),
                pos,
                topic: topics[i % topics.len()].to_string(),
                cefr,
                curriculum,
                freq_rank: i as u32 + 1,
                meaning_ko: format!("뜻-{i}"),
                definition_en: format!("definition of {lemma}"),
                gse: Some(20.0 + rng.gen_range(0.0..40.0)),
                lexile: Some(300 + (i % 9) as i32 * 100),
                synonyms: vec![neighbor(1), neighbor(2), neighbor(4)],
                antonyms: vec![neighbor(3)],
                hypernyms: vec![format!("group{:02}", i % 40)],
                word_family: vec![],
                collocations: vec![format!("{lemma} up"), format!("take {lemma}")],
                sentences: vec![format!("The {lemma} was exactly what we expected.")],
                is_core: cefr <= CefrBand::B1,
                is_loanword: i % 97 == 0,
            });
        }
        Self::build(entries).expect("synthetic bank is non-empty")
    }
}

/// First tag of a possibly comma- or pipe-delimited topic field.
pub fn primary_topic(raw: &str) -> &str {
    raw.split([',', '|']).next().unwrap_or("").trim()
}

#[derive(Debug, Default, Clone)]
pub struct ItemFilter<'a> {
    pub topic: Option<&'a str>,
    pub pos: Option<PartOfSpeech>,
    pub cefr: Option<CefrBand>,
    pub curriculum: Option<CurriculumBand>,
    pub question_type: Option<QuestionType>,
}
