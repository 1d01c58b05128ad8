//! The CAT session state machine.
//!
//! A session moves `Initialized -> InProgress -> Terminated` and is only
//! ever mutated by its owning handler while the per-session lock is held,
//! because posterior updates do not commute.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bank::render::RenderedItem;
use crate::bank::{primary_topic, ItemBank, PartOfSpeech, QuestionType};
use crate::irt::{Posterior, PosteriorError};

use super::exposure::ExposureController;
use super::selector::{self, SelectionInputs};
use super::stopping::{StoppingRules, TerminationReason};

/// Learner profile captured at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub grade: String,
    pub self_assess: String,
    pub exam_experience: String,
    /// None means mixed mode: the selector assigns a type per item.
    pub preferred_type: Option<QuestionType>,
}

/// Profile-derived starting estimate, a small bias clamped to [-1, +1]
/// around the neutral prior.
pub fn initial_theta(profile: &Profile) -> f64 {
    let grade: f64 = match profile.grade.as_str() {
        "초3-4" => -2.0,
        "초5-6" => -1.2,
        "중1" => -0.5,
        "중2" => 0.0,
        "중3" => 0.3,
        "고1" => 0.5,
        "고2" => 0.8,
        "고3" => 1.0,
        "대학" => 1.2,
        "성인" => 0.5,
        _ => 0.0,
    };
    let assess = match profile.self_assess.as_str() {
        "beginner" => -0.5,
        "advanced" => 0.5,
        _ => 0.0,
    };
    let exam = match profile.exam_experience.as_str() {
        "none" => -0.3,
        "수능" => 0.2,
        "TOEIC" => 0.3,
        "TOEFL" => 0.5,
        _ => 0.0,
    };
    (grade + assess + exam).clamp(-1.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialized,
    InProgress,
    Terminated,
}

/// The last issued item with the parameters it was issued under.
#[derive(Debug, Clone, Copy)]
struct PendingItem {
    item_id: u32,
    question_type: QuestionType,
    a: f64,
    b: f64,
    c: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseRecord {
    pub item_id: u32,
    pub question_type: QuestionType,
    pub is_correct: bool,
    pub is_dont_know: bool,
    pub response_time_ms: i64,
    pub theta_after: f64,
    pub se_after: f64,
    pub sequence: u32,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub items_completed: usize,
    pub total_correct: usize,
    pub accuracy: f64,
    pub current_theta: f64,
    pub current_se: f64,
    pub is_complete: bool,
}

#[derive(Debug)]
pub struct SubmitOutcome {
    pub progress: Progress,
    pub next_item: Option<RenderedItem>,
    pub terminated: Option<TerminationReason>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is already terminated")]
    AlreadyTerminated,
    #[error("item {item_id} was already answered in this session")]
    DuplicateResponse {
        item_id: u32,
        committed: Box<ResponseRecord>,
    },
    #[error("item {item_id} is not the last issued item")]
    NotLastIssued { item_id: u32 },
    #[error("no eligible item remains in the pool")]
    PoolExhausted,
    #[error("item could not be rendered")]
    RenderFailed { item_id: u32 },
    #[error("posterior invariant violated: {0}")]
    Invariant(#[from] PosteriorError),
}

#[derive(Debug)]
pub struct CatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    profile: Profile,
    posterior: Posterior,
    initial_theta: f64,
    administered: Vec<u32>,
    administered_set: HashSet<u32>,
    responses: Vec<ResponseRecord>,
    theta_history: Vec<f64>,
    topic_counts: HashMap<String, u32>,
    pos_counts: [u32; PartOfSpeech::COUNT],
    type_counts: [u32; 6],
    pending: Option<PendingItem>,
    rng: StdRng,
    seed: u64,
    stopping: StoppingRules,
    phase: Phase,
    termination_reason: Option<TerminationReason>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl CatSession {
    pub fn new(id: Uuid, user_id: Uuid, profile: Profile) -> Self {
        let seed = seed_from_id(&id);
        let theta0 = initial_theta(&profile);
        let now = Utc::now();
        Self {
            id,
            user_id,
            profile,
            posterior: Posterior::new_prior(),
            initial_theta: theta0,
            administered: Vec::new(),
            administered_set: HashSet::new(),
            responses: Vec::new(),
            theta_history: vec![theta0],
            topic_counts: HashMap::new(),
            pos_counts: [0; PartOfSpeech::COUNT],
            type_counts: [0; 6],
            pending: None,
            rng: StdRng::seed_from_u64(seed),
            seed,
            stopping: StoppingRules::default(),
            phase: Phase::Initialized,
            termination_reason: None,
            started_at: now,
            last_activity: now,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn initial_theta(&self) -> f64 {
        self.initial_theta
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.termination_reason
    }

    pub fn responses(&self) -> &[ResponseRecord] {
        &self.responses
    }

    pub fn administered(&self) -> &[u32] {
        &self.administered
    }

    pub fn theta(&self) -> f64 {
        if self.responses.is_empty() {
            self.initial_theta
        } else {
            self.posterior.theta_hat()
        }
    }

    pub fn se(&self) -> f64 {
        self.posterior.se()
    }

    pub fn posterior_mass(&self) -> f64 {
        self.posterior.total_mass()
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn progress(&self) -> Progress {
        let total = self.responses.len();
        let correct = self.responses.iter().filter(|r| r.is_correct).count();
        Progress {
            items_completed: total,
            total_correct: correct,
            accuracy: if total == 0 {
                0.0
            } else {
                correct as f64 / total as f64
            },
            current_theta: self.theta(),
            current_se: self.se(),
            is_complete: self.phase == Phase::Terminated,
        }
    }

    /// Deterministic render seed for an item within this session.
    pub fn render_seed(&self, item_id: u32) -> u64 {
        self.seed ^ (item_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    /// First selection; moves the session into `InProgress`.
    pub fn begin(
        &mut self,
        bank: &ItemBank,
        exposure: &ExposureController,
    ) -> Result<RenderedItem, SessionError> {
        if self.phase == Phase::Terminated {
            return Err(SessionError::AlreadyTerminated);
        }
        let rendered = self.issue_next(bank, exposure)?;
        self.phase = Phase::InProgress;
        self.touch();
        Ok(rendered)
    }

    /// Record a response, update the posterior, and either issue the next
    /// item or terminate. All state mutation happens before this returns so
    /// the handler commits exactly one batch.
    pub fn submit(
        &mut self,
        bank: &ItemBank,
        exposure: &ExposureController,
        item_id: u32,
        is_correct: bool,
        is_dont_know: bool,
        response_time_ms: i64,
    ) -> Result<SubmitOutcome, SessionError> {
        if self.phase == Phase::Terminated {
            return Err(SessionError::AlreadyTerminated);
        }
        if self.administered_set.contains(&item_id) {
            let committed = self
                .responses
                .iter()
                .find(|r| r.item_id == item_id)
                .cloned()
                .expect("administered item has a committed response");
            return Err(SessionError::DuplicateResponse {
                item_id,
                committed: Box::new(committed),
            });
        }
        let pending = match self.pending {
            Some(pending) if pending.item_id == item_id => pending,
            _ => return Err(SessionError::NotLastIssued { item_id }),
        };

        // "Don't know" scores as incorrect for theta but removes the
        // guessing floor from that likelihood term.
        let counted_correct = is_correct && !is_dont_know;
        let c = if is_dont_know { 0.0 } else { pending.c };
        if let Err(err) = self
            .posterior
            .update(pending.a, pending.b, c, counted_correct)
        {
            self.phase = Phase::Terminated;
            self.termination_reason = Some(TerminationReason::Corrupted);
            self.pending = None;
            return Err(SessionError::Invariant(err));
        }

        self.pending = None;
        self.administered.push(item_id);
        self.administered_set.insert(item_id);
        if let Some(entry) = bank.entry(item_id) {
            let topic = primary_topic(&entry.topic);
            if !topic.is_empty() {
                *self.topic_counts.entry(topic.to_string()).or_insert(0) += 1;
            }
            self.pos_counts[entry.pos.slot()] += 1;
        }
        self.type_counts[pending.question_type.index()] += 1;

        let theta_after = self.posterior.theta_hat();
        let se_after = self.posterior.se();
        self.theta_history.push(theta_after);
        self.responses.push(ResponseRecord {
            item_id,
            question_type: pending.question_type,
            is_correct: counted_correct,
            is_dont_know,
            response_time_ms,
            theta_after,
            se_after,
            sequence: self.responses.len() as u32 + 1,
            answered_at: Utc::now(),
        });
        self.touch();

        if let Some(reason) =
            self.stopping
                .evaluate(self.responses.len(), se_after, &self.theta_history)
        {
            self.terminate(reason);
            return Ok(SubmitOutcome {
                progress: self.progress(),
                next_item: None,
                terminated: Some(reason),
            });
        }

        match self.issue_next(bank, exposure) {
            Ok(rendered) => Ok(SubmitOutcome {
                progress: self.progress(),
                next_item: Some(rendered),
                terminated: None,
            }),
            Err(SessionError::PoolExhausted) => {
                self.terminate(TerminationReason::PoolExhausted);
                Ok(SubmitOutcome {
                    progress: self.progress(),
                    next_item: None,
                    terminated: Some(TerminationReason::PoolExhausted),
                })
            }
            Err(other) => Err(other),
        }
    }

    /// TTL expiry; a no-op when the session already terminated.
    pub fn expire(&mut self) {
        if self.phase != Phase::Terminated {
            self.terminate(TerminationReason::Expired);
        }
    }

    fn terminate(&mut self, reason: TerminationReason) {
        self.phase = Phase::Terminated;
        self.termination_reason = Some(reason);
        self.pending = None;
    }

    fn issue_next(
        &mut self,
        bank: &ItemBank,
        exposure: &ExposureController,
    ) -> Result<RenderedItem, SessionError> {
        let theta = self.theta();
        let inputs = SelectionInputs {
            theta,
            administered: &self.administered_set,
            topic_counts: &self.topic_counts,
            pos_counts: &self.pos_counts,
            items_completed: self.responses.len(),
            preferred_type: self.profile.preferred_type,
        };
        let selected = selector::select_next(bank, exposure, &inputs, &mut self.rng)
            .ok_or(SessionError::PoolExhausted)?;

        let seed = self.render_seed(selected.item_id);
        let rendered = bank
            .render(selected.item_id, selected.question_type, seed)
            .or_else(|| {
                // Renderability said yes but generation came up short; fall
                // back to any type the item can carry.
                QuestionType::ALL
                    .into_iter()
                    .filter(|&qtype| bank.renderable(selected.item_id, qtype))
                    .find_map(|qtype| bank.render(selected.item_id, qtype, seed))
            })
            .ok_or(SessionError::RenderFailed {
                item_id: selected.item_id,
            })?;

        // The rendered type is authoritative (loanwords can be redirected),
        // so the pending parameters follow it.
        let actual_type = rendered.question_type;
        self.pending = Some(PendingItem {
            item_id: selected.item_id,
            question_type: actual_type,
            a: bank.discrimination(selected.item_id, actual_type),
            b: bank.effective_b(selected.item_id, actual_type),
            c: bank.guessing(actual_type),
        });
        exposure.record_administration(selected.item_id);
        Ok(rendered)
    }

    /// Rebuild the posterior by replaying archived responses through the
    /// estimator; used by the read side after in-memory eviction.
    pub fn replay_posterior(
        bank: &ItemBank,
        records: &[(u32, QuestionType, bool, bool)],
    ) -> Result<Posterior, PosteriorError> {
        let mut posterior = Posterior::new_prior();
        for &(item_id, qtype, is_correct, is_dont_know) in records {
            let a = bank.discrimination(item_id, qtype);
            let b = bank.effective_b(item_id, qtype);
            let c = if is_dont_know { 0.0 } else { bank.guessing(qtype) };
            posterior.update(a, b, c, is_correct && !is_dont_know)?;
        }
        Ok(posterior)
    }
}

fn seed_from_id(id: &Uuid) -> u64 {
    let bytes = id.as_bytes();
    u64::from_le_bytes(bytes[..8].try_into().expect("uuid has 16 bytes"))
}
