//! Bayesian online recalibration of item parameters from archived responses.
//!
//! Runs offline (admin-triggered). Each item with enough responses gets a
//! MAP update of b then a; updates outside the guard bounds are logged as
//! anomalous and discarded. The caller publishes the resulting bank version
//! with a single swap.

use serde::Serialize;

use crate::irt;

use super::{ItemBank, ItemParams};

pub const DEFAULT_CALIBRATION_THRESHOLD: usize = 200;
pub const SESSIONS_FOR_3PL: u64 = 5000;

const B_GUARD: f64 = 0.5;
const A_GUARD: f64 = 0.3;
const B_PRIOR_SD: f64 = 0.5;
const A_PRIOR_SD: f64 = 0.3;
const B_BOUNDS: (f64, f64) = (-3.5, 3.5);
const A_BOUNDS: (f64, f64) = (0.2, 3.0);

/// One archived observation: the learner's ability estimate recorded at the
/// time of the response, and whether the response was correct.
#[derive(Debug, Clone, Copy)]
pub struct ResponseObs {
    pub theta: f64,
    pub correct: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemCalibration {
    pub item_id: u32,
    pub n_responses: usize,
    pub old_a: f64,
    pub old_b: f64,
    pub new_a: f64,
    pub new_b: f64,
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationSummary {
    pub items_considered: usize,
    pub items_updated: usize,
    pub items_rejected: usize,
    pub bank_version: u32,
    pub model: &'static str,
    pub updates: Vec<ItemCalibration>,
}

fn log_posterior_b(b: f64, prior_b: f64, a: f64, c: f64, obs: &[ResponseObs]) -> f64 {
    let z = (b - prior_b) / B_PRIOR_SD;
    -0.5 * z * z
        + obs
            .iter()
            .map(|o| irt::log_likelihood(o.theta, &[(a, b, c, o.correct)]))
            .sum::<f64>()
}

fn log_posterior_a(a: f64, prior_a: f64, b: f64, c: f64, obs: &[ResponseObs]) -> f64 {
    let z = (a - prior_a) / A_PRIOR_SD;
    -0.5 * z * z
        + obs
            .iter()
            .map(|o| irt::log_likelihood(o.theta, &[(a, b, c, o.correct)]))
            .sum::<f64>()
}

/// Bounded golden-section maximization, enough for these smooth unimodal
/// posteriors.
fn maximize(mut lo: f64, mut hi: f64, f: impl Fn(f64) -> f64) -> f64 {
    const PHI: f64 = 0.618_033_988_749_895;
    const TOL: f64 = 1e-4;

    let mut x1 = hi - PHI * (hi - lo);
    let mut x2 = lo + PHI * (hi - lo);
    let mut f1 = f(x1);
    let mut f2 = f(x2);

    while hi - lo > TOL {
        if f1 < f2 {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + PHI * (hi - lo);
            f2 = f(x2);
        } else {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - PHI * (hi - lo);
            f1 = f(x1);
        }
    }
    (lo + hi) / 2.0
}

/// MAP update of a single item. Returns the proposed parameters and whether
/// they pass the guard bounds.
pub fn calibrate_item(current: ItemParams, obs: &[ResponseObs], c: f64) -> (ItemParams, bool) {
    let new_b = maximize(B_BOUNDS.0, B_BOUNDS.1, |b| {
        log_posterior_b(b, current.b, current.a, c, obs)
    });
    let new_a = maximize(A_BOUNDS.0, A_BOUNDS.1, |a| {
        log_posterior_a(a, current.a, new_b, c, obs)
    });

    let accepted = (new_b - current.b).abs() <= B_GUARD && (new_a - current.a).abs() <= A_GUARD;
    (ItemParams { a: new_a, b: new_b }, accepted)
}

/// Recalibrate every item with at least `threshold` responses and produce the
/// next bank version. 3PL activates only once enough sessions have
/// accumulated; before that `c` stays at the rendering default of the 2PL
/// mode (zero).
pub fn recalibrate(
    bank: &ItemBank,
    grouped: &std::collections::HashMap<u32, Vec<ResponseObs>>,
    threshold: usize,
    total_sessions: u64,
) -> (ItemBank, CalibrationSummary) {
    let use_3pl = total_sessions >= SESSIONS_FOR_3PL;
    let mut params = bank.all_params().to_vec();
    let mut updates = Vec::new();
    let mut considered = 0;
    let mut updated = 0;
    let mut rejected = 0;

    for (&item_id, obs) in grouped {
        if obs.len() < threshold {
            continue;
        }
        let Some(current) = bank.params(item_id) else {
            continue;
        };
        considered += 1;

        let (proposed, accepted) = calibrate_item(current, obs, 0.0);
        if accepted {
            params[item_id as usize] = proposed;
            updated += 1;
        } else {
            rejected += 1;
            tracing::warn!(
                item_id,
                old_a = current.a,
                old_b = current.b,
                new_a = proposed.a,
                new_b = proposed.b,
                "anomalous calibration update rejected"
            );
        }
        updates.push(ItemCalibration {
            item_id,
            n_responses: obs.len(),
            old_a: current.a,
            old_b: current.b,
            new_a: proposed.a,
            new_b: proposed.b,
            accepted,
        });
    }

    updates.sort_by_key(|u| u.item_id);
    let next = bank.with_params(params, use_3pl);
    let summary = CalibrationSummary {
        items_considered: considered,
        items_updated: updated,
        items_rejected: rejected,
        bank_version: next.version(),
        model: if use_3pl { "3PL" } else { "2PL" },
        updates,
    };
    (next, summary)
}
