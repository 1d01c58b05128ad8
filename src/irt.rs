//! IRT math kernel: 2PL/3PL response probability, Fisher information,
//! log-likelihood, and EAP ability estimation on a fixed quadrature grid.

pub const QUAD_POINTS: usize = 41;
pub const QUAD_RANGE: (f64, f64) = (-4.0, 4.0);
pub const THETA_PRIOR_MEAN: f64 = 0.0;
pub const THETA_PRIOR_SD: f64 = 1.0;

pub const A_MIN: f64 = 0.3;
pub const A_MAX: f64 = 3.0;
pub const B_MIN: f64 = -4.0;
pub const B_MAX: f64 = 4.0;
pub const C_MAX: f64 = 0.4;

const P_EPS: f64 = 1e-10;

/// Grid spacing of the quadrature: (4 - (-4)) / 40.
pub fn grid_step() -> f64 {
    (QUAD_RANGE.1 - QUAD_RANGE.0) / (QUAD_POINTS - 1) as f64
}

/// The theta value of quadrature node `j`.
pub fn grid_point(j: usize) -> f64 {
    QUAD_RANGE.0 + grid_step() * j as f64
}

/// P(correct | theta) under the 3PL model; c = 0 gives 2PL.
///
/// The exponent is computed once and branched on sign so neither tail
/// overflows.
pub fn probability(theta: f64, a: f64, b: f64, c: f64) -> f64 {
    let a = a.clamp(A_MIN, A_MAX);
    let b = b.clamp(B_MIN, B_MAX);
    let c = c.clamp(0.0, C_MAX);

    let exponent = a * (theta - b);
    let sigma = if exponent >= 0.0 {
        1.0 / (1.0 + (-exponent).exp())
    } else {
        let e = exponent.exp();
        e / (1.0 + e)
    };
    c + (1.0 - c) * sigma
}

/// Fisher information of an item at theta.
///
/// 2PL: a^2 * P * (1 - P). 3PL: a^2 * (P - c)^2 * (1 - P) / ((1 - c)^2 * P),
/// which is 0 in the limit P -> 0.
pub fn fisher_information(theta: f64, a: f64, b: f64, c: f64) -> f64 {
    let a = a.clamp(A_MIN, A_MAX);
    let p = probability(theta, a, b, c);
    let q = 1.0 - p;

    if c <= 0.0 {
        return a * a * p * q;
    }
    if p < P_EPS {
        return 0.0;
    }
    let one_minus_c = 1.0 - c;
    a * a * (p - c) * (p - c) * q / (one_minus_c * one_minus_c * p)
}

/// Log-likelihood of a response pattern at theta.
///
/// Items are given as (a, b, c, correct). P is clamped away from 0/1 and the
/// incorrect branch uses ln_1p(-p) so the tails do not underflow.
pub fn log_likelihood(theta: f64, pattern: &[(f64, f64, f64, bool)]) -> f64 {
    let mut ll = 0.0;
    for &(a, b, c, correct) in pattern {
        let p = probability(theta, a, b, c).clamp(P_EPS, 1.0 - P_EPS);
        if correct {
            ll += p.ln();
        } else {
            ll += (-p).ln_1p();
        }
    }
    ll
}

/// Discrete posterior over theta on the fixed quadrature grid.
///
/// Starts as the N(0, 1) prior and is updated in place after each response.
/// The update is not commutative-safe across interleavings, which is why the
/// owning session serializes its handlers.
#[derive(Debug, Clone)]
pub struct Posterior {
    weights: [f64; QUAD_POINTS],
}

impl Posterior {
    pub fn new_prior() -> Self {
        let mut weights = [0.0; QUAD_POINTS];
        for (j, w) in weights.iter_mut().enumerate() {
            let z = (grid_point(j) - THETA_PRIOR_MEAN) / THETA_PRIOR_SD;
            *w = (-0.5 * z * z).exp();
        }
        let mut posterior = Self { weights };
        posterior
            .renormalize()
            .expect("standard normal prior is normalizable");
        posterior
    }

    /// Bayes update with one response on an item (a, b, c).
    ///
    /// Returns Err when the posterior mass collapses below the normalizable
    /// floor, which the caller must treat as an invariant violation.
    pub fn update(&mut self, a: f64, b: f64, c: f64, correct: bool) -> Result<(), PosteriorError> {
        for (j, w) in self.weights.iter_mut().enumerate() {
            let p = probability(grid_point(j), a, b, c).clamp(P_EPS, 1.0 - P_EPS);
            *w *= if correct { p } else { 1.0 - p };
        }
        self.renormalize()
    }

    fn renormalize(&mut self) -> Result<(), PosteriorError> {
        let total: f64 = self.weights.iter().sum::<f64>() * grid_step();
        if !total.is_finite() || total < 1e-300 {
            return Err(PosteriorError::Degenerate);
        }
        for w in &mut self.weights {
            *w /= total;
        }
        Ok(())
    }

    /// EAP point estimate: the posterior mean.
    pub fn theta_hat(&self) -> f64 {
        let step = grid_step();
        self.weights
            .iter()
            .enumerate()
            .map(|(j, w)| grid_point(j) * w * step)
            .sum()
    }

    /// Posterior standard deviation of theta.
    pub fn se(&self) -> f64 {
        let theta = self.theta_hat();
        let step = grid_step();
        let variance: f64 = self
            .weights
            .iter()
            .enumerate()
            .map(|(j, w)| {
                let d = grid_point(j) - theta;
                d * d * w * step
            })
            .sum();
        variance.max(P_EPS).sqrt()
    }

    /// Total posterior mass; 1.0 up to floating error after renormalization.
    pub fn total_mass(&self) -> f64 {
        self.weights.iter().sum::<f64>() * grid_step()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PosteriorError {
    #[error("posterior mass is not normalizable")]
    Degenerate,
}

/// Reliability of the estimate, floored at zero.
pub fn reliability(se: f64) -> f64 {
    (1.0 - se * se).max(0.0)
}
