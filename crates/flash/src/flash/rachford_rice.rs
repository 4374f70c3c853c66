//! Material balance for given equilibrium ratios.
//!
//! Phase fractions are measured against a reference phase: for `m` other
//! phases with ratios `K_k`, `t_i = 1 + Σ_k β_k (K_ik − 1)`, the reference
//! composition is `z_i/t_i` and phase `k` holds `K_ik z_i/t_i`.

use std::convert::Infallible;

use nalgebra::{DMatrix, DVector};
use tpflash_core::{EquationProblem, Model};
use tpflash_solvers::equation::bisection;
use tracing::debug;

const BISECTION_MAX_ITERS: usize = 200;
const BISECTION_TOL: f64 = 1e-15;
const NEWTON_MAX_ITERS: usize = 100;
const GRADIENT_TOL: f64 = 1e-14;
const MAX_BACKTRACKS: usize = 40;

/// Outcome of the two-phase solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TwoPhase {
    /// Fraction of the non-reference phase, strictly inside `(0, 1)`.
    Split(f64),
    /// Every mole stays in the reference phase (`β ≤ 0`).
    AllReference,
    /// Every mole moves to the other phase (`β ≥ 1`).
    AllOther,
}

/// `Σ z_i (K_i − 1) / (1 + β(K_i − 1))`, decreasing in `β`.
pub(crate) fn residual(feed: &[f64], k: &[f64], beta: f64) -> f64 {
    feed.iter()
        .zip(k)
        .map(|(z, k)| z * (k - 1.0) / ((1.0 - beta) + beta * k))
        .sum()
}

struct RachfordRice<'a> {
    feed: &'a [f64],
    k: &'a [f64],
}

impl Model for RachfordRice<'_> {
    type Input = f64;
    type Output = f64;
    type Error = Infallible;

    fn call(&self, beta: &f64) -> Result<f64, Infallible> {
        Ok(residual(self.feed, self.k, *beta))
    }
}

struct PhaseFraction;

impl EquationProblem<1> for PhaseFraction {
    type Input = f64;
    type Output = f64;
    type Error = Infallible;

    fn input(&self, x: &[f64; 1]) -> Result<f64, Infallible> {
        Ok(x[0])
    }

    fn residuals(&self, _beta: &f64, sum: &f64) -> Result<[f64; 1], Infallible> {
        Ok([*sum])
    }
}

/// Solves the two-phase equation for `β ∈ [0, 1]` by bisection.
pub(crate) fn solve_two_phase(feed: &[f64], k: &[f64]) -> TwoPhase {
    if residual(feed, k, 0.0) <= 0.0 {
        return TwoPhase::AllReference;
    }
    if residual(feed, k, 1.0) >= 0.0 {
        return TwoPhase::AllOther;
    }

    let config = bisection::Config::new(BISECTION_MAX_ITERS, BISECTION_TOL, 0.0, BISECTION_TOL)
        .unwrap_or_default();
    let model = RachfordRice { feed, k };

    match bisection::solve_unobserved(&model, &PhaseFraction, [0.0, 1.0], &config) {
        Ok(solution) => TwoPhase::Split(solution.x.clamp(0.0, 1.0)),
        Err(error) => {
            debug!(%error, "rachford-rice bisection failed, using midpoint sign");
            if residual(feed, k, 0.5) > 0.0 {
                TwoPhase::AllOther
            } else {
                TwoPhase::AllReference
            }
        }
    }
}

/// Solution of the multiphase problem.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Multiphase {
    /// Fractions of the non-reference phases.
    pub fractions: Vec<f64>,
    /// `∂F/∂β_k` at the solution.
    pub gradient: Vec<f64>,
}

impl Multiphase {
    /// Non-reference phases pinned at zero that would shrink further.
    pub fn vanished(&self) -> Vec<usize> {
        self.fractions
            .iter()
            .zip(&self.gradient)
            .enumerate()
            .filter(|(_, (beta, g))| **beta <= 0.0 && **g > 0.0)
            .map(|(k, _)| k)
            .collect()
    }
}

/// Minimizes the convex function `F(β) = −Σ z_i ln t_i` with Newton steps.
///
/// Every iterate keeps `t_i > 0`, `β_k ≥ 0` and `Σ β_k < 1`. Phases pinned at
/// their lower bound are held fixed while the gradient pushes them outward.
pub(crate) fn solve_multiphase(feed: &[f64], k: &[Vec<f64>], start: &[f64]) -> Multiphase {
    let m = k.len();
    let t_of = |beta: &[f64]| -> Vec<f64> {
        feed.iter()
            .enumerate()
            .map(|(i, _)| 1.0 + (0..m).map(|p| beta[p] * (k[p][i] - 1.0)).sum::<f64>())
            .collect()
    };
    let objective = |beta: &[f64]| -> f64 {
        let t = t_of(beta);
        if t.iter().any(|ti| *ti <= 0.0) {
            return f64::INFINITY;
        }
        -feed.iter().zip(&t).map(|(z, ti)| z * ti.ln()).sum::<f64>()
    };
    let gradient_of = |t: &[f64]| -> Vec<f64> {
        (0..m)
            .map(|p| {
                -feed
                    .iter()
                    .zip(t)
                    .enumerate()
                    .map(|(i, (z, ti))| z * (k[p][i] - 1.0) / ti)
                    .sum::<f64>()
            })
            .collect()
    };

    let feasible = start.len() == m
        && start.iter().all(|b| *b >= 0.0)
        && start.iter().sum::<f64>() < 1.0
        && objective(start).is_finite();
    let mut beta = if feasible { start.to_vec() } else { vec![0.0; m] };

    for _ in 0..NEWTON_MAX_ITERS {
        let t = t_of(&beta);
        let gradient = gradient_of(&t);

        let free: Vec<usize> = (0..m)
            .filter(|&p| !(beta[p] <= 0.0 && gradient[p] > 0.0))
            .collect();
        if free.is_empty() || free.iter().all(|&p| gradient[p].abs() < GRADIENT_TOL) {
            break;
        }

        let hessian = DMatrix::from_fn(free.len(), free.len(), |a, b| {
            let (p, q) = (free[a], free[b]);
            feed.iter()
                .zip(&t)
                .enumerate()
                .map(|(i, (z, ti))| z * (k[p][i] - 1.0) * (k[q][i] - 1.0) / (ti * ti))
                .sum()
        });
        let rhs = DVector::from_iterator(free.len(), free.iter().map(|&p| -gradient[p]));
        let descent = |d: &DVector<f64>| {
            d.iter().zip(free.iter()).map(|(dp, &p)| dp * gradient[p]).sum::<f64>() < 0.0
        };
        let reduced = match hessian.lu().solve(&rhs) {
            Some(d) if descent(&d) => d,
            _ => rhs,
        };

        let mut direction = vec![0.0; m];
        for (a, &p) in free.iter().enumerate() {
            direction[p] = reduced[a];
        }

        let mut alpha: f64 = 1.0;
        let mut pinned = None;
        for p in 0..m {
            if direction[p] < 0.0 {
                let limit = beta[p] / -direction[p];
                if limit < alpha {
                    alpha = limit;
                    pinned = Some(p);
                }
            }
        }
        let total: f64 = direction.iter().sum();
        if total > 0.0 {
            let limit = 0.999 * (1.0 - beta.iter().sum::<f64>()) / total;
            if limit < alpha {
                alpha = limit;
                pinned = None;
            }
        }
        for (i, ti) in t.iter().enumerate() {
            let slope: f64 = (0..m).map(|p| direction[p] * (k[p][i] - 1.0)).sum();
            if slope < 0.0 {
                let limit = 0.9 * ti / -slope;
                if limit < alpha {
                    alpha = limit;
                    pinned = None;
                }
            }
        }

        let step_to = |alpha: f64, pinned: Option<usize>| -> Vec<f64> {
            let mut next: Vec<f64> = beta
                .iter()
                .zip(&direction)
                .map(|(b, d)| (b + alpha * d).max(0.0))
                .collect();
            if let Some(p) = pinned {
                next[p] = 0.0;
            }
            next
        };

        let f0 = objective(&beta);
        let mut next = step_to(alpha, pinned);
        let mut backtracks = 0;
        while objective(&next) > f0 && backtracks < MAX_BACKTRACKS {
            alpha *= 0.5;
            backtracks += 1;
            next = step_to(alpha, None);
        }

        let change = beta
            .iter()
            .zip(&next)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        beta = next;
        if change < 1e-16 {
            break;
        }
    }

    let gradient = gradient_of(&t_of(&beta));
    Multiphase {
        fractions: beta,
        gradient,
    }
}

/// Compositions for every phase: the reference first, then the others in
/// the order of `k`. Each composition is normalized.
pub(crate) fn compositions(feed: &[f64], k: &[Vec<f64>], fractions: &[f64]) -> Vec<Vec<f64>> {
    let reference: Vec<f64> = feed
        .iter()
        .enumerate()
        .map(|(i, z)| {
            let t = (1.0 - fractions.iter().sum::<f64>())
                + fractions
                    .iter()
                    .zip(k)
                    .map(|(beta, kp)| beta * kp[i])
                    .sum::<f64>();
            z / t
        })
        .collect();

    let mut all = Vec::with_capacity(k.len() + 1);
    for kp in k {
        let x: Vec<f64> = reference.iter().zip(kp).map(|(x, k)| x * k).collect();
        all.push(normalize(x));
    }
    all.insert(0, normalize(reference));
    all
}

fn normalize(mut x: Vec<f64>) -> Vec<f64> {
    let total: f64 = x.iter().sum();
    if total > 0.0 {
        for v in &mut x {
            *v /= total;
        }
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn two_phase_root_zeroes_the_residual() {
        let feed = [0.5, 0.3, 0.2];
        let k = [3.0, 0.8, 0.1];
        let TwoPhase::Split(beta) = solve_two_phase(&feed, &k) else {
            panic!("expected a split");
        };
        assert!(beta > 0.0 && beta < 1.0);
        assert_relative_eq!(residual(&feed, &k, beta), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn two_phase_detects_single_phase_limits() {
        assert_eq!(solve_two_phase(&[0.5, 0.5], &[0.9, 0.5]), TwoPhase::AllReference);
        assert_eq!(solve_two_phase(&[0.5, 0.5], &[3.0, 1.1]), TwoPhase::AllOther);
    }

    #[test]
    fn two_phase_handles_extreme_ratios() {
        let feed = [0.5, 0.5];
        let k = [1e200, 1e-200];
        let TwoPhase::Split(beta) = solve_two_phase(&feed, &k) else {
            panic!("expected a split");
        };
        assert_relative_eq!(beta, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn multiphase_reduces_to_two_phase() {
        let feed = [0.5, 0.3, 0.2];
        let k = vec![vec![3.0, 0.8, 0.1]];
        let solution = solve_multiphase(&feed, &k, &[0.0]);
        let TwoPhase::Split(beta) = solve_two_phase(&feed, &k[0]) else {
            panic!("expected a split");
        };
        assert_relative_eq!(solution.fractions[0], beta, epsilon = 1e-10);
        assert!(solution.vanished().is_empty());
    }

    #[test]
    fn multiphase_three_phase_balance() {
        // Reference liquid, vapor with light species, aqueous with water.
        let feed = [0.3, 0.4, 0.3];
        let k = vec![vec![0.02, 20.0, 0.05], vec![50.0, 1e-3, 1e-4]];
        let solution = solve_multiphase(&feed, &k, &[0.0, 0.0]);
        assert!(solution.fractions.iter().all(|b| *b > 0.0));
        for g in &solution.gradient {
            assert_relative_eq!(*g, 0.0, epsilon = 1e-10);
        }

        let x = compositions(&feed, &k, &solution.fractions);
        let beta_ref = 1.0 - solution.fractions.iter().sum::<f64>();
        for i in 0..3 {
            let total = beta_ref * x[0][i]
                + solution.fractions[0] * x[1][i]
                + solution.fractions[1] * x[2][i];
            assert_relative_eq!(total, feed[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn multiphase_removes_a_phase_that_cannot_exist() {
        let feed = [0.5, 0.5];
        let k = vec![vec![4.0, 0.25], vec![1.0, 1.0 - 1e-3]];
        let solution = solve_multiphase(&feed, &k, &[0.2, 0.2]);
        assert_eq!(solution.vanished(), vec![1]);
        assert!(solution.fractions[0] > 0.0);
    }

    proptest! {
        #[test]
        fn rachford_rice_is_monotonic(
            k in prop::collection::vec(0.01f64..100.0, 2..8),
            a in 0.0f64..1.0,
            b in 0.0f64..1.0,
        ) {
            let n = k.len();
            let feed = vec![1.0 / n as f64; n];
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            prop_assert!(residual(&feed, &k, lo) >= residual(&feed, &k, hi) - 1e-12);
        }

        #[test]
        fn two_phase_split_conserves_material(
            k in prop::collection::vec(0.01f64..100.0, 2..8),
            weights in prop::collection::vec(0.05f64..1.0, 8),
        ) {
            let n = k.len();
            let total: f64 = weights[..n].iter().sum();
            let feed: Vec<f64> = weights[..n].iter().map(|w| w / total).collect();

            if let TwoPhase::Split(beta) = solve_two_phase(&feed, &k) {
                let x = compositions(&feed, &[k.clone()], &[beta]);
                for i in 0..n {
                    let balance = (1.0 - beta) * x[0][i] + beta * x[1][i];
                    prop_assert!((balance - feed[i]).abs() < 1e-8);
                }
                prop_assert!((x[0].iter().sum::<f64>() - 1.0).abs() < 1e-12);
            }
        }
    }
}
