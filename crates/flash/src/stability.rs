//! Michelsen tangent-plane-distance stability test.
//!
//! A phase of composition `z` is stable when no trial composition `w` lowers
//! the Gibbs energy, which is checked by locating stationary points of the
//! modified tangent plane distance
//! `tm(W) = 1 + Σ W_i (ln W_i + ln φ_i(w) − d_i − 1)`, `d_i = ln z_i + ln φ_i(z)`.

use tracing::trace;

use crate::{
    conditions::Conditions,
    config::FlashConfig,
    eos::{CubicEos, EosError, EosPhase, RootSelection, StatePoint, wilson_k_values},
    error::FlashError,
    mixture::Mixture,
    registry::Species,
};

const CONVERGENCE: f64 = 1e-10;
const TRIVIAL: f64 = 1e-4;
const PURE_WEIGHT: f64 = 0.999;

/// How a trial phase finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    /// Reached a stationary point distinct from the tested phase.
    Converged,
    /// Collapsed onto the tested phase composition.
    Trivial,
    /// Ran out of iterations or produced non-finite values.
    Inconclusive,
}

/// Result of one stability trial.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    /// Normalized trial composition at the last iterate.
    pub composition: Vec<f64>,
    /// Unnormalized trial amounts `W` at the last iterate.
    pub amounts: Vec<f64>,
    /// Modified tangent plane distance at the last iterate.
    pub tpd: f64,
    pub outcome: TrialOutcome,
    pub iterations: usize,
}

impl Trial {
    /// Whether this trial indicates the tested phase should split.
    ///
    /// Inconclusive trials count as unstable.
    #[must_use]
    pub fn signals_instability(&self, tolerance: f64) -> bool {
        match self.outcome {
            TrialOutcome::Converged => self.tpd < -tolerance,
            TrialOutcome::Trivial => false,
            TrialOutcome::Inconclusive => true,
        }
    }
}

/// Outcome of a stability analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityReport {
    pub stable: bool,
    pub trials: Vec<Trial>,
    tolerance: f64,
}

impl StabilityReport {
    /// Trials that signal instability, most negative TPD first.
    #[must_use]
    pub fn unstable_trials(&self) -> Vec<&Trial> {
        let mut unstable: Vec<&Trial> = self
            .trials
            .iter()
            .filter(|t| t.signals_instability(self.tolerance))
            .collect();
        unstable.sort_by(|a, b| a.tpd.total_cmp(&b.tpd));
        unstable
    }

    /// The trial with the most negative TPD, if any trial is unstable.
    #[must_use]
    pub fn most_unstable(&self) -> Option<&Trial> {
        self.unstable_trials().into_iter().next()
    }
}

/// Runs tangent-plane trials against phases of one mixture.
#[derive(Debug, Clone)]
pub struct StabilityAnalyzer<'a> {
    species: &'a [Species],
    tolerance: f64,
    max_iterations: usize,
}

impl<'a> StabilityAnalyzer<'a> {
    #[must_use]
    pub fn new(mixture: &'a Mixture, config: &FlashConfig) -> Self {
        Self {
            species: mixture.components(),
            tolerance: config.stability_tolerance,
            max_iterations: config.stability_max_iterations,
        }
    }

    /// Tests a feed composition, evaluated on its minimum-Gibbs root.
    ///
    /// # Errors
    ///
    /// Returns an [`EosError`] if the feed itself cannot be evaluated.
    pub fn is_stable(
        &self,
        state: &StatePoint<'_>,
        feed: &[f64],
    ) -> Result<StabilityReport, EosError> {
        let phase = state.evaluate(feed, RootSelection::MinimumGibbs)?;
        Ok(self.test_phase(state, &phase))
    }

    /// Tests an already evaluated phase.
    ///
    /// Trials whose own evaluation fails are reported as inconclusive.
    #[must_use]
    pub fn test_phase(&self, state: &StatePoint<'_>, phase: &EosPhase) -> StabilityReport {
        let z = &phase.composition;
        let d: Vec<f64> = z
            .iter()
            .zip(&phase.ln_phi)
            .map(|(zi, lp)| if *zi > 0.0 { zi.ln() + lp } else { f64::NEG_INFINITY })
            .collect();

        let trials: Vec<Trial> = self
            .initial_guesses(z, state)
            .into_iter()
            .map(|seed| self.run_trial(state, z, &d, seed))
            .collect();

        let stable = !trials.iter().any(|t| t.signals_instability(self.tolerance));
        trace!(
            stable,
            trials = trials.len(),
            min_tpd = trials.iter().map(|t| t.tpd).fold(f64::INFINITY, f64::min),
            "stability analysis finished"
        );

        StabilityReport {
            stable,
            trials,
            tolerance: self.tolerance,
        }
    }

    fn initial_guesses(&self, z: &[f64], state: &StatePoint<'_>) -> Vec<Vec<f64>> {
        let k = wilson_k_values(self.species, state.temperature(), state.pressure());
        let mut seeds = vec![
            z.iter().zip(&k).map(|(zi, ki)| zi * ki).collect(),
            z.iter().zip(&k).map(|(zi, ki)| zi / ki).collect(),
        ];

        if z.len() > 1 {
            for (index, &zk) in z.iter().enumerate() {
                let rest = 1.0 - zk;
                if zk <= 0.0 || rest <= 0.0 {
                    continue;
                }
                let seed = z
                    .iter()
                    .enumerate()
                    .map(|(i, &zi)| {
                        if i == index {
                            PURE_WEIGHT
                        } else {
                            (1.0 - PURE_WEIGHT) * zi / rest
                        }
                    })
                    .collect();
                seeds.push(seed);
            }
        }

        seeds
    }

    fn run_trial(&self, state: &StatePoint<'_>, z: &[f64], d: &[f64], seed: Vec<f64>) -> Trial {
        let mut big_w = seed;
        let mut last = Trial {
            composition: normalized(&big_w),
            amounts: big_w.clone(),
            tpd: f64::NAN,
            outcome: TrialOutcome::Inconclusive,
            iterations: 0,
        };

        for iteration in 1..=self.max_iterations {
            let Ok(trial_phase) = state.evaluate(&big_w, RootSelection::MinimumGibbs) else {
                return last;
            };

            let next: Vec<f64> = d
                .iter()
                .zip(&trial_phase.ln_phi)
                .map(|(di, lp)| (di - lp).exp())
                .collect();

            let tpd = modified_tpd(&big_w, &trial_phase.ln_phi, d);
            let change = big_w
                .iter()
                .zip(&next)
                .filter(|(w, _)| **w > 0.0)
                .map(|(w, n)| (n.ln() - w.ln()).abs())
                .fold(0.0, f64::max);

            last = Trial {
                composition: trial_phase.composition,
                amounts: big_w.clone(),
                tpd,
                outcome: TrialOutcome::Inconclusive,
                iterations: iteration,
            };

            if !change.is_finite() || next.iter().any(|w| !w.is_finite()) {
                return last;
            }

            let collapsed = last
                .composition
                .iter()
                .zip(z)
                .filter(|(_, zi)| **zi > 0.0)
                .all(|(w, zi)| (w / zi).ln().abs() < TRIVIAL);
            if collapsed {
                last.outcome = TrialOutcome::Trivial;
                return last;
            }

            big_w = next;

            if change < CONVERGENCE {
                last.outcome = TrialOutcome::Converged;
                return last;
            }
        }

        last
    }
}

/// Tests the feed of `mixture` at `conditions`.
///
/// # Errors
///
/// Returns a [`FlashError`] if the configuration is invalid or the feed cannot
/// be evaluated.
pub fn is_stable(
    mixture: &Mixture,
    conditions: &Conditions,
    config: &FlashConfig,
) -> Result<StabilityReport, FlashError> {
    config.validate()?;
    let eos = CubicEos::new(mixture, config);
    let state = eos.state_point(conditions.kelvin(), conditions.pascal())?;
    let analyzer = StabilityAnalyzer::new(mixture, config);
    Ok(analyzer.is_stable(&state, mixture.fractions())?)
}

fn modified_tpd(big_w: &[f64], ln_phi: &[f64], d: &[f64]) -> f64 {
    1.0 + big_w
        .iter()
        .zip(ln_phi)
        .zip(d)
        .filter(|((w, _), _)| **w > 0.0)
        .map(|((w, lp), di)| w * (w.ln() + lp - di - 1.0))
        .sum::<f64>()
}

fn normalized(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    values.iter().map(|v| v / total).collect()
}
