//! Isothermal-isobaric flash for up to three phases.
//!
//! # Stages
//!
//! The solver walks a fixed sequence of [`Stage`]s:
//!
//! 1. `Init` evaluates the feed and `KValueEstimate` seeds a two-phase split
//!    from Wilson's correlation.
//! 2. `SuccessiveSubstitution` alternates a Rachford–Rice solve with a
//!    fugacity update until `max |Δ ln K|` meets the tolerance. When it
//!    stalls, or gets close, `NewtonRefine` takes over on phase mole numbers.
//! 3. With `multiphase_check` on, `StabilityCheck` tests the converged phases
//!    and `AddPhase` seeds a third phase from an unstable trial, after which
//!    substitution resumes.
//!
//! A split that degenerates to a single phase is always confirmed with a
//! feed stability test, and an unstable feed re-seeds the split once.
//!
//! # Observer Events
//!
//! Each stage transition emits [`FlashEvent::StageEntered`], and each
//! substitution or Newton iteration emits [`FlashEvent::Iteration`].
//! Returning [`Action::StopEarly`] ends the flash with the lowest-residual
//! consistent estimate so far and [`Status::StoppedEarly`]. An elapsed time
//! budget ends it the same way.

mod equilibrium;
mod event;
mod labeling;
mod newton;
mod rachford_rice;

pub use equilibrium::{Equilibrium, PhaseKind, PhaseState, Status};
pub use event::{Action, FlashEvent, Stage};

use std::time::Instant;

use tpflash_core::Observer;
use tracing::{debug, trace};

use crate::{
    conditions::Conditions,
    config::FlashConfig,
    eos::{CubicEos, EosError, EosPhase, RootSelection, StatePoint, wilson_k_values},
    error::FlashError,
    mixture::Mixture,
    stability::StabilityAnalyzer,
};

use newton::Point;
use rachford_rice::TwoPhase;

/// A two-phase split whose `|ln K|` all fall below this is trivial.
const TRIVIAL_LN_K: f64 = 1e-4;
/// Substitution error below which Newton takes over.
const NEWTON_SWITCH: f64 = 1e-5;
/// Error ratio above which substitution counts as stalled.
const STALL_RATIO: f64 = 0.9;
/// Substitution iterations in a stage before a stall can trigger Newton.
const STALL_AFTER: usize = 5;
/// Step halvings tried to keep Newton mole numbers positive.
const MAX_HALVINGS: usize = 8;
/// Initial fraction of an added phase.
const SEED_FRACTION: f64 = 1e-3;
/// Trials closer than this (sum of absolute differences) to an existing
/// phase are not added.
const DUPLICATE_DISTANCE: f64 = 1e-3;
const LN_K_LIMIT: f64 = 500.0;

/// Flashes `mixture` at `conditions`.
///
/// # Errors
///
/// Returns a [`FlashError`] if the configuration is invalid, the equation of
/// state cannot be evaluated, or the iteration budget runs out.
pub fn flash(
    mixture: &Mixture,
    conditions: &Conditions,
    config: &FlashConfig,
) -> Result<Equilibrium, FlashError> {
    flash_observed(mixture, conditions, config, ())
}

/// Flashes `mixture` at `conditions`, reporting progress to `observer`.
///
/// # Errors
///
/// Returns a [`FlashError`] if the configuration is invalid, the equation of
/// state cannot be evaluated, or the iteration budget runs out. Stopping
/// through the observer or the time budget is not an error.
pub fn flash_observed<Obs>(
    mixture: &Mixture,
    conditions: &Conditions,
    config: &FlashConfig,
    observer: Obs,
) -> Result<Equilibrium, FlashError>
where
    Obs: Observer<FlashEvent, Action>,
{
    config.validate()?;
    let eos = CubicEos::new(mixture, config);
    Solver::new(mixture, conditions, config, &eos, observer)?.run()
}

/// Phases and fractions that satisfy the material balance.
#[derive(Debug, Clone)]
struct Estimate {
    phases: Vec<EosPhase>,
    fractions: Vec<f64>,
    residual: f64,
}

impl Estimate {
    fn single(phase: EosPhase) -> Self {
        Self {
            phases: vec![phase],
            fractions: vec![1.0],
            residual: 0.0,
        }
    }

    /// The feed as a single phase, before any iteration has scored it.
    fn unsolved(feed: EosPhase) -> Self {
        Self {
            residual: f64::INFINITY,
            ..Self::single(feed)
        }
    }

    fn from_point(point: &Point) -> Self {
        Self {
            phases: point.phases().to_vec(),
            fractions: point.fractions(),
            residual: point.error,
        }
    }
}

/// Working state of successive substitution.
///
/// K-values are kept as `θ_p = −ln φ_p` per phase, so ratios against any
/// reference phase are `exp(θ_p − θ_ref)`.
#[derive(Debug, Clone)]
struct Split {
    theta: Vec<Vec<f64>>,
    beta: Vec<f64>,
    /// Set once a phase has been added or removed.
    reshaped: bool,
}

impl Split {
    fn two_phase(ln_k: Vec<f64>) -> Self {
        Self {
            theta: vec![vec![0.0; ln_k.len()], ln_k],
            beta: vec![0.5, 0.5],
            reshaped: false,
        }
    }

    fn len(&self) -> usize {
        self.beta.len()
    }

    /// Phase with the largest fraction, the first one on ties.
    fn reference(&self) -> usize {
        let mut reference = 0;
        for (p, beta) in self.beta.iter().enumerate() {
            if *beta > self.beta[reference] {
                reference = p;
            }
        }
        reference
    }

    fn others(&self, reference: usize) -> Vec<usize> {
        (0..self.len()).filter(|p| *p != reference).collect()
    }

    fn ratios(&self, reference: usize) -> Vec<Vec<f64>> {
        self.others(reference)
            .into_iter()
            .map(|p| {
                self.theta[p]
                    .iter()
                    .zip(&self.theta[reference])
                    .map(|(tp, tr)| (tp - tr).clamp(-LN_K_LIMIT, LN_K_LIMIT).exp())
                    .collect()
            })
            .collect()
    }

    fn set_fractions(&mut self, reference: usize, others: &[usize], fractions: &[f64]) {
        self.beta[reference] = 1.0 - fractions.iter().sum::<f64>();
        for (&p, &beta) in others.iter().zip(fractions) {
            self.beta[p] = beta;
        }
    }

    fn remove(&mut self, phases: &[usize]) {
        let keep: Vec<usize> = (0..self.len()).filter(|p| !phases.contains(p)).collect();
        self.theta = keep.iter().map(|&p| self.theta[p].clone()).collect();
        self.beta = keep.iter().map(|&p| self.beta[p]).collect();
        self.reshaped = true;
    }

    /// Adds a phase seeded from trial amounts found against `parent`.
    fn add(&mut self, parent: usize, parent_composition: &[f64], amounts: &[f64]) {
        let theta = self.theta[parent]
            .iter()
            .zip(amounts.iter().zip(parent_composition))
            .map(|(t, (w, x))| t + log_ratio(*w, *x))
            .collect();
        for beta in &mut self.beta {
            *beta *= 1.0 - SEED_FRACTION;
        }
        self.theta.push(theta);
        self.beta.push(SEED_FRACTION);
        self.reshaped = true;
    }

    /// Restarts from the fugacities and fractions of an estimate.
    fn rebase(&mut self, estimate: &Estimate) {
        self.theta = estimate.phases.iter().map(theta_of).collect();
        self.beta = estimate.fractions.clone();
    }

    /// Whether a two-phase split has collapsed onto one composition.
    fn is_trivial(&self) -> bool {
        self.len() == 2
            && self.theta[1]
                .iter()
                .zip(&self.theta[0])
                .all(|(a, b)| (a - b).abs() < TRIVIAL_LN_K)
    }
}

/// How a substitution stage ended.
enum Outcome {
    Converged(Estimate),
    Collapsed,
}

/// How a Newton refinement ended.
enum Refinement {
    Converged(Estimate),
    /// Resume substitution, from the improved point if there is one.
    Fallback(Option<Estimate>),
}

/// Why the solver stopped before converging.
enum Interrupt {
    Stopped,
    Exhausted,
    Eos(EosError),
}

impl From<EosError> for Interrupt {
    fn from(error: EosError) -> Self {
        Interrupt::Eos(error)
    }
}

struct Solver<'a, Obs> {
    mixture: &'a Mixture,
    config: &'a FlashConfig,
    conditions: Conditions,
    analyzer: StabilityAnalyzer<'a>,
    state: StatePoint<'a>,
    deadline: Option<Instant>,
    observer: Obs,
    iterations: usize,
    /// Estimate with the smallest residual so far.
    best: Estimate,
    latest: Estimate,
    feed: EosPhase,
}

impl<'a, Obs> Solver<'a, Obs>
where
    Obs: Observer<FlashEvent, Action>,
{
    /// Evaluates the feed and starts the budget clock.
    fn new(
        mixture: &'a Mixture,
        conditions: &Conditions,
        config: &'a FlashConfig,
        eos: &'a CubicEos,
        observer: Obs,
    ) -> Result<Self, EosError> {
        let state = eos.state_point(conditions.kelvin(), conditions.pascal())?;
        let feed = state.evaluate(mixture.fractions(), RootSelection::MinimumGibbs)?;

        Ok(Self {
            mixture,
            config,
            conditions: *conditions,
            analyzer: StabilityAnalyzer::new(mixture, config),
            state,
            deadline: config
                .time_budget()
                .and_then(|budget| Instant::now().checked_add(budget)),
            observer,
            iterations: 0,
            best: Estimate::unsolved(feed.clone()),
            latest: Estimate::unsolved(feed.clone()),
            feed,
        })
    }

    fn run(mut self) -> Result<Equilibrium, FlashError> {
        match self.solve() {
            Ok(estimate) => {
                self.announce(Stage::Done);
                Ok(self.finish(estimate, Status::Converged))
            }
            Err(Interrupt::Stopped) => {
                debug!(
                    iterations = self.iterations,
                    best_residual = self.best.residual,
                    "flash stopped early"
                );
                let estimate = self.best.clone();
                self.announce(Stage::Done);
                Ok(self.finish(estimate, Status::StoppedEarly))
            }
            Err(Interrupt::Exhausted) => {
                debug!(
                    iterations = self.iterations,
                    best_residual = self.best.residual,
                    "flash ran out of iterations"
                );
                let estimate = self.finish(self.latest.clone(), Status::MaxIterations);
                Err(FlashError::NotConverged {
                    iterations: self.iterations,
                    best_residual: self.best.residual,
                    estimate: Box::new(estimate),
                })
            }
            Err(Interrupt::Eos(error)) => Err(error.into()),
        }
    }

    fn solve(&mut self) -> Result<Estimate, Interrupt> {
        self.enter(Stage::Init)?;
        self.enter(Stage::KValueEstimate)?;
        let wilson = wilson_k_values(
            self.mixture.components(),
            self.state.temperature(),
            self.state.pressure(),
        );
        let mut split = Split::two_phase(wilson.iter().map(|k| k.ln()).collect());
        let mut reseeded = false;

        loop {
            match self.substitute(&mut split)? {
                Outcome::Collapsed => {
                    if !reseeded {
                        reseeded = true;
                        self.enter(Stage::StabilityCheck)?;
                        if let Some(amounts) = self.feed_instability() {
                            debug!("feed is unstable, re-seeding the split from the trial phase");
                            let ln_k = amounts
                                .iter()
                                .zip(self.mixture.fractions())
                                .map(|(w, z)| log_ratio(*w, *z))
                                .collect();
                            split = Split::two_phase(ln_k);
                            continue;
                        }
                    }
                    debug!("single phase");
                    return Ok(Estimate::single(self.feed.clone()));
                }
                Outcome::Converged(estimate) => {
                    if self.config.multiphase_check && split.len() == 2 && !split.reshaped {
                        self.enter(Stage::StabilityCheck)?;
                        if let Some((parent, amounts)) = self.third_phase_seed(&estimate) {
                            self.enter(Stage::AddPhase)?;
                            split.rebase(&estimate);
                            split.add(parent, &estimate.phases[parent].composition, &amounts);
                            continue;
                        }
                    }
                    self.enter(Stage::Converged)?;
                    return Ok(estimate);
                }
            }
        }
    }

    /// Runs successive substitution on `split` until it converges or
    /// collapses to a single phase.
    fn substitute(&mut self, split: &mut Split) -> Result<Outcome, Interrupt> {
        self.enter(Stage::SuccessiveSubstitution)?;
        let mixture = self.mixture;
        let feed = mixture.fractions();
        let mut newton = self.config.newton;
        let mut previous: Option<f64> = None;
        let mut stage_iterations = 0;

        loop {
            self.begin_iteration()?;
            stage_iterations += 1;

            let reference = split.reference();
            let others = split.others(reference);
            let ratios = split.ratios(reference);

            let fractions = if split.len() == 2 {
                match rachford_rice::solve_two_phase(feed, &ratios[0]) {
                    TwoPhase::Split(beta) => vec![beta],
                    limit => {
                        debug!(?limit, "two-phase split left the unit interval");
                        return Ok(Outcome::Collapsed);
                    }
                }
            } else {
                let start: Vec<f64> = others.iter().map(|&p| split.beta[p]).collect();
                let solution = rachford_rice::solve_multiphase(feed, &ratios, &start);
                let vanished: Vec<usize> =
                    solution.vanished().into_iter().map(|j| others[j]).collect();
                if !vanished.is_empty() {
                    debug!(?vanished, "removing phases with vanishing fraction");
                    split.set_fractions(reference, &others, &solution.fractions);
                    split.remove(&vanished);
                    previous = None;
                    continue;
                }
                solution.fractions
            };
            split.set_fractions(reference, &others, &fractions);

            let mut compositions = vec![Vec::new(); split.len()];
            let solved = rachford_rice::compositions(feed, &ratios, &fractions);
            for (p, x) in std::iter::once(reference).chain(others.iter().copied()).zip(solved) {
                compositions[p] = x;
            }
            let phases = compositions
                .iter()
                .map(|x| self.state.evaluate(x, RootSelection::MinimumGibbs))
                .collect::<Result<Vec<_>, _>>()?;

            let theta: Vec<Vec<f64>> = phases.iter().map(theta_of).collect();
            let residual = others
                .iter()
                .flat_map(|&p| {
                    let (old, new) = (&split.theta, &theta);
                    (0..feed.len()).map(move |i| {
                        ((new[p][i] - new[reference][i]) - (old[p][i] - old[reference][i])).abs()
                    })
                })
                .fold(0.0, f64::max);
            split.theta = theta;

            let estimate = Estimate {
                phases,
                fractions: split.beta.clone(),
                residual,
            };
            self.record(&estimate);
            self.report(Stage::SuccessiveSubstitution, split.len(), residual)?;

            if split.is_trivial() {
                debug!("two-phase split converged to the trivial solution");
                return Ok(Outcome::Collapsed);
            }
            if residual < self.config.tolerance {
                return Ok(Outcome::Converged(estimate));
            }

            let stalled = stage_iterations >= STALL_AFTER
                && previous.is_some_and(|before| residual / before > STALL_RATIO);
            if newton && (residual < NEWTON_SWITCH || stalled) {
                match self.refine(&estimate)? {
                    Refinement::Converged(estimate) => return Ok(Outcome::Converged(estimate)),
                    Refinement::Fallback(improved) => {
                        newton = false;
                        if let Some(improved) = improved {
                            split.rebase(&improved);
                        }
                        self.enter(Stage::SuccessiveSubstitution)?;
                    }
                }
            }
            previous = Some(residual);
        }
    }

    /// Newton iteration on the mole numbers of the non-reference phases,
    /// starting from a substitution estimate.
    fn refine(&mut self, start: &Estimate) -> Result<Refinement, Interrupt> {
        self.enter(Stage::NewtonRefine)?;
        let mixture = self.mixture;
        let feed = mixture.fractions();

        let mut reference = 0;
        for (p, beta) in start.fractions.iter().enumerate() {
            if *beta > start.fractions[reference] {
                reference = p;
            }
        }
        let amounts = start
            .phases
            .iter()
            .zip(&start.fractions)
            .map(|(phase, beta)| phase.composition.iter().map(|x| x * beta).collect())
            .collect();
        let roots = start.phases.iter().map(|phase| phase.root).collect();

        let Some(mut point) = Point::new(&self.state, feed, reference, amounts, roots) else {
            debug!("newton start point is infeasible, continuing with substitution");
            return Ok(Refinement::Fallback(None));
        };
        let mut improved = false;

        loop {
            if point.error < self.config.tolerance {
                return Ok(Refinement::Converged(Estimate::from_point(&point)));
            }
            self.begin_iteration()?;

            let fallback = |point: &Point| {
                Refinement::Fallback(improved.then(|| Estimate::from_point(point)))
            };

            let Some(direction) = point.direction(&self.state) else {
                debug!("singular newton jacobian, falling back to substitution");
                return Ok(fallback(&point));
            };

            let mut lambda = 1.0;
            let mut next = None;
            for _ in 0..=MAX_HALVINGS {
                next = point.advance(&self.state, feed, &direction, lambda);
                if next.is_some() {
                    break;
                }
                lambda *= 0.5;
            }

            let Some(next) = next.filter(|next| next.error < point.error) else {
                debug!(
                    residual = point.error,
                    lambda, "newton step rejected, falling back to substitution"
                );
                return Ok(fallback(&point));
            };

            point = next;
            improved = true;
            self.record(&Estimate::from_point(&point));
            self.report(Stage::NewtonRefine, point.phases().len(), point.error)?;
        }
    }

    /// Unnormalized amounts of the most unstable trial against the feed.
    fn feed_instability(&self) -> Option<Vec<f64>> {
        let report = self.analyzer.test_phase(&self.state, &self.feed);
        report.most_unstable().map(|trial| trial.amounts.clone())
    }

    /// Picks the most unstable trial against any phase of a two-phase
    /// estimate, skipping trials that reproduce an existing phase.
    fn third_phase_seed(&self, estimate: &Estimate) -> Option<(usize, Vec<f64>)> {
        let mut seed: Option<(f64, usize, Vec<f64>)> = None;

        for (parent, phase) in estimate.phases.iter().enumerate() {
            let report = self.analyzer.test_phase(&self.state, phase);
            for trial in report.unstable_trials() {
                let distinct = estimate.phases.iter().all(|existing| {
                    distance(&trial.composition, &existing.composition) > DUPLICATE_DISTANCE
                });
                let better = seed
                    .as_ref()
                    .is_none_or(|(tpd, ..)| trial.tpd.total_cmp(tpd).is_lt());
                if distinct && better {
                    seed = Some((trial.tpd, parent, trial.amounts.clone()));
                }
            }
        }

        seed.map(|(tpd, parent, amounts)| {
            debug!(tpd, parent, "adding a phase from an unstable trial");
            (parent, amounts)
        })
    }

    fn finish(&self, estimate: Estimate, status: Status) -> Equilibrium {
        let (phases, fractions): (Vec<EosPhase>, Vec<f64>) = estimate
            .phases
            .into_iter()
            .zip(estimate.fractions)
            .filter(|(_, beta)| *beta > 0.0)
            .unzip();

        let kinds = labeling::assign(
            &phases,
            self.mixture.components(),
            self.mixture.water_index(),
            self.state.temperature(),
        );
        let mut states: Vec<PhaseState> = phases
            .into_iter()
            .zip(fractions)
            .zip(kinds)
            .map(|((phase, beta), kind)| PhaseState::from_eos(kind, beta, phase))
            .collect();
        states.sort_by_key(|state| state.kind);

        Equilibrium {
            mixture: self.mixture.clone(),
            config: self.config.clone(),
            conditions: self.conditions,
            phases: states,
            iterations: self.iterations,
            residual: estimate.residual,
            status,
        }
    }

    /// Counts one iteration against the budgets.
    fn begin_iteration(&mut self) -> Result<(), Interrupt> {
        if self.iterations >= self.config.max_iterations {
            return Err(Interrupt::Exhausted);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            debug!(iterations = self.iterations, "flash time budget elapsed");
            return Err(Interrupt::Stopped);
        }
        self.iterations += 1;
        Ok(())
    }

    fn record(&mut self, estimate: &Estimate) {
        if estimate.residual < self.best.residual {
            self.best = estimate.clone();
        }
        self.latest = estimate.clone();
    }

    fn enter(&mut self, stage: Stage) -> Result<(), Interrupt> {
        debug!(%stage, iterations = self.iterations, "entering flash stage");
        match self.announce(stage) {
            Some(Action::StopEarly) => Err(Interrupt::Stopped),
            None => Ok(()),
        }
    }

    fn announce(&mut self, stage: Stage) -> Option<Action> {
        self.observer.observe(&FlashEvent::StageEntered {
            stage,
            iterations: self.iterations,
        })
    }

    fn report(&mut self, stage: Stage, phase_count: usize, residual: f64) -> Result<(), Interrupt> {
        trace!(%stage, iteration = self.iterations, phase_count, residual, "flash iteration");
        let event = FlashEvent::Iteration {
            stage,
            iteration: self.iterations,
            phase_count,
            residual,
        };
        match self.observer.observe(&event) {
            Some(Action::StopEarly) => Err(Interrupt::Stopped),
            None => Ok(()),
        }
    }
}

fn theta_of(phase: &EosPhase) -> Vec<f64> {
    phase.ln_phi.iter().map(|lp| -lp).collect()
}

/// `ln(a/b)` limited to a finite range, zero where undefined.
fn log_ratio(a: f64, b: f64) -> f64 {
    let ratio = (a / b).ln();
    if ratio.is_nan() {
        0.0
    } else {
        ratio.clamp(-LN_K_LIMIT, LN_K_LIMIT)
    }
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::registry::Database;

    fn mixture(feed: &[(&str, f64)]) -> Mixture {
        Mixture::new(&Database::builtin().unwrap(), feed).unwrap()
    }

    fn solver_at<'a>(
        mixture: &'a Mixture,
        config: &'a FlashConfig,
        eos: &'a CubicEos,
        t: f64,
        p: f64,
    ) -> Solver<'a, ()> {
        let conditions = Conditions::from_si(t, p).unwrap();
        Solver::new(mixture, &conditions, config, eos, ()).unwrap()
    }

    #[test]
    fn split_reference_prefers_the_first_of_equal_fractions() {
        let split = Split::two_phase(vec![1.0, -1.0]);
        assert_eq!(split.reference(), 0);

        let ratios = split.ratios(0);
        assert_relative_eq!(ratios[0][0], 1.0_f64.exp());
        assert_relative_eq!(ratios[0][1], (-1.0_f64).exp());
    }

    #[test]
    fn added_phase_takes_the_seed_fraction() {
        let mut split = Split::two_phase(vec![0.5, -0.5]);
        split.beta = vec![0.3, 0.7];
        split.add(1, &[0.5, 0.5], &[2.0, 0.25]);

        assert_eq!(split.len(), 3);
        assert!(split.reshaped);
        assert_relative_eq!(split.beta.iter().sum::<f64>(), 1.0, epsilon = 1e-15);
        assert_relative_eq!(split.beta[2], SEED_FRACTION);
        assert_relative_eq!(split.theta[2][0], 0.5 + 4.0_f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(split.theta[2][1], -0.5 + 0.5_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn log_ratio_stays_finite() {
        assert_eq!(log_ratio(0.0, 0.0), 0.0);
        assert_eq!(log_ratio(1.0, 0.0), LN_K_LIMIT);
        assert_eq!(log_ratio(0.0, 1.0), -LN_K_LIMIT);
    }

    #[test]
    fn binary_inside_envelope_splits_in_two() {
        let mixture = mixture(&[("propane", 0.5), ("n-butane", 0.5)]);
        let conditions = Conditions::from_si(300.0, 5e5).unwrap();
        let result = flash(&mixture, &conditions, &FlashConfig::default()).unwrap();

        assert!(result.converged());
        assert_eq!(result.phase_count(), 2);
        assert!(result.has_phase(PhaseKind::Vapor));
        assert!(result.has_phase(PhaseKind::Liquid));

        let vapor = result.phase(PhaseKind::Vapor).unwrap();
        assert_relative_eq!(vapor.fraction, 0.531, epsilon = 0.02);
        assert!(result.material_balance_error() < 1e-8);
        assert_relative_eq!(result.phase_fraction_sum(), 1.0, epsilon = 1e-12);

        let k = result
            .k_values(PhaseKind::Vapor, PhaseKind::Liquid)
            .unwrap();
        assert!(k[0] > 1.0 && k[1] < 1.0);
    }

    #[test]
    fn substitution_alone_converges_without_newton() {
        let mixture = mixture(&[("propane", 0.5), ("n-butane", 0.5)]);
        let conditions = Conditions::from_si(300.0, 5e5).unwrap();
        let with_newton = flash(&mixture, &conditions, &FlashConfig::default()).unwrap();
        let without = flash(
            &mixture,
            &conditions,
            &FlashConfig::default().with_newton(false),
        )
        .unwrap();

        assert!(without.converged());
        for (a, b) in with_newton.phases().iter().zip(without.phases()) {
            assert_eq!(a.kind, b.kind);
            assert_relative_eq!(a.fraction, b.fraction, epsilon = 1e-7);
            for (x, y) in a.composition.iter().zip(&b.composition) {
                assert_relative_eq!(x, y, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn pure_component_stays_single_phase() {
        let mixture = mixture(&[("propane", 1.0)]);
        let conditions = Conditions::from_si(300.0, 5e5).unwrap();
        let config = FlashConfig::default().with_multiphase_check(true);
        let result = flash(&mixture, &conditions, &config).unwrap();

        assert!(result.converged());
        assert_eq!(result.phase_count(), 1);
        assert!(result.has_phase(PhaseKind::Vapor));
        assert_relative_eq!(result.phases()[0].fraction, 1.0);
    }

    #[test]
    fn collapsed_split_is_checked_for_stability() {
        let mixture = mixture(&[("water", 0.5), ("n-hexane", 0.5)]);
        let conditions = Conditions::from_si(300.0, 1e6).unwrap();
        let result = flash(&mixture, &conditions, &FlashConfig::default()).unwrap();

        assert!(result.converged());
        assert_eq!(result.phase_count(), 2);
        assert!(result.has_phase(PhaseKind::Liquid));
        assert!(result.has_phase(PhaseKind::Aqueous));
        assert!(result.material_balance_error() < 1e-8);

        let aqueous = result.phase(PhaseKind::Aqueous).unwrap();
        assert!(aqueous.composition[0] > 0.99);
    }

    #[test]
    fn newton_falls_back_and_substitution_still_converges() {
        let mixture = mixture(&[("methane", 0.6), ("propane", 0.3), ("n-hexane", 0.1)]);
        let config = FlashConfig::default();
        let eos = CubicEos::new(&mixture, &config);
        let mut solver = solver_at(&mixture, &config, &eos, 300.0, 3e6);

        // The liquid holds no n-hexane, so no mole numbers are feasible.
        let liquid = solver
            .state
            .evaluate(&[0.2, 0.8, 0.0], RootSelection::Liquid)
            .unwrap();
        let vapor = solver
            .state
            .evaluate(&[0.8, 0.1, 0.1], RootSelection::Vapor)
            .unwrap();
        let infeasible = Estimate {
            phases: vec![liquid, vapor],
            fractions: vec![0.26, 0.74],
            residual: 1.0,
        };
        assert!(matches!(
            solver.refine(&infeasible),
            Ok(Refinement::Fallback(None))
        ));

        let wilson = wilson_k_values(mixture.components(), 300.0, 3e6);
        let mut split = Split::two_phase(wilson.iter().map(|k| k.ln()).collect());
        let Ok(Outcome::Converged(converged)) = solver.substitute(&mut split) else {
            panic!("substitution should converge after the fallback");
        };
        assert!(converged.residual < config.tolerance);

        // Below the round-off floor every step is eventually rejected.
        let strict = FlashConfig::default().with_tolerance(1e-300);
        let mut strict_solver = solver_at(&mixture, &strict, &eos, 300.0, 3e6);
        match strict_solver.refine(&converged) {
            Ok(Refinement::Fallback(improved)) => {
                let estimate = improved.unwrap_or(converged);
                assert_eq!(estimate.phases.len(), 2);
                assert_relative_eq!(
                    estimate.fractions.iter().sum::<f64>(),
                    1.0,
                    epsilon = 1e-12
                );
            }
            _ => panic!("newton should fall back once it cannot improve"),
        }
    }

    #[test]
    fn stopping_returns_the_lowest_residual_estimate() {
        let mixture = mixture(&[("propane", 0.5), ("n-butane", 0.5)]);
        let conditions = Conditions::from_si(300.0, 5e5).unwrap();
        let config = FlashConfig::default().with_newton(false);

        let mut residuals = Vec::new();
        let observer = |event: &FlashEvent| -> Option<Action> {
            if let FlashEvent::Iteration { residual, .. } = event {
                residuals.push(*residual);
            }
            (residuals.len() >= 3).then_some(Action::StopEarly)
        };
        let result = flash_observed(&mixture, &conditions, &config, observer).unwrap();

        assert_eq!(result.status, Status::StoppedEarly);
        assert_eq!(residuals.len(), 3);
        let lowest = residuals.iter().copied().fold(f64::INFINITY, f64::min);
        assert_relative_eq!(result.residual, lowest);
        assert!(result.material_balance_error() < 1e-10);
    }

    #[test]
    fn best_estimate_survives_a_worse_iterate() {
        let mixture = mixture(&[("propane", 0.5), ("n-butane", 0.5)]);
        let config = FlashConfig::default();
        let eos = CubicEos::new(&mixture, &config);
        let mut solver = solver_at(&mixture, &config, &eos, 300.0, 5e5);

        let state = &solver.state;
        let liquid = state
            .evaluate(&[0.35, 0.65], RootSelection::MinimumGibbs)
            .unwrap();
        let vapor = state
            .evaluate(&[0.63, 0.37], RootSelection::MinimumGibbs)
            .unwrap();
        let good = Estimate {
            phases: vec![liquid, vapor],
            fractions: vec![0.47, 0.53],
            residual: 1e-3,
        };
        let worse = Estimate {
            residual: 1e-1,
            ..good.clone()
        };

        solver.record(&good);
        solver.record(&worse);
        assert_relative_eq!(solver.best.residual, 1e-3);
        assert_relative_eq!(solver.latest.residual, 1e-1);
    }

    #[test]
    fn stages_are_reported_in_order() {
        let mixture = mixture(&[("propane", 0.5), ("n-butane", 0.5)]);
        let conditions = Conditions::from_si(300.0, 5e5).unwrap();

        let mut stages = Vec::new();
        let observer = |event: &FlashEvent| -> Option<Action> {
            if let FlashEvent::StageEntered { stage, .. } = event {
                stages.push(*stage);
            }
            None
        };
        flash_observed(&mixture, &conditions, &FlashConfig::default(), observer).unwrap();

        assert_eq!(
            &stages[..3],
            &[
                Stage::Init,
                Stage::KValueEstimate,
                Stage::SuccessiveSubstitution
            ]
        );
        assert_eq!(stages[stages.len() - 2..], [Stage::Converged, Stage::Done]);
    }
}
