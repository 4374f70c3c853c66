//! Bisection for scalar equation problems.
//!
//! # Algorithm
//!
//! The solver evaluates both ends of a bracket, checks that the residual
//! changes sign, then repeatedly halves the bracket toward the root. It stops
//! when the bracket width or the closest residual meets the configured
//! tolerances.
//!
//! Bisection cannot diverge, which makes it a good fit for monotonic
//! functions with a known bracket such as the two-phase Rachford–Rice
//! equation on `β ∈ [0, 1]`.
//!
//! # Observer Events
//!
//! Every evaluation emits one [`Event`]: [`Event::Endpoint`] for each end of
//! the bracket, then [`Event::Midpoint`] for each iteration. Observers can
//! return [`Action::StopEarly`] to halt with the closest evaluation so far.

mod bracket;
mod config;
mod error;
mod event;
mod solution;

pub use bracket::{Bracket, BracketError, Sign};
pub use config::{Config, ConfigError};
pub use error::Error;
pub use event::{Action, Event};
pub use solution::{Solution, Status};

use tpflash_core::{EquationProblem, Model, Observer};

use crate::equation::evaluate;

use bracket::Interval;
use solution::Closest;

/// Finds a root of the equation using the bisection method.
///
/// # Errors
///
/// Returns an error if the bracket is invalid, the residual does not change
/// sign across it, or an evaluation fails or is not finite.
pub fn solve<M, P, Obs>(
    model: &M,
    problem: &P,
    bracket: [f64; 2],
    config: &Config,
    mut observer: Obs,
) -> Result<Solution<M::Input, M::Output>, Error>
where
    M: Model,
    P: EquationProblem<1, Input = M::Input, Output = M::Output>,
    Obs: for<'a> Observer<Event<'a, M, P>, Action>,
{
    let interval = Interval::ordered(bracket)?;
    let mut closest = Closest::none();

    let mut signs = [Sign::Positive; 2];
    for (sign, x) in signs.iter_mut().zip(interval.endpoints()) {
        let Some(measured) = step(model, problem, x, None, &mut observer, &mut closest)? else {
            return closest.into_solution(Status::StoppedByObserver, 0);
        };
        if closest.within(config.residual_tol()) {
            return closest.into_solution(Status::Converged, 0);
        }
        *sign = measured;
    }
    let mut bracket = Bracket::new(interval, signs)?;

    for iter in 1..=config.max_iters() {
        let mid = bracket.midpoint();
        let Some(sign) = step(model, problem, mid, Some(&bracket), &mut observer, &mut closest)?
        else {
            return closest.into_solution(Status::StoppedByObserver, iter);
        };
        bracket.shrink(mid, sign);

        if closest.within(config.residual_tol())
            || bracket.is_x_converged(config.x_abs_tol(), config.x_rel_tol())
        {
            return closest.into_solution(Status::Converged, iter);
        }
    }

    closest.into_solution(Status::MaxIters, config.max_iters())
}

/// Runs bisection without observation.
///
/// # Errors
///
/// Returns an error if the bracket is invalid, the residual does not change
/// sign across it, or an evaluation fails or is not finite.
pub fn solve_unobserved<M, P>(
    model: &M,
    problem: &P,
    bracket: [f64; 2],
    config: &Config,
) -> Result<Solution<M::Input, M::Output>, Error>
where
    M: Model,
    P: EquationProblem<1, Input = M::Input, Output = M::Output>,
{
    solve(model, problem, bracket, config, ())
}

/// Evaluates at `x` and reports it.
///
/// Returns the residual sign, or `None` if the observer asked to stop. A
/// stop request takes precedence over a failed evaluation.
fn step<M, P, Obs>(
    model: &M,
    problem: &P,
    x: f64,
    bracket: Option<&Bracket>,
    observer: &mut Obs,
    closest: &mut Closest<M::Input, M::Output>,
) -> Result<Option<Sign>, Error>
where
    M: Model,
    P: EquationProblem<1, Input = M::Input, Output = M::Output>,
    Obs: for<'a> Observer<Event<'a, M, P>, Action>,
{
    let result = evaluate(model, problem, x);
    let event = match bracket {
        None => Event::Endpoint { x, result: &result },
        Some(bracket) => Event::Midpoint {
            x,
            bracket,
            result: &result,
        },
    };
    let stop = observer.observe(&event) == Some(Action::StopEarly);

    match result {
        Ok(eval) if eval.residual.is_finite() => {
            let sign = Sign::of(eval.residual);
            closest.offer(eval);
            Ok((!stop).then_some(sign))
        }
        _ if stop => Ok(None),
        Ok(eval) => Err(Error::NonFiniteResidual {
            x,
            residual: eval.residual,
        }),
        Err(error) => Err(Error::from(error)),
    }
}
