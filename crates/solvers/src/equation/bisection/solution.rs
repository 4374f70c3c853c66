use tpflash_core::Snapshot;

use crate::equation::Evaluation;

use super::Error;

/// Indicates whether the solver converged or hit the iteration limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Converged according to the configured tolerances.
    Converged,

    /// Reached the iteration limit without converging.
    MaxIters,

    /// Stopped early due to an observer decision.
    StoppedByObserver,
}

/// The result of a bisection solve.
///
/// The reported point is the evaluation with the smallest residual
/// magnitude, which is not necessarily the last midpoint.
#[derive(Debug, Clone)]
pub struct Solution<I, O> {
    pub status: Status,
    pub x: f64,
    pub residual: f64,
    pub snapshot: Snapshot<I, O>,
    /// Midpoint iterations used.
    pub iters: usize,
}

/// Closest evaluation seen so far, if any succeeded.
pub(super) struct Closest<I, O>(Option<Evaluation<I, O>>);

impl<I, O> Closest<I, O> {
    pub(super) fn none() -> Self {
        Self(None)
    }

    pub(super) fn offer(&mut self, eval: Evaluation<I, O>) {
        if self.0.as_ref().is_none_or(|kept| eval.is_closer_than(kept)) {
            self.0 = Some(eval);
        }
    }

    pub(super) fn within(&self, residual_tol: f64) -> bool {
        self.0
            .as_ref()
            .is_some_and(|eval| eval.residual.abs() <= residual_tol)
    }

    /// # Errors
    ///
    /// Returns `Error::NoSuccessfulEvaluation` if nothing was offered.
    pub(super) fn into_solution(self, status: Status, iters: usize) -> Result<Solution<I, O>, Error> {
        let eval = self.0.ok_or(Error::NoSuccessfulEvaluation)?;
        Ok(Solution {
            status,
            x: eval.x,
            residual: eval.residual,
            snapshot: eval.snapshot,
            iters,
        })
    }
}
