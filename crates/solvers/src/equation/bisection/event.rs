use tpflash_core::{EquationProblem, Model};

use crate::equation::EvaluateResult;

use super::Bracket;

/// Event emitted by the bisection solver for each evaluation.
pub enum Event<'a, M, P>
where
    M: Model,
    P: EquationProblem<1, Input = M::Input, Output = M::Output>,
{
    /// One of the two bracket endpoints, before the sign change is checked.
    Endpoint {
        x: f64,
        result: &'a EvaluateResult<M, P>,
    },

    /// A midpoint of the validated bracket, before it shrinks.
    Midpoint {
        x: f64,
        bracket: &'a Bracket,
        result: &'a EvaluateResult<M, P>,
    },
}

impl<'a, M, P> Event<'a, M, P>
where
    M: Model,
    P: EquationProblem<1, Input = M::Input, Output = M::Output>,
{
    #[must_use]
    pub fn x(&self) -> f64 {
        match self {
            Event::Endpoint { x, .. } | Event::Midpoint { x, .. } => *x,
        }
    }

    #[must_use]
    pub fn result(&self) -> &'a EvaluateResult<M, P> {
        match self {
            Event::Endpoint { result, .. } | Event::Midpoint { result, .. } => result,
        }
    }
}

/// Control actions a bisection observer may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop and return the closest evaluation so far.
    StopEarly,
}
