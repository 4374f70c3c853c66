use thiserror::Error;

use tpflash_core::{EquationProblem, Model, Snapshot};

/// One scalar residual evaluation with the model call that produced it.
#[derive(Debug, Clone)]
pub struct Evaluation<I, O> {
    pub x: f64,
    pub residual: f64,
    pub snapshot: Snapshot<I, O>,
}

impl<I, O> Evaluation<I, O> {
    /// Whether this evaluation lies closer to the root than `other`.
    #[must_use]
    pub fn is_closer_than(&self, other: &Self) -> bool {
        self.residual.abs() < other.residual.abs()
    }
}

/// Errors from mapping, calling or measuring one evaluation.
#[derive(Debug, Error)]
pub enum EvalError<ME, PE> {
    #[error("model call failed")]
    Model(#[source] ME),
    #[error("problem error")]
    Problem(#[source] PE),
}

/// Result of [`evaluate`] for a model and scalar problem.
pub type EvaluateResult<M, P> = Result<
    Evaluation<<M as Model>::Input, <M as Model>::Output>,
    EvalError<<M as Model>::Error, <P as EquationProblem<1>>::Error>,
>;

/// Evaluates the residual of a scalar equation problem at `x`.
///
/// # Errors
///
/// Returns an [`EvalError`] if the problem cannot build an input from `x`,
/// the model call fails, or the residual cannot be computed.
pub fn evaluate<M, P>(model: &M, problem: &P, x: f64) -> EvaluateResult<M, P>
where
    M: Model,
    P: EquationProblem<1, Input = M::Input, Output = M::Output>,
{
    let input = problem.input(&[x]).map_err(EvalError::Problem)?;
    let output = model.call(&input).map_err(EvalError::Model)?;
    let [residual] = problem
        .residuals(&input, &output)
        .map_err(EvalError::Problem)?;

    Ok(Evaluation {
        x,
        residual,
        snapshot: Snapshot::new(input, output),
    })
}
