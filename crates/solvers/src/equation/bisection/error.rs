use std::error::Error as StdError;

use thiserror::Error;

use crate::equation::EvalError;

use super::bracket::BracketError;

type BoxedError = Box<dyn StdError + Send + Sync>;

/// Reasons a bisection solve ends without a solution.
#[derive(Debug, Error)]
pub enum Error {
    #[error("bracket rejected: {0}")]
    InvalidBracket(#[from] BracketError),

    /// The solver stopped before any evaluation succeeded.
    #[error("stopped before any evaluation succeeded")]
    NoSuccessfulEvaluation,

    #[error("residual is {residual} at x = {x}")]
    NonFiniteResidual { x: f64, residual: f64 },

    /// Mapping `x` to a model input, or the output to a residual, failed.
    #[error("equation problem failed at an evaluation")]
    Problem(#[source] BoxedError),

    #[error("model failed at an evaluation")]
    Model(#[source] BoxedError),
}

impl<ME, PE> From<EvalError<ME, PE>> for Error
where
    ME: StdError + Send + Sync + 'static,
    PE: StdError + Send + Sync + 'static,
{
    fn from(err: EvalError<ME, PE>) -> Self {
        match err {
            EvalError::Problem(e) => Self::Problem(Box::new(e)),
            EvalError::Model(e) => Self::Model(Box::new(e)),
        }
    }
}
