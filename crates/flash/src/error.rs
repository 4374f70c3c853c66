use thiserror::Error;

use crate::{
    conditions::ConditionError, config::ConfigError, eos::EosError, flash::Equilibrium,
};

/// Errors that end a flash calculation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlashError {
    #[error(transparent)]
    InvalidCondition(#[from] ConditionError),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    Eos(#[from] EosError),

    /// The iteration budget ran out before the K-values settled.
    ///
    /// Carries the last material-balance-consistent estimate.
    #[error("flash did not converge in {iterations} iterations (best residual {best_residual:e})")]
    NotConverged {
        iterations: usize,
        best_residual: f64,
        estimate: Box<Equilibrium>,
    },
}

/// Errors that may occur when evaluating properties of a flash result.
///
/// A property that does not exist for a phase or the bulk is `None` in the
/// report, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    /// The input values are invalid or inconsistent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The calculation failed due to a numerical or internal error.
    #[error("calculation error: {0}")]
    Calculation(String),
}

impl From<EosError> for PropertyError {
    fn from(err: EosError) -> Self {
        PropertyError::Calculation(err.to_string())
    }
}
