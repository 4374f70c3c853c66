//! Root finding for equation problems.
//!
//! An [`EquationProblem`] maps solver variables to model inputs, calls the
//! model, and computes residuals. The solvers here drive a single residual
//! to zero.
//!
//! [`EquationProblem`]: tpflash_core::EquationProblem

mod evaluate;

pub use evaluate::{EvalError, EvaluateResult, Evaluation, evaluate};

pub mod bisection;
