//! Numerical solvers for the tpflash workspace.
//!
//! Solvers are generic over a [`Model`] and a problem trait from
//! `tpflash-core`, so the same bisection routine that finds a vapor fraction
//! can be tested against plain polynomials.
//!
//! [`Model`]: tpflash_core::Model

pub mod equation;
