//! Newton iteration on phase mole numbers.
//!
//! The unknowns are the mole numbers of every non-reference phase, stacked
//! phase by phase. The reference phase holds whatever is left of the feed,
//! so material balance is exact at every iterate. Residuals are
//! `ln f_i^(k) − ln f_i^(ref)` for each non-reference phase `k`.

use nalgebra::{DMatrix, DVector};

use crate::eos::{EosPhase, RootSelection, StatePoint};

/// A feasible iterate with its equilibrium residual.
#[derive(Debug, Clone)]
pub(super) struct Point {
    reference: usize,
    roots: Vec<RootSelection>,
    /// Mole numbers of every phase, per mole of feed.
    amounts: Vec<Vec<f64>>,
    phases: Vec<EosPhase>,
    residual: DVector<f64>,
    /// `max |residual|`.
    pub error: f64,
}

impl Point {
    /// Builds a point from per-phase mole numbers.
    ///
    /// The reference amounts are recomputed from the feed. Returns `None` if
    /// any mole number is not strictly positive or an evaluation fails.
    pub fn new(
        state: &StatePoint<'_>,
        feed: &[f64],
        reference: usize,
        mut amounts: Vec<Vec<f64>>,
        roots: Vec<RootSelection>,
    ) -> Option<Self> {
        let remainder: Vec<f64> = (0..feed.len())
            .map(|i| {
                feed[i]
                    - amounts
                        .iter()
                        .enumerate()
                        .filter(|(p, _)| *p != reference)
                        .map(|(_, n)| n[i])
                        .sum::<f64>()
            })
            .collect();
        amounts[reference] = remainder;

        if amounts.iter().flatten().any(|n| !(*n > 0.0)) {
            return None;
        }

        let phases = amounts
            .iter()
            .zip(&roots)
            .map(|(n, root)| state.evaluate(n, *root))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;

        let nc = feed.len();
        let log_fugacity = |p: usize| -> Vec<f64> {
            let total: f64 = amounts[p].iter().sum();
            amounts[p]
                .iter()
                .zip(&phases[p].ln_phi)
                .map(|(n, lp)| (n / total).ln() + lp)
                .collect()
        };
        let reference_f = log_fugacity(reference);

        let mut residual = DVector::zeros(nc * (amounts.len() - 1));
        for (block, p) in others(amounts.len(), reference).enumerate() {
            for (i, f) in log_fugacity(p).into_iter().enumerate() {
                residual[block * nc + i] = f - reference_f[i];
            }
        }
        let error = residual.amax();

        Some(Self {
            reference,
            roots,
            amounts,
            phases,
            residual,
            error,
        })
    }

    /// Solves `J Δ = −r` for the Newton direction.
    ///
    /// Returns `None` if the Jacobian is singular or cannot be evaluated.
    pub fn direction(&self, state: &StatePoint<'_>) -> Option<DVector<f64>> {
        let nc = self.amounts[0].len();
        let blocks = self
            .amounts
            .iter()
            .zip(&self.roots)
            .map(|(n, root)| phase_block(state, n, *root))
            .collect::<Option<Vec<_>>>()?;

        let unknowns: Vec<usize> = others(self.amounts.len(), self.reference).collect();
        let size = nc * unknowns.len();
        let reference = &blocks[self.reference];
        let jacobian = DMatrix::from_fn(size, size, |row, col| {
            let (a, i) = (row / nc, row % nc);
            let (b, j) = (col / nc, col % nc);
            let own = if a == b { blocks[unknowns[a]][(i, j)] } else { 0.0 };
            own + reference[(i, j)]
        });

        let direction = jacobian.lu().solve(&(-&self.residual))?;
        direction.iter().all(|d| d.is_finite()).then_some(direction)
    }

    /// Moves `lambda` along `direction`, or returns `None` if the result is
    /// infeasible.
    pub fn advance(
        &self,
        state: &StatePoint<'_>,
        feed: &[f64],
        direction: &DVector<f64>,
        lambda: f64,
    ) -> Option<Self> {
        let nc = feed.len();
        let mut amounts = self.amounts.clone();
        for (block, p) in others(amounts.len(), self.reference).enumerate() {
            for i in 0..nc {
                amounts[p][i] += lambda * direction[block * nc + i];
            }
        }
        Self::new(state, feed, self.reference, amounts, self.roots.clone())
    }

    /// Phase fractions, equal to each phase's total moles.
    pub fn fractions(&self) -> Vec<f64> {
        self.amounts.iter().map(|n| n.iter().sum()).collect()
    }

    pub fn phases(&self) -> &[EosPhase] {
        &self.phases
    }
}

/// `∂ ln f_i / ∂ n_j` for a phase holding `n` moles.
fn phase_block(state: &StatePoint<'_>, n: &[f64], root: RootSelection) -> Option<DMatrix<f64>> {
    let total: f64 = n.iter().sum();
    let x: Vec<f64> = n.iter().map(|v| v / total).collect();
    let jacobian = state.ln_phi_jacobian(&x, root).ok()?;
    Some(DMatrix::from_fn(n.len(), n.len(), |i, j| {
        let diagonal = if i == j { 1.0 / n[i] } else { 0.0 };
        diagonal - 1.0 / total + jacobian[(i, j)] / total
    }))
}

fn others(count: usize, reference: usize) -> impl Iterator<Item = usize> {
    (0..count).filter(move |p| *p != reference)
}
