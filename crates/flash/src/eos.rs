//! Two-parameter cubic equations of state of the van der Waals family.
//!
//! Every supported equation is written as
//! `P = RT/(v − b) − a/((v + δ₁b)(v + δ₂b))`,
//! so SRK and Peng–Robinson differ only in their constants.

mod cubic;
mod departure;

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

pub use departure::Departure;

use departure::{Attraction, Cubic};

use crate::{
    config::{CubicEquation, FlashConfig, MixingRule},
    mixture::Mixture,
    registry::Species,
    units::GAS_CONSTANT as R,
};

/// Errors raised while evaluating the equation of state.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EosError {
    #[error("no compressibility root exceeds the covolume at T = {temperature} K, P = {pressure} Pa")]
    Degenerate { temperature: f64, pressure: f64 },

    #[error("equation of state needs positive T and P, got T = {temperature} K, P = {pressure} Pa")]
    InvalidCondition { temperature: f64, pressure: f64 },
}

/// Which real root of the cubic describes a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSelection {
    /// Largest root with `Z > B`.
    Vapor,
    /// Smallest root with `Z > B`.
    Liquid,
    /// Root with the lower residual Gibbs energy.
    MinimumGibbs,
}

/// Equation-of-state output for one phase composition.
#[derive(Debug, Clone, PartialEq)]
pub struct EosPhase {
    /// Normalized composition the phase was evaluated at.
    pub composition: Vec<f64>,
    /// Every real root of the cubic, ascending.
    pub roots: Vec<f64>,
    /// Selected compressibility factor.
    pub z: f64,
    /// Branch the selected root lies on, never `MinimumGibbs`.
    ///
    /// A lone root is classified by the Li pseudo-critical temperature,
    /// whatever branch was requested.
    pub root: RootSelection,
    pub ln_phi: Vec<f64>,
    /// Molar volume from the cubic, m³/mol.
    pub molar_volume: f64,
    /// Molar volume after volume translation, m³/mol.
    ///
    /// Equal to `molar_volume` when volume correction is off.
    pub translated_volume: f64,
    /// Mixture covolume `b`, m³/mol.
    pub covolume: f64,
    /// Mixture attraction `a`, Pa·m⁶/mol².
    pub attraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct PureParameters {
    critical_temperature: f64,
    critical_volume: f64,
    ac: f64,
    b: f64,
    m: f64,
    shift: f64,
}

/// A cubic equation of state bound to the species of one mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicEos {
    equation: CubicEquation,
    cubic: Cubic,
    pure: Vec<PureParameters>,
    /// `1 − (k_ij + k_ji)/2`.
    symmetric: DMatrix<f64>,
    /// `k_ij − k_ji`, present only for the asymmetric rule.
    asymmetric: Option<DMatrix<f64>>,
    volume_correction: bool,
}

impl CubicEos {
    /// Builds the equation selected by `config` for the species in `mixture`.
    #[must_use]
    pub fn new(mixture: &Mixture, config: &FlashConfig) -> Self {
        let (cubic, omega_a, omega_b) = match config.equation {
            CubicEquation::Srk => (
                Cubic {
                    delta1: 1.0,
                    delta2: 0.0,
                },
                0.42748,
                0.08664,
            ),
            CubicEquation::PengRobinson => (
                Cubic {
                    delta1: 1.0 + std::f64::consts::SQRT_2,
                    delta2: 1.0 - std::f64::consts::SQRT_2,
                },
                0.45724,
                0.07780,
            ),
        };

        let pure = mixture
            .components()
            .iter()
            .map(|s| pure_parameters(config.equation, s, omega_a, omega_b))
            .collect();

        let k = mixture.interaction();
        let n = mixture.len();
        let symmetric = DMatrix::from_fn(n, n, |i, j| 1.0 - 0.5 * (k[(i, j)] + k[(j, i)]));
        let asymmetric = match config.mixing_rule {
            MixingRule::Classic => None,
            MixingRule::Asymmetric => Some(DMatrix::from_fn(n, n, |i, j| k[(i, j)] - k[(j, i)])),
        };

        Self {
            equation: config.equation,
            cubic,
            pure,
            symmetric,
            asymmetric,
            volume_correction: config.volume_correction,
        }
    }

    #[must_use]
    pub fn equation(&self) -> CubicEquation {
        self.equation
    }

    /// Number of species the equation was built for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pure.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pure.is_empty()
    }

    /// Fixes temperature and pressure, precomputing temperature-dependent terms.
    ///
    /// # Errors
    ///
    /// Returns [`EosError::InvalidCondition`] if `t` or `p` is not finite and positive.
    pub fn state_point(&self, t: f64, p: f64) -> Result<StatePoint<'_>, EosError> {
        if !(t.is_finite() && p.is_finite() && t > 0.0 && p > 0.0) {
            return Err(EosError::InvalidCondition {
                temperature: t,
                pressure: p,
            });
        }

        let n = self.pure.len();
        let mut sqrt_ac = Vec::with_capacity(n);
        let mut s = Vec::with_capacity(n);
        let mut s_t = Vec::with_capacity(n);
        let mut s_tt = Vec::with_capacity(n);
        for c in &self.pure {
            let tc = c.critical_temperature;
            sqrt_ac.push(c.ac.sqrt());
            s.push(1.0 + c.m * (1.0 - (t / tc).sqrt()));
            s_t.push(-c.m / (2.0 * (t * tc).sqrt()));
            s_tt.push(c.m / (4.0 * tc.sqrt() * t.powf(1.5)));
        }

        let cross = DMatrix::from_fn(n, n, |i, j| sqrt_ac[i] * sqrt_ac[j] * s[i] * s[j]);

        Ok(StatePoint {
            eos: self,
            t,
            p,
            cross,
            sqrt_ac,
            s,
            s_t,
            s_tt,
        })
    }

    /// Evaluates one phase at `t` and `p`.
    ///
    /// # Errors
    ///
    /// Returns an [`EosError`] for non-physical conditions or when no root
    /// satisfies `Z > B`.
    pub fn evaluate(
        &self,
        x: &[f64],
        t: f64,
        p: f64,
        root: RootSelection,
    ) -> Result<EosPhase, EosError> {
        self.state_point(t, p)?.evaluate(x, root)
    }
}

fn pure_parameters(
    equation: CubicEquation,
    species: &Species,
    omega_a: f64,
    omega_b: f64,
) -> PureParameters {
    let tc = species.critical_temperature;
    let pc = species.critical_pressure;
    let w = species.acentric_factor;

    let (m, shift) = match equation {
        CubicEquation::Srk => (
            0.480 + 1.574 * w - 0.176 * w * w,
            0.40768 * (0.29441 - species.rackett_z()),
        ),
        CubicEquation::PengRobinson => (
            0.37464 + 1.54226 * w - 0.26992 * w * w,
            0.50033 * (0.25969 - species.rackett_z()),
        ),
    };

    PureParameters {
        critical_temperature: tc,
        critical_volume: species.critical_volume,
        ac: omega_a * (R * tc).powi(2) / pc,
        b: omega_b * R * tc / pc,
        m,
        shift: shift * R * tc / pc,
    }
}

/// The equation of state at a fixed temperature and pressure.
#[derive(Debug, Clone)]
pub struct StatePoint<'a> {
    eos: &'a CubicEos,
    t: f64,
    p: f64,
    /// `√(a_i a_j)` at `t`.
    cross: DMatrix<f64>,
    sqrt_ac: Vec<f64>,
    s: Vec<f64>,
    s_t: Vec<f64>,
    s_tt: Vec<f64>,
}

impl StatePoint<'_> {
    #[must_use]
    pub fn temperature(&self) -> f64 {
        self.t
    }

    #[must_use]
    pub fn pressure(&self) -> f64 {
        self.p
    }

    /// Evaluates the cubic, selects a root and computes `ln φ`.
    ///
    /// The composition is normalized first, so mole numbers work as well as
    /// fractions.
    ///
    /// # Errors
    ///
    /// Returns [`EosError::Degenerate`] if the composition is empty or no
    /// root satisfies `Z > B`.
    pub fn evaluate(&self, x: &[f64], root: RootSelection) -> Result<EosPhase, EosError> {
        let x = self.normalize(x)?;
        let Cubic { delta1, delta2 } = self.eos.cubic;
        let rt = R * self.t;

        let b_i: Vec<f64> = self.eos.pure.iter().map(|c| c.b).collect();
        let b: f64 = x.iter().zip(&b_i).map(|(xi, bi)| xi * bi).sum();
        let (a, a_bar) = self.mix(&x);

        let big_a = a * self.p / (rt * rt);
        let big_b = b * self.p / rt;
        let u = delta1 + delta2;
        let w = delta1 * delta2;

        let c2 = -(1.0 + big_b - u * big_b);
        let c1 = big_a + w * big_b * big_b - u * big_b - u * big_b * big_b;
        let c0 = -(big_a * big_b + w * big_b * big_b + w * big_b.powi(3));
        let roots = cubic::real_roots(c2, c1, c0);

        let valid: Vec<f64> = roots
            .iter()
            .copied()
            .filter(|z| z.is_finite() && *z > big_b)
            .collect();
        let (Some(&smallest), Some(&largest)) = (valid.first(), valid.last()) else {
            return Err(self.degenerate());
        };

        let log_term = |z: f64| ((z + delta1 * big_b) / (z + delta2 * big_b)).ln();
        let scale = big_a / (big_b * (delta1 - delta2));
        let gibbs = |z: f64| z - 1.0 - (z - big_b).ln() - scale * log_term(z);

        let (z, root) = if valid.len() == 1 {
            (smallest, self.single_root_branch(&x))
        } else {
            match root {
                RootSelection::Vapor => (largest, RootSelection::Vapor),
                RootSelection::Liquid => (smallest, RootSelection::Liquid),
                RootSelection::MinimumGibbs => {
                    if gibbs(smallest) < gibbs(largest) {
                        (smallest, RootSelection::Liquid)
                    } else {
                        (largest, RootSelection::Vapor)
                    }
                }
            }
        };

        let ln_z_minus_b = (z - big_b).ln();
        let log_z = log_term(z);
        let ln_phi = a_bar
            .iter()
            .zip(&b_i)
            .map(|(ak, bk)| {
                let b_ratio = bk / b;
                b_ratio * (z - 1.0) - ln_z_minus_b - scale * (ak / a - b_ratio) * log_z
            })
            .collect();

        let molar_volume = z * rt / self.p;
        let translated_volume = if self.eos.volume_correction {
            let shift: f64 = x
                .iter()
                .zip(&self.eos.pure)
                .map(|(xi, c)| xi * c.shift)
                .sum();
            molar_volume - shift
        } else {
            molar_volume
        };

        Ok(EosPhase {
            composition: x,
            roots,
            z,
            root,
            ln_phi,
            molar_volume,
            translated_volume,
            covolume: b,
            attraction: a,
        })
    }

    /// `∂ ln φ_i / ∂ n_j` at one mole total, by central differences on the
    /// root branch selected at `x`.
    ///
    /// Entry `(i, j)` holds the derivative of `ln φ_i` with respect to `n_j`.
    /// For a phase holding `N` moles, divide by `N`.
    ///
    /// # Errors
    ///
    /// Returns an [`EosError`] if any perturbed evaluation fails.
    pub fn ln_phi_jacobian(
        &self,
        x: &[f64],
        root: RootSelection,
    ) -> Result<DMatrix<f64>, EosError> {
        let base = self.evaluate(x, root)?;
        let branch = base.root;
        let n = base.composition.len();
        let mut jacobian = DMatrix::zeros(n, n);

        for j in 0..n {
            let nj = base.composition[j];
            let h = 1e-6 * nj.max(1e-6);

            let mut up = base.composition.clone();
            up[j] += h;
            let plus = self.evaluate(&up, branch)?.ln_phi;

            let (minus, span) = if nj > h {
                let mut down = base.composition.clone();
                down[j] -= h;
                (self.evaluate(&down, branch)?.ln_phi, 2.0 * h)
            } else {
                (base.ln_phi.clone(), h)
            };

            for i in 0..n {
                jacobian[(i, j)] = (plus[i] - minus[i]) / span;
            }
        }

        Ok(jacobian)
    }

    /// Residual properties of an evaluated phase.
    #[must_use]
    pub fn departure(&self, phase: &EosPhase) -> Departure {
        let x = &phase.composition;
        let n = x.len();
        let g = |i: usize, j: usize| self.sqrt_ac[i] * self.sqrt_ac[j];

        let cross_t =
            DMatrix::from_fn(n, n, |i, j| g(i, j) * (self.s_t[i] * self.s[j] + self.s[i] * self.s_t[j]));
        let cross_tt = DMatrix::from_fn(n, n, |i, j| {
            g(i, j)
                * (self.s_tt[i] * self.s[j]
                    + 2.0 * self.s_t[i] * self.s_t[j]
                    + self.s[i] * self.s_tt[j])
        });

        let attraction = Attraction {
            a: phase.attraction,
            a_t: self.quadratic(x, &cross_t),
            a_tt: self.quadratic(x, &cross_tt),
        };

        self.eos
            .cubic
            .departure(self.t, phase.molar_volume, phase.covolume, attraction)
    }

    /// Mixture attraction `a` and the partial terms `(1/n)·∂(n²a)/∂n_k`.
    fn mix(&self, x: &[f64]) -> (f64, Vec<f64>) {
        let xv = DVector::from_column_slice(x);
        let q = self.cross.component_mul(&self.eos.symmetric);
        let qx = &q * &xv;

        let mut a = xv.dot(&qx);
        let mut a_bar: Vec<f64> = qx.iter().map(|v| 2.0 * v).collect();

        if let Some(d) = &self.eos.asymmetric {
            let dm = self.cross.component_mul(d);
            let dx = &dm * &xv;
            let x2 = xv.component_mul(&xv);
            let cubic_sum = x2.dot(&dx);
            let column = dm.transpose() * &x2;

            a += cubic_sum;
            for (k, value) in a_bar.iter_mut().enumerate() {
                *value += 2.0 * x[k] * dx[k] + column[k] - cubic_sum;
            }
        }

        (a, a_bar)
    }

    /// Mixes an arbitrary `√(a_i a_j)`-like matrix with the active rule.
    fn quadratic(&self, x: &[f64], cross: &DMatrix<f64>) -> f64 {
        let xv = DVector::from_column_slice(x);
        let mut value = xv.dot(&(cross.component_mul(&self.eos.symmetric) * &xv));
        if let Some(d) = &self.eos.asymmetric {
            let x2 = xv.component_mul(&xv);
            value += x2.dot(&(cross.component_mul(d) * &xv));
        }
        value
    }

    fn normalize(&self, x: &[f64]) -> Result<Vec<f64>, EosError> {
        let total: f64 = x.iter().sum();
        if x.len() != self.eos.pure.len()
            || !total.is_finite()
            || total <= 0.0
            || x.iter().any(|v| *v < 0.0)
        {
            return Err(self.degenerate());
        }
        Ok(x.iter().map(|v| v / total).collect())
    }

    /// Branch of a lone root: vapor at or above the Li pseudo-critical
    /// temperature of `x`, liquid below it.
    fn single_root_branch(&self, x: &[f64]) -> RootSelection {
        let critical = self
            .eos
            .pure
            .iter()
            .map(|c| (c.critical_temperature, c.critical_volume));
        if self.t >= pseudo_critical_temperature(x, critical) {
            RootSelection::Vapor
        } else {
            RootSelection::Liquid
        }
    }

    fn degenerate(&self) -> EosError {
        EosError::Degenerate {
            temperature: self.t,
            pressure: self.p,
        }
    }
}

/// Li's pseudo-critical temperature `Σ φ_i Tc_i`, `φ_i = x_i Vc_i / Σ x_j Vc_j`.
///
/// `critical` yields `(Tc_i, Vc_i)` in the order of `x`.
pub(crate) fn pseudo_critical_temperature(
    x: &[f64],
    critical: impl Iterator<Item = (f64, f64)> + Clone,
) -> f64 {
    let volume: f64 = x.iter().zip(critical.clone()).map(|(xi, (_, vc))| xi * vc).sum();
    x.iter()
        .zip(critical)
        .map(|(xi, (tc, vc))| xi * vc / volume * tc)
        .sum()
}

/// Wilson's correlation, `ln K_i = ln(Pc_i/P) + 5.373(1 + ω_i)(1 − Tc_i/T)`.
#[must_use]
pub fn wilson_k_values(species: &[Species], t: f64, p: f64) -> Vec<f64> {
    species
        .iter()
        .map(|s| {
            let ln_k = (s.critical_pressure / p).ln()
                + 5.373 * (1.0 + s.acentric_factor) * (1.0 - s.critical_temperature / t);
            ln_k.exp()
        })
        .collect()
}
