use std::fmt;

use uom::si::f64::{Pressure, ThermodynamicTemperature};

use crate::{
    conditions::Conditions,
    config::FlashConfig,
    eos::{EosPhase, RootSelection},
    mixture::Mixture,
};

/// Identity of a coexisting phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PhaseKind {
    Vapor,
    /// Hydrocarbon-rich liquid.
    Liquid,
    /// Water-rich liquid.
    Aqueous,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PhaseKind::Vapor => "vapor",
            PhaseKind::Liquid => "liquid",
            PhaseKind::Aqueous => "aqueous",
        })
    }
}

/// One phase of an equilibrium result.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseState {
    pub kind: PhaseKind,
    /// Mole fractions, in mixture order.
    pub composition: Vec<f64>,
    /// Phase mole fraction `β`.
    pub fraction: f64,
    /// Compressibility factor from the cubic.
    pub z: f64,
    pub ln_phi: Vec<f64>,
    /// Molar volume in m³/mol, translated when volume correction is on.
    pub molar_volume: f64,
    /// Molar volume from the cubic before translation, m³/mol.
    pub eos_volume: f64,
    /// Root branch the phase was evaluated on.
    pub root: RootSelection,
}

impl PhaseState {
    pub(super) fn from_eos(kind: PhaseKind, fraction: f64, phase: EosPhase) -> Self {
        Self {
            kind,
            composition: phase.composition,
            fraction,
            z: phase.z,
            ln_phi: phase.ln_phi,
            molar_volume: phase.translated_volume,
            eos_volume: phase.molar_volume,
            root: phase.root,
        }
    }
}

/// How a flash ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Converged,
    /// An observer asked to stop, or the time budget ran out.
    StoppedEarly,
    /// The iteration budget ran out. Only seen on estimates carried by
    /// [`FlashError::NotConverged`](crate::FlashError::NotConverged).
    MaxIterations,
}

/// Result of a flash: coexisting phases plus diagnostics.
///
/// Phases are ordered vapor, liquid, aqueous, and each kind appears at most
/// once.
#[derive(Debug, Clone, PartialEq)]
pub struct Equilibrium {
    pub(super) mixture: Mixture,
    pub(super) config: FlashConfig,
    pub(super) conditions: Conditions,
    pub(super) phases: Vec<PhaseState>,
    /// SS and Newton iterations used.
    pub iterations: usize,
    /// Final convergence measure.
    pub residual: f64,
    pub status: Status,
}

impl Equilibrium {
    #[must_use]
    pub fn phases(&self) -> &[PhaseState] {
        &self.phases
    }

    #[must_use]
    pub fn phase(&self, kind: PhaseKind) -> Option<&PhaseState> {
        self.phases.iter().find(|p| p.kind == kind)
    }

    #[must_use]
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    #[must_use]
    pub fn has_phase(&self, kind: PhaseKind) -> bool {
        self.phase(kind).is_some()
    }

    /// `y_i / x_i` between phases `a` and `b`, if both are present.
    #[must_use]
    pub fn k_values(&self, a: PhaseKind, b: PhaseKind) -> Option<Vec<f64>> {
        let (a, b) = (self.phase(a)?, self.phase(b)?);
        Some(
            a.composition
                .iter()
                .zip(&b.composition)
                .map(|(ya, xb)| ya / xb)
                .collect(),
        )
    }

    /// `max_i |Σ_k β_k x_ik − z_i|`.
    #[must_use]
    pub fn material_balance_error(&self) -> f64 {
        self.mixture
            .fractions()
            .iter()
            .enumerate()
            .map(|(i, z)| {
                let recombined: f64 = self
                    .phases
                    .iter()
                    .map(|p| p.fraction * p.composition[i])
                    .sum();
                (recombined - z).abs()
            })
            .fold(0.0, f64::max)
    }

    #[must_use]
    pub fn phase_fraction_sum(&self) -> f64 {
        self.phases.iter().map(|p| p.fraction).sum()
    }

    #[must_use]
    pub fn converged(&self) -> bool {
        self.status == Status::Converged
    }

    #[must_use]
    pub fn temperature(&self) -> ThermodynamicTemperature {
        self.conditions.temperature()
    }

    #[must_use]
    pub fn pressure(&self) -> Pressure {
        self.conditions.pressure()
    }

    #[must_use]
    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    #[must_use]
    pub fn mixture(&self) -> &Mixture {
        &self.mixture
    }

    #[must_use]
    pub fn config(&self) -> &FlashConfig {
        &self.config
    }
}
