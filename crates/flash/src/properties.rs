//! Per-phase and bulk properties of a flash result.
//!
//! Caloric properties combine an ideal-gas reference, integrated from
//! `cp = A + B·T + C·T² + D·T³` starting at 298.15 K and 1 atm, with the
//! equation-of-state departure functions. Transport properties come from a
//! [`TransportModel`].
//!
//! Properties that do not exist are `None`, never zero: a phase that is not
//! present, the speed of sound where `(∂P/∂v)_T ≥ 0`, and the bulk
//! Joule–Thomson coefficient and speed of sound.

mod report;
mod transport;

pub use report::{PropertyReport, PropertyRow};
pub use transport::{CorrespondingStates, TransportModel, TransportState};

use uom::si::{
    dynamic_viscosity::pascal_second,
    f64::{
        DynamicViscosity, MassDensity, MolarEnergy, MolarHeatCapacity, MolarMass, MolarVolume,
        Pressure, Ratio, ThermalConductivity, ThermodynamicTemperature, Velocity,
    },
    mass_density::kilogram_per_cubic_meter,
    molar_energy::joule_per_mole,
    molar_heat_capacity::joule_per_kelvin_mole,
    molar_mass::kilogram_per_mole,
    molar_volume::cubic_meter_per_mole,
    ratio::percent,
    thermal_conductivity::watt_per_meter_kelvin,
    velocity::meter_per_second,
};

use crate::{
    eos::CubicEos,
    error::PropertyError,
    flash::{Equilibrium, PhaseKind, PhaseState},
    registry::Species,
    units::{self, GAS_CONSTANT as R, JouleThomsonCoefficient, MolarEntropy, REFERENCE_PRESSURE},
};

/// Properties of one phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseProperties {
    pub mole_percent: Ratio,
    pub weight_percent: Ratio,
    /// Translated when volume correction is on.
    pub molar_volume: MolarVolume,
    pub volume_percent: Ratio,
    pub density: MassDensity,
    /// Compressibility factor from the cubic.
    pub z: f64,
    pub molar_mass: MolarMass,
    pub enthalpy: MolarEnergy,
    pub entropy: MolarEntropy,
    pub cp: MolarHeatCapacity,
    pub cv: MolarHeatCapacity,
    /// `Cp/Cv`.
    pub kappa: f64,
    pub joule_thomson: JouleThomsonCoefficient,
    /// `None` where `(∂P/∂v)_T ≥ 0`.
    pub speed_of_sound: Option<Velocity>,
    pub viscosity: DynamicViscosity,
    pub thermal_conductivity: ThermalConductivity,
}

/// Bulk properties of the whole system.
///
/// Extensive molar properties are phase-fraction weighted, and transport
/// properties are volume-fraction weighted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixtureProperties {
    pub phase_count: usize,
    pub pressure: Pressure,
    pub temperature: ThermodynamicTemperature,
    pub mole_percent: Ratio,
    pub weight_percent: Ratio,
    /// Total volume per total moles.
    pub molar_volume: MolarVolume,
    pub volume_percent: Ratio,
    /// Total mass per total volume.
    pub density: MassDensity,
    pub z: f64,
    pub molar_mass: MolarMass,
    pub enthalpy: MolarEnergy,
    pub entropy: MolarEntropy,
    pub cp: MolarHeatCapacity,
    pub cv: MolarHeatCapacity,
    pub kappa: f64,
    /// Undefined for the bulk system.
    pub joule_thomson: Option<JouleThomsonCoefficient>,
    /// Undefined for the bulk system.
    pub speed_of_sound: Option<Velocity>,
    pub viscosity: DynamicViscosity,
    pub thermal_conductivity: ThermalConductivity,
}

/// Computes the property report of a flash result with the default
/// [`CorrespondingStates`] transport model.
///
/// # Errors
///
/// Returns a [`PropertyError`] if a phase can no longer be evaluated or a
/// transport property is not finite.
pub fn compute_properties(equilibrium: &Equilibrium) -> Result<PropertyReport, PropertyError> {
    compute_properties_with(equilibrium, &CorrespondingStates)
}

/// Computes the property report of a flash result with a custom transport
/// model.
///
/// # Errors
///
/// Returns a [`PropertyError`] if a phase can no longer be evaluated or a
/// transport property fails.
pub fn compute_properties_with<T: TransportModel>(
    equilibrium: &Equilibrium,
    transport: &T,
) -> Result<PropertyReport, PropertyError> {
    let mixture = equilibrium.mixture();
    let conditions = equilibrium.conditions();
    let (t, p) = (conditions.kelvin(), conditions.pascal());
    let eos = CubicEos::new(mixture, equilibrium.config());
    let state = eos.state_point(t, p)?;

    let phases = equilibrium.phases();
    let total_mass: f64 = phases
        .iter()
        .map(|phase| phase.fraction * mixture.molar_mass(&phase.composition))
        .sum();
    let total_volume: f64 = phases
        .iter()
        .map(|phase| phase.fraction * phase.molar_volume)
        .sum();

    let mut computed = Vec::with_capacity(phases.len());
    for phase in phases {
        let evaluated = state.evaluate(&phase.composition, phase.root)?;
        let departure = state.departure(&evaluated);
        let species = mixture.components();

        let molar_mass = mixture.molar_mass(&phase.composition);
        let ideal = IdealGas::of(species, &phase.composition, t, p);
        let cp = ideal.cp + departure.cp;
        let cv = ideal.cp - R + departure.cv;

        // JT and sound speed use the untranslated volume the derivatives belong to.
        let v = evaluated.molar_volume;
        let dv_dt = -departure.dp_dt / departure.dp_dv;
        let joule_thomson = (t * dv_dt - v) / cp;
        let speed_of_sound = (departure.dp_dv < 0.0)
            .then(|| (-v * v * (cp / cv) * departure.dp_dv / molar_mass).sqrt());

        let transport_state = TransportState {
            species,
            composition: &phase.composition,
            temperature: t,
            molar_volume: phase.molar_volume,
        };

        let properties = PhaseProperties {
            mole_percent: Ratio::new::<percent>(100.0 * phase.fraction),
            weight_percent: Ratio::new::<percent>(
                100.0 * phase.fraction * molar_mass / total_mass,
            ),
            molar_volume: MolarVolume::new::<cubic_meter_per_mole>(phase.molar_volume),
            volume_percent: Ratio::new::<percent>(
                100.0 * phase.fraction * phase.molar_volume / total_volume,
            ),
            density: MassDensity::new::<kilogram_per_cubic_meter>(molar_mass / phase.molar_volume),
            z: phase.z,
            molar_mass: MolarMass::new::<kilogram_per_mole>(molar_mass),
            enthalpy: MolarEnergy::new::<joule_per_mole>(ideal.enthalpy + departure.enthalpy),
            entropy: MolarEntropy::new::<joule_per_kelvin_mole>(ideal.entropy + departure.entropy),
            cp: MolarHeatCapacity::new::<joule_per_kelvin_mole>(cp),
            cv: MolarHeatCapacity::new::<joule_per_kelvin_mole>(cv),
            kappa: cp / cv,
            joule_thomson: units::joule_thomson(joule_thomson),
            speed_of_sound: speed_of_sound.map(Velocity::new::<meter_per_second>),
            viscosity: transport.viscosity(&transport_state)?,
            thermal_conductivity: transport.thermal_conductivity(&transport_state)?,
        };
        computed.push((phase, properties));
    }

    let bulk = bulk_properties(equilibrium, &computed, total_mass, total_volume);
    let find = |kind: PhaseKind| {
        computed
            .iter()
            .find(|(phase, _)| phase.kind == kind)
            .map(|(_, properties)| *properties)
    };

    Ok(PropertyReport {
        mixture: bulk,
        vapor: find(PhaseKind::Vapor),
        liquid: find(PhaseKind::Liquid),
        aqueous: find(PhaseKind::Aqueous),
    })
}

fn bulk_properties(
    equilibrium: &Equilibrium,
    phases: &[(&PhaseState, PhaseProperties)],
    total_mass: f64,
    total_volume: f64,
) -> MixtureProperties {
    let mole_weighted = |f: fn(&PhaseProperties) -> f64| -> f64 {
        phases
            .iter()
            .map(|(phase, properties)| phase.fraction * f(properties))
            .sum()
    };
    let volume_weighted = |f: fn(&PhaseProperties) -> f64| -> f64 {
        phases
            .iter()
            .map(|(phase, properties)| phase.fraction * phase.molar_volume / total_volume * f(properties))
            .sum()
    };

    let cp = mole_weighted(|p| p.cp.get::<joule_per_kelvin_mole>());
    let cv = mole_weighted(|p| p.cv.get::<joule_per_kelvin_mole>());

    MixtureProperties {
        phase_count: equilibrium.phase_count(),
        pressure: equilibrium.pressure(),
        temperature: equilibrium.temperature(),
        mole_percent: Ratio::new::<percent>(100.0),
        weight_percent: Ratio::new::<percent>(100.0),
        molar_volume: MolarVolume::new::<cubic_meter_per_mole>(total_volume),
        volume_percent: Ratio::new::<percent>(100.0),
        density: MassDensity::new::<kilogram_per_cubic_meter>(total_mass / total_volume),
        z: mole_weighted(|p| p.z),
        molar_mass: MolarMass::new::<kilogram_per_mole>(total_mass),
        enthalpy: MolarEnergy::new::<joule_per_mole>(mole_weighted(|p| {
            p.enthalpy.get::<joule_per_mole>()
        })),
        entropy: MolarEntropy::new::<joule_per_kelvin_mole>(mole_weighted(|p| {
            p.entropy.get::<joule_per_kelvin_mole>()
        })),
        cp: MolarHeatCapacity::new::<joule_per_kelvin_mole>(cp),
        cv: MolarHeatCapacity::new::<joule_per_kelvin_mole>(cv),
        kappa: cp / cv,
        joule_thomson: None,
        speed_of_sound: None,
        viscosity: DynamicViscosity::new::<pascal_second>(volume_weighted(|p| {
            p.viscosity.get::<pascal_second>()
        })),
        thermal_conductivity: ThermalConductivity::new::<watt_per_meter_kelvin>(volume_weighted(
            |p| p.thermal_conductivity.get::<watt_per_meter_kelvin>(),
        )),
    }
}

/// Ideal-gas mixture properties at `t` and `p`, per mole.
struct IdealGas {
    enthalpy: f64,
    entropy: f64,
    cp: f64,
}

impl IdealGas {
    fn of(species: &[Species], x: &[f64], t: f64, p: f64) -> Self {
        let mut ideal = Self {
            enthalpy: 0.0,
            entropy: -R * (p / REFERENCE_PRESSURE).ln(),
            cp: 0.0,
        };
        for (s, &xi) in species.iter().zip(x) {
            ideal.enthalpy += xi * s.ideal_gas_enthalpy(t);
            ideal.cp += xi * s.ideal_gas_cp(t);
            ideal.entropy += xi * s.ideal_gas_entropy(t);
            if xi > 0.0 {
                ideal.entropy -= R * xi * xi.ln();
            }
        }
        ideal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::{
        conditions::Conditions, config::FlashConfig, flash::flash, mixture::Mixture,
        registry::Database,
    };

    fn report(feed: &[(&str, f64)], t: f64, p: f64) -> (Equilibrium, PropertyReport) {
        let mixture = Mixture::new(&Database::builtin().unwrap(), feed).unwrap();
        let conditions = Conditions::from_si(t, p).unwrap();
        let result = flash(&mixture, &conditions, &FlashConfig::default()).unwrap();
        let report = compute_properties(&result).unwrap();
        (result, report)
    }

    #[test]
    fn methane_gas_is_nearly_ideal() {
        let (_, report) = report(&[("methane", 1.0)], 300.0, 1e5);
        let gas = report.vapor.unwrap();
        assert!(report.liquid.is_none());
        assert!(report.aqueous.is_none());

        assert_relative_eq!(gas.z, 0.998, epsilon = 2e-3);
        assert_relative_eq!(gas.density.get::<kilogram_per_cubic_meter>(), 0.644, max_relative = 0.01);
        assert_relative_eq!(gas.kappa, 1.30, epsilon = 0.03);

        // About 450 m/s measured.
        let c = gas.speed_of_sound.unwrap().get::<meter_per_second>();
        assert_relative_eq!(c, 450.0, max_relative = 0.03);

        // Roughly 0.45 K/bar.
        let jt = gas.joule_thomson.value;
        assert!(jt > 2e-6 && jt < 8e-6, "JT coefficient {jt} K/Pa");

        // Ideal-gas enthalpy from 298.15 K plus a small negative departure.
        let h = gas.enthalpy.get::<joule_per_mole>();
        assert!(h > 0.0 && h < 100.0, "enthalpy {h} J/mol");
    }

    #[test]
    fn bulk_values_combine_phases() {
        let (result, report) = report(&[("propane", 0.5), ("n-butane", 0.5)], 300.0, 5e5);
        assert_eq!(result.phase_count(), 2);
        let (gas, oil) = (report.vapor.unwrap(), report.liquid.unwrap());

        let percents = |f: fn(&PhaseProperties) -> f64| f(&gas) + f(&oil);
        assert_relative_eq!(percents(|p| p.mole_percent.get::<percent>()), 100.0, epsilon = 1e-9);
        assert_relative_eq!(percents(|p| p.weight_percent.get::<percent>()), 100.0, epsilon = 1e-9);
        assert_relative_eq!(percents(|p| p.volume_percent.get::<percent>()), 100.0, epsilon = 1e-9);

        let beta_gas = gas.mole_percent.get::<percent>() / 100.0;
        let expected_h = beta_gas * gas.enthalpy.get::<joule_per_mole>()
            + (1.0 - beta_gas) * oil.enthalpy.get::<joule_per_mole>();
        assert_relative_eq!(
            report.mixture.enthalpy.get::<joule_per_mole>(),
            expected_h,
            max_relative = 1e-9
        );

        assert!(oil.density > gas.density);
        assert!(oil.viscosity > gas.viscosity);
        assert!(gas.enthalpy > oil.enthalpy);
        assert!(report.mixture.joule_thomson.is_none());
        assert!(report.mixture.speed_of_sound.is_none());
        assert_eq!(report.mixture.phase_count, 2);
    }

    #[test]
    fn absent_phases_are_nan_in_the_flat_vector() {
        let (_, report) = report(&[("methane", 0.9), ("ethane", 0.1)], 300.0, 1e6);
        let values = report.to_vec();

        assert_eq!(values.len(), 67);
        assert!(values[..15].iter().all(|v| v.is_finite()));
        assert!(values[15].is_nan() && values[16].is_nan());
        assert!(values[19..35].iter().all(|v| v.is_finite()));
        assert!(values[35..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn table_marks_undefined_values() {
        let (_, report) = report(&[("methane", 0.9), ("ethane", 0.1)], 300.0, 1e6);
        let rows = report.rows();
        assert_eq!(rows.len(), 19);
        assert_eq!(rows[0].mixture, Some(1.0));
        assert!(rows.iter().all(|row| row.aqueous.is_none()));

        let text = report.to_string();
        assert!(text.contains("---"));
        assert!(text.contains("thermal conductivity"));
    }
}
