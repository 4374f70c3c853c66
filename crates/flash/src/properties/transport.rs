//! Viscosity and thermal conductivity of a single phase.

use uom::si::{
    dynamic_viscosity::pascal_second,
    f64::{DynamicViscosity, ThermalConductivity},
    thermal_conductivity::watt_per_meter_kelvin,
};

use crate::{error::PropertyError, registry::Species, units::GAS_CONSTANT as R};

/// State of one phase handed to a [`TransportModel`].
///
/// All values are SI.
#[derive(Debug, Clone, Copy)]
pub struct TransportState<'a> {
    pub species: &'a [Species],
    pub composition: &'a [f64],
    /// Temperature, K.
    pub temperature: f64,
    /// Molar volume, m³/mol.
    pub molar_volume: f64,
}

/// Correlations for transport properties.
///
/// Implement this trait to plug a different model into
/// [`compute_properties_with`](super::compute_properties_with).
pub trait TransportModel {
    /// Returns the dynamic viscosity of the phase.
    ///
    /// # Errors
    ///
    /// Returns a [`PropertyError`] if the viscosity cannot be calculated.
    fn viscosity(&self, state: &TransportState<'_>) -> Result<DynamicViscosity, PropertyError>;

    /// Returns the thermal conductivity of the phase.
    ///
    /// # Errors
    ///
    /// Returns a [`PropertyError`] if the conductivity cannot be calculated.
    fn thermal_conductivity(
        &self,
        state: &TransportState<'_>,
    ) -> Result<ThermalConductivity, PropertyError>;
}

/// Corresponding-states transport correlations.
///
/// Viscosity follows Lohrenz–Bray–Clark on top of the Stiel–Thodos dilute gas
/// viscosity with Herning–Zipperer mixing. Conductivity adds the Stiel–Thodos
/// dense-fluid excess to a modified Eucken dilute gas value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CorrespondingStates;

const PA_PER_ATM: f64 = 101_325.0;
const PA_PER_BAR: f64 = 1e5;
const CENTIPOISE: f64 = 1e-3;

impl TransportModel for CorrespondingStates {
    fn viscosity(&self, state: &TransportState<'_>) -> Result<DynamicViscosity, PropertyError> {
        let pseudo = Pseudo::of(state)?;
        let dilute = dilute_viscosity(state);

        let xi = pseudo.critical_temperature.powf(1.0 / 6.0)
            / ((pseudo.molar_mass * 1e3).sqrt() * (pseudo.critical_pressure / PA_PER_ATM).powf(2.0 / 3.0));
        let rho_r = pseudo.reduced_density(state.molar_volume);
        let poly = 0.1023
            + rho_r * (0.023_364 + rho_r * (0.058_533 + rho_r * (-0.040_758 + rho_r * 0.009_332_4)));
        let centipoise = dilute / CENTIPOISE + (poly.powi(4) - 1e-4) / xi;

        checked(centipoise * CENTIPOISE, "viscosity")
            .map(DynamicViscosity::new::<pascal_second>)
    }

    fn thermal_conductivity(
        &self,
        state: &TransportState<'_>,
    ) -> Result<ThermalConductivity, PropertyError> {
        let pseudo = Pseudo::of(state)?;
        let dilute = dilute_conductivity(state);

        let gamma = 210.0
            * (pseudo.critical_temperature * (pseudo.molar_mass * 1e3).powi(3)
                / (pseudo.critical_pressure / PA_PER_BAR).powi(4))
            .powf(1.0 / 6.0);
        let zc = pseudo.critical_pressure * pseudo.critical_volume
            / (R * pseudo.critical_temperature);
        let rho_r = pseudo.reduced_density(state.molar_volume);

        let excess = if rho_r < 0.5 {
            1.22e-2 * ((0.535 * rho_r).exp() - 1.0)
        } else if rho_r < 2.0 {
            1.14e-2 * ((0.67 * rho_r).exp() - 1.069)
        } else {
            // Fitted up to ρr = 2.8 and extrapolated above.
            2.60e-3 * ((1.155 * rho_r).exp() + 2.016)
        };

        checked(dilute + excess / (gamma * zc.powi(5)), "thermal conductivity")
            .map(ThermalConductivity::new::<watt_per_meter_kelvin>)
    }
}

/// Mole-fraction averaged critical constants.
struct Pseudo {
    critical_temperature: f64,
    critical_pressure: f64,
    critical_volume: f64,
    molar_mass: f64,
}

impl Pseudo {
    fn of(state: &TransportState<'_>) -> Result<Self, PropertyError> {
        if state.species.len() != state.composition.len() {
            return Err(PropertyError::InvalidInput(format!(
                "{} species but {} mole fractions",
                state.species.len(),
                state.composition.len()
            )));
        }
        if !(state.temperature > 0.0 && state.molar_volume > 0.0) {
            return Err(PropertyError::InvalidInput(format!(
                "temperature {} K and molar volume {} m³/mol must be positive",
                state.temperature, state.molar_volume
            )));
        }

        let average = |f: fn(&Species) -> f64| -> f64 {
            state
                .species
                .iter()
                .zip(state.composition)
                .map(|(s, x)| x * f(s))
                .sum()
        };
        Ok(Self {
            critical_temperature: average(|s| s.critical_temperature),
            critical_pressure: average(|s| s.critical_pressure),
            critical_volume: average(|s| s.critical_volume),
            molar_mass: average(|s| s.molar_mass),
        })
    }

    fn reduced_density(&self, molar_volume: f64) -> f64 {
        self.critical_volume / molar_volume
    }
}

/// Stiel–Thodos low-pressure viscosity of one species, Pa·s.
fn species_dilute_viscosity(species: &Species, t: f64) -> f64 {
    let tr = t / species.critical_temperature;
    let xi = species.critical_temperature.powf(1.0 / 6.0)
        / ((species.molar_mass * 1e3).sqrt()
            * (species.critical_pressure / PA_PER_ATM).powf(2.0 / 3.0));
    let scaled = if tr <= 1.5 {
        34e-5 * tr.powf(0.94)
    } else {
        17.78e-5 * (4.58 * tr - 1.67).powf(0.625)
    };
    scaled / xi * CENTIPOISE
}

/// Herning–Zipperer mixture of the dilute species viscosities, Pa·s.
fn dilute_viscosity(state: &TransportState<'_>) -> f64 {
    let (numerator, denominator) = state
        .species
        .iter()
        .zip(state.composition)
        .fold((0.0, 0.0), |(num, den), (s, x)| {
            let weight = x * (s.molar_mass * 1e3).sqrt();
            (
                num + weight * species_dilute_viscosity(s, state.temperature),
                den + weight,
            )
        });
    numerator / denominator
}

/// Modified Eucken dilute conductivity, mixed with `M^(1/3)` weights, W/(m·K).
fn dilute_conductivity(state: &TransportState<'_>) -> f64 {
    let t = state.temperature;
    let (numerator, denominator) = state
        .species
        .iter()
        .zip(state.composition)
        .fold((0.0, 0.0), |(num, den), (s, x)| {
            let cv = s.ideal_gas_cp(t) - R;
            let conductivity =
                species_dilute_viscosity(s, t) * cv / s.molar_mass * (1.32 + 1.77 * R / cv);
            let weight = x * (s.molar_mass * 1e3).cbrt();
            (num + weight * conductivity, den + weight)
        });
    numerator / denominator
}

fn checked(value: f64, property: &'static str) -> Result<f64, PropertyError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(PropertyError::Calculation(format!(
            "{property} evaluated to {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use uom::si::{dynamic_viscosity::micropascal_second, thermal_conductivity::watt_per_meter_kelvin};

    use crate::registry::{ComponentRegistry, Database};

    fn species(names: &[&str]) -> Vec<Species> {
        let db = Database::builtin().unwrap();
        names.iter().map(|n| db.lookup(n).unwrap()).collect()
    }

    #[test]
    fn methane_gas_viscosity_is_close_to_measured() {
        let species = species(&["methane"]);
        let t = 300.0;
        let state = TransportState {
            species: &species,
            composition: &[1.0],
            temperature: t,
            molar_volume: R * t / 1e5,
        };

        // Measured value is about 11.2 μPa·s.
        let mu = CorrespondingStates.viscosity(&state).unwrap();
        assert_relative_eq!(mu.get::<micropascal_second>(), 11.2, max_relative = 0.15);

        // Measured value is about 0.034 W/(m·K).
        let k = CorrespondingStates.thermal_conductivity(&state).unwrap();
        assert_relative_eq!(k.get::<watt_per_meter_kelvin>(), 0.034, max_relative = 0.3);
    }

    #[test]
    fn denser_phase_is_more_viscous() {
        let species = species(&["n-hexane"]);
        let gas = TransportState {
            species: &species,
            composition: &[1.0],
            temperature: 400.0,
            molar_volume: R * 400.0 / 1e5,
        };
        let liquid = TransportState {
            molar_volume: 1.4e-4,
            ..gas
        };

        let model = CorrespondingStates;
        assert!(model.viscosity(&liquid).unwrap() > model.viscosity(&gas).unwrap());
        assert!(
            model.thermal_conductivity(&liquid).unwrap()
                > model.thermal_conductivity(&gas).unwrap()
        );
    }

    #[test]
    fn rejects_mismatched_input() {
        let species = species(&["methane", "ethane"]);
        let state = TransportState {
            species: &species,
            composition: &[1.0],
            temperature: 300.0,
            molar_volume: 0.02,
        };
        assert!(matches!(
            CorrespondingStates.viscosity(&state),
            Err(PropertyError::InvalidInput(_))
        ));
    }
}
