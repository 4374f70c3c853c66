//! Quantity aliases and constants missing from `uom`.

use uom::{
    si::{
        ISQ, Quantity, SI,
        f64::{Pressure, TemperatureInterval},
        pressure::pascal,
        temperature_interval::kelvin,
    },
    typenum::{N1, N2, P1, P2, Z0},
};

/// Universal gas constant, J/(mol·K).
pub const GAS_CONSTANT: f64 = 8.314_462_618;

/// Reference temperature for ideal-gas enthalpy and entropy, K.
pub const REFERENCE_TEMPERATURE: f64 = 298.15;

/// Reference pressure for ideal-gas entropy, Pa.
pub const REFERENCE_PRESSURE: f64 = 101_325.0;

/// Molar entropy, J/(mol·K) in SI.
pub type MolarEntropy = Quantity<ISQ<P2, P1, N2, Z0, N1, N1, Z0>, SI<f64>, f64>;

/// Joule–Thomson coefficient, K/Pa in SI.
pub type JouleThomsonCoefficient = Quantity<ISQ<P1, N1, P2, Z0, P1, Z0, Z0>, SI<f64>, f64>;

/// Builds a Joule–Thomson coefficient from a value in K/Pa.
#[must_use]
pub fn joule_thomson(kelvin_per_pascal: f64) -> JouleThomsonCoefficient {
    TemperatureInterval::new::<kelvin>(kelvin_per_pascal) / Pressure::new::<pascal>(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use uom::si::{
        f64::MolarHeatCapacity, molar_heat_capacity::joule_per_kelvin_mole, pressure::bar,
    };

    #[test]
    fn joule_thomson_from_interval_over_pressure() {
        let jt: JouleThomsonCoefficient =
            TemperatureInterval::new::<kelvin>(0.5) / Pressure::new::<bar>(1.0);
        assert_relative_eq!(jt.value, 0.5e-5);
        assert_relative_eq!(joule_thomson(0.5e-5).value, jt.value);
    }

    #[test]
    fn molar_entropy_shares_heat_capacity_units() {
        let s: MolarEntropy = MolarHeatCapacity::new::<joule_per_kelvin_mole>(GAS_CONSTANT);
        assert_relative_eq!(s.get::<joule_per_kelvin_mole>(), GAS_CONSTANT);
    }
}
