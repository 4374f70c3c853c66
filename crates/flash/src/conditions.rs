use thiserror::Error;
use uom::si::{
    f64::{Pressure, ThermodynamicTemperature},
    pressure::pascal,
    thermodynamic_temperature::kelvin,
};

/// Temperature and pressure at which a flash is performed.
///
/// Both values are validated on construction, so a `Conditions` always
/// holds a finite, strictly positive absolute temperature and pressure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conditions {
    temperature: ThermodynamicTemperature,
    pressure: Pressure,
}

/// Errors raised when a temperature or pressure is outside the physical range.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConditionError {
    #[error("temperature must be finite and positive, got {0} K")]
    Temperature(f64),

    #[error("pressure must be finite and positive, got {0} Pa")]
    Pressure(f64),
}

impl Conditions {
    /// Creates validated flash conditions.
    ///
    /// # Errors
    ///
    /// Returns a [`ConditionError`] if either value is non-finite or not
    /// strictly positive.
    pub fn new(
        temperature: ThermodynamicTemperature,
        pressure: Pressure,
    ) -> Result<Self, ConditionError> {
        let t = temperature.get::<kelvin>();
        if !t.is_finite() || t <= 0.0 {
            return Err(ConditionError::Temperature(t));
        }
        let p = pressure.get::<pascal>();
        if !p.is_finite() || p <= 0.0 {
            return Err(ConditionError::Pressure(p));
        }

        Ok(Self {
            temperature,
            pressure,
        })
    }

    /// Creates validated conditions from kelvin and pascal.
    ///
    /// # Errors
    ///
    /// Returns a [`ConditionError`] if either value is non-finite or not
    /// strictly positive.
    pub fn from_si(temperature: f64, pressure: f64) -> Result<Self, ConditionError> {
        Self::new(
            ThermodynamicTemperature::new::<kelvin>(temperature),
            Pressure::new::<pascal>(pressure),
        )
    }

    #[must_use]
    pub fn temperature(&self) -> ThermodynamicTemperature {
        self.temperature
    }

    #[must_use]
    pub fn pressure(&self) -> Pressure {
        self.pressure
    }

    /// Returns a copy at a different pressure.
    ///
    /// # Errors
    ///
    /// Returns a [`ConditionError`] if the new pressure is invalid.
    pub fn with_pressure(self, pressure: Pressure) -> Result<Self, ConditionError> {
        Self::new(self.temperature, pressure)
    }

    pub(crate) fn kelvin(&self) -> f64 {
        self.temperature.get::<kelvin>()
    }

    pub(crate) fn pascal(&self) -> f64 {
        self.pressure.get::<pascal>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use uom::si::{pressure::bar, thermodynamic_temperature::degree_celsius};

    #[test]
    fn converts_units() {
        let conditions = Conditions::new(
            ThermodynamicTemperature::new::<degree_celsius>(45.0),
            Pressure::new::<bar>(10.0),
        )
        .unwrap();

        assert_relative_eq!(conditions.kelvin(), 318.15, epsilon = 1e-12);
        assert_relative_eq!(conditions.pascal(), 1.0e6);
    }

    #[test]
    fn rejects_non_physical_values() {
        assert_eq!(
            Conditions::from_si(0.0, 1e5),
            Err(ConditionError::Temperature(0.0))
        );
        assert_eq!(
            Conditions::from_si(300.0, -1.0),
            Err(ConditionError::Pressure(-1.0))
        );
        assert!(Conditions::from_si(f64::NAN, 1e5).is_err());
    }
}
