use std::fmt;

use uom::si::{
    dynamic_viscosity::pascal_second, mass_density::kilogram_per_cubic_meter,
    molar_energy::joule_per_mole, molar_heat_capacity::joule_per_kelvin_mole,
    molar_mass::gram_per_mole, molar_volume::cubic_meter_per_mole, pressure::pascal,
    ratio::percent, thermal_conductivity::watt_per_meter_kelvin,
    thermodynamic_temperature::kelvin, velocity::meter_per_second,
};

use super::{MixtureProperties, PhaseProperties};

/// Bulk and per-phase properties of a flash result.
///
/// Phases that are not present are `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyReport {
    pub mixture: MixtureProperties,
    pub vapor: Option<PhaseProperties>,
    pub liquid: Option<PhaseProperties>,
    pub aqueous: Option<PhaseProperties>,
}

/// One line of the property table.
///
/// Values are in the listed unit, and `None` marks an undefined value.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRow {
    pub name: &'static str,
    pub unit: &'static str,
    pub mixture: Option<f64>,
    pub vapor: Option<f64>,
    pub liquid: Option<f64>,
    pub aqueous: Option<f64>,
}

/// Name and unit of each per-phase property, in report order.
const PHASE_COLUMNS: [(&str, &str); 16] = [
    ("mole percent", "%"),
    ("weight percent", "%"),
    ("molar volume", "m3/mol"),
    ("volume percent", "%"),
    ("density", "kg/m3"),
    ("Z factor", "-"),
    ("molecular weight", "g/mol"),
    ("enthalpy", "J/mol"),
    ("entropy", "J/mol/K"),
    ("Cp", "J/mol/K"),
    ("Cv", "J/mol/K"),
    ("kappa (Cp/Cv)", "-"),
    ("JT coefficient", "K/Pa"),
    ("speed of sound", "m/s"),
    ("viscosity", "Pa s"),
    ("thermal conductivity", "W/m/K"),
];

impl PhaseProperties {
    fn values(&self) -> [Option<f64>; 16] {
        [
            Some(self.mole_percent.get::<percent>()),
            Some(self.weight_percent.get::<percent>()),
            Some(self.molar_volume.get::<cubic_meter_per_mole>()),
            Some(self.volume_percent.get::<percent>()),
            Some(self.density.get::<kilogram_per_cubic_meter>()),
            Some(self.z),
            Some(self.molar_mass.get::<gram_per_mole>()),
            Some(self.enthalpy.get::<joule_per_mole>()),
            Some(self.entropy.get::<joule_per_kelvin_mole>()),
            Some(self.cp.get::<joule_per_kelvin_mole>()),
            Some(self.cv.get::<joule_per_kelvin_mole>()),
            Some(self.kappa),
            Some(self.joule_thomson.value),
            self.speed_of_sound.map(|c| c.get::<meter_per_second>()),
            Some(self.viscosity.get::<pascal_second>()),
            Some(self.thermal_conductivity.get::<watt_per_meter_kelvin>()),
        ]
    }
}

impl MixtureProperties {
    fn values(&self) -> [Option<f64>; 19] {
        #[allow(clippy::cast_precision_loss)]
        let phase_count = self.phase_count as f64;
        [
            Some(phase_count),
            Some(self.pressure.get::<pascal>()),
            Some(self.temperature.get::<kelvin>()),
            Some(self.mole_percent.get::<percent>()),
            Some(self.weight_percent.get::<percent>()),
            Some(self.molar_volume.get::<cubic_meter_per_mole>()),
            Some(self.volume_percent.get::<percent>()),
            Some(self.density.get::<kilogram_per_cubic_meter>()),
            Some(self.z),
            Some(self.molar_mass.get::<gram_per_mole>()),
            Some(self.enthalpy.get::<joule_per_mole>()),
            Some(self.entropy.get::<joule_per_kelvin_mole>()),
            Some(self.cp.get::<joule_per_kelvin_mole>()),
            Some(self.cv.get::<joule_per_kelvin_mole>()),
            Some(self.kappa),
            self.joule_thomson.map(|jt| jt.value),
            self.speed_of_sound.map(|c| c.get::<meter_per_second>()),
            Some(self.viscosity.get::<pascal_second>()),
            Some(self.thermal_conductivity.get::<watt_per_meter_kelvin>()),
        ]
    }
}

impl PropertyReport {
    /// The report as a table: three mixture-only rows followed by the
    /// sixteen properties shared by the mixture and each phase.
    #[must_use]
    pub fn rows(&self) -> Vec<PropertyRow> {
        let mixture = self.mixture.values();
        let column = |phase: &Option<PhaseProperties>| phase.map(|p| p.values());
        let (vapor, liquid, aqueous) = (
            column(&self.vapor),
            column(&self.liquid),
            column(&self.aqueous),
        );

        let mut rows = vec![
            mixture_row("number of phases", "-", mixture[0]),
            mixture_row("pressure", "Pa", mixture[1]),
            mixture_row("temperature", "K", mixture[2]),
        ];
        for (i, (name, unit)) in PHASE_COLUMNS.into_iter().enumerate() {
            rows.push(PropertyRow {
                name,
                unit,
                mixture: mixture[i + 3],
                vapor: vapor.and_then(|v| v[i]),
                liquid: liquid.and_then(|v| v[i]),
                aqueous: aqueous.and_then(|v| v[i]),
            });
        }
        rows
    }

    /// The 67 report values: 19 mixture values, then 16 each for the gas,
    /// oil and aqueous phases. Undefined values are NaN.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        let absent = [None; 16];
        self.mixture
            .values()
            .into_iter()
            .chain(self.vapor.map_or(absent, |p| p.values()))
            .chain(self.liquid.map_or(absent, |p| p.values()))
            .chain(self.aqueous.map_or(absent, |p| p.values()))
            .map(|value| value.unwrap_or(f64::NAN))
            .collect()
    }
}

fn mixture_row(name: &'static str, unit: &'static str, value: Option<f64>) -> PropertyRow {
    PropertyRow {
        name,
        unit,
        mixture: value,
        vapor: None,
        liquid: None,
        aqueous: None,
    }
}

impl fmt::Display for PropertyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<22}{:>14}{:>14}{:>14}{:>14}  {}",
            "", "total", "gas", "oil", "aqueous", "unit"
        )?;
        for row in self.rows() {
            write!(f, "{:<22}", row.name)?;
            for value in [row.mixture, row.vapor, row.liquid, row.aqueous] {
                match value {
                    Some(v) => write!(f, "{v:>14.5e}")?,
                    None => write!(f, "{:>14}", "---")?,
                }
            }
            writeln!(f, "  {}", row.unit)?;
        }
        Ok(())
    }
}
