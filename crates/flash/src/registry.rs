//! Pure-component data and binary interaction parameters.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::REFERENCE_TEMPERATURE;

const BUILTIN_COMPONENTS: &str = include_str!("../data/components.json");

/// Fixed properties of a single chemical species.
///
/// All values are SI: kelvin, pascal, kg/mol and m³/mol.
/// The ideal-gas heat capacity is `cp = A + B·T + C·T² + D·T³` in J/(mol·K).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    pub critical_temperature: f64,
    pub critical_pressure: f64,
    pub acentric_factor: f64,
    pub molar_mass: f64,
    pub critical_volume: f64,

    /// Rackett compressibility factor used for volume translation.
    #[serde(default)]
    pub rackett_z: Option<f64>,

    pub ideal_gas_cp: [f64; 4],
}

impl Species {
    /// Ideal-gas heat capacity at `t`, J/(mol·K).
    #[must_use]
    pub fn ideal_gas_cp(&self, t: f64) -> f64 {
        let [a, b, c, d] = self.ideal_gas_cp;
        a + t * (b + t * (c + t * d))
    }

    /// `∫ cp dT` from the reference temperature to `t`, J/mol.
    #[must_use]
    pub fn ideal_gas_enthalpy(&self, t: f64) -> f64 {
        let [a, b, c, d] = self.ideal_gas_cp;
        let antiderivative = |t: f64| t * (a + t * (b / 2.0 + t * (c / 3.0 + t * d / 4.0)));
        antiderivative(t) - antiderivative(REFERENCE_TEMPERATURE)
    }

    /// `∫ cp/T dT` from the reference temperature to `t`, J/(mol·K).
    #[must_use]
    pub fn ideal_gas_entropy(&self, t: f64) -> f64 {
        let [a, b, c, d] = self.ideal_gas_cp;
        let antiderivative = |t: f64| a * t.ln() + t * (b + t * (c / 2.0 + t * d / 3.0));
        antiderivative(t) - antiderivative(REFERENCE_TEMPERATURE)
    }

    /// Rackett factor, falling back to the Yamada–Gunn estimate.
    #[must_use]
    pub fn rackett_z(&self) -> f64 {
        self.rackett_z
            .unwrap_or(0.29056 - 0.08775 * self.acentric_factor)
    }

    /// Critical compressibility factor `Pc·Vc/(R·Tc)`.
    #[must_use]
    pub fn critical_z(&self) -> f64 {
        self.critical_pressure * self.critical_volume
            / (crate::units::GAS_CONSTANT * self.critical_temperature)
    }

    #[must_use]
    pub fn is_water(&self) -> bool {
        self.name.eq_ignore_ascii_case("water")
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<10} Tc={:>8.2} K  Pc={:>7.3} MPa  ω={:>6.4}  M={:>8.3} g/mol  Vc={:>6.1} cm³/mol",
            self.name,
            self.critical_temperature,
            self.critical_pressure * 1e-6,
            self.acentric_factor,
            self.molar_mass * 1e3,
            self.critical_volume * 1e6,
        )
    }
}

/// Errors raised by a component registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown species `{0}`")]
    UnknownSpecies(String),

    #[error("species `{0}` is defined more than once")]
    DuplicateSpecies(String),

    #[error("binary parameter references unknown species `{0}`")]
    UnknownBinarySpecies(String),

    #[error("failed to parse component data: {0}")]
    Parse(String),
}

/// Source of species records and binary interaction parameters.
pub trait ComponentRegistry {
    /// Resolves a species by name or alias.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownSpecies`] if `id` is not known.
    fn lookup(&self, id: &str) -> Result<Species, RegistryError>;

    /// Returns `k_ij` for the ordered pair, or zero when no value is stored.
    ///
    /// Registries with asymmetric data may return `k_ij ≠ k_ji`.
    fn binary_interaction(&self, i: &str, j: &str) -> f64;
}

#[derive(Debug, Deserialize)]
struct DatabaseFile {
    components: Vec<ComponentRecord>,
    #[serde(default)]
    binary: Vec<BinaryRecord>,
}

#[derive(Debug, Deserialize)]
struct ComponentRecord {
    #[serde(flatten)]
    species: Species,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BinaryRecord {
    pair: [String; 2],
    kij: f64,
    kji: Option<f64>,
}

/// In-memory component database loaded from JSON.
///
/// Names and aliases match case-insensitively.
#[derive(Debug, Clone, PartialEq)]
pub struct Database {
    species: Vec<Species>,
    index: HashMap<String, usize>,
    binary: HashMap<(usize, usize), f64>,
}

impl Database {
    /// Loads the twelve species shipped with the crate.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] only if the embedded data is corrupt.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_json(BUILTIN_COMPONENTS)
    }

    /// Loads a database from JSON text.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the text is malformed, a name or alias
    /// is repeated, or a binary pair references an unknown species.
    pub fn from_json(text: &str) -> Result<Self, RegistryError> {
        let file: DatabaseFile =
            serde_json::from_str(text).map_err(|e| RegistryError::Parse(e.to_string()))?;

        let mut species = Vec::with_capacity(file.components.len());
        let mut index = HashMap::new();

        for (position, record) in file.components.into_iter().enumerate() {
            let keys = std::iter::once(&record.species.name).chain(&record.aliases);
            for key in keys {
                if index.insert(normalize(key), position).is_some() {
                    return Err(RegistryError::DuplicateSpecies(key.clone()));
                }
            }
            species.push(record.species);
        }

        let mut binary = HashMap::new();
        for record in file.binary {
            let [first, second] = &record.pair;
            let i = *index
                .get(&normalize(first))
                .ok_or_else(|| RegistryError::UnknownBinarySpecies(first.clone()))?;
            let j = *index
                .get(&normalize(second))
                .ok_or_else(|| RegistryError::UnknownBinarySpecies(second.clone()))?;
            binary.insert((i, j), record.kij);
            binary.insert((j, i), record.kji.unwrap_or(record.kij));
        }

        Ok(Self {
            species,
            index,
            binary,
        })
    }

    /// Iterates over every species in file order.
    pub fn species(&self) -> impl Iterator<Item = &Species> {
        self.species.iter()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.index.get(&normalize(id)).copied()
    }
}

impl ComponentRegistry for Database {
    fn lookup(&self, id: &str) -> Result<Species, RegistryError> {
        self.position(id)
            .map(|i| self.species[i].clone())
            .ok_or_else(|| RegistryError::UnknownSpecies(id.to_string()))
    }

    fn binary_interaction(&self, i: &str, j: &str) -> f64 {
        match (self.position(i), self.position(j)) {
            (Some(i), Some(j)) if i != j => self.binary.get(&(i, j)).copied().unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

fn normalize(id: &str) -> String {
    id.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn builtin_has_twelve_species() {
        let db = Database::builtin().unwrap();
        assert_eq!(db.species().count(), 12);
    }

    #[test]
    fn lookup_matches_aliases_case_insensitively() {
        let db = Database::builtin().unwrap();
        assert_eq!(db.lookup("Carbon Dioxide").unwrap().name, "CO2");
        assert_eq!(db.lookup("co2").unwrap().name, "CO2");
        assert_eq!(db.lookup("isobutane").unwrap().name, "i-butane");
        assert_eq!(db.lookup(" Water ").unwrap().name, "water");
    }

    #[test]
    fn unknown_species_is_an_error() {
        let db = Database::builtin().unwrap();
        assert_eq!(
            db.lookup("unobtainium"),
            Err(RegistryError::UnknownSpecies("unobtainium".into()))
        );
    }

    #[test]
    fn binary_parameters_are_directional() {
        let db = Database::builtin().unwrap();
        assert_relative_eq!(db.binary_interaction("water", "methane"), 0.485);
        assert_relative_eq!(db.binary_interaction("methane", "water"), 0.485);
        assert_relative_eq!(db.binary_interaction("water", "CO2"), 0.19);
        assert_relative_eq!(db.binary_interaction("CO2", "water"), 0.05);
        assert_relative_eq!(db.binary_interaction("methane", "ethane"), 0.0);
        assert_relative_eq!(db.binary_interaction("water", "water"), 0.0);
    }

    #[test]
    fn ideal_gas_integrals_vanish_at_reference() {
        let methane = Database::builtin().unwrap().lookup("methane").unwrap();
        assert_relative_eq!(methane.ideal_gas_enthalpy(REFERENCE_TEMPERATURE), 0.0);
        assert_relative_eq!(methane.ideal_gas_entropy(REFERENCE_TEMPERATURE), 0.0);

        // Methane cp near 35.7 J/(mol·K) at room temperature.
        assert_relative_eq!(methane.ideal_gas_cp(298.15), 35.7, max_relative = 0.02);

        let dh = methane.ideal_gas_enthalpy(308.15);
        assert_relative_eq!(dh, 10.0 * methane.ideal_gas_cp(303.15), max_relative = 1e-3);
    }

    #[test]
    fn rackett_falls_back_to_acentric_estimate() {
        let mut water = Database::builtin().unwrap().lookup("water").unwrap();
        assert_relative_eq!(water.rackett_z(), 0.2338);
        water.rackett_z = None;
        assert_relative_eq!(water.rackett_z(), 0.29056 - 0.08775 * 0.3443);
        assert!(water.is_water());
    }

    #[test]
    fn rejects_duplicate_names() {
        let text = r#"{
            "components": [
                { "name": "a", "aliases": ["x"], "critical_temperature": 1.0,
                  "critical_pressure": 1.0, "acentric_factor": 0.0, "molar_mass": 1.0,
                  "critical_volume": 1.0, "ideal_gas_cp": [1.0, 0.0, 0.0, 0.0] },
                { "name": "X", "critical_temperature": 1.0,
                  "critical_pressure": 1.0, "acentric_factor": 0.0, "molar_mass": 1.0,
                  "critical_volume": 1.0, "ideal_gas_cp": [1.0, 0.0, 0.0, 0.0] }
            ]
        }"#;
        assert_eq!(
            Database::from_json(text),
            Err(RegistryError::DuplicateSpecies("X".into()))
        );
    }

    #[test]
    fn display_lists_critical_properties() {
        let text = Database::builtin().unwrap().lookup("propane").unwrap().to_string();
        assert!(text.starts_with("propane"));
        assert!(text.contains("369.83"));
    }
}
