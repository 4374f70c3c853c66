use nalgebra::DMatrix;
use thiserror::Error;

use crate::registry::{ComponentRegistry, RegistryError, Species};

const FRACTION_SUM_TOLERANCE: f64 = 1e-6;

/// A feed: an ordered set of species with overall mole fractions.
///
/// Binary interaction parameters are resolved from the registry once, at
/// construction, and stored as a dense matrix where entry `(i, j)` is `k_ij`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mixture {
    species: Vec<Species>,
    fractions: Vec<f64>,
    interaction: DMatrix<f64>,
}

/// Errors raised when building a [`Mixture`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MixtureError {
    #[error("a mixture needs at least one species")]
    Empty,

    #[error(transparent)]
    UnknownSpecies(#[from] RegistryError),

    #[error("fraction of `{species}` must be finite and non-negative, got {value}")]
    InvalidFraction { species: String, value: f64 },

    #[error("mole fractions must sum to 1, got {0}")]
    FractionSum(f64),

    #[error("species `{0}` appears more than once")]
    Duplicate(String),
}

impl Mixture {
    /// Builds a mixture from mole fractions that already sum to one.
    ///
    /// # Errors
    ///
    /// Returns a [`MixtureError`] if a species is unknown or repeated, a
    /// fraction is negative or non-finite, or the fractions do not sum to one
    /// within `1e-6`.
    pub fn new(
        registry: &impl ComponentRegistry,
        feed: &[(&str, f64)],
    ) -> Result<Self, MixtureError> {
        let sum = checked_sum(feed)?;
        if (sum - 1.0).abs() > FRACTION_SUM_TOLERANCE {
            return Err(MixtureError::FractionSum(sum));
        }
        Self::build(registry, feed, sum)
    }

    /// Builds a mixture from mole amounts in any consistent unit, normalizing
    /// them to fractions.
    ///
    /// # Errors
    ///
    /// Returns a [`MixtureError`] if a species is unknown or repeated, an
    /// amount is negative or non-finite, or all amounts are zero.
    pub fn from_amounts(
        registry: &impl ComponentRegistry,
        amounts: &[(&str, f64)],
    ) -> Result<Self, MixtureError> {
        let sum = checked_sum(amounts)?;
        if sum <= 0.0 {
            return Err(MixtureError::FractionSum(sum));
        }
        Self::build(registry, amounts, sum)
    }

    fn build(
        registry: &impl ComponentRegistry,
        feed: &[(&str, f64)],
        sum: f64,
    ) -> Result<Self, MixtureError> {
        let mut species: Vec<Species> = Vec::with_capacity(feed.len());
        for &(id, _) in feed {
            let record = registry.lookup(id)?;
            if species.iter().any(|s| s.name == record.name) {
                return Err(MixtureError::Duplicate(record.name));
            }
            species.push(record);
        }

        let n = species.len();
        let interaction = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                0.0
            } else {
                registry.binary_interaction(&species[i].name, &species[j].name)
            }
        });

        Ok(Self {
            species,
            fractions: feed.iter().map(|&(_, z)| z / sum).collect(),
            interaction,
        })
    }

    /// Number of species.
    #[must_use]
    pub fn len(&self) -> usize {
        self.species.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    /// The resolved species records, in feed order.
    #[must_use]
    pub fn components(&self) -> &[Species] {
        &self.species
    }

    /// Overall mole fractions, in feed order.
    #[must_use]
    pub fn fractions(&self) -> &[f64] {
        &self.fractions
    }

    /// Directional binary interaction matrix, `k_ij` at `(i, j)`.
    #[must_use]
    pub fn interaction(&self) -> &DMatrix<f64> {
        &self.interaction
    }

    /// Position of water in the feed, if present.
    #[must_use]
    pub fn water_index(&self) -> Option<usize> {
        self.species.iter().position(Species::is_water)
    }

    /// Position of a species by its canonical name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.species
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Molar mass of a phase with composition `x`, kg/mol.
    #[must_use]
    pub fn molar_mass(&self, x: &[f64]) -> f64 {
        self.species
            .iter()
            .zip(x)
            .map(|(s, xi)| xi * s.molar_mass)
            .sum()
    }
}

fn checked_sum(feed: &[(&str, f64)]) -> Result<f64, MixtureError> {
    if feed.is_empty() {
        return Err(MixtureError::Empty);
    }
    let mut sum = 0.0;
    for &(id, value) in feed {
        if !value.is_finite() || value < 0.0 {
            return Err(MixtureError::InvalidFraction {
                species: id.to_string(),
                value,
            });
        }
        sum += value;
    }
    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::registry::Database;

    #[test]
    fn resolves_species_and_interactions() {
        let db = Database::builtin().unwrap();
        let mixture = Mixture::new(&db, &[("water", 0.5), ("C1", 0.3), ("co2", 0.2)]).unwrap();

        assert_eq!(mixture.len(), 3);
        assert_eq!(mixture.components()[1].name, "methane");
        assert_eq!(mixture.water_index(), Some(0));
        assert_eq!(mixture.index_of("CO2"), Some(2));

        let k = mixture.interaction();
        assert_relative_eq!(k[(0, 1)], 0.485);
        assert_relative_eq!(k[(0, 2)], 0.19);
        assert_relative_eq!(k[(2, 0)], 0.05);
        assert_relative_eq!(k[(1, 1)], 0.0);
    }

    #[test]
    fn normalizes_amounts() {
        let db = Database::builtin().unwrap();
        let mixture = Mixture::from_amounts(&db, &[("propane", 3.0), ("n-butane", 1.0)]).unwrap();
        assert_relative_eq!(mixture.fractions()[0], 0.75);
        assert_relative_eq!(mixture.fractions()[1], 0.25);
        assert_relative_eq!(
            mixture.molar_mass(mixture.fractions()),
            0.75 * 0.044097 + 0.25 * 0.058123
        );
    }

    #[test]
    fn rejects_invalid_feeds() {
        let db = Database::builtin().unwrap();

        assert_eq!(Mixture::new(&db, &[]), Err(MixtureError::Empty));
        assert!(matches!(
            Mixture::new(&db, &[("methane", 0.5), ("ethane", 0.4)]),
            Err(MixtureError::FractionSum(_))
        ));
        assert!(matches!(
            Mixture::new(&db, &[("methane", 1.2), ("ethane", -0.2)]),
            Err(MixtureError::InvalidFraction { .. })
        ));
        assert_eq!(
            Mixture::new(&db, &[("methane", 0.5), ("C1", 0.5)]),
            Err(MixtureError::Duplicate("methane".into()))
        );
        assert_eq!(
            Mixture::new(&db, &[("methane", 0.5), ("kryptonite", 0.5)]),
            Err(MixtureError::UnknownSpecies(RegistryError::UnknownSpecies(
                "kryptonite".into()
            )))
        );
        assert!(matches!(
            Mixture::from_amounts(&db, &[("methane", 0.0)]),
            Err(MixtureError::FractionSum(_))
        ));
    }
}
