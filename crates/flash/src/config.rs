use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cubic equation of state used for every phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CubicEquation {
    /// Soave–Redlich–Kwong.
    #[default]
    Srk,
    /// Peng–Robinson (1976).
    PengRobinson,
}

/// Rule combining pure-component attraction parameters into a mixture value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MixingRule {
    /// Van der Waals one-fluid rule with symmetric `k_ij`.
    #[default]
    Classic,
    /// Panagiotopoulos–Reid rule with composition-dependent `k_ij ≠ k_ji`.
    Asymmetric,
}

/// Options controlling a single flash calculation.
///
/// Every field has a default, so a TOML file only needs the values it
/// overrides:
///
/// ```
/// use tpflash::{FlashConfig, MixingRule};
///
/// let config = FlashConfig::from_toml_str(r#"
///     mixing-rule = "classic"
///     volume-correction = true
///     max-iterations = 300
/// "#).unwrap();
///
/// assert_eq!(config.mixing_rule, MixingRule::Classic);
/// assert_eq!(config.max_iterations, 300);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct FlashConfig {
    pub equation: CubicEquation,
    pub mixing_rule: MixingRule,

    /// Apply Peneloux volume translation to reported volumes and densities.
    pub volume_correction: bool,

    /// Test converged phases for stability and add a third phase if needed.
    pub multiphase_check: bool,

    /// Switch to Newton steps when successive substitution stalls.
    pub newton: bool,

    /// Convergence tolerance on `max |Δ ln K|`.
    pub tolerance: f64,

    /// Outer iteration budget shared by all solver stages.
    pub max_iterations: usize,

    /// Tangent-plane distance below which a trial phase signals instability.
    pub stability_tolerance: f64,

    /// Iteration cap for each stability trial.
    pub stability_max_iterations: usize,

    /// Wall-clock budget in milliseconds, checked once per outer iteration.
    pub time_budget_ms: Option<u64>,
}

/// Errors raised when a flash configuration is invalid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("tolerance must be finite and positive, got {0}")]
    Tolerance(f64),

    #[error("stability tolerance must be finite and non-negative, got {0}")]
    StabilityTolerance(f64),

    #[error("{0} must be at least 1")]
    ZeroIterations(&'static str),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            equation: CubicEquation::Srk,
            mixing_rule: MixingRule::Classic,
            volume_correction: false,
            multiphase_check: false,
            newton: true,
            tolerance: 1e-10,
            max_iterations: 200,
            stability_tolerance: 1e-8,
            stability_max_iterations: 100,
            time_budget_ms: None,
        }
    }
}

impl FlashConfig {
    /// Parses and validates a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the text is not valid TOML, contains
    /// unknown keys, or holds out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that tolerances and iteration budgets are usable.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ConfigError::Tolerance(self.tolerance));
        }
        if !self.stability_tolerance.is_finite() || self.stability_tolerance < 0.0 {
            return Err(ConfigError::StabilityTolerance(self.stability_tolerance));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations("max_iterations"));
        }
        if self.stability_max_iterations == 0 {
            return Err(ConfigError::ZeroIterations("stability_max_iterations"));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_equation(self, equation: CubicEquation) -> Self {
        Self { equation, ..self }
    }

    #[must_use]
    pub fn with_mixing_rule(self, mixing_rule: MixingRule) -> Self {
        Self {
            mixing_rule,
            ..self
        }
    }

    #[must_use]
    pub fn with_volume_correction(self, volume_correction: bool) -> Self {
        Self {
            volume_correction,
            ..self
        }
    }

    #[must_use]
    pub fn with_multiphase_check(self, multiphase_check: bool) -> Self {
        Self {
            multiphase_check,
            ..self
        }
    }

    #[must_use]
    pub fn with_newton(self, newton: bool) -> Self {
        Self { newton, ..self }
    }

    #[must_use]
    pub fn with_tolerance(self, tolerance: f64) -> Self {
        Self { tolerance, ..self }
    }

    #[must_use]
    pub fn with_max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    #[must_use]
    pub fn with_time_budget(self, budget: Duration) -> Self {
        let millis = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        Self {
            time_budget_ms: Some(millis),
            ..self
        }
    }

    /// Returns the wall-clock budget, if any.
    #[must_use]
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = FlashConfig::from_toml_str("").unwrap();
        assert_eq!(config, FlashConfig::default());
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = FlashConfig::from_toml_str(
            r#"
            equation = "peng-robinson"
            mixing-rule = "asymmetric"
            multiphase-check = true
            tolerance = 1e-9
            time-budget-ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.equation, CubicEquation::PengRobinson);
        assert_eq!(config.mixing_rule, MixingRule::Asymmetric);
        assert!(config.multiphase_check);
        assert!(!config.volume_correction);
        assert_eq!(config.time_budget(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let err = FlashConfig::from_toml_str("mixing_rule_number = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = FlashConfig::default().with_tolerance(-1.0);
        assert_eq!(config.validate(), Err(ConfigError::Tolerance(-1.0)));

        let config = FlashConfig::default().with_max_iterations(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroIterations("max_iterations"))
        );
    }

    #[test]
    fn round_trips_through_toml() {
        let config = FlashConfig::default()
            .with_volume_correction(true)
            .with_multiphase_check(true)
            .with_time_budget(Duration::from_secs(2));

        let text = toml::to_string(&config).unwrap();
        assert_eq!(FlashConfig::from_toml_str(&text).unwrap(), config);
    }
}
