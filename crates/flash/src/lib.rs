//! Multiphase isothermal-isobaric flash with cubic equations of state.
//!
//! Given a feed [`Mixture`], a temperature and a pressure, [`flash`] finds the
//! coexisting vapor, hydrocarbon liquid and aqueous phases, their amounts and
//! compositions. [`compute_properties`] then reports per-phase and bulk
//! properties, including transport properties.
//!
//! ```
//! use tpflash::{Conditions, Database, FlashConfig, Mixture, PhaseKind, flash};
//!
//! let mixture = Mixture::new(
//!     &Database::builtin().unwrap(),
//!     &[("propane", 0.5), ("n-butane", 0.5)],
//! ).unwrap();
//! let conditions = Conditions::from_si(300.0, 5e5).unwrap();
//!
//! let result = flash(&mixture, &conditions, &FlashConfig::default()).unwrap();
//! assert_eq!(result.phase_count(), 2);
//! assert!(result.has_phase(PhaseKind::Vapor));
//! ```
//!
//! The crate never installs a `tracing` subscriber. Stage transitions are
//! logged at `debug` and iterations at `trace`.

mod conditions;
mod config;
mod error;
mod mixture;
mod registry;

pub mod eos;
pub mod flash;
pub mod properties;
pub mod stability;
pub mod units;

pub use conditions::{ConditionError, Conditions};
pub use config::{ConfigError, CubicEquation, FlashConfig, MixingRule};
pub use error::{FlashError, PropertyError};
pub use flash::{
    Action, Equilibrium, FlashEvent, PhaseKind, PhaseState, Stage, Status, flash, flash_observed,
};
pub use mixture::{Mixture, MixtureError};
pub use properties::{
    CorrespondingStates, MixtureProperties, PhaseProperties, PropertyReport, PropertyRow,
    TransportModel, TransportState, compute_properties, compute_properties_with,
};
pub use registry::{ComponentRegistry, Database, RegistryError, Species};
pub use stability::{StabilityReport, Trial, TrialOutcome, is_stable};
