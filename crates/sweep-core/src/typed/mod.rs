//! Typed scenario API: `Scenario`, `NamedScenario`, the factories and the
//! `ScenarioRegistry` the runtime dispatches through.

pub mod registry;
pub mod scenario;

pub use self::registry::{RegistryError, ScenarioRegistry, ScenarioSpec};
pub use self::scenario::{FnFactory, NamedScenario, Scenario, ScenarioFactory, TypedFactory};
