//! Scenarios built into the binary, for smoke-testing a deployment end to end.
//!
//! Real experiments register their own `NamedScenario`s in a binary of their
//! own; these two only prove the queue, the store and the tracking work.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use sweep_core::domain::{Params, ScenarioError, ScenarioOutput};
use sweep_core::typed::{NamedScenario, RegistryError, Scenario, ScenarioRegistry};

pub fn registry() -> Result<ScenarioRegistry, RegistryError> {
    let mut registry = ScenarioRegistry::new();
    registry.register::<Echo>()?;
    registry.register::<Sleep>()?;
    Ok(registry)
}

/// Returns the run config it was given.
pub struct Echo;

impl Scenario for Echo {
    fn single_run(&self, config: &Params) -> Result<ScenarioOutput, ScenarioError> {
        Ok(ScenarioOutput::new(serde_json::Value::Object(config.clone()))
            .with_info("keys", json!(config.len())))
    }
}

impl NamedScenario for Echo {
    const NAME: &'static str = "echo";
    type Params = serde_json::Value;

    fn from_params(_params: Self::Params) -> Result<Self, ScenarioError> {
        Ok(Echo)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SleepParams {
    #[serde(default = "default_seconds")]
    seconds: f64,
    #[serde(default)]
    fail: bool,
}

fn default_seconds() -> f64 {
    1.0
}

/// Blocks for a while, then succeeds (or fails when `fail: true`).
pub struct Sleep {
    duration: Duration,
    fail: bool,
}

impl Scenario for Sleep {
    fn single_run(&self, _config: &Params) -> Result<ScenarioOutput, ScenarioError> {
        std::thread::sleep(self.duration);
        if self.fail {
            return Err(ScenarioError::failed("sleep scenario asked to fail"));
        }
        Ok(ScenarioOutput::new(json!({ "slept": self.duration.as_secs_f64() })))
    }
}

impl NamedScenario for Sleep {
    const NAME: &'static str = "sleep";
    type Params = SleepParams;

    fn from_params(params: SleepParams) -> Result<Self, ScenarioError> {
        let duration = Duration::try_from_secs_f64(params.seconds).map_err(|e| {
            ScenarioError::InvalidParams(format!("seconds={}: {e}", params.seconds))
        })?;
        Ok(Sleep {
            duration,
            fail: params.fail,
        })
    }
}
