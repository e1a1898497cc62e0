//! Scenario traits.
//!
//! Two layers, the same way handlers are usually split:
//! - **Typed**: `NamedScenario` ties a scenario name to a Rust type and to a
//!   serde-decoded params struct, so a typo in a name or a bad param shape is
//!   caught once, in `from_params`.
//! - **Dyn**: `ScenarioFactory` / `Box<dyn Scenario>`, object-safe, what the
//!   registry stores and the runtime calls.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::domain::{Params, ScenarioError, ScenarioOutput};

/// One experiment: takes the merged run config, returns
/// `(value, info)` as a `ScenarioOutput`.
///
/// Runs on a blocking thread, so it is free to do heavy synchronous work.
pub trait Scenario: Send + Sync {
    fn single_run(&self, config: &Params) -> Result<ScenarioOutput, ScenarioError>;
}

/// A scenario constructible from the params found under the config's
/// `scenario` entry.
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct ImdbParams { size: usize, bs: usize }
///
/// impl NamedScenario for ImdbAttention {
///     const NAME: &'static str = "imdb_attention";
///     type Params = ImdbParams;
///     fn from_params(p: ImdbParams) -> Result<Self, ScenarioError> { ... }
/// }
/// ```
pub trait NamedScenario: Scenario + Sized + 'static {
    const NAME: &'static str;

    type Params: DeserializeOwned;

    fn from_params(params: Self::Params) -> Result<Self, ScenarioError>;
}

/// Object-safe constructor stored in the registry.
pub trait ScenarioFactory: Send + Sync {
    fn build(&self, params: Params) -> Result<Box<dyn Scenario>, ScenarioError>;
}

/// `ScenarioFactory` for a `NamedScenario` type.
pub struct TypedFactory<S> {
    _marker: PhantomData<fn() -> S>,
}

impl<S: NamedScenario> TypedFactory<S> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<S: NamedScenario> Default for TypedFactory<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: NamedScenario> ScenarioFactory for TypedFactory<S> {
    fn build(&self, params: Params) -> Result<Box<dyn Scenario>, ScenarioError> {
        let params: S::Params = serde_json::from_value(serde_json::Value::Object(params))
            .map_err(|e| ScenarioError::InvalidParams(format!("{}: {e}", S::NAME)))?;
        Ok(Box::new(S::from_params(params)?))
    }
}

/// `ScenarioFactory` from a closure.
pub struct FnFactory<F> {
    f: F,
}

impl<F> FnFactory<F>
where
    F: Fn(Params) -> Result<Box<dyn Scenario>, ScenarioError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ScenarioFactory for FnFactory<F>
where
    F: Fn(Params) -> Result<Box<dyn Scenario>, ScenarioError> + Send + Sync,
{
    fn build(&self, params: Params) -> Result<Box<dyn Scenario>, ScenarioError> {
        (self.f)(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoScenario, FailingScenario};
    use serde_json::json;

    #[test]
    fn typed_factory_decodes_params() {
        let factory = TypedFactory::<FailingScenario>::new();
        let mut params = Params::new();
        params.insert("message".into(), json!("diverged"));
        let scenario = factory.build(params).unwrap();
        let err = scenario.single_run(&Params::new()).unwrap_err();
        assert_eq!(err.to_string(), "diverged");
    }

    #[test]
    fn typed_factory_rejects_bad_params() {
        let factory = TypedFactory::<FailingScenario>::new();
        let mut params = Params::new();
        params.insert("message".into(), json!(42));
        let err = factory.build(params).err().unwrap();
        assert!(matches!(err, ScenarioError::InvalidParams(ref m) if m.starts_with("fail")));
    }

    #[test]
    fn fn_factory_calls_closure() {
        let factory = FnFactory::new(|_params| Ok(Box::new(EchoScenario) as Box<dyn Scenario>));
        let mut config = Params::new();
        config.insert("lr".into(), json!(0.1));
        let out = factory.build(Params::new()).unwrap().single_run(&config).unwrap();
        assert_eq!(out.value, json!({"lr": 0.1}));
    }
}
