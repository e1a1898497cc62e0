//! ScenarioRegistry - scenario name -> factory, filled at process start,
//! read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{Params, ScenarioError, TaskFailure};

use super::scenario::{FnFactory, NamedScenario, Scenario, ScenarioFactory, TypedFactory};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("scenario {0:?} is already registered")]
    AlreadyRegistered(String),

    #[error("scenario name must not be empty")]
    EmptyName,
}

#[derive(Default)]
pub struct ScenarioRegistry {
    factories: HashMap<String, Arc<dyn ScenarioFactory>>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: NamedScenario>(&mut self) -> Result<(), RegistryError> {
        self.register_factory(S::NAME, Arc::new(TypedFactory::<S>::new()))
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> Result<(), RegistryError>
    where
        F: Fn(Params) -> Result<Box<dyn Scenario>, ScenarioError> + Send + Sync + 'static,
    {
        self.register_factory(name, Arc::new(FnFactory::new(f)))
    }

    pub fn register_factory(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn ScenarioFactory>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.factories.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ScenarioFactory>> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// The scenario a run config asks for.
///
/// The `scenario` entry of the merged config may be:
/// - a string: the scenario name, no params
/// - a mapping with a `name` string: the name, the remaining keys are params
/// - absent: the task name is used, no params
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSpec {
    pub name: String,
    pub params: Params,
}

impl ScenarioSpec {
    pub const CONFIG_KEY: &'static str = "scenario";

    pub fn from_config(config: &Params, fallback_name: &str) -> Result<Self, TaskFailure> {
        match config.get(Self::CONFIG_KEY) {
            None | Some(serde_json::Value::Null) => Ok(Self {
                name: fallback_name.to_string(),
                params: Params::new(),
            }),
            Some(serde_json::Value::String(name)) => Ok(Self {
                name: name.clone(),
                params: Params::new(),
            }),
            Some(serde_json::Value::Object(entry)) => {
                let mut params = entry.clone();
                match params.remove("name") {
                    Some(serde_json::Value::String(name)) => Ok(Self { name, params }),
                    _ => Err(TaskFailure::InvalidConfig(
                        "`scenario` mapping needs a string `name`".to_string(),
                    )),
                }
            }
            Some(other) => Err(TaskFailure::InvalidConfig(format!(
                "`scenario` must be a string or a mapping, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoScenario, FailingScenario};
    use rstest::rstest;
    use serde_json::json;

    fn config(v: serde_json::Value) -> Params {
        match v {
            serde_json::Value::Object(m) => m,
            _ => panic!("config must be an object"),
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = ScenarioRegistry::new();
        registry.register::<EchoScenario>().unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = ScenarioRegistry::new();
        registry.register::<EchoScenario>().unwrap();
        let result = registry.register::<EchoScenario>();
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(ref n)) if n == "echo"));
    }

    #[test]
    fn empty_names_are_rejected() {
        let mut registry = ScenarioRegistry::new();
        let result = registry.register_fn("", |_| Ok(Box::new(EchoScenario) as Box<dyn Scenario>));
        assert!(matches!(result, Err(RegistryError::EmptyName)));
    }

    #[test]
    fn registered_names_are_sorted() {
        let mut registry = ScenarioRegistry::new();
        registry.register::<FailingScenario>().unwrap();
        registry.register::<EchoScenario>().unwrap();
        assert_eq!(registry.registered_names(), vec!["echo", "fail"]);
    }

    #[rstest]
    #[case(json!({}), "task-name", json!({}))]
    #[case(json!({"scenario": null}), "task-name", json!({}))]
    #[case(json!({"scenario": "imdb"}), "imdb", json!({}))]
    #[case(json!({"scenario": {"name": "imdb", "size": 1000, "bs": 64}}), "imdb", json!({"size": 1000, "bs": 64}))]
    fn spec_from_config(
        #[case] cfg: serde_json::Value,
        #[case] name: &str,
        #[case] params: serde_json::Value,
    ) {
        let spec = ScenarioSpec::from_config(&config(cfg), "task-name").unwrap();
        assert_eq!(spec.name, name);
        assert_eq!(serde_json::Value::Object(spec.params), params);
    }

    #[rstest]
    #[case(json!({"scenario": 3}))]
    #[case(json!({"scenario": {"size": 3}}))]
    #[case(json!({"scenario": {"name": 7}}))]
    fn bad_scenario_entries_are_invalid_config(#[case] cfg: serde_json::Value) {
        let err = ScenarioSpec::from_config(&config(cfg), "t").unwrap_err();
        assert!(matches!(err, TaskFailure::InvalidConfig(_)));
    }
}
