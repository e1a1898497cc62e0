//! Runtime - dispatches a run config to the registered scenario.
//!
//! Scenarios are synchronous and may run for hours, so each one gets a
//! blocking thread. A panic there comes back as a `JoinError` and is turned
//! into `TaskFailure::Panicked`; it never unwinds into the worker loop.

use std::any::Any;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{Params, ScenarioError, ScenarioOutput, Task, TaskFailure};
use crate::typed::{ScenarioRegistry, ScenarioSpec};

use super::context;

pub struct Runtime {
    registry: Arc<ScenarioRegistry>,
}

impl Runtime {
    pub fn new(registry: Arc<ScenarioRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    /// Build the run config for a task (params + description file).
    pub async fn prepare(&self, task: &Task) -> Result<Params, TaskFailure> {
        context::build_run_config(task).await
    }

    /// Resolve the scenario named by `config` (falling back to `task_name`)
    /// and run it to completion.
    pub async fn execute(
        &self,
        task_name: &str,
        config: Params,
    ) -> Result<ScenarioOutput, TaskFailure> {
        let spec = ScenarioSpec::from_config(&config, task_name)?;
        let factory = self
            .registry
            .get(&spec.name)
            .ok_or_else(|| TaskFailure::UnknownScenario(spec.name.clone()))?;

        debug!(scenario = %spec.name, "starting scenario");
        let scenario_name = spec.name.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let scenario = factory.build(spec.params).map_err(|e| match e {
                ScenarioError::InvalidParams(reason) => TaskFailure::InvalidConfig(reason),
                other => TaskFailure::Scenario {
                    scenario: spec.name.clone(),
                    source: other,
                },
            })?;
            scenario
                .single_run(&config)
                .map_err(|source| TaskFailure::Scenario {
                    scenario: spec.name,
                    source,
                })
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(TaskFailure::Panicked {
                scenario: scenario_name,
                message: panic_message(err.into_panic()),
            }),
            Err(err) => Err(TaskFailure::Panicked {
                scenario: scenario_name,
                message: err.to_string(),
            }),
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailureKind;
    use crate::testing::{EchoScenario, FailingScenario, PanickingScenario};
    use serde_json::json;

    fn runtime() -> Runtime {
        let mut registry = ScenarioRegistry::new();
        registry.register::<EchoScenario>().unwrap();
        registry.register::<FailingScenario>().unwrap();
        registry.register::<PanickingScenario>().unwrap();
        Runtime::new(Arc::new(registry))
    }

    fn config(v: serde_json::Value) -> Params {
        match v {
            serde_json::Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn runs_the_named_scenario() {
        let out = runtime()
            .execute("ignored", config(json!({"scenario": "echo", "lr": 0.1})))
            .await
            .unwrap();
        assert_eq!(out.value["lr"], 0.1);
    }

    #[tokio::test]
    async fn falls_back_to_task_name() {
        let out = runtime()
            .execute("echo", config(json!({"bs": 8})))
            .await
            .unwrap();
        assert_eq!(out.value, json!({"bs": 8}));
    }

    #[tokio::test]
    async fn unknown_scenario() {
        let err = runtime()
            .execute("t", config(json!({"scenario": "imdb"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnknownScenario);
    }

    #[tokio::test]
    async fn scenario_error_is_captured() {
        let err = runtime()
            .execute(
                "t",
                config(json!({"scenario": {"name": "fail", "message": "val loss exploded"}})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ScenarioFailed);
        assert_eq!(err.detail().chain, vec!["val loss exploded".to_string()]);
    }

    #[tokio::test]
    async fn bad_params_are_invalid_config() {
        let err = runtime()
            .execute("t", config(json!({"scenario": {"name": "fail", "message": 1}})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidConfig);
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let err = runtime()
            .execute("panic", Params::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TaskFailure::Panicked { ref message, .. } if message.contains("attention head")
        ));
    }

    #[test]
    fn registry_lists_what_the_runtime_can_dispatch() {
        let runtime = runtime();
        assert_eq!(runtime.registry().registered_names(), vec!["echo", "fail", "panic"]);
        assert!(!runtime.registry().contains("imdb"));
    }

    #[test]
    fn panic_message_handles_both_payloads() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }
}
